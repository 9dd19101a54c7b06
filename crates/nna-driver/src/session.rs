//! Hardware session: the two register windows, power control and the
//! pipeline state they share.

use crate::config::{RunOptions, SessionConfig};
use crate::conv::ConvOperation;
use crate::error::Result;
use crate::mmio::{MappedWindow, RegisterIo};
use crate::pdp::PoolOperation;
use crate::pipeline::{Orchestrator, PipelineRun, PipelineState, RunReport};
use crate::power::PowerControl;
use crate::sdp::ScaleBiasOperation;
use nna_chip::regs::glb;
use tracing::info;

/// One accelerator session.
///
/// Owns the NNA register window and the CCU power controller. Runs are
/// serialized through `&mut self`; the NNA is powered off on
/// [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct Session<R: RegisterIo, C: RegisterIo> {
    nna: R,
    power: PowerControl<C>,
    state: PipelineState,
}

impl Session<MappedWindow, MappedWindow> {
    /// Map both windows from the memory device and bring the NNA up.
    ///
    /// # Errors
    ///
    /// Mapping failures, or an unsupported clock in `config`.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let nna = MappedWindow::open(&config.mem_device, config.nna_base, config.nna_size)?;
        let ccu = MappedWindow::open(&config.mem_device, config.ccu_base, config.ccu_size)?;
        info!(
            "Mapped NNA at {:#x} and CCU at {:#x} via {}",
            config.nna_base,
            config.ccu_base,
            config.mem_device.display()
        );
        Self::with_windows(nna, ccu, config)
    }
}

impl<R: RegisterIo, C: RegisterIo> Session<R, C> {
    /// Build a session over already-mapped windows.
    ///
    /// With `power_on_open` set this powers on, selects the clock, resets the
    /// engines and clears stale interrupt status.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidState`](crate::NnaError::InvalidState) for an
    /// unsupported clock.
    pub fn with_windows(nna: R, ccu: C, config: &SessionConfig) -> Result<Self> {
        let mut session = Self {
            nna,
            power: PowerControl::new(ccu),
            state: PipelineState::Idle,
        };
        if config.power_on_open {
            session.power.power_on();
            session.power.set_clock(config.clock_mhz)?;
            session.power.reset();
            session.nna.write32(glb::S_INTR_STATUS, glb::INTR_CLEAR_ALL);
        }
        Ok(session)
    }

    /// Run one pipeline and block until it completes, times out or is
    /// cancelled.
    ///
    /// Descriptors are validated and compiled before any register write; on
    /// every path after that the engines are reset and the session returns
    /// to [`PipelineState::Idle`].
    ///
    /// # Errors
    ///
    /// - contract violations (`InvalidGeometry`, `UnsupportedFormat`), with
    ///   nothing written
    /// - `Timeout`, `FlushTimeout` or `Cancelled`
    /// - `InvalidState` if a previous run never returned to idle
    pub fn run_operation(&mut self, run: &PipelineRun, opts: &RunOptions) -> Result<RunReport> {
        Orchestrator::new(&mut self.nna, &mut self.power, &mut self.state).run(run, opts)
    }

    /// Convolution into scale-bias, output to memory.
    ///
    /// # Errors
    ///
    /// See [`run_operation`](Self::run_operation).
    pub fn run_conv(
        &mut self,
        conv: ConvOperation,
        sdp: ScaleBiasOperation,
        opts: &RunOptions,
    ) -> Result<RunReport> {
        self.run_operation(&PipelineRun::ConvOnly { conv, sdp }, opts)
    }

    /// Convolution into scale-bias into pooling.
    ///
    /// # Errors
    ///
    /// See [`run_operation`](Self::run_operation).
    pub fn run_conv_pool(
        &mut self,
        conv: ConvOperation,
        sdp: ScaleBiasOperation,
        pdp: PoolOperation,
        opts: &RunOptions,
    ) -> Result<RunReport> {
        self.run_operation(&PipelineRun::ConvPool { conv, sdp, pdp }, opts)
    }

    /// Raw interrupt status.
    pub fn read_status(&mut self) -> u32 {
        self.nna.read32(glb::S_INTR_STATUS)
    }

    /// Current pipeline state.
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Power controller.
    pub fn power_mut(&mut self) -> &mut PowerControl<C> {
        &mut self.power
    }

    /// NNA register window.
    pub const fn nna(&self) -> &R {
        &self.nna
    }

    /// NNA register window, mutably.
    pub fn nna_mut(&mut self) -> &mut R {
        &mut self.nna
    }

    /// Power the NNA off and release both windows.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.power.is_powered() {
            self.power.power_off();
            info!("Session closed");
        }
    }
}

impl<R: RegisterIo, C: RegisterIo> Drop for Session<R, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
