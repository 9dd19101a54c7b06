//! Accelerator power, reset and clock control through the SoC CCU.

use crate::error::{NnaError, Result};
use crate::mmio::RegisterIo;
use nna_chip::ccu;
use tracing::{debug, info};

/// Clock and power gate of the NNA.
#[derive(Debug)]
pub struct PowerControl<C: RegisterIo> {
    ccu: C,
    clock_mhz: Option<u32>,
    powered: bool,
}

impl<C: RegisterIo> PowerControl<C> {
    /// Wrap a mapped CCU window. Nothing is written until a method is called.
    pub const fn new(ccu: C) -> Self {
        Self {
            ccu,
            clock_mhz: None,
            powered: false,
        }
    }

    /// Open the clock gate and release reset.
    pub fn power_on(&mut self) {
        self.ccu.write32(ccu::NNA_GATE, ccu::GATE_ON);
        self.powered = true;
        info!("NNA powered on");
    }

    /// Gate the clock and hold the engine in reset.
    pub fn power_off(&mut self) {
        self.ccu.write32(ccu::NNA_GATE, ccu::GATE_OFF);
        self.powered = false;
        info!("NNA powered off");
    }

    /// Disable then re-arm every engine.
    ///
    /// Clears all engine state, including programmed descriptor groups.
    pub fn reset(&mut self) {
        self.ccu.write32(ccu::NNA_GATE, ccu::GATE_OFF);
        self.ccu.write32(ccu::NNA_GATE, ccu::GATE_ON);
        self.powered = true;
        debug!("NNA reset");
    }

    /// Select the accelerator clock.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidState`] if `mhz` is not one of the supported
    /// frequencies; the clock register is left untouched.
    pub fn set_clock(&mut self, mhz: u32) -> Result<()> {
        let word = ccu::clock_word(mhz).ok_or_else(|| {
            let supported: Vec<String> =
                ccu::CLOCK_TABLE.iter().map(|(f, _)| f.to_string()).collect();
            NnaError::invalid_state(format!(
                "unsupported NNA clock {mhz} MHz (supported: {})",
                supported.join(", ")
            ))
        })?;
        self.ccu.write32(ccu::NNA_CLOCK, word);
        self.clock_mhz = Some(mhz);
        info!("NNA clock set to {mhz} MHz");
        Ok(())
    }

    /// Clock selected through this handle, if any.
    pub const fn clock_mhz(&self) -> Option<u32> {
        self.clock_mhz
    }

    /// Whether the gate is open.
    pub const fn is_powered(&self) -> bool {
        self.powered
    }

    /// Raw CCU window.
    pub const fn ccu(&self) -> &C {
        &self.ccu
    }

    /// Raw CCU window, mutably.
    pub fn ccu_mut(&mut self) -> &mut C {
        &mut self.ccu
    }
}
