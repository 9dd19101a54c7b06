//! Pipeline orchestrator.
//!
//! One run drives the engines through a fixed sequence:
//!
//! ```text
//! Idle ─▶ ProducerSet ─▶ Programmed ─▶ Enabled ─▶ WaitingCompletion ─┬▶ Done ─────┐
//!                                                                     └▶ TimedOut ─┤
//! Idle ◀──────────────────────────── reset ◀──────────────────────────────────────┘
//! ```
//!
//! Every engine program is compiled before the first register write, so an
//! invalid descriptor never leaves the hardware partially programmed. Once
//! writes have started, the engines are reset on every exit path.

use crate::config::RunOptions;
use crate::conv::{self, ConvOperation};
use crate::error::{NnaError, Result};
use crate::mmio::RegisterIo;
use crate::pdp::{self, PoolOperation};
use crate::power::PowerControl;
use crate::program::RegisterProgram;
use crate::sdp::{self, ScaleBiasOperation};
use nna_chip::regs::{self, cdma, glb, intr, pdp as pdp_regs, sdp as sdp_regs};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No run in progress; engines reset.
    Idle,
    /// Producer pointers written.
    ProducerSet,
    /// Engine register programs written.
    Programmed,
    /// Operation-enable bits asserted.
    Enabled,
    /// Polling the interrupt status register.
    WaitingCompletion,
    /// Completion flags matched.
    Done,
    /// Deadline passed without a match.
    TimedOut,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cooperative cancellation flag shared with another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the waiting run stops at its next poll.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Engines taking part in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineRun {
    /// Convolution into scale-bias, output to memory.
    ConvOnly {
        /// Convolution pass.
        conv: ConvOperation,
        /// Scale-bias pass.
        sdp: ScaleBiasOperation,
    },
    /// Convolution into scale-bias into pooling.
    ConvPool {
        /// Convolution pass.
        conv: ConvOperation,
        /// Scale-bias pass.
        sdp: ScaleBiasOperation,
        /// Pooling pass.
        pdp: PoolOperation,
    },
}

impl PipelineRun {
    /// Short shape name.
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::ConvOnly { .. } => "conv_only",
            Self::ConvPool { .. } => "conv_pool",
        }
    }

    /// Interrupt bits that must all be set for the run to be complete.
    pub const fn event_mask(&self) -> u32 {
        match self {
            Self::ConvOnly { .. } => intr::CONV_ONLY_MASK,
            Self::ConvPool { .. } => intr::CONV_POOL_MASK,
        }
    }

    /// Value the masked status must equal.
    pub const fn event_value(&self) -> u32 {
        self.event_mask()
    }

    /// Validate every engine and compile their register programs.
    ///
    /// # Errors
    ///
    /// The first contract violation found; nothing is compiled past it.
    pub fn compile(&self) -> Result<CompiledRun> {
        let (conv, sdp, pdp) = match self {
            Self::ConvOnly { conv, sdp } => (conv, sdp, None),
            Self::ConvPool { conv, sdp, pdp } => (conv, sdp, Some(pdp)),
        };

        let conv_out = conv.output_cube()?;
        if sdp.source.in_memory() {
            return Err(NnaError::invalid_geometry("sdp source must be the flying conv output"));
        }
        if conv_out.dims != sdp.source.dims {
            return Err(NnaError::invalid_geometry(format!(
                "conv output {} does not match sdp input {}",
                conv_out.dims, sdp.source.dims
            )));
        }
        match pdp {
            Some(pdp) => {
                if sdp.feeds_pooling() == pdp.reads_memory() {
                    return Err(NnaError::invalid_geometry(
                        "sdp destination and pool source disagree on fly mode",
                    ));
                }
                if pdp.source.dims != sdp.destination.dims {
                    return Err(NnaError::invalid_geometry(format!(
                        "sdp output {} does not match pool input {}",
                        sdp.destination.dims, pdp.source.dims
                    )));
                }
            }
            None if sdp.feeds_pooling() => {
                return Err(NnaError::invalid_geometry(
                    "conv_only run needs an sdp destination in memory",
                ));
            }
            None => {}
        }

        Ok(CompiledRun {
            shape: self.shape(),
            conv: conv.compile()?,
            sdp: sdp.compile()?,
            pdp: pdp.map(PoolOperation::compile).transpose()?,
            sdp_rdma: sdp.rdma_needed(),
            pdp_rdma: pdp.is_some_and(PoolOperation::reads_memory),
            event_mask: self.event_mask(),
            event_value: self.event_value(),
        })
    }
}

/// Register programs for every engine of a validated run.
#[derive(Debug, Clone)]
pub struct CompiledRun {
    /// Shape name.
    pub shape: &'static str,
    /// Convolution program.
    pub conv: RegisterProgram,
    /// Scale-bias program.
    pub sdp: RegisterProgram,
    /// Pooling program, for `conv_pool`.
    pub pdp: Option<RegisterProgram>,
    /// SDP RDMA must be enabled.
    pub sdp_rdma: bool,
    /// PDP RDMA must be enabled.
    pub pdp_rdma: bool,
    /// Completion mask.
    pub event_mask: u32,
    /// Expected masked completion value.
    pub event_value: u32,
}

impl CompiledRun {
    /// Programs in write order.
    pub fn programs(&self) -> impl Iterator<Item = &RegisterProgram> {
        [&self.conv, &self.sdp].into_iter().chain(self.pdp.as_ref())
    }
}

/// Outcome of the completion wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Flags matched on poll `polls`.
    Done {
        /// Polls performed, including the matching one.
        polls: u32,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// Poll budget spent without a match.
    TimedOut {
        /// Last observed status.
        status: u32,
        /// Polls performed.
        polls: u32,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// Cancellation requested.
    Cancelled {
        /// Polls performed.
        polls: u32,
    },
}

/// Successful run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Shape that ran.
    pub shape: &'static str,
    /// Completion polls, including the matching one.
    pub polls: u32,
    /// Time from enable to completion.
    pub elapsed: Duration,
    /// States visited, in order.
    pub states: Vec<PipelineState>,
}

/// Poll the interrupt status until `(status & mask) == value`.
///
/// Performs at most [`RunOptions::max_polls`] reads, sleeping
/// `poll_interval` between them. On a match the status register is cleared.
pub fn wait_for_completion<R: RegisterIo + ?Sized>(
    io: &mut R,
    mask: u32,
    value: u32,
    opts: &RunOptions,
) -> Completion {
    let max_polls = opts.max_polls();
    let start = Instant::now();
    let mut status = 0;

    for poll in 1..=max_polls {
        status = io.read32(glb::S_INTR_STATUS);
        if status & mask == value {
            io.write32(glb::S_INTR_STATUS, glb::INTR_CLEAR_ALL);
            return Completion::Done {
                polls: poll,
                elapsed: start.elapsed(),
            };
        }
        if opts.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Completion::Cancelled { polls: poll };
        }
        if poll < max_polls {
            std::thread::sleep(opts.poll_interval);
        }
    }

    Completion::TimedOut {
        status,
        polls: max_polls,
        elapsed: start.elapsed(),
    }
}

/// Drives one run across the engines and the power controller.
pub(crate) struct Orchestrator<'a, R: RegisterIo, C: RegisterIo> {
    nna: &'a mut R,
    power: &'a mut PowerControl<C>,
    state: &'a mut PipelineState,
    visited: Vec<PipelineState>,
}

impl<'a, R: RegisterIo, C: RegisterIo> Orchestrator<'a, R, C> {
    pub(crate) fn new(
        nna: &'a mut R,
        power: &'a mut PowerControl<C>,
        state: &'a mut PipelineState,
    ) -> Self {
        Self {
            nna,
            power,
            state,
            visited: Vec::new(),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("pipeline {} -> {}", *self.state, next);
        *self.state = next;
        self.visited.push(next);
    }

    /// Run to completion. The engines are reset before returning whenever
    /// any register was written.
    pub(crate) fn run(mut self, run: &PipelineRun, opts: &RunOptions) -> Result<RunReport> {
        if *self.state != PipelineState::Idle {
            return Err(NnaError::invalid_state(format!(
                "pipeline busy ({})",
                *self.state
            )));
        }
        let compiled = run.compile()?;
        self.visited.push(PipelineState::Idle);

        let result = self.execute(&compiled, run, opts);

        self.power.reset();
        self.transition(PipelineState::Idle);

        let (polls, elapsed) = result?;
        info!("{} done after {polls} polls ({elapsed:?})", compiled.shape);
        Ok(RunReport {
            shape: compiled.shape,
            polls,
            elapsed,
            states: self.visited,
        })
    }

    fn execute(
        &mut self,
        compiled: &CompiledRun,
        run: &PipelineRun,
        opts: &RunOptions,
    ) -> Result<(u32, Duration)> {
        self.set_producers(run);
        self.transition(PipelineState::ProducerSet);

        for program in compiled.programs() {
            program.apply(&mut *self.nna);
        }
        self.transition(PipelineState::Programmed);

        self.enable_conv(opts)?;
        self.enable_sdp(compiled.sdp_rdma, opts.perf_stats);
        if compiled.pdp.is_some() {
            self.enable_pdp(compiled.pdp_rdma, opts.perf_stats);
        }
        self.transition(PipelineState::Enabled);

        self.transition(PipelineState::WaitingCompletion);
        match wait_for_completion(&mut *self.nna, compiled.event_mask, compiled.event_value, opts) {
            Completion::Done { polls, elapsed } => {
                self.transition(PipelineState::Done);
                Ok((polls, elapsed))
            }
            Completion::TimedOut {
                status,
                polls,
                elapsed,
            } => {
                self.transition(PipelineState::TimedOut);
                let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
                error!(
                    "{} timed out: status={status:#010x} expected={:#010x} polls={polls} elapsed={elapsed_us}µs",
                    compiled.shape, compiled.event_value
                );
                Err(NnaError::Timeout {
                    status,
                    expected: compiled.event_value,
                    polls,
                    elapsed_us,
                })
            }
            Completion::Cancelled { polls } => {
                info!("{} cancelled after {polls} polls", compiled.shape);
                Err(NnaError::Cancelled { polls })
            }
        }
    }

    fn set_producers(&mut self, run: &PipelineRun) {
        let mut pointers: Vec<usize> = conv::PRODUCER_POINTERS.to_vec();
        pointers.extend(sdp::PRODUCER_POINTERS);
        if matches!(run, PipelineRun::ConvPool { .. }) {
            pointers.extend(pdp::PRODUCER_POINTERS);
        }
        for reg in pointers {
            self.nna.write32(reg, regs::POINTER_GROUP_0);
        }
    }

    /// Wait for the convolution buffer to flush, then enable consumer first.
    fn enable_conv(&mut self, opts: &RunOptions) -> Result<()> {
        let max_polls = opts.max_polls();
        let mut flushed = false;
        for poll in 1..=max_polls {
            if self.nna.read32(cdma::S_CBUF_FLUSH_STATUS) != 0 {
                flushed = true;
                break;
            }
            if opts.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(NnaError::Cancelled { polls: poll });
            }
            std::thread::sleep(opts.poll_interval);
        }
        if !flushed {
            error!("convolution buffer not flushed after {max_polls} polls");
            return Err(NnaError::FlushTimeout { polls: max_polls });
        }

        self.nna
            .write32(cdma::D_PERF_ENABLE, u32::from(opts.perf_stats));
        for reg in conv::OP_ENABLES {
            self.nna.write32(reg, regs::OP_ENABLE);
        }
        Ok(())
    }

    fn enable_sdp(&mut self, rdma: bool, perf_stats: bool) {
        if perf_stats {
            self.nna
                .write32(sdp_regs::D_PERF_ENABLE, sdp_regs::PERF_ENABLE_ALL);
        }
        if rdma {
            self.nna.write32(regs::sdp_rdma::D_OP_ENABLE, regs::OP_ENABLE);
        }
        self.nna.write32(sdp_regs::D_OP_ENABLE, regs::OP_ENABLE);
    }

    fn enable_pdp(&mut self, rdma: bool, perf_stats: bool) {
        if perf_stats {
            self.nna.write32(pdp_regs::D_PERF_ENABLE, 1);
        }
        if rdma {
            self.nna.write32(regs::pdp_rdma::D_OP_ENABLE, regs::OP_ENABLE);
        }
        self.nna.write32(pdp_regs::D_OP_ENABLE, regs::OP_ENABLE);
    }
}
