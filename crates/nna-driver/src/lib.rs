//! Userspace driver for the NNA tensor accelerator.
//!
//! Turns layer descriptors (data cubes plus convolution, scale-bias and
//! pooling parameters) into register programs, writes them through a mapped
//! register window, and drives the engines to completion.
//!
//! # Pipeline
//!
//! ```text
//! ConvOperation ─▶ ScaleBiasOperation ─▶ [PoolOperation]
//!      │                  │                     │
//!      └──── compile ─────┴────── compile ──────┘   (all before any write)
//!                         ▼
//!   producer pointers ▶ programs ▶ enables ▶ poll INTR_STATUS ▶ reset
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use nna_driver::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::from_env()?;
//! let mut session = Session::open(&config)?;
//!
//! let input = DataCube::feature(0x4000_0000, CubeDims::new(32, 32, 8));
//! let conv = ConvOperation::new(input, Kernel::square(3, 32), 0x4010_0000)
//!     .with_padding(Padding::symmetric(1));
//! let out = conv.output_cube()?;
//! let sdp = ScaleBiasOperation::new(
//!     DataCube::flying(out.dims),
//!     DataCube::feature(0x4020_0000, out.dims),
//! );
//!
//! let report = session.run_conv(conv, sdp, &RunOptions::default())?;
//! println!("done after {} polls", report.polls);
//! # Ok(())
//! # }
//! ```
//!
//! Without hardware, [`SoftwareWindow`] stands in for both windows; see
//! [`Session::with_windows`].

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod buffer;
mod config;
pub mod conv;
mod cube;
mod error;
pub mod layout;
pub mod mmio;
pub mod pdp;
pub mod pipeline;
mod power;
mod program;
pub mod sdp;
mod session;
mod software;

pub use buffer::{BufferProvider, PhysicalRegion, ReservedMemory};
pub use config::{parse_u64, RunOptions, SessionConfig};
pub use conv::{ConvGeometry, ConvOperation, Dilation, Kernel, Padding, ReuseFlags, Stride};
pub use cube::{CubeDims, DataCube, DataFormat};
pub use error::{NnaError, Result};
pub use mmio::{MappedWindow, RegisterIo};
pub use pdp::{PoolMode, PoolOperation};
pub use pipeline::{
    wait_for_completion, CancelToken, CompiledRun, Completion, PipelineRun, PipelineState,
    RunReport,
};
pub use power::PowerControl;
pub use program::{RegWrite, RegisterProgram};
pub use sdp::{Activation, AluAlgo, Conversion, Lane, LaneOp, LaneSource, ScaleBiasOperation};
pub use session::Session;
pub use software::SoftwareWindow;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Activation, CancelToken, ConvOperation, CubeDims, DataCube, Kernel, Lane, NnaError,
        Padding, PipelineRun, PipelineState, PoolMode, PoolOperation, Result, RunOptions,
        ScaleBiasOperation, Session, SessionConfig, SoftwareWindow, Stride,
    };
}
