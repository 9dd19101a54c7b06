//! Silicon model for the NNA tensor accelerator (NVDLA "small" derivative).
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the silicon: register offsets for every engine block, the
//! convolution buffer geometry, completion-interrupt bits, and the SoC
//! clock/power control unit that gates the accelerator.
//!
//! Offsets are relative to the NNA register window; the window
//! itself and the control unit live at SoC-specific physical addresses
//! described in [`window`].
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`window`] | Physical placement of the NNA and CCU windows per SoC |
//! | [`regs`] | Register map: GLB, CDMA, CSC, CMAC, CACC, SDP, PDP |
//! | [`geometry`] | Atomic sizes, CBUF banks, pooling reciprocal table |
//! | [`ccu`] | Clock and power-gating words for the control unit |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ccu;
pub mod geometry;
pub mod regs;
pub mod window;
