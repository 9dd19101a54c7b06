//! Pooling engine programmer (PDP).
//!
//! Pooling either consumes the scale-bias output directly (fly mode, source
//! address 0) or reads its input through the PDP RDMA. The RDMA front-end
//! is only programmed in the latter case.
//!
//! Right and bottom padding are always recomputed so the declared output
//! size is reproduced exactly:
//!
//! ```text
//! (out - 1) * stride + kernel == in + pad_before + pad_after
//! ```

use crate::conv::{Padding, Stride};
use crate::cube::DataCube;
use crate::error::{NnaError, Result};
use crate::program::RegisterProgram;
use nna_chip::geometry::{recip_kernel, MAX_POOL_KERNEL, MAX_POOL_PAD};
use nna_chip::regs::{pdp, pdp_rdma, RAM_TYPE_MC};

/// Largest pooling stride (4-bit field).
const MAX_POOL_STRIDE: u32 = 16;

/// Reduction applied over each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolMode {
    /// Mean, normalized by the reciprocal kernel table.
    Avg,
    /// Maximum.
    #[default]
    Max,
    /// Minimum.
    Min,
}

impl PoolMode {
    /// `OPERATION_MODE_CFG` method field.
    pub const fn method(self) -> u32 {
        match self {
            Self::Avg => pdp::method::AVERAGE,
            Self::Max => pdp::method::MAX,
            Self::Min => pdp::method::MIN,
        }
    }
}

/// Ceil-mode pooled output size along one axis.
///
/// Returns `None` when the kernel does not fit the padded input or the
/// stride is zero.
pub fn pooled_output_size(input: u32, kernel: u32, stride: u32, pad_before: u32) -> Option<u32> {
    let padded = input + pad_before;
    if stride == 0 || kernel == 0 || kernel > padded {
        return None;
    }
    Some((padded - kernel).div_ceil(stride) + 1)
}

/// Trailing pad that makes `out` windows cover exactly `in + pad_before + pad_after`.
fn trailing_pad(
    axis: &str,
    input: u32,
    output: u32,
    kernel: u32,
    stride: u32,
    pad_before: u32,
) -> Result<u32> {
    let covered = (i64::from(output) - 1) * i64::from(stride) + i64::from(kernel);
    let pad = covered - i64::from(input) - i64::from(pad_before);
    match u32::try_from(pad) {
        Ok(pad) if pad <= MAX_POOL_PAD => Ok(pad),
        _ => Err(NnaError::invalid_geometry(format!(
            "pool {axis}: output {output} needs trailing pad {pad} (allowed 0..={MAX_POOL_PAD})"
        ))),
    }
}

/// One pooling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOperation {
    /// Reduction.
    pub mode: PoolMode,
    /// Window width.
    pub kernel_width: u32,
    /// Window height.
    pub kernel_height: u32,
    /// Window step.
    pub stride: Stride,
    /// Leading padding; `right`/`bottom` are recomputed.
    pub padding: Padding,
    /// Input cube; address 0 streams it from the scale-bias engine.
    pub source: DataCube,
    /// Output cube, in memory.
    pub destination: DataCube,
}

impl PoolOperation {
    /// Square `kernel` window with uniform `stride` and no leading padding.
    pub fn new(
        mode: PoolMode,
        kernel: u32,
        stride: u32,
        source: DataCube,
        destination: DataCube,
    ) -> Self {
        Self {
            mode,
            kernel_width: kernel,
            kernel_height: kernel,
            stride: Stride::uniform(stride),
            padding: Padding::default(),
            source,
            destination,
        }
    }

    /// Set leading padding.
    #[must_use]
    pub const fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// True when input is read from memory rather than streamed.
    pub const fn reads_memory(&self) -> bool {
        self.source.in_memory()
    }

    /// Padding with right/bottom recomputed from the cube sizes.
    ///
    /// Caller-supplied `right`/`bottom` are ignored.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidGeometry`] when a side would be negative or exceed
    /// the 3-bit hardware field.
    pub fn resolved_padding(&self) -> Result<Padding> {
        let p = self.padding;
        if p.left > MAX_POOL_PAD || p.top > MAX_POOL_PAD {
            return Err(NnaError::invalid_geometry(format!(
                "pool leading pad {}/{} exceeds {MAX_POOL_PAD}",
                p.left, p.top
            )));
        }
        let (src, dst) = (&self.source.dims, &self.destination.dims);
        Ok(Padding {
            left: p.left,
            top: p.top,
            right: trailing_pad(
                "width",
                src.width,
                dst.width,
                self.kernel_width,
                self.stride.x,
                p.left,
            )?,
            bottom: trailing_pad(
                "height",
                src.height,
                dst.height,
                self.kernel_height,
                self.stride.y,
                p.top,
            )?,
        })
    }

    /// Check window, stride and cube geometry.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidGeometry`] for out-of-range windows or strides,
    /// mismatched channels, an output not in memory, or unresolvable padding.
    pub fn validate(&self) -> Result<Padding> {
        self.source.validate("pool source")?;
        self.destination.validate("pool destination")?;
        for (axis, k, s) in [
            ("width", self.kernel_width, self.stride.x),
            ("height", self.kernel_height, self.stride.y),
        ] {
            if k == 0 || k > MAX_POOL_KERNEL {
                return Err(NnaError::invalid_geometry(format!(
                    "pool kernel {axis} {k} outside 1..={MAX_POOL_KERNEL}"
                )));
            }
            if s == 0 || s > MAX_POOL_STRIDE {
                return Err(NnaError::invalid_geometry(format!(
                    "pool stride {axis} {s} outside 1..={MAX_POOL_STRIDE}"
                )));
            }
        }
        if self.source.channel() != self.destination.channel() {
            return Err(NnaError::invalid_geometry(format!(
                "pool channels {} -> {} differ",
                self.source.channel(),
                self.destination.channel()
            )));
        }
        if !self.destination.in_memory() {
            return Err(NnaError::invalid_geometry("pool destination must be in memory"));
        }
        self.resolved_padding()
    }

    /// Compile the PDP (and, off-fly, PDP RDMA) register program.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn compile(&self) -> Result<RegisterProgram> {
        let pad = self.validate()?;
        let src = &self.source;
        let dst = &self.destination;
        let off_fly = self.reads_memory();
        let (kw, kh) = (self.kernel_width, self.kernel_height);
        let (sx, sy) = (self.stride.x, self.stride.y);
        let recip = |k: u32| {
            recip_kernel(k).ok_or_else(|| NnaError::invalid_geometry(format!("pool kernel {k}")))
        };
        let mut prog = RegisterProgram::new("pdp");

        prog.push(pdp_rdma::D_FLYING_MODE, u32::from(off_fly));
        if off_fly {
            prog.push(pdp_rdma::D_DATA_CUBE_IN_WIDTH, src.width() - 1);
            prog.push(pdp_rdma::D_DATA_CUBE_IN_HEIGHT, src.height() - 1);
            prog.push(pdp_rdma::D_DATA_CUBE_IN_CHANNEL, src.channel() - 1);
            prog.push_addr(
                pdp_rdma::D_SRC_BASE_ADDR_LOW,
                pdp_rdma::D_SRC_BASE_ADDR_HIGH,
                src.address,
            );
            prog.push(pdp_rdma::D_SRC_LINE_STRIDE, src.line_stride);
            prog.push(pdp_rdma::D_SRC_SURFACE_STRIDE, src.surface_stride);
            prog.push(pdp_rdma::D_SRC_RAM_CFG, RAM_TYPE_MC);
            prog.push(pdp_rdma::D_DATA_FORMAT, 0);
            prog.push(pdp_rdma::D_POOLING_KERNEL_CFG, (kw - 1) | ((sx - 1) << 4));
            prog.push(pdp_rdma::D_POOLING_PADDING_CFG, pad.left);
            prog.push(pdp::D_SRC_LINE_STRIDE, src.line_stride);
            prog.push(pdp::D_SRC_SURFACE_STRIDE, src.surface_stride);
        }

        prog.push(pdp::D_DATA_CUBE_IN_WIDTH, src.width() - 1);
        prog.push(pdp::D_DATA_CUBE_IN_HEIGHT, src.height() - 1);
        prog.push(pdp::D_DATA_CUBE_IN_CHANNEL, src.channel() - 1);
        prog.push(pdp::D_DATA_CUBE_OUT_WIDTH, dst.width() - 1);
        prog.push(pdp::D_DATA_CUBE_OUT_HEIGHT, dst.height() - 1);
        prog.push(pdp::D_DATA_CUBE_OUT_CHANNEL, dst.channel() - 1);
        prog.push(
            pdp::D_OPERATION_MODE_CFG,
            self.mode.method() | (u32::from(off_fly) << 4),
        );
        prog.push(
            pdp::D_POOLING_KERNEL_CFG,
            (kw - 1) | ((kh - 1) << 8) | ((sx - 1) << 16) | ((sy - 1) << 20),
        );
        prog.push(pdp::D_RECIP_KERNEL_WIDTH, recip(kw)?);
        prog.push(pdp::D_RECIP_KERNEL_HEIGHT, recip(kh)?);
        prog.push(
            pdp::D_POOLING_PADDING_CFG,
            pad.left | (pad.top << 4) | (pad.right << 8) | (pad.bottom << 12),
        );
        for i in 0..pdp::PADDING_VALUE_COUNT {
            prog.push(pdp::D_POOLING_PADDING_VALUE_1 + 4 * i, 0);
        }
        prog.push(pdp::D_NAN_FLUSH_TO_ZERO, 0);
        prog.push_addr(
            pdp::D_DST_BASE_ADDR_LOW,
            pdp::D_DST_BASE_ADDR_HIGH,
            dst.address,
        );
        prog.push(pdp::D_DST_LINE_STRIDE, dst.line_stride);
        prog.push(pdp::D_DST_SURFACE_STRIDE, dst.surface_stride);
        prog.push(pdp::D_DST_RAM_CFG, RAM_TYPE_MC);
        prog.push(pdp::D_DATA_FORMAT, 0);

        tracing::debug!(
            "pdp {:?} {}x{}/{} {} -> {} pad={:?} off_fly={}",
            self.mode,
            kw,
            kh,
            sx,
            src.dims,
            dst.dims,
            pad,
            off_fly
        );
        Ok(prog)
    }
}

/// Producer pointers of the PDP and its RDMA.
pub const PRODUCER_POINTERS: [usize; 2] = [pdp::S_POINTER, pdp_rdma::S_POINTER];
