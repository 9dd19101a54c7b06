//! Convolution engine programmer.
//!
//! The convolution pipe spans five register blocks: CDMA fetches feature
//! data and weights into the convolution buffer, CSC sequences them into the
//! two MAC arrays (CMAC_A/B), and CACC accumulates the partial sums and
//! streams the result to the scale-bias engine.
//!
//! All derived layout fields (entries per slice, banks, weight bytes) are
//! recomputed from the cube geometry on every compile; callers never supply
//! them.

use crate::cube::{CubeDims, DataCube};
use crate::error::{NnaError, Result};
use crate::layout::{
    compute_data_bank, compute_entries_per_slice, compute_weight_bank, truncate_weight_bytes,
};
use crate::program::RegisterProgram;
use nna_chip::geometry::{CBUF_BANK_NUMBER, MAX_CUBE_EXTENT, WEIGHT_ALIGN};
use nna_chip::regs::{self, cacc, cdma, cmac_a, cmac_b, csc};

/// Largest convolution stride (3-bit field).
const MAX_STRIDE: u32 = 8;
/// Largest dilation (5-bit field).
const MAX_DILATION: u32 = 32;
/// Largest per-side zero padding (5-bit field).
const MAX_PAD: u32 = 31;

/// Horizontal and vertical step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stride {
    /// Step along width.
    pub x: u32,
    /// Step along height.
    pub y: u32,
}

impl Stride {
    /// Same step on both axes.
    pub const fn uniform(s: u32) -> Self {
        Self { x: s, y: s }
    }

    /// `(x-1) | (y-1) << 16`
    const fn packed(self) -> u32 {
        (self.x - 1) | ((self.y - 1) << 16)
    }
}

impl Default for Stride {
    fn default() -> Self {
        Self::uniform(1)
    }
}

/// Kernel dilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dilation {
    /// Dilation along width.
    pub x: u32,
    /// Dilation along height.
    pub y: u32,
}

impl Dilation {
    /// Same dilation on both axes.
    pub const fn uniform(d: u32) -> Self {
        Self { x: d, y: d }
    }

    const fn packed(self) -> u32 {
        (self.x - 1) | ((self.y - 1) << 16)
    }
}

impl Default for Dilation {
    fn default() -> Self {
        Self::uniform(1)
    }
}

/// Zero padding around the input plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    /// Columns added before the first.
    pub left: u32,
    /// Columns added after the last.
    pub right: u32,
    /// Lines added above the first.
    pub top: u32,
    /// Lines added below the last.
    pub bottom: u32,
}

impl Padding {
    /// Same padding on every side.
    pub const fn symmetric(p: u32) -> Self {
        Self {
            left: p,
            right: p,
            top: p,
            bottom: p,
        }
    }

    fn max_side(self) -> u32 {
        self.left.max(self.right).max(self.top).max(self.bottom)
    }
}

/// Kernel window and count; kernel channels equal input channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    /// Window width.
    pub width: u32,
    /// Window height.
    pub height: u32,
    /// Number of kernels (output channels).
    pub count: u32,
}

impl Kernel {
    /// Square `size × size` window, `count` kernels.
    pub const fn square(size: u32, count: u32) -> Self {
        Self {
            width: size,
            height: size,
            count,
        }
    }
}

/// Buffer reuse and release control between consecutive layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReuseFlags {
    /// Feature data already resident in the buffer.
    pub data_reuse: bool,
    /// Weights already resident in the buffer.
    pub weight_reuse: bool,
    /// Keep feature data after this layer.
    pub skip_data_release: bool,
    /// Keep weights after this layer.
    pub skip_weight_release: bool,
}

impl ReuseFlags {
    /// `skip_weight_rls << 28 | skip_data_rls << 24 | weight_reuse << 20 | data_reuse << 16`
    pub fn misc_cfg(self) -> u32 {
        (u32::from(self.skip_weight_release) << 28)
            | (u32::from(self.skip_data_release) << 24)
            | (u32::from(self.weight_reuse) << 20)
            | (u32::from(self.data_reuse) << 16)
    }
}

/// One convolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvOperation {
    /// Input feature cube (must be in memory).
    pub input: DataCube,
    /// Kernel geometry.
    pub kernel: Kernel,
    /// Physical address of the packed weights.
    pub weight_address: u64,
    /// Accumulator output address; 0 streams straight into the scale-bias engine.
    pub output_address: u64,
    /// Step between output positions.
    pub stride: Stride,
    /// Kernel dilation.
    pub dilation: Dilation,
    /// Zero padding.
    pub padding: Padding,
    /// Buffer reuse control.
    pub reuse: ReuseFlags,
}

/// Fields derived from the cube geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    /// Output cube dimensions.
    pub output: CubeDims,
    /// Buffer entries one input line occupies.
    pub entries_per_slice: u32,
    /// `kc * kw * kh`.
    pub bytes_per_kernel: u32,
    /// Data banks occupied by the input.
    pub data_banks: u32,
    /// Weight banks occupied by the kernels.
    pub weight_banks: u32,
    /// Weight byte count as programmed, a multiple of 32.
    pub total_weight_bytes: u32,
}

/// Output extent along one axis.
///
/// `(input + pad_before + pad_after - dilated_kernel) / stride + 1`, or
/// `None` when the dilated kernel does not fit the padded input.
pub fn conv_output_size(
    input: u32,
    kernel: u32,
    stride: u32,
    dilation: u32,
    pad_before: u32,
    pad_after: u32,
) -> Option<u32> {
    let extent = (kernel.checked_sub(1)?).checked_mul(dilation)?.checked_add(1)?;
    let padded = input.checked_add(pad_before)?.checked_add(pad_after)?;
    if stride == 0 || extent > padded {
        return None;
    }
    Some((padded - extent) / stride + 1)
}

impl ConvOperation {
    /// Unit stride/dilation, no padding, output streamed to the scale-bias engine.
    pub fn new(input: DataCube, kernel: Kernel, weight_address: u64) -> Self {
        Self {
            input,
            kernel,
            weight_address,
            output_address: 0,
            stride: Stride::default(),
            dilation: Dilation::default(),
            padding: Padding::default(),
            reuse: ReuseFlags::default(),
        }
    }

    /// Set the stride.
    #[must_use]
    pub const fn with_stride(mut self, stride: Stride) -> Self {
        self.stride = stride;
        self
    }

    /// Set the dilation.
    #[must_use]
    pub const fn with_dilation(mut self, dilation: Dilation) -> Self {
        self.dilation = dilation;
        self
    }

    /// Set the padding.
    #[must_use]
    pub const fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Set buffer reuse flags.
    #[must_use]
    pub const fn with_reuse(mut self, reuse: ReuseFlags) -> Self {
        self.reuse = reuse;
        self
    }

    /// Validate the descriptor and derive the buffer layout.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidGeometry`] for zero or out-of-range dimensions, a
    /// kernel larger than the padded input, or a layout that overflows the
    /// convolution buffer. [`NnaError::UnsupportedFormat`] for pixel input.
    pub fn geometry(&self) -> Result<ConvGeometry> {
        self.input.validate("conv input")?;
        if !self.input.in_memory() {
            return Err(NnaError::invalid_geometry("conv input must be in memory"));
        }
        if self.weight_address == 0 {
            return Err(NnaError::invalid_geometry("conv weights must be in memory"));
        }
        let k = self.kernel;
        if k.width == 0 || k.height == 0 || k.count == 0 {
            return Err(NnaError::invalid_geometry(format!(
                "kernel {}x{}x{} has a zero dimension",
                k.width, k.height, k.count
            )));
        }
        let dims = self.input.dims;
        if [k.width, k.height, k.count]
            .iter()
            .any(|&v| v > MAX_CUBE_EXTENT)
        {
            return Err(NnaError::invalid_geometry(format!(
                "kernel {}x{}x{} exceeds {MAX_CUBE_EXTENT}",
                k.width, k.height, k.count
            )));
        }
        accumulator_address(self.output_address)?;
        check_range("stride", self.stride.x, self.stride.y, MAX_STRIDE)?;
        check_range("dilation", self.dilation.x, self.dilation.y, MAX_DILATION)?;
        if self.padding.max_side() > MAX_PAD {
            return Err(NnaError::invalid_geometry(format!(
                "padding {:?} exceeds {MAX_PAD}",
                self.padding
            )));
        }

        let p = self.padding;
        let out_w = conv_output_size(
            dims.width,
            k.width,
            self.stride.x,
            self.dilation.x,
            p.left,
            p.right,
        );
        let out_h = conv_output_size(
            dims.height,
            k.height,
            self.stride.y,
            self.dilation.y,
            p.top,
            p.bottom,
        );
        let (Some(out_w), Some(out_h)) = (out_w, out_h) else {
            return Err(NnaError::invalid_geometry(format!(
                "kernel {}x{} larger than padded input {}x{}",
                k.width, k.height, dims.width, dims.height
            )));
        };

        let entries_per_slice =
            compute_entries_per_slice(self.input.format, dims.channel, dims.width)?;
        let bytes_per_kernel = u64::from(dims.channel) * u64::from(k.width) * u64::from(k.height);
        let weight_size = u64::from(k.count) * bytes_per_kernel + u64::from(WEIGHT_ALIGN - 1);
        let (Ok(bytes_per_kernel), Ok(weight_size)) =
            (u32::try_from(bytes_per_kernel), u32::try_from(weight_size))
        else {
            return Err(NnaError::invalid_geometry(format!(
                "{} kernels of {}x{}x{} exceed 32-bit weight addressing",
                k.count, k.width, k.height, dims.channel
            )));
        };
        let data_banks = compute_data_bank(entries_per_slice, dims.height);
        let weight_banks = compute_weight_bank(weight_size);
        if data_banks.saturating_add(weight_banks) > CBUF_BANK_NUMBER {
            return Err(NnaError::invalid_geometry(format!(
                "{data_banks} data + {weight_banks} weight banks exceed {CBUF_BANK_NUMBER}"
            )));
        }

        Ok(ConvGeometry {
            output: CubeDims::new(out_w, out_h, k.count),
            entries_per_slice,
            bytes_per_kernel,
            data_banks,
            weight_banks,
            total_weight_bytes: truncate_weight_bytes(weight_size),
        })
    }

    /// The accumulator output cube.
    ///
    /// # Errors
    ///
    /// Same as [`geometry`](Self::geometry).
    pub fn output_cube(&self) -> Result<DataCube> {
        Ok(DataCube::feature(self.output_address, self.geometry()?.output))
    }

    /// Compile the full register program for CMAC, CSC, CDMA and CACC.
    ///
    /// # Errors
    ///
    /// Same as [`geometry`](Self::geometry); nothing is produced for an
    /// invalid descriptor.
    pub fn compile(&self) -> Result<RegisterProgram> {
        let g = self.geometry()?;
        let input = &self.input;
        let k = self.kernel;
        let out = DataCube::feature(self.output_address, g.output);
        let misc_cfg = self.reuse.misc_cfg();
        let banks = (g.data_banks - 1) | ((g.weight_banks - 1) << 16);
        let in_size = (input.width() - 1) | ((input.height() - 1) << 16);
        let p = self.padding;

        let mut prog = RegisterProgram::new("conv");

        // cmac
        prog.push(cmac_a::D_MISC_CFG, 0);
        prog.push(cmac_b::D_MISC_CFG, 0);

        // csc
        prog.push(csc::D_MISC_CFG, misc_cfg);
        prog.push(csc::D_DATAIN_FORMAT, 0);
        prog.push(csc::D_DATAIN_SIZE_EXT_0, in_size);
        prog.push(csc::D_DATAIN_SIZE_EXT_1, input.channel() - 1);
        prog.push(csc::D_BATCH_NUMBER, 0);
        prog.push(csc::D_POST_Y_EXTENSION, 0);
        prog.push(csc::D_ENTRY_PER_SLICE, g.entries_per_slice - 1);
        prog.push(csc::D_WEIGHT_FORMAT, 0);
        prog.push(csc::D_WEIGHT_SIZE_EXT_0, (k.width - 1) | ((k.height - 1) << 16));
        prog.push(
            csc::D_WEIGHT_SIZE_EXT_1,
            (input.channel() - 1) | ((k.count - 1) << 16),
        );
        prog.push(csc::D_WEIGHT_BYTES, g.total_weight_bytes);
        prog.push(
            csc::D_DATAOUT_SIZE_0,
            (out.width() - 1) | ((out.height() - 1) << 16),
        );
        prog.push(csc::D_DATAOUT_SIZE_1, out.channel() - 1);
        prog.push(csc::D_ATOMICS, out.width() * out.height() - 1);
        prog.push(csc::D_RELEASE, 0);
        prog.push(csc::D_CONV_STRIDE_EXT, self.stride.packed());
        prog.push(csc::D_DILATION_EXT, self.dilation.packed());
        prog.push(csc::D_ZERO_PADDING, p.left | (p.top << 16));
        prog.push(csc::D_ZERO_PADDING_VALUE, 0);
        prog.push(csc::D_BANK, banks);
        prog.push(csc::D_PRA_CFG, 0);

        // cdma
        prog.push(cdma::S_ARBITER, cdma::ARBITER_DEFAULT);
        prog.push(cdma::D_MISC_CFG, misc_cfg);
        prog.push(cdma::D_DATAIN_FORMAT, cdma::DATAIN_FORMAT_FEATURE);
        prog.push(cdma::D_MEAN_FORMAT, 0);
        prog.push(cdma::D_DAIN_MAP, 1);
        prog.push(cdma::D_DATAIN_SIZE_0, in_size);
        prog.push(cdma::D_DATAIN_SIZE_1, input.channel() - 1);
        prog.push(cdma::D_DATAIN_SIZE_EXT_0, in_size);
        prog.push(cdma::D_DAIN_RAM_TYPE, regs::RAM_TYPE_MC);
        prog.push_addr(
            cdma::D_DAIN_ADDR_LOW_0,
            cdma::D_DAIN_ADDR_HIGH_0,
            input.address,
        );
        prog.push(cdma::D_LINE_STRIDE, input.line_stride);
        prog.push(cdma::D_SURF_STRIDE, input.surface_stride);
        prog.push(cdma::D_BATCH_NUMBER, 0);
        prog.push(cdma::D_ENTRY_PER_SLICE, g.entries_per_slice - 1);
        prog.push(cdma::D_WEIGHT_FORMAT, 0);
        prog.push(cdma::D_WEIGHT_SIZE_0, g.bytes_per_kernel - 1);
        prog.push(cdma::D_WEIGHT_SIZE_1, k.count - 1);
        prog.push(cdma::D_WEIGHT_RAM_TYPE, regs::RAM_TYPE_MC);
        prog.push_addr(
            cdma::D_WEIGHT_ADDR_LOW,
            cdma::D_WEIGHT_ADDR_HIGH,
            self.weight_address,
        );
        prog.push(cdma::D_WEIGHT_BYTES, g.total_weight_bytes);
        prog.push(cdma::D_CONV_STRIDE, self.stride.packed());
        prog.push(
            cdma::D_ZERO_PADDING,
            p.left | (p.right << 8) | (p.top << 16) | (p.bottom << 24),
        );
        prog.push(cdma::D_ZERO_PADDING_VALUE, 0);
        prog.push(cdma::D_BANK, banks);

        // cacc
        prog.push(cacc::D_MISC_CFG, 0);
        prog.push(
            cacc::D_DATAOUT_SIZE_0,
            (out.width() - 1) | ((out.height() - 1) << 16),
        );
        prog.push(cacc::D_DATAOUT_SIZE_1, out.channel() - 1);
        prog.push(cacc::D_DATAOUT_ADDR, accumulator_address(out.address)?);
        prog.push(cacc::D_BATCH_NUMBER, 0);
        prog.push(cacc::D_LINE_STRIDE, out.line_stride);
        prog.push(cacc::D_SURF_STRIDE, out.surface_stride);
        prog.push(cacc::D_DATAOUT_MAP, cacc::DATAOUT_MAP_PACKED);
        prog.push(cacc::D_CLIP_CFG, 0);

        tracing::debug!(
            "conv {} * {}x{}x{} -> {}: eps={} banks={}/{} weights={}B",
            input.dims,
            k.width,
            k.height,
            k.count,
            g.output,
            g.entries_per_slice,
            g.data_banks,
            g.weight_banks,
            g.total_weight_bytes
        );
        Ok(prog)
    }
}

/// Producer pointers of every convolution sub-block.
pub const PRODUCER_POINTERS: [usize; 5] = [
    cacc::S_POINTER,
    cmac_a::S_POINTER,
    cmac_b::S_POINTER,
    csc::S_POINTER,
    cdma::S_POINTER,
];

/// Operation-enable registers, in enable order (consumer first).
pub const OP_ENABLES: [usize; 5] = [
    cacc::D_OP_ENABLE,
    cmac_a::D_OP_ENABLE,
    cmac_b::D_OP_ENABLE,
    csc::D_OP_ENABLE,
    cdma::D_OP_ENABLE,
];

/// The accumulator has a single 32-bit output address register.
fn accumulator_address(address: u64) -> Result<u32> {
    u32::try_from(address).map_err(|_| {
        NnaError::invalid_geometry(format!(
            "accumulator output {address:#x} is beyond 32-bit addressing"
        ))
    })
}

fn check_range(what: &str, x: u32, y: u32, max: u32) -> Result<()> {
    if x == 0 || y == 0 || x > max || y > max {
        return Err(NnaError::invalid_geometry(format!(
            "{what} {x}x{y} outside 1..={max}"
        )));
    }
    Ok(())
}
