//! Scale-bias-activation engine programmer (SDP).
//!
//! The engine applies up to three element-wise lanes to the convolution
//! output, in order:
//!
//! ```text
//!  CACC ─▶ X1 (BS) ─▶ X2 (BN) ─▶ Y (EW) ─▶ output CVT ─▶ memory / PDP
//! ```
//!
//! Each lane is an ALU (max/min/sum/equal) followed by a multiplier and an
//! optional ReLU/PReLU. Operands come from inline registers (per layer) or
//! from a 16-bit operand cube fetched by the SDP RDMA (per kernel or per
//! point). All three lanes share one programmer parametrized by
//! [`LaneRegs`].

// Signed operands are written as raw two's-complement register words.
#![allow(clippy::cast_sign_loss)]

use crate::cube::DataCube;
use crate::error::{NnaError, Result};
use crate::program::RegisterProgram;
use nna_chip::regs::{sdp, sdp_rdma, RAM_TYPE_MC};

/// Largest ALU operand shift (6-bit field).
const MAX_SHIFT: u8 = 63;

/// What a lane computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneOp {
    /// Pass-through (activation only).
    #[default]
    None,
    /// Multiplier only.
    Multiply,
    /// ALU only.
    Add,
    /// ALU then multiplier.
    Both,
}

impl LaneOp {
    const fn uses_alu(self) -> bool {
        matches!(self, Self::Add | Self::Both)
    }

    const fn uses_mul(self) -> bool {
        matches!(self, Self::Multiply | Self::Both)
    }

    /// RDMA `data_use` selector.
    const fn rdma_use(self) -> u32 {
        match self {
            Self::Multiply | Self::None => 0,
            Self::Add => 1,
            Self::Both => 2,
        }
    }
}

/// ALU reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum AluAlgo {
    /// `max(x, operand)`
    Max = 0,
    /// `min(x, operand)`
    Min = 1,
    /// `x + operand`
    #[default]
    Sum = 2,
    /// `x == operand`
    Equal = 3,
}

impl AluAlgo {
    /// Decode the 2-bit field.
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Max,
            1 => Self::Min,
            2 => Self::Sum,
            _ => Self::Equal,
        }
    }
}

/// How operands are applied across the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// One scalar for the whole layer.
    PerLayer,
    /// One value per output channel.
    PerKernel,
    /// One value per element.
    PerPoint,
}

/// Lane activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// Linear.
    #[default]
    None,
    /// `max(x, 0)`.
    Relu,
    /// Negative side scaled by the multiplier operand.
    Prelu,
}

/// Where a lane's operands come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneSource {
    /// Inline scalars.
    PerLayer {
        /// ALU operand.
        alu: i32,
        /// Multiplier operand.
        mul: i32,
    },
    /// 16-bit operand cube, one value per kernel.
    PerKernel {
        /// Physical address of the operand cube.
        address: u64,
    },
    /// 16-bit operand cube, one value per element.
    PerPoint {
        /// Physical address of the operand cube.
        address: u64,
    },
}

impl Default for LaneSource {
    fn default() -> Self {
        Self::PerLayer { alu: 0, mul: 1 }
    }
}

impl LaneSource {
    /// Application mode implied by the source.
    pub const fn mode(&self) -> ApplyMode {
        match self {
            Self::PerLayer { .. } => ApplyMode::PerLayer,
            Self::PerKernel { .. } => ApplyMode::PerKernel,
            Self::PerPoint { .. } => ApplyMode::PerPoint,
        }
    }

    const fn memory_address(&self) -> Option<u64> {
        match self {
            Self::PerLayer { .. } => None,
            Self::PerKernel { address } | Self::PerPoint { address } => Some(*address),
        }
    }
}

/// Fixed-point conversion: `(x - offset) * scale >> truncate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    /// Subtracted before scaling.
    pub offset: i32,
    /// Multiplier; 1 is unity gain.
    pub scale: i16,
    /// Right shift after scaling.
    pub truncate: u8,
    /// Apply the conversion (Y lane only; output conversion is always applied).
    pub enabled: bool,
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            offset: 0,
            scale: 1,
            truncate: 0,
            enabled: false,
        }
    }
}

impl Conversion {
    /// Unity gain followed by a right shift.
    pub fn shift(truncate: u8) -> Self {
        Self {
            truncate,
            ..Self::default()
        }
    }
}

/// One lane descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lane {
    /// Lane participates.
    pub enabled: bool,
    /// ALU / multiplier selection.
    pub op: LaneOp,
    /// ALU reduction.
    pub alu_algo: AluAlgo,
    /// Left shift applied to the ALU operand. X lanes only: the Y ALU
    /// takes an operand conversion instead.
    pub shift: u8,
    /// Right shift applied after the multiplier.
    pub truncate: u8,
    /// Activation after the multiplier.
    pub activation: Activation,
    /// Operand source.
    pub source: LaneSource,
    /// ALU operand conversion (Y lane, memory operands).
    pub alu_cvt: Conversion,
    /// Multiplier operand conversion (Y lane, memory operands).
    pub mul_cvt: Conversion,
}

impl Lane {
    /// Disabled lane.
    pub fn bypass() -> Self {
        Self::default()
    }

    /// Per-kernel bias add from a 16-bit bias cube, shifted left by `shift`.
    pub fn bias(address: u64, shift: u8) -> Self {
        Self {
            enabled: true,
            op: LaneOp::Add,
            alu_algo: AluAlgo::Sum,
            shift,
            source: LaneSource::PerKernel { address },
            ..Self::default()
        }
    }

    /// Activation-only lane.
    pub fn activation(activation: Activation) -> Self {
        Self {
            enabled: true,
            activation,
            ..Self::default()
        }
    }

    /// Set the activation.
    #[must_use]
    pub const fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Control word fields for this lane.
    pub const fn control(&self) -> LaneControl {
        LaneControl {
            bypass: !self.enabled,
            alu_bypass: !self.op.uses_alu(),
            alu_algo: self.alu_algo,
            mul_bypass: !self.op.uses_mul(),
            mul_prelu: matches!(self.activation, Activation::Prelu),
            relu_bypass: !matches!(self.activation, Activation::Relu),
        }
    }

    /// Operand cube address when the lane fetches from memory.
    pub const fn operand_address(&self) -> Option<u64> {
        if !self.enabled || matches!(self.op, LaneOp::None) {
            return None;
        }
        self.source.memory_address()
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.shift > MAX_SHIFT {
            return Err(NnaError::invalid_geometry(format!(
                "{name} shift {} exceeds {MAX_SHIFT}",
                self.shift
            )));
        }
        if self.operand_address() == Some(0) {
            return Err(NnaError::invalid_geometry(format!(
                "{name} memory operand has no address"
            )));
        }
        Ok(())
    }
}

/// Decoded lane control word.
///
/// Layout: `bypass | alu_bypass << 1 | alu_algo << 2 | mul_bypass << 4 |
/// mul_prelu << 5 | relu_bypass << 6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct LaneControl {
    /// Whole lane bypassed.
    pub bypass: bool,
    /// ALU bypassed.
    pub alu_bypass: bool,
    /// ALU reduction.
    pub alu_algo: AluAlgo,
    /// Multiplier bypassed.
    pub mul_bypass: bool,
    /// Multiplier acts as PReLU.
    pub mul_prelu: bool,
    /// ReLU bypassed.
    pub relu_bypass: bool,
}

impl LaneControl {
    /// Fully bypassed lane word.
    pub const BYPASS_WORD: u32 = 0x53;

    /// Pack into the register word.
    pub const fn pack(self) -> u32 {
        (self.bypass as u32)
            | ((self.alu_bypass as u32) << 1)
            | ((self.alu_algo as u32) << 2)
            | ((self.mul_bypass as u32) << 4)
            | ((self.mul_prelu as u32) << 5)
            | ((self.relu_bypass as u32) << 6)
    }

    /// Decode a register word.
    pub const fn unpack(word: u32) -> Self {
        Self {
            bypass: word & 1 != 0,
            alu_bypass: word & (1 << 1) != 0,
            alu_algo: AluAlgo::from_bits(word >> 2),
            mul_bypass: word & (1 << 4) != 0,
            mul_prelu: word & (1 << 5) != 0,
            relu_bypass: word & (1 << 6) != 0,
        }
    }
}

/// Operand conversion registers (Y lane only).
#[derive(Debug, Clone, Copy)]
pub struct CvtRegs {
    /// Offset register.
    pub offset: usize,
    /// Scale register.
    pub scale: usize,
    /// Truncate register.
    pub truncate: usize,
}

/// Register offsets of one lane.
#[derive(Debug, Clone, Copy)]
pub struct LaneRegs {
    /// Lane name for diagnostics.
    pub name: &'static str,
    /// Control word.
    pub cfg: usize,
    /// ALU config.
    pub alu_cfg: usize,
    /// Inline ALU operand.
    pub alu_src_value: usize,
    /// Multiplier config.
    pub mul_cfg: usize,
    /// Inline multiplier operand.
    pub mul_src_value: usize,
    /// ALU operand conversion; present on lanes with CVT-style configs.
    pub alu_cvt: Option<CvtRegs>,
    /// Multiplier operand conversion.
    pub mul_cvt: Option<CvtRegs>,
    /// Lane truncate register, if separate from `MUL_CFG`.
    pub truncate: Option<usize>,
    /// RDMA fetch config.
    pub rdma_cfg: usize,
    /// Operand cube base address, low word.
    pub base_low: usize,
    /// Operand cube base address, high word.
    pub base_high: usize,
    /// Operand cube line stride.
    pub line_stride: usize,
    /// Operand cube surface stride.
    pub surface_stride: usize,
    /// Operand cube batch stride.
    pub batch_stride: usize,
}

/// X1 lane (BS).
pub const X1_REGS: LaneRegs = LaneRegs {
    name: "x1",
    cfg: sdp::D_DP_BS_CFG,
    alu_cfg: sdp::D_DP_BS_ALU_CFG,
    alu_src_value: sdp::D_DP_BS_ALU_SRC_VALUE,
    mul_cfg: sdp::D_DP_BS_MUL_CFG,
    mul_src_value: sdp::D_DP_BS_MUL_SRC_VALUE,
    alu_cvt: None,
    mul_cvt: None,
    truncate: None,
    rdma_cfg: sdp_rdma::D_BRDMA_CFG,
    base_low: sdp_rdma::D_BS_BASE_ADDR_LOW,
    base_high: sdp_rdma::D_BS_BASE_ADDR_HIGH,
    line_stride: sdp_rdma::D_BS_LINE_STRIDE,
    surface_stride: sdp_rdma::D_BS_SURFACE_STRIDE,
    batch_stride: sdp_rdma::D_BS_BATCH_STRIDE,
};

/// X2 lane (BN).
pub const X2_REGS: LaneRegs = LaneRegs {
    name: "x2",
    cfg: sdp::D_DP_BN_CFG,
    alu_cfg: sdp::D_DP_BN_ALU_CFG,
    alu_src_value: sdp::D_DP_BN_ALU_SRC_VALUE,
    mul_cfg: sdp::D_DP_BN_MUL_CFG,
    mul_src_value: sdp::D_DP_BN_MUL_SRC_VALUE,
    alu_cvt: None,
    mul_cvt: None,
    truncate: None,
    rdma_cfg: sdp_rdma::D_NRDMA_CFG,
    base_low: sdp_rdma::D_BN_BASE_ADDR_LOW,
    base_high: sdp_rdma::D_BN_BASE_ADDR_HIGH,
    line_stride: sdp_rdma::D_BN_LINE_STRIDE,
    surface_stride: sdp_rdma::D_BN_SURFACE_STRIDE,
    batch_stride: sdp_rdma::D_BN_BATCH_STRIDE,
};

/// Y lane (EW).
pub const Y_REGS: LaneRegs = LaneRegs {
    name: "y",
    cfg: sdp::D_DP_EW_CFG,
    alu_cfg: sdp::D_DP_EW_ALU_CFG,
    alu_src_value: sdp::D_DP_EW_ALU_SRC_VALUE,
    mul_cfg: sdp::D_DP_EW_MUL_CFG,
    mul_src_value: sdp::D_DP_EW_MUL_SRC_VALUE,
    alu_cvt: Some(CvtRegs {
        offset: sdp::D_DP_EW_ALU_CVT_OFFSET_VALUE,
        scale: sdp::D_DP_EW_ALU_CVT_SCALE_VALUE,
        truncate: sdp::D_DP_EW_ALU_CVT_TRUNCATE_VALUE,
    }),
    mul_cvt: Some(CvtRegs {
        offset: sdp::D_DP_EW_MUL_CVT_OFFSET_VALUE,
        scale: sdp::D_DP_EW_MUL_CVT_SCALE_VALUE,
        truncate: sdp::D_DP_EW_MUL_CVT_TRUNCATE_VALUE,
    }),
    truncate: Some(sdp::D_DP_EW_TRUNCATE_VALUE),
    rdma_cfg: sdp_rdma::D_ERDMA_CFG,
    base_low: sdp_rdma::D_EW_BASE_ADDR_LOW,
    base_high: sdp_rdma::D_EW_BASE_ADDR_HIGH,
    line_stride: sdp_rdma::D_EW_LINE_STRIDE,
    surface_stride: sdp_rdma::D_EW_SURFACE_STRIDE,
    batch_stride: sdp_rdma::D_EW_BATCH_STRIDE,
};

/// RDMA config: `disable | use << 1 | size << 3 | mode << 4 | ram << 5`.
const RDMA_DISABLE: u32 = 1;
/// Operands are 16-bit.
const RDMA_SIZE_16BIT: u32 = 1 << 3;

fn write_cvt(prog: &mut RegisterProgram, regs: CvtRegs, cvt: Conversion) {
    prog.push(regs.offset, cvt.offset as u32);
    prog.push(regs.scale, u32::from(cvt.scale as u16));
    prog.push(regs.truncate, u32::from(cvt.truncate));
}

/// Program one lane into `prog`.
///
/// `source` is the SDP input cube; memory operands use its strides doubled
/// for 16-bit elements.
pub fn program_lane(prog: &mut RegisterProgram, regs: &LaneRegs, lane: &Lane, source: &DataCube) {
    let control = lane.control();
    prog.push(regs.cfg, control.pack());

    if lane.enabled {
        let from_memory = lane.operand_address().is_some();
        let src_bit = u32::from(from_memory);

        if lane.op.uses_alu() {
            match regs.alu_cvt {
                Some(cvt) => {
                    prog.push(regs.alu_cfg, src_bit | (u32::from(!lane.alu_cvt.enabled) << 1));
                    if from_memory {
                        write_cvt(prog, cvt, lane.alu_cvt);
                    }
                }
                None => prog.push(regs.alu_cfg, src_bit | (u32::from(lane.shift) << 8)),
            }
            if let LaneSource::PerLayer { alu, .. } = lane.source {
                prog.push(regs.alu_src_value, alu as u32);
            }
        }

        if lane.op.uses_mul() {
            match regs.mul_cvt {
                Some(cvt) => {
                    prog.push(regs.mul_cfg, src_bit | (u32::from(!lane.mul_cvt.enabled) << 1));
                    if from_memory {
                        write_cvt(prog, cvt, lane.mul_cvt);
                    }
                }
                None => prog.push(regs.mul_cfg, src_bit | (u32::from(lane.truncate) << 8)),
            }
            if let Some(reg) = regs.truncate {
                prog.push(reg, u32::from(lane.truncate));
            }
            if let LaneSource::PerLayer { mul, .. } = lane.source {
                prog.push(regs.mul_src_value, mul as u32);
            }
        }
    }

    match lane.operand_address() {
        Some(address) => {
            let mode = u32::from(matches!(lane.source.mode(), ApplyMode::PerPoint));
            prog.push(
                regs.rdma_cfg,
                (lane.op.rdma_use() << 1) | RDMA_SIZE_16BIT | (mode << 4) | (RAM_TYPE_MC << 5),
            );
            prog.push_addr(regs.base_low, regs.base_high, address);
            prog.push(regs.line_stride, source.line_stride * 2);
            prog.push(regs.surface_stride, source.surface_stride * 2);
            prog.push(regs.batch_stride, 0);
        }
        None => {
            prog.push(regs.rdma_cfg, RDMA_DISABLE);
            prog.push(regs.base_low, 0);
        }
    }
}

/// One scale-bias-activation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleBiasOperation {
    /// Input cube; address 0 streams it from the convolution accumulator.
    pub source: DataCube,
    /// Output cube; address 0 streams it into the pooling engine.
    pub destination: DataCube,
    /// First lane (bias).
    pub x1: Lane,
    /// Second lane (batch norm).
    pub x2: Lane,
    /// Third lane (element-wise).
    pub y: Lane,
    /// Output conversion, always applied.
    pub output: Conversion,
}

impl ScaleBiasOperation {
    /// All lanes bypassed, unity output conversion.
    pub fn new(source: DataCube, destination: DataCube) -> Self {
        Self {
            source,
            destination,
            x1: Lane::bypass(),
            x2: Lane::bypass(),
            y: Lane::bypass(),
            output: Conversion::default(),
        }
    }

    /// Set the X1 lane.
    #[must_use]
    pub const fn with_x1(mut self, lane: Lane) -> Self {
        self.x1 = lane;
        self
    }

    /// Set the X2 lane.
    #[must_use]
    pub const fn with_x2(mut self, lane: Lane) -> Self {
        self.x2 = lane;
        self
    }

    /// Set the Y lane.
    #[must_use]
    pub const fn with_y(mut self, lane: Lane) -> Self {
        self.y = lane;
        self
    }

    /// Set the output conversion.
    #[must_use]
    pub const fn with_output(mut self, output: Conversion) -> Self {
        self.output = output;
        self
    }

    /// True when input is streamed from the accumulator.
    pub const fn flying(&self) -> bool {
        !self.source.in_memory()
    }

    /// True when output is streamed into the pooling engine.
    pub const fn feeds_pooling(&self) -> bool {
        !self.destination.in_memory()
    }

    /// True when the RDMA front-end has anything to fetch.
    pub const fn rdma_needed(&self) -> bool {
        self.source.in_memory()
            || self.x1.operand_address().is_some()
            || self.x2.operand_address().is_some()
            || self.y.operand_address().is_some()
    }

    /// Check cube geometry and lane settings.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidGeometry`] for zero or mismatched cubes, or a lane
    /// with an out-of-range shift or an unaddressed memory operand. A shift
    /// on the Y lane is rejected since it has no shift field.
    pub fn validate(&self) -> Result<()> {
        self.source.validate("sdp source")?;
        self.destination.validate("sdp destination")?;
        if self.source.dims != self.destination.dims {
            return Err(NnaError::invalid_geometry(format!(
                "sdp source {} and destination {} differ",
                self.source.dims, self.destination.dims
            )));
        }
        self.x1.validate("x1")?;
        self.x2.validate("x2")?;
        self.y.validate("y")?;
        if self.y.enabled && self.y.shift != 0 {
            return Err(NnaError::invalid_geometry(format!(
                "y shift {} has no register, use alu_cvt",
                self.y.shift
            )));
        }
        Ok(())
    }

    /// Compile the SDP and SDP RDMA register program.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn compile(&self) -> Result<RegisterProgram> {
        self.validate()?;
        let src = &self.source;
        let dst = &self.destination;
        let flying = self.flying();
        let mut prog = RegisterProgram::new("sdp");

        // rdma
        prog.push(sdp_rdma::D_FEATURE_MODE_CFG, u32::from(flying));
        prog.push(sdp_rdma::D_SRC_DMA_CFG, RAM_TYPE_MC);
        prog.push(sdp_rdma::D_DATA_CUBE_WIDTH, src.width() - 1);
        prog.push(sdp_rdma::D_DATA_CUBE_HEIGHT, src.height() - 1);
        prog.push(sdp_rdma::D_DATA_CUBE_CHANNEL, src.channel() - 1);
        if !flying {
            prog.push_addr(
                sdp_rdma::D_SRC_BASE_ADDR_LOW,
                sdp_rdma::D_SRC_BASE_ADDR_HIGH,
                src.address,
            );
            prog.push(sdp_rdma::D_SRC_LINE_STRIDE, src.line_stride);
            prog.push(sdp_rdma::D_SRC_SURFACE_STRIDE, src.surface_stride);
        }

        // core
        if dst.in_memory() {
            prog.push_addr(
                sdp::D_DST_BASE_ADDR_LOW,
                sdp::D_DST_BASE_ADDR_HIGH,
                dst.address,
            );
            prog.push(sdp::D_DST_LINE_STRIDE, dst.line_stride);
            prog.push(sdp::D_DST_SURFACE_STRIDE, dst.surface_stride);
            prog.push(sdp::D_DST_DMA_CFG, RAM_TYPE_MC);
            prog.push(sdp::D_DST_BATCH_STRIDE, 0);
        }
        prog.push(sdp::D_DATA_CUBE_WIDTH, src.width() - 1);
        prog.push(sdp::D_DATA_CUBE_HEIGHT, src.height() - 1);
        prog.push(sdp::D_DATA_CUBE_CHANNEL, src.channel() - 1);
        prog.push(
            sdp::D_FEATURE_MODE_CFG,
            u32::from(flying) | (u32::from(self.feeds_pooling()) << 1),
        );
        prog.push(sdp::D_DATA_FORMAT, 0);
        prog.push(sdp::D_CVT_OFFSET, self.output.offset as u32);
        prog.push(sdp::D_CVT_SCALE, u32::from(self.output.scale as u16));
        prog.push(sdp::D_CVT_SHIFT, u32::from(self.output.truncate));

        for (lane_regs, lane) in [(&X1_REGS, &self.x1), (&X2_REGS, &self.x2), (&Y_REGS, &self.y)] {
            program_lane(&mut prog, lane_regs, lane, src);
        }

        tracing::debug!(
            "sdp {} flying={} to_pdp={} lanes={:#x}/{:#x}/{:#x}",
            src.dims,
            flying,
            self.feeds_pooling(),
            self.x1.control().pack(),
            self.x2.control().pack(),
            self.y.control().pack()
        );
        Ok(prog)
    }
}

/// Producer pointers of the SDP and its RDMA.
pub const PRODUCER_POINTERS: [usize; 2] = [sdp::S_POINTER, sdp_rdma::S_POINTER];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::CubeDims;

    fn cube() -> DataCube {
        DataCube::flying(CubeDims::new(32, 32, 32))
    }

    #[test]
    fn bypass_lane_word() {
        assert_eq!(Lane::bypass().control().pack(), LaneControl::BYPASS_WORD);
    }

    #[test]
    fn control_word_round_trip() {
        for word in 0..0x80u32 {
            assert_eq!(LaneControl::unpack(word).pack(), word, "{word:#x}");
        }
        for algo in [AluAlgo::Max, AluAlgo::Min, AluAlgo::Sum, AluAlgo::Equal] {
            let c = LaneControl {
                bypass: false,
                alu_bypass: false,
                alu_algo: algo,
                mul_bypass: true,
                mul_prelu: false,
                relu_bypass: false,
            };
            assert_eq!(LaneControl::unpack(c.pack()), c);
        }
    }

    #[test]
    fn bias_relu_lane_word() {
        let lane = Lane::bias(0x4002_0000, 3).with_activation(Activation::Relu);
        let c = lane.control();
        assert!(!c.bypass && !c.alu_bypass && c.mul_bypass && !c.relu_bypass);
        // alu sum (2 << 2) + mul bypass (1 << 4)
        assert_eq!(c.pack(), 0x18);
    }

    #[test]
    fn prelu_sets_multiplier_mode() {
        let lane = Lane {
            enabled: true,
            op: LaneOp::Multiply,
            activation: Activation::Prelu,
            ..Lane::default()
        };
        let c = lane.control();
        assert!(c.alu_bypass && !c.mul_bypass && c.mul_prelu && c.relu_bypass);
    }

    #[test]
    fn bias_lane_programs_rdma() {
        let src = cube();
        let mut prog = RegisterProgram::new("t");
        program_lane(&mut prog, &X1_REGS, &Lane::bias(0x4002_0000, 4), &src);
        assert_eq!(prog.value_at(sdp::D_DP_BS_ALU_CFG), Some(1 | (4 << 8)));
        assert_eq!(prog.value_at(sdp::D_DP_BS_MUL_CFG), None);
        assert_eq!(prog.value_at(sdp::D_DP_BS_ALU_SRC_VALUE), None);
        // use=add, 16-bit, per-kernel, MC
        assert_eq!(
            prog.value_at(sdp_rdma::D_BRDMA_CFG),
            Some((1 << 1) | (1 << 3) | (1 << 5))
        );
        assert_eq!(prog.value_at(sdp_rdma::D_BS_BASE_ADDR_LOW), Some(0x4002_0000));
        assert_eq!(prog.value_at(sdp_rdma::D_BS_LINE_STRIDE), Some(src.line_stride * 2));
        assert_eq!(
            prog.value_at(sdp_rdma::D_BS_SURFACE_STRIDE),
            Some(src.surface_stride * 2)
        );
    }

    #[test]
    fn per_layer_lane_writes_inline_operands() {
        let lane = Lane {
            enabled: true,
            op: LaneOp::Both,
            alu_algo: AluAlgo::Max,
            truncate: 5,
            source: LaneSource::PerLayer { alu: -7, mul: 3 },
            ..Lane::default()
        };
        let mut prog = RegisterProgram::new("t");
        program_lane(&mut prog, &X2_REGS, &lane, &cube());
        assert_eq!(prog.value_at(sdp::D_DP_BN_ALU_CFG), Some(0));
        assert_eq!(prog.value_at(sdp::D_DP_BN_ALU_SRC_VALUE), Some((-7i32) as u32));
        assert_eq!(prog.value_at(sdp::D_DP_BN_MUL_CFG), Some(5 << 8));
        assert_eq!(prog.value_at(sdp::D_DP_BN_MUL_SRC_VALUE), Some(3));
        assert_eq!(prog.value_at(sdp_rdma::D_NRDMA_CFG), Some(1));
        assert_eq!(prog.value_at(sdp_rdma::D_BN_BASE_ADDR_LOW), Some(0));
    }

    #[test]
    fn y_lane_memory_operand_uses_conversion() {
        let lane = Lane {
            enabled: true,
            op: LaneOp::Multiply,
            truncate: 2,
            source: LaneSource::PerPoint { address: 0x5000_0000 },
            mul_cvt: Conversion {
                offset: 10,
                scale: 3,
                truncate: 1,
                enabled: true,
            },
            ..Lane::default()
        };
        let mut prog = RegisterProgram::new("t");
        program_lane(&mut prog, &Y_REGS, &lane, &cube());
        assert_eq!(prog.value_at(sdp::D_DP_EW_MUL_CFG), Some(1));
        assert_eq!(prog.value_at(sdp::D_DP_EW_MUL_CVT_OFFSET_VALUE), Some(10));
        assert_eq!(prog.value_at(sdp::D_DP_EW_MUL_CVT_SCALE_VALUE), Some(3));
        assert_eq!(prog.value_at(sdp::D_DP_EW_MUL_CVT_TRUNCATE_VALUE), Some(1));
        assert_eq!(prog.value_at(sdp::D_DP_EW_TRUNCATE_VALUE), Some(2));
        // use=mul, 16-bit, per-point, MC
        assert_eq!(
            prog.value_at(sdp_rdma::D_ERDMA_CFG),
            Some((1 << 3) | (1 << 4) | (1 << 5))
        );
    }

    #[test]
    fn flying_bias_relu_into_pooling() {
        let op = ScaleBiasOperation::new(cube(), cube())
            .with_x1(Lane::bias(0x4002_0000, 0).with_activation(Activation::Relu))
            .with_output(Conversion::shift(9));
        let prog = op.compile().unwrap();
        assert_eq!(prog.value_at(sdp_rdma::D_FEATURE_MODE_CFG), Some(1));
        assert_eq!(prog.value_at(sdp::D_FEATURE_MODE_CFG), Some(0b11));
        assert_eq!(prog.value_at(sdp::D_DST_BASE_ADDR_LOW), None);
        assert_eq!(prog.value_at(sdp_rdma::D_SRC_BASE_ADDR_LOW), None);
        assert_eq!(prog.value_at(sdp::D_CVT_SCALE), Some(1));
        assert_eq!(prog.value_at(sdp::D_CVT_SHIFT), Some(9));
        assert_eq!(prog.value_at(sdp::D_DP_BN_CFG), Some(LaneControl::BYPASS_WORD));
        assert_eq!(prog.value_at(sdp::D_DP_EW_CFG), Some(LaneControl::BYPASS_WORD));
        assert!(op.rdma_needed());
    }

    #[test]
    fn output_to_memory() {
        let dims = CubeDims::new(16, 16, 64);
        let op = ScaleBiasOperation::new(
            DataCube::flying(dims),
            DataCube::feature(0x4006_0000, dims),
        );
        let prog = op.compile().unwrap();
        assert_eq!(prog.value_at(sdp::D_FEATURE_MODE_CFG), Some(1));
        assert_eq!(prog.value_at(sdp::D_DST_BASE_ADDR_LOW), Some(0x4006_0000));
        assert_eq!(prog.value_at(sdp::D_DST_LINE_STRIDE), Some(128));
        assert_eq!(prog.value_at(sdp::D_DST_DMA_CFG), Some(1));
        assert!(!op.rdma_needed());
    }

    #[test]
    fn output_conversion_always_programmed() {
        let prog = ScaleBiasOperation::new(cube(), cube()).compile().unwrap();
        assert_eq!(prog.value_at(sdp::D_CVT_OFFSET), Some(0));
        assert_eq!(prog.value_at(sdp::D_CVT_SCALE), Some(1));
        assert_eq!(prog.value_at(sdp::D_CVT_SHIFT), Some(0));
    }

    #[test]
    fn mismatched_cubes_rejected() {
        let op = ScaleBiasOperation::new(
            cube(),
            DataCube::flying(CubeDims::new(16, 16, 32)),
        );
        assert!(op.compile().is_err());
    }

    #[test]
    fn memory_operand_without_address_rejected() {
        let op = ScaleBiasOperation::new(cube(), cube()).with_x1(Lane::bias(0, 0));
        assert!(op.compile().unwrap_err().is_contract_violation());
    }

    #[test]
    fn y_lane_shift_rejected() {
        let y = Lane::bias(0x4002_0000, 2);
        let op = ScaleBiasOperation::new(cube(), cube()).with_y(y);
        let err = op.compile().unwrap_err();
        assert!(err.to_string().contains("y shift 2"), "{err}");

        let op = ScaleBiasOperation::new(cube(), cube()).with_y(Lane::bias(0x4002_0000, 0));
        assert!(op.compile().is_ok());

        // The same shift is programmed on an X lane.
        let op = ScaleBiasOperation::new(cube(), cube()).with_x1(y);
        assert!(op.compile().is_ok());
    }
}
