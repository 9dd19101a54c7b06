//! Register map of the NNA engine window.
//!
//! Every engine block occupies its own 4 KiB page inside the window. Offsets
//! exported here are window-relative (`BASE + register`), so they can be
//! handed straight to a register accessor.
//!
//! ```text
//! Block      Base     Role
//! ────────── ──────── ──────────────────────────────────────────────
//!  GLB       0x1000   Global interrupt status
//!  CDMA      0x3000   Convolution DMA: feature + weight fetch
//!  CSC       0x4000   Convolution sequence controller
//!  CMAC_A    0x5000   MAC array, lane A
//!  CMAC_B    0x6000   MAC array, lane B
//!  CACC      0x7000   Convolution accumulator
//!  SDP_RDMA  0x8000   Scale-bias operand fetch
//!  SDP       0x9000   Scale / bias / activation
//!  PDP_RDMA  0xA000   Pooling input fetch
//!  PDP       0xB000   Planar pooling
//! ```
//!
//! Register naming follows the hardware convention: `S_` registers are
//! single (not double-buffered), `D_` registers belong to the group selected
//! by the block's producer pointer. Sizes are stored as `count - 1`.

// ── Shared per-block registers ───────────────────────────────────────────────

/// Producer pointer: selects the descriptor group the next `D_` writes land in.
pub const S_POINTER: usize = 0x0004;

/// Group 0 (the only group used for single-shot runs).
pub const POINTER_GROUP_0: u32 = 0;

/// Operation enable value.
pub const OP_ENABLE: u32 = 1;

/// RAM type selector for memory-client (MC) DMA.
pub const RAM_TYPE_MC: u32 = 1;

// ── GLB ──────────────────────────────────────────────────────────────────────

/// Global block.
pub mod glb {
    /// Block base.
    pub const BASE: usize = 0x1000;
    /// Interrupt status. Bits set per finished engine; write all-ones to clear.
    pub const S_INTR_STATUS: usize = BASE + 0x00C;
    /// Value that clears every pending interrupt.
    pub const INTR_CLEAR_ALL: u32 = 0xFFFF_FFFF;
}

// ── Interrupt bits ───────────────────────────────────────────────────────────

/// `GLB_S_INTR_STATUS` bit definitions (group 0).
pub mod intr {
    /// SDP finished group 0.
    pub const SDP_DONE0: u32 = 1 << 0;
    /// PDP finished group 0.
    pub const PDP_DONE0: u32 = 1 << 4;
    /// CDMA finished fetching feature data, group 0.
    pub const CDMA_DAT_DONE0: u32 = 1 << 16;
    /// CDMA finished fetching weights, group 0.
    pub const CDMA_WT_DONE0: u32 = 1 << 18;
    /// CACC finished group 0.
    pub const CACC_DONE0: u32 = 1 << 20;

    /// Completion mask for convolution + scale-bias.
    pub const CONV_ONLY_MASK: u32 = SDP_DONE0 | CDMA_DAT_DONE0 | CDMA_WT_DONE0 | CACC_DONE0;
    /// Completion mask for convolution + scale-bias + pooling.
    pub const CONV_POOL_MASK: u32 = CONV_ONLY_MASK | PDP_DONE0;
}

// ── CDMA ─────────────────────────────────────────────────────────────────────

/// Convolution DMA.
pub mod cdma {
    /// Block base.
    pub const BASE: usize = 0x3000;
    /// Producer pointer.
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    /// Read arbiter weights.
    pub const S_ARBITER: usize = BASE + 0x008;
    /// Non-zero once the convolution buffer has flushed and can take a new layer.
    pub const S_CBUF_FLUSH_STATUS: usize = BASE + 0x00C;
    pub const D_OP_ENABLE: usize = BASE + 0x010;
    /// Precision + reuse/release flags.
    pub const D_MISC_CFG: usize = BASE + 0x014;
    pub const D_DATAIN_FORMAT: usize = BASE + 0x018;
    /// `(w-1) | (h-1) << 16`.
    pub const D_DATAIN_SIZE_0: usize = BASE + 0x01C;
    /// `c-1`.
    pub const D_DATAIN_SIZE_1: usize = BASE + 0x020;
    pub const D_DATAIN_SIZE_EXT_0: usize = BASE + 0x024;
    pub const D_DAIN_RAM_TYPE: usize = BASE + 0x02C;
    pub const D_DAIN_ADDR_HIGH_0: usize = BASE + 0x030;
    pub const D_DAIN_ADDR_LOW_0: usize = BASE + 0x034;
    pub const D_LINE_STRIDE: usize = BASE + 0x040;
    pub const D_SURF_STRIDE: usize = BASE + 0x048;
    pub const D_DAIN_MAP: usize = BASE + 0x04C;
    pub const D_BATCH_NUMBER: usize = BASE + 0x058;
    /// Entries per slice, minus one.
    pub const D_ENTRY_PER_SLICE: usize = BASE + 0x060;
    pub const D_WEIGHT_FORMAT: usize = BASE + 0x068;
    /// Bytes per kernel, minus one.
    pub const D_WEIGHT_SIZE_0: usize = BASE + 0x06C;
    /// Kernel count, minus one.
    pub const D_WEIGHT_SIZE_1: usize = BASE + 0x070;
    pub const D_WEIGHT_RAM_TYPE: usize = BASE + 0x074;
    pub const D_WEIGHT_ADDR_HIGH: usize = BASE + 0x078;
    pub const D_WEIGHT_ADDR_LOW: usize = BASE + 0x07C;
    /// Total weight bytes, 32-byte aligned.
    pub const D_WEIGHT_BYTES: usize = BASE + 0x080;
    pub const D_MEAN_FORMAT: usize = BASE + 0x098;
    /// `(x-1) | (y-1) << 16`.
    pub const D_CONV_STRIDE: usize = BASE + 0x0B0;
    /// `left | right << 8 | top << 16 | bottom << 24`.
    pub const D_ZERO_PADDING: usize = BASE + 0x0B4;
    pub const D_ZERO_PADDING_VALUE: usize = BASE + 0x0B8;
    /// `(data_banks-1) | (weight_banks-1) << 16`.
    pub const D_BANK: usize = BASE + 0x0BC;
    pub const D_PERF_ENABLE: usize = BASE + 0x0D4;

    /// Default arbiter weighting.
    pub const ARBITER_DEFAULT: u32 = 0x0001_0001;
    /// Feature-format input (`DATAIN_FORMAT`).
    pub const DATAIN_FORMAT_FEATURE: u32 = 0x0010_1000;
}

// ── CSC ──────────────────────────────────────────────────────────────────────

/// Convolution sequence controller.
pub mod csc {
    /// Block base.
    pub const BASE: usize = 0x4000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x008;
    pub const D_MISC_CFG: usize = BASE + 0x00C;
    pub const D_DATAIN_FORMAT: usize = BASE + 0x010;
    pub const D_DATAIN_SIZE_EXT_0: usize = BASE + 0x014;
    pub const D_DATAIN_SIZE_EXT_1: usize = BASE + 0x018;
    pub const D_BATCH_NUMBER: usize = BASE + 0x01C;
    pub const D_POST_Y_EXTENSION: usize = BASE + 0x020;
    pub const D_ENTRY_PER_SLICE: usize = BASE + 0x024;
    pub const D_WEIGHT_FORMAT: usize = BASE + 0x028;
    /// `(kw-1) | (kh-1) << 16`.
    pub const D_WEIGHT_SIZE_EXT_0: usize = BASE + 0x02C;
    /// `(kc-1) | (kernels-1) << 16`.
    pub const D_WEIGHT_SIZE_EXT_1: usize = BASE + 0x030;
    pub const D_WEIGHT_BYTES: usize = BASE + 0x034;
    pub const D_DATAOUT_SIZE_0: usize = BASE + 0x03C;
    pub const D_DATAOUT_SIZE_1: usize = BASE + 0x040;
    /// Output pixels per channel, minus one.
    pub const D_ATOMICS: usize = BASE + 0x044;
    pub const D_RELEASE: usize = BASE + 0x048;
    pub const D_CONV_STRIDE_EXT: usize = BASE + 0x04C;
    pub const D_DILATION_EXT: usize = BASE + 0x050;
    /// `left | top << 16`.
    pub const D_ZERO_PADDING: usize = BASE + 0x054;
    pub const D_ZERO_PADDING_VALUE: usize = BASE + 0x058;
    pub const D_BANK: usize = BASE + 0x05C;
    pub const D_PRA_CFG: usize = BASE + 0x060;
}

// ── CMAC ─────────────────────────────────────────────────────────────────────

/// MAC array, lane A.
pub mod cmac_a {
    /// Block base.
    pub const BASE: usize = 0x5000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x008;
    pub const D_MISC_CFG: usize = BASE + 0x00C;
}

/// MAC array, lane B.
pub mod cmac_b {
    /// Block base.
    pub const BASE: usize = 0x6000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x008;
    pub const D_MISC_CFG: usize = BASE + 0x00C;
}

// ── CACC ─────────────────────────────────────────────────────────────────────

/// Convolution accumulator.
pub mod cacc {
    /// Block base.
    pub const BASE: usize = 0x7000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x008;
    pub const D_MISC_CFG: usize = BASE + 0x00C;
    pub const D_DATAOUT_SIZE_0: usize = BASE + 0x010;
    pub const D_DATAOUT_SIZE_1: usize = BASE + 0x014;
    pub const D_DATAOUT_ADDR: usize = BASE + 0x018;
    pub const D_BATCH_NUMBER: usize = BASE + 0x01C;
    pub const D_LINE_STRIDE: usize = BASE + 0x020;
    pub const D_SURF_STRIDE: usize = BASE + 0x024;
    /// `line_packed | surf_packed << 16`.
    pub const D_DATAOUT_MAP: usize = BASE + 0x028;
    pub const D_CLIP_CFG: usize = BASE + 0x02C;

    /// Line- and surface-packed output.
    pub const DATAOUT_MAP_PACKED: u32 = 1 | (1 << 16);
}

// ── SDP RDMA ─────────────────────────────────────────────────────────────────

/// Scale-bias operand fetch.
pub mod sdp_rdma {
    /// Block base.
    pub const BASE: usize = 0x8000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x008;
    pub const D_DATA_CUBE_WIDTH: usize = BASE + 0x00C;
    pub const D_DATA_CUBE_HEIGHT: usize = BASE + 0x010;
    pub const D_DATA_CUBE_CHANNEL: usize = BASE + 0x014;
    pub const D_SRC_BASE_ADDR_LOW: usize = BASE + 0x018;
    pub const D_SRC_BASE_ADDR_HIGH: usize = BASE + 0x01C;
    pub const D_SRC_LINE_STRIDE: usize = BASE + 0x020;
    pub const D_SRC_SURFACE_STRIDE: usize = BASE + 0x024;

    /// X1 (BS) operand fetch.
    pub const D_BRDMA_CFG: usize = BASE + 0x028;
    pub const D_BS_BASE_ADDR_LOW: usize = BASE + 0x02C;
    pub const D_BS_BASE_ADDR_HIGH: usize = BASE + 0x030;
    pub const D_BS_LINE_STRIDE: usize = BASE + 0x034;
    pub const D_BS_SURFACE_STRIDE: usize = BASE + 0x038;
    pub const D_BS_BATCH_STRIDE: usize = BASE + 0x03C;

    /// X2 (BN) operand fetch.
    pub const D_NRDMA_CFG: usize = BASE + 0x040;
    pub const D_BN_BASE_ADDR_LOW: usize = BASE + 0x044;
    pub const D_BN_BASE_ADDR_HIGH: usize = BASE + 0x048;
    pub const D_BN_LINE_STRIDE: usize = BASE + 0x04C;
    pub const D_BN_SURFACE_STRIDE: usize = BASE + 0x050;
    pub const D_BN_BATCH_STRIDE: usize = BASE + 0x054;

    /// Y (EW) operand fetch.
    pub const D_ERDMA_CFG: usize = BASE + 0x058;
    pub const D_EW_BASE_ADDR_LOW: usize = BASE + 0x05C;
    pub const D_EW_BASE_ADDR_HIGH: usize = BASE + 0x060;
    pub const D_EW_LINE_STRIDE: usize = BASE + 0x064;
    pub const D_EW_SURFACE_STRIDE: usize = BASE + 0x068;
    pub const D_EW_BATCH_STRIDE: usize = BASE + 0x06C;

    /// Bit 0: input flies in from CACC.
    pub const D_FEATURE_MODE_CFG: usize = BASE + 0x070;
    pub const D_SRC_DMA_CFG: usize = BASE + 0x074;
}

// ── SDP ──────────────────────────────────────────────────────────────────────

/// Scale / bias / activation.
pub mod sdp {
    /// Block base.
    pub const BASE: usize = 0x9000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x038;
    pub const D_DATA_CUBE_WIDTH: usize = BASE + 0x03C;
    pub const D_DATA_CUBE_HEIGHT: usize = BASE + 0x040;
    pub const D_DATA_CUBE_CHANNEL: usize = BASE + 0x044;
    pub const D_DST_BASE_ADDR_LOW: usize = BASE + 0x048;
    pub const D_DST_BASE_ADDR_HIGH: usize = BASE + 0x04C;
    pub const D_DST_LINE_STRIDE: usize = BASE + 0x050;
    pub const D_DST_SURFACE_STRIDE: usize = BASE + 0x054;

    /// X1 lane (BS).
    pub const D_DP_BS_CFG: usize = BASE + 0x058;
    pub const D_DP_BS_ALU_CFG: usize = BASE + 0x05C;
    pub const D_DP_BS_ALU_SRC_VALUE: usize = BASE + 0x060;
    pub const D_DP_BS_MUL_CFG: usize = BASE + 0x064;
    pub const D_DP_BS_MUL_SRC_VALUE: usize = BASE + 0x068;

    /// X2 lane (BN).
    pub const D_DP_BN_CFG: usize = BASE + 0x06C;
    pub const D_DP_BN_ALU_CFG: usize = BASE + 0x070;
    pub const D_DP_BN_ALU_SRC_VALUE: usize = BASE + 0x074;
    pub const D_DP_BN_MUL_CFG: usize = BASE + 0x078;
    pub const D_DP_BN_MUL_SRC_VALUE: usize = BASE + 0x07C;

    /// Y lane (EW).
    pub const D_DP_EW_CFG: usize = BASE + 0x080;
    pub const D_DP_EW_ALU_CFG: usize = BASE + 0x084;
    pub const D_DP_EW_ALU_SRC_VALUE: usize = BASE + 0x088;
    pub const D_DP_EW_ALU_CVT_OFFSET_VALUE: usize = BASE + 0x08C;
    pub const D_DP_EW_ALU_CVT_SCALE_VALUE: usize = BASE + 0x090;
    pub const D_DP_EW_ALU_CVT_TRUNCATE_VALUE: usize = BASE + 0x094;
    pub const D_DP_EW_MUL_CFG: usize = BASE + 0x098;
    pub const D_DP_EW_MUL_SRC_VALUE: usize = BASE + 0x09C;
    pub const D_DP_EW_MUL_CVT_OFFSET_VALUE: usize = BASE + 0x0A0;
    pub const D_DP_EW_MUL_CVT_SCALE_VALUE: usize = BASE + 0x0A4;
    pub const D_DP_EW_MUL_CVT_TRUNCATE_VALUE: usize = BASE + 0x0A8;
    pub const D_DP_EW_TRUNCATE_VALUE: usize = BASE + 0x0AC;

    /// `flying | output_to_pdp << 1`.
    pub const D_FEATURE_MODE_CFG: usize = BASE + 0x0B0;
    pub const D_DST_DMA_CFG: usize = BASE + 0x0B4;
    pub const D_DST_BATCH_STRIDE: usize = BASE + 0x0B8;
    pub const D_DATA_FORMAT: usize = BASE + 0x0BC;
    pub const D_CVT_OFFSET: usize = BASE + 0x0C0;
    pub const D_CVT_SCALE: usize = BASE + 0x0C4;
    pub const D_CVT_SHIFT: usize = BASE + 0x0C8;
    pub const D_PERF_ENABLE: usize = BASE + 0x0DC;

    /// Perf counters: DMA, LUT, saturation, NaN.
    pub const PERF_ENABLE_ALL: u32 = 0x0F;
}

// ── PDP RDMA ─────────────────────────────────────────────────────────────────

/// Pooling input fetch (used only when pooling reads from memory).
pub mod pdp_rdma {
    /// Block base.
    pub const BASE: usize = 0xA000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x008;
    pub const D_DATA_CUBE_IN_WIDTH: usize = BASE + 0x00C;
    pub const D_DATA_CUBE_IN_HEIGHT: usize = BASE + 0x010;
    pub const D_DATA_CUBE_IN_CHANNEL: usize = BASE + 0x014;
    /// 1 = off-fly (input from memory).
    pub const D_FLYING_MODE: usize = BASE + 0x018;
    pub const D_SRC_BASE_ADDR_LOW: usize = BASE + 0x01C;
    pub const D_SRC_BASE_ADDR_HIGH: usize = BASE + 0x020;
    pub const D_SRC_LINE_STRIDE: usize = BASE + 0x024;
    pub const D_SRC_SURFACE_STRIDE: usize = BASE + 0x028;
    pub const D_SRC_RAM_CFG: usize = BASE + 0x02C;
    pub const D_DATA_FORMAT: usize = BASE + 0x030;
    /// `(kw-1) | (sx-1) << 4`.
    pub const D_POOLING_KERNEL_CFG: usize = BASE + 0x038;
    pub const D_POOLING_PADDING_CFG: usize = BASE + 0x03C;
}

// ── PDP ──────────────────────────────────────────────────────────────────────

/// Planar pooling.
pub mod pdp {
    /// Block base.
    pub const BASE: usize = 0xB000;
    pub const S_POINTER: usize = BASE + super::S_POINTER;
    pub const D_OP_ENABLE: usize = BASE + 0x008;
    pub const D_DATA_CUBE_IN_WIDTH: usize = BASE + 0x00C;
    pub const D_DATA_CUBE_IN_HEIGHT: usize = BASE + 0x010;
    pub const D_DATA_CUBE_IN_CHANNEL: usize = BASE + 0x014;
    pub const D_DATA_CUBE_OUT_WIDTH: usize = BASE + 0x018;
    pub const D_DATA_CUBE_OUT_HEIGHT: usize = BASE + 0x01C;
    pub const D_DATA_CUBE_OUT_CHANNEL: usize = BASE + 0x020;
    /// `method | off_flying << 4 | split_num << 8`.
    pub const D_OPERATION_MODE_CFG: usize = BASE + 0x024;
    pub const D_NAN_FLUSH_TO_ZERO: usize = BASE + 0x028;
    /// `(kw-1) | (kh-1) << 8 | (sx-1) << 16 | (sy-1) << 20`.
    pub const D_POOLING_KERNEL_CFG: usize = BASE + 0x034;
    pub const D_RECIP_KERNEL_WIDTH: usize = BASE + 0x038;
    pub const D_RECIP_KERNEL_HEIGHT: usize = BASE + 0x03C;
    /// `left | top << 4 | right << 8 | bottom << 12`.
    pub const D_POOLING_PADDING_CFG: usize = BASE + 0x040;
    /// First of seven consecutive padding-value registers.
    pub const D_POOLING_PADDING_VALUE_1: usize = BASE + 0x044;
    pub const PADDING_VALUE_COUNT: usize = 7;
    pub const D_SRC_LINE_STRIDE: usize = BASE + 0x068;
    pub const D_SRC_SURFACE_STRIDE: usize = BASE + 0x06C;
    pub const D_DST_BASE_ADDR_LOW: usize = BASE + 0x070;
    pub const D_DST_BASE_ADDR_HIGH: usize = BASE + 0x074;
    pub const D_DST_LINE_STRIDE: usize = BASE + 0x078;
    pub const D_DST_SURFACE_STRIDE: usize = BASE + 0x07C;
    pub const D_DST_RAM_CFG: usize = BASE + 0x080;
    pub const D_DATA_FORMAT: usize = BASE + 0x084;
    pub const D_PERF_ENABLE: usize = BASE + 0x094;

    /// Pooling methods (`OPERATION_MODE_CFG[1:0]`).
    pub mod method {
        /// Average over the window.
        pub const AVERAGE: u32 = 0;
        /// Maximum over the window.
        pub const MAX: u32 = 1;
        /// Minimum over the window.
        pub const MIN: u32 = 2;
    }
}
