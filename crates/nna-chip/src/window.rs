//! Physical placement of the register windows.
//!
//! The accelerator is reached through two memory-mapped windows:
//!
//! ```text
//! Window  Base          Size     Purpose
//! ─────── ───────────── ──────── ──────────────────────────────────────────
//!  NNA    0x0240_0000   128 KB   Engine registers (GLB, CDMA .. PDP)
//!  CCU    0x0300_1000    64 KB   Clock source and power/reset gate
//! ```
//!
//! Other SoCs carrying the same engine set only differ in these bases.

/// Where one chip places its NNA and CCU windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipProfile {
    /// Human-readable SoC name.
    pub name: &'static str,
    /// Physical base of the NNA register window.
    pub nna_base: u64,
    /// Size of the NNA register window in bytes.
    pub nna_size: usize,
    /// Physical base of the clock control unit window.
    pub ccu_base: u64,
    /// Size of the clock control unit window in bytes.
    pub ccu_size: usize,
}

/// Allwinner V831 placement.
pub const V831: ChipProfile = ChipProfile {
    name: "V831",
    nna_base: 0x0240_0000,
    nna_size: 0x2_0000,
    ccu_base: 0x0300_1000,
    ccu_size: 0x1_0000,
};

impl ChipProfile {
    /// True if `offset..offset + 4` lies inside the NNA window.
    #[must_use]
    pub const fn nna_contains(&self, offset: usize) -> bool {
        offset + 4 <= self.nna_size
    }
}
