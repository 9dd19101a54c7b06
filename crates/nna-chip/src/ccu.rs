//! Clock control unit (CCU) words for the accelerator.
//!
//! The NNA has no reset bit of its own inside the engine window: reset,
//! power gating and clock selection all go through two registers of the SoC
//! control unit.

/// NNA clock source/divider register (CCU-relative).
pub const NNA_CLOCK: usize = 0x06E0;

/// NNA bus gate and reset register (CCU-relative).
pub const NNA_GATE: usize = 0x06EC;

/// Gate word: clock gate open, reset de-asserted.
pub const GATE_ON: u32 = 0x0001_0001;

/// Gate word: clock gated, reset asserted.
pub const GATE_OFF: u32 = 0x0000_0000;

/// Default accelerator clock in MHz.
pub const DEFAULT_CLOCK_MHZ: u32 = 400;

/// Supported accelerator clocks and their CCU words.
pub const CLOCK_TABLE: &[(u32, u32)] = &[
    (100, 0xC100_000B),
    (200, 0xC100_0005),
    (300, 0xC100_0003),
    (400, 0xC100_0002),
    (600, 0xC100_0001),
    (800, 0xC500_0000),
    (1200, 0xC100_0000),
];

/// CCU word for `mhz`, if the frequency is supported.
#[must_use]
pub fn clock_word(mhz: u32) -> Option<u32> {
    CLOCK_TABLE
        .iter()
        .find(|(freq, _)| *freq == mhz)
        .map(|(_, word)| *word)
}
