//! Session configuration.
//!
//! Defaults describe the V831 placement; every field can be overridden in
//! code or, for deployment, from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `NNA_MEM_DEVICE` | memory device path |
//! | `NNA_BASE_ADDR` | NNA window base (hex `0x…` or decimal) |
//! | `NNA_CLOCK_MHZ` | accelerator clock |

use crate::error::{NnaError, Result};
use nna_chip::ccu::DEFAULT_CLOCK_MHZ;
use nna_chip::window::{ChipProfile, V831};
use std::path::PathBuf;
use std::time::Duration;

/// Hardware session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Memory device the windows are mapped from.
    pub mem_device: PathBuf,
    /// Physical base of the NNA register window.
    pub nna_base: u64,
    /// NNA window size in bytes.
    pub nna_size: usize,
    /// Physical base of the clock control unit.
    pub ccu_base: u64,
    /// CCU window size in bytes.
    pub ccu_size: usize,
    /// Accelerator clock applied at open.
    pub clock_mhz: u32,
    /// Power the accelerator up (and reset it) when the session opens.
    pub power_on_open: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::for_chip(&V831)
    }
}

impl SessionConfig {
    /// Defaults for a chip profile.
    pub fn for_chip(profile: &ChipProfile) -> Self {
        Self {
            mem_device: PathBuf::from("/dev/mem"),
            nna_base: profile.nna_base,
            nna_size: profile.nna_size,
            ccu_base: profile.ccu_base,
            ccu_size: profile.ccu_size,
            clock_mhz: DEFAULT_CLOCK_MHZ,
            power_on_open: true,
        }
    }

    /// Defaults with environment overrides applied.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidState`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source.
    ///
    /// # Errors
    ///
    /// [`NnaError::InvalidState`] if a value is malformed.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup("NNA_MEM_DEVICE") {
            self.mem_device = PathBuf::from(path);
        }
        if let Some(base) = lookup("NNA_BASE_ADDR") {
            self.nna_base = parse_u64(&base).ok_or_else(|| {
                NnaError::invalid_state(format!("NNA_BASE_ADDR={base:?} is not an address"))
            })?;
        }
        if let Some(clock) = lookup("NNA_CLOCK_MHZ") {
            self.clock_mhz = clock.trim().parse().map_err(|_| {
                NnaError::invalid_state(format!("NNA_CLOCK_MHZ={clock:?} is not a number"))
            })?;
        }
        Ok(self)
    }
}

/// Parse `0x`-prefixed hex or decimal.
pub fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim().replace('_', "");
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Completion deadline.
    pub timeout: Duration,
    /// Sleep between completion polls.
    pub poll_interval: Duration,
    /// Enable engine performance counters.
    pub perf_stats: bool,
    /// Cooperative cancellation, checked on every poll.
    pub cancel: Option<crate::CancelToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(400),
            poll_interval: Duration::from_micros(20),
            perf_stats: false,
            cancel: None,
        }
    }
}

impl RunOptions {
    /// Set the completion deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable performance counters.
    #[must_use]
    pub const fn with_perf_stats(mut self, enabled: bool) -> Self {
        self.perf_stats = enabled;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: crate::CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Poll budget: `timeout / poll_interval`, at least one.
    pub fn max_polls(&self) -> u32 {
        let interval = self.poll_interval.as_nanos().max(1);
        let polls = self.timeout.as_nanos() / interval;
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_v831() {
        let c = SessionConfig::default();
        assert_eq!(c.nna_base, 0x0240_0000);
        assert_eq!(c.ccu_base, 0x0300_1000);
        assert_eq!(c.clock_mhz, 400);
        assert!(c.power_on_open);
    }

    #[test]
    fn overrides_applied() {
        let c = SessionConfig::default()
            .with_overrides(|k| match k {
                "NNA_BASE_ADDR" => Some("0x0250_0000".into()),
                "NNA_CLOCK_MHZ" => Some("600".into()),
                "NNA_MEM_DEVICE" => Some("/dev/fake".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(c.nna_base, 0x0250_0000);
        assert_eq!(c.clock_mhz, 600);
        assert_eq!(c.mem_device, PathBuf::from("/dev/fake"));
    }

    #[test]
    fn malformed_override_rejected() {
        let err = SessionConfig::default()
            .with_overrides(|k| (k == "NNA_CLOCK_MHZ").then(|| "fast".into()))
            .unwrap_err();
        assert!(matches!(err, NnaError::InvalidState { .. }));
    }

    #[test]
    fn parse_hex_and_decimal() {
        assert_eq!(parse_u64("0x2400000"), Some(0x0240_0000));
        assert_eq!(parse_u64("37748736"), Some(37_748_736));
        assert_eq!(parse_u64("0xZZ"), None);
    }

    #[test]
    fn poll_budget() {
        assert_eq!(RunOptions::default().max_polls(), 20_000);
        let opts = RunOptions::default().with_timeout(Duration::from_micros(10));
        assert_eq!(opts.max_polls(), 1);
        let opts = RunOptions::default().with_timeout(Duration::from_millis(2));
        assert_eq!(opts.max_polls(), 100);
    }
}
