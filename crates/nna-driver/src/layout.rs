//! Layout calculator: convolution buffer partitioning.
//!
//! Pure integer functions mapping cube geometry to the buffer parameters
//! the convolution engines are programmed with. They are the hardware's
//! partitioning rules and must match it exactly.

use crate::cube::DataFormat;
use crate::error::{NnaError, Result};
use nna_chip::geometry::{
    BYTES_PER_ELEMENT, CBUF_ENTRIES_PER_BANK, MEMORY_ATOMIC_SIZE, WEIGHT_ALIGN, WEIGHT_BANK_BYTES,
};

/// Entries per slice: buffer entries one input line occupies.
///
/// Channels are padded to whole memory atomics; every four atomics fill one
/// entry per pixel, and a partial group of 1..3 atomics packs 4, 2 or 1
/// pixels per entry.
///
/// # Errors
///
/// [`NnaError::UnsupportedFormat`] for [`DataFormat::Pixel`], which has no
/// defined packing on this hardware generation.
/// [`NnaError::InvalidGeometry`] if the count does not fit 32 bits.
///
/// # Panics
///
/// Panics if `channel` or `width` is zero.
pub fn compute_entries_per_slice(format: DataFormat, channel: u32, width: u32) -> Result<u32> {
    assert!(channel > 0 && width > 0, "entries per slice of an empty cube");
    match format {
        DataFormat::Feature => {
            let width = u64::from(width);
            let c_atomics = (u64::from(channel) * u64::from(BYTES_PER_ELEMENT))
                .div_ceil(u64::from(MEMORY_ATOMIC_SIZE));
            let mut eps = width * (c_atomics >> 2);
            eps += match c_atomics & 3 {
                3 => width,
                2 => (width + 1) >> 1,
                1 => (width + 3) >> 2,
                _ => 0,
            };
            u32::try_from(eps).map_err(|_| {
                NnaError::invalid_geometry(format!("{eps} entries per slice overflow"))
            })
        }
        DataFormat::Pixel => Err(NnaError::UnsupportedFormat {
            format: format.name(),
        }),
    }
}

/// Data banks (512 entries each) needed for `height` slices.
///
/// Saturates at `u32::MAX`, far beyond any bank budget.
///
/// # Panics
///
/// Panics if either argument is zero.
pub fn compute_data_bank(entries_per_slice: u32, height: u32) -> u32 {
    assert!(entries_per_slice > 0 && height > 0, "data bank of an empty cube");
    let entries = u64::from(entries_per_slice) * u64::from(height);
    u32::try_from(entries.div_ceil(u64::from(CBUF_ENTRIES_PER_BANK))).unwrap_or(u32::MAX)
}

/// Weight byte count as programmed: truncated to a 32-byte multiple.
pub const fn truncate_weight_bytes(bytes: u32) -> u32 {
    bytes & !(WEIGHT_ALIGN - 1)
}

/// Weight banks (16 KiB each) needed for `weight_bytes`.
///
/// # Panics
///
/// Panics if `weight_bytes` truncates to zero.
pub fn compute_weight_bank(weight_bytes: u32) -> u32 {
    let aligned = truncate_weight_bytes(weight_bytes);
    assert!(aligned > 0, "weight bank of an empty weight cube");
    aligned.div_ceil(WEIGHT_BANK_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eps(channel: u32, width: u32) -> u32 {
        compute_entries_per_slice(DataFormat::Feature, channel, width).unwrap()
    }

    #[test]
    fn eps_reference_layers() {
        // 3 channels pad to one atomic: 4 pixels per entry.
        assert_eq!(eps(3, 32), 8);
        // 8 channels, one atomic.
        assert_eq!(eps(8, 143), 36);
        // 16 channels, two atomics: 2 pixels per entry.
        assert_eq!(eps(16, 16), 8);
        // 24 channels, three atomics: full entry per pixel.
        assert_eq!(eps(24, 10), 10);
        // 32 channels, four atomics.
        assert_eq!(eps(32, 10), 10);
        // 40 channels: four atomics plus one.
        assert_eq!(eps(40, 10), 13);
    }

    #[test]
    fn eps_monotonic_in_width() {
        for channel in 1..=64 {
            let mut prev = 0;
            for width in 1..=256 {
                let e = eps(channel, width);
                assert!(e >= prev, "c={channel} w={width}: {e} < {prev}");
                prev = e;
            }
        }
    }

    #[test]
    fn eps_pixel_unsupported() {
        let err = compute_entries_per_slice(DataFormat::Pixel, 3, 32).unwrap_err();
        assert!(matches!(err, NnaError::UnsupportedFormat { format: "pixel" }));
    }

    #[test]
    #[should_panic(expected = "empty cube")]
    fn eps_zero_width_panics() {
        let _ = compute_entries_per_slice(DataFormat::Feature, 8, 0);
    }

    #[test]
    fn data_bank_is_ceiling() {
        assert_eq!(compute_data_bank(36, 79), 6);
        assert_eq!(compute_data_bank(512, 1), 1);
        assert_eq!(compute_data_bank(513, 1), 2);
        for eps in [1, 7, 100, 511, 512, 1000] {
            for h in [1, 3, 32, 79] {
                let banks = compute_data_bank(eps, h);
                assert!(banks * 512 >= eps * h);
                assert!((banks - 1) * 512 < eps * h);
            }
        }
    }

    #[test]
    fn weight_bank_is_ceiling_of_truncated() {
        assert_eq!(compute_weight_bank(16 * 72), 1);
        assert_eq!(compute_weight_bank(16_384), 1);
        assert_eq!(compute_weight_bank(16_416), 2);
        for bytes in [32, 1150, 1152, 20_000, 65_567] {
            let banks = compute_weight_bank(bytes);
            assert!(banks * 16_384 >= truncate_weight_bytes(bytes));
        }
    }

    #[test]
    fn weight_truncation() {
        assert_eq!(truncate_weight_bytes(1152), 1152);
        assert_eq!(truncate_weight_bytes(1150), 1120);
        assert_eq!(truncate_weight_bytes(1152 + 31), 1152);
    }

    #[test]
    fn data_bank_product_does_not_wrap() {
        // 2^21 * 2^13 entries would wrap to 0 in 32 bits
        assert_eq!(compute_data_bank(1 << 21, 1 << 13), 1 << 25);
        assert_eq!(compute_data_bank(u32::MAX, u32::MAX), u32::MAX);
    }

    #[test]
    fn entries_per_slice_at_extent_limits() {
        assert_eq!(
            compute_entries_per_slice(DataFormat::Feature, 8192, 8192).unwrap(),
            8192 * 256
        );
        assert!(compute_entries_per_slice(DataFormat::Feature, u32::MAX, u32::MAX).is_err());
    }
}
