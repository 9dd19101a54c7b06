//! Convolution buffer (CBUF) geometry and fixed arithmetic tables.
//!
//! All values are for int8 operation.

/// Channels packed into one feature atomic (atomic-C).
pub const ATOMIC_C_SIZE: u32 = 8;

/// Kernels processed per MAC group (atomic-K).
pub const ATOMIC_K_SIZE: u32 = 8;

/// Bytes of one memory atomic; feature lines are padded to this.
pub const MEMORY_ATOMIC_SIZE: u32 = 8;

/// Largest cube extent the 13-bit size fields hold.
pub const MAX_CUBE_EXTENT: u32 = 8192;

/// Number of CBUF banks shared between data and weights.
pub const CBUF_BANK_NUMBER: u32 = 32;

/// Entries held by one data bank (512 B).
pub const CBUF_ENTRIES_PER_BANK: u32 = 512;

/// Width of one CBUF entry in bytes.
pub const CBUF_ENTRY_WIDTH: u32 = 8;

/// Bytes held by one weight bank (16 KiB).
pub const WEIGHT_BANK_BYTES: u32 = 16 * 1024;

/// Weight byte counts are programmed at this granularity.
pub const WEIGHT_ALIGN: u32 = 32;

/// Feature-format bytes per pixel position at one atomic (int8).
pub const BYTES_PER_ELEMENT: u32 = 1;

/// Largest pooling window the reciprocal table covers.
pub const MAX_POOL_KERNEL: u32 = 8;

/// Largest per-side pooling pad (3-bit field).
pub const MAX_POOL_PAD: u32 = 7;

/// Reciprocal of the pooling kernel extent in 0.16 fixed point.
///
/// Indexed by `kernel - 1`: 1/1, 1/2, 1/3 .. 1/8.
pub const RECIP_KERNEL_SIZE: [u32; 8] = [
    0x10000, 0x8000, 0x5555, 0x4000, 0x3333, 0x2AAA, 0x2492, 0x2000,
];

/// Reciprocal table entry for a kernel extent of `kernel` (1..=8).
#[must_use]
pub fn recip_kernel(kernel: u32) -> Option<u32> {
    let index = usize::try_from(kernel.checked_sub(1)?).ok()?;
    RECIP_KERNEL_SIZE.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recip_table_is_one_over_n() {
        for n in 1..=MAX_POOL_KERNEL {
            let expected = 0x10000 / n;
            assert_eq!(recip_kernel(n), Some(expected), "1/{n}");
        }
    }

    #[test]
    fn recip_out_of_range() {
        assert_eq!(recip_kernel(0), None);
        assert_eq!(recip_kernel(9), None);
    }

    #[test]
    fn bank_sizes_match_entry_geometry() {
        assert_eq!(CBUF_ENTRIES_PER_BANK, 512);
        assert_eq!(WEIGHT_BANK_BYTES, 16_384);
    }
}
