//! Physical buffer addressing.
//!
//! The driver never touches buffer memory; it only needs physical addresses
//! the accelerator can DMA from. A [`BufferProvider`] supplies them (an ION
//! or CMA allocator in a real deployment). [`PhysicalRegion`] carves one
//! contiguous allocation into weights, bias and activation buffers.

use crate::error::{NnaError, Result};

/// Source of DMA-capable physical memory.
pub trait BufferProvider {
    /// Physically contiguous region of at least `size` bytes.
    ///
    /// # Errors
    ///
    /// Implementation-specific allocation failure.
    fn allocate(&mut self, size: u64) -> Result<PhysicalRegion>;
}

/// Contiguous physical memory region with a bump allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalRegion {
    base: u64,
    size: u64,
    next: u64,
}

impl PhysicalRegion {
    /// Region starting at `base`.
    pub const fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            size,
            next: 0,
        }
    }

    /// Physical base address.
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Region size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Bytes not yet handed out by [`allocate`](Self::allocate).
    pub const fn remaining(&self) -> u64 {
        self.size - self.next
    }

    /// Physical address of `offset`.
    ///
    /// # Errors
    ///
    /// [`NnaError::BufferExhausted`] if `offset` lies outside the region or
    /// past the end of the address space.
    pub fn at(&self, offset: u64) -> Result<u64> {
        self.base
            .checked_add(offset)
            .filter(|_| offset < self.size)
            .ok_or(NnaError::BufferExhausted {
                requested: offset,
                available: self.size,
            })
    }

    /// Reserve `size` bytes aligned to `align` (a power of two).
    ///
    /// # Errors
    ///
    /// [`NnaError::BufferExhausted`] if the region cannot fit the request,
    /// [`NnaError::InvalidState`] for a non-power-of-two alignment.
    pub fn allocate(&mut self, size: u64, align: u64) -> Result<u64> {
        if !align.is_power_of_two() {
            return Err(NnaError::invalid_state(format!(
                "alignment {align} is not a power of two"
            )));
        }
        let placed = self
            .base
            .checked_add(self.next)
            .and_then(|cursor| cursor.checked_next_multiple_of(align))
            .and_then(|addr| {
                let start = addr - self.base;
                let end = start.checked_add(size).filter(|&end| end <= self.size)?;
                addr.checked_add(size)?;
                Some((addr, end))
            });
        let Some((addr, end)) = placed else {
            return Err(NnaError::BufferExhausted {
                requested: size,
                available: self.remaining(),
            });
        };
        self.next = end;
        tracing::trace!("buffer {addr:#x}+{size:#x}");
        Ok(addr)
    }
}

/// Provider backed by one fixed reserved region (e.g. a carve-out).
#[derive(Debug)]
pub struct ReservedMemory {
    region: PhysicalRegion,
}

impl ReservedMemory {
    /// Reserved memory at `base`.
    pub const fn new(base: u64, size: u64) -> Self {
        Self {
            region: PhysicalRegion::new(base, size),
        }
    }
}

impl BufferProvider for ReservedMemory {
    fn allocate(&mut self, size: u64) -> Result<PhysicalRegion> {
        let base = self.region.allocate(size, 4096)?;
        Ok(PhysicalRegion::new(base, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_resolve_inside_region() {
        let r = PhysicalRegion::new(0x4000_0000, 0x8_0000);
        assert_eq!(r.at(0x4_0000).unwrap(), 0x4004_0000);
        assert!(matches!(
            r.at(0x8_0000),
            Err(NnaError::BufferExhausted { .. })
        ));
    }

    #[test]
    fn offsets_near_end_of_address_space() {
        let mut r = PhysicalRegion::new(u64::MAX - 0xFF, 0x1000);
        assert_eq!(r.at(0xFF).unwrap(), u64::MAX);
        assert!(matches!(
            r.at(0x100),
            Err(NnaError::BufferExhausted { requested: 0x100, .. })
        ));
        assert!(matches!(
            r.allocate(0x200, 1),
            Err(NnaError::BufferExhausted { requested: 0x200, .. })
        ));
        assert!(r.allocate(0x10, 0x1000).is_err());
    }

    #[test]
    fn bump_allocation_aligns() {
        let mut r = PhysicalRegion::new(0x4000_0000, 0x1000);
        assert_eq!(r.allocate(10, 32).unwrap(), 0x4000_0000);
        assert_eq!(r.allocate(10, 32).unwrap(), 0x4000_0020);
        assert_eq!(r.remaining(), 0x1000 - 0x2A);
        assert!(r.allocate(0x1000, 32).is_err());
        assert!(r.allocate(1, 3).is_err());
    }

    #[test]
    fn reserved_memory_hands_out_pages() {
        let mut mem = ReservedMemory::new(0x4000_0000, 0x8_0000);
        let a = mem.allocate(0x100).unwrap();
        let b = mem.allocate(0x100).unwrap();
        assert_eq!(a.base(), 0x4000_0000);
        assert_eq!(b.base(), 0x4000_1000);
        assert!(mem.allocate(0x10_0000).is_err());
    }
}
