//! Register window access.
//!
//! Every engine programmer talks to hardware through [`RegisterIo`]: a
//! 32-bit, offset-addressed accessor over one register window. Two
//! implementations exist:
//!
//! - [`MappedWindow`]: a `/dev/mem` mapping of the physical window
//!   (`O_SYNC`, so the kernel maps it uncached).
//! - [`SoftwareWindow`](crate::SoftwareWindow): an in-memory register file
//!   for dry runs and tests.
//!
//! Pointer arithmetic over the mapping never leaves this module.

// MMIO registers are naturally aligned by hardware, so pointer casts are safe
#![allow(clippy::cast_ptr_alignment)]

use crate::error::{NnaError, Result};
use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::path::Path;
use std::ptr::NonNull;

/// Offset-addressed 32-bit register access.
///
/// Offsets are byte offsets from the start of the window and must be
/// 4-byte aligned. Accesses are issued in program order and never cached.
pub trait RegisterIo {
    /// Read the register at `offset`.
    fn read32(&mut self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`.
    fn write32(&mut self, offset: usize, value: u32);

    /// Size of the window in bytes.
    fn window_size(&self) -> usize;
}

impl<T: RegisterIo + ?Sized> RegisterIo for &mut T {
    fn read32(&mut self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }

    fn window_size(&self) -> usize {
        (**self).window_size()
    }
}

/// Physical register window mapped through a memory device.
pub struct MappedWindow {
    /// Page-aligned start of the mapping
    map: NonNull<u8>,
    /// Length of the mapping, including the alignment head
    map_len: usize,
    /// Distance from `map` to the first register
    head: usize,
    /// Usable window size
    size: usize,
    /// Physical address of the first register
    phys_base: u64,
    _fd: OwnedFd,
}

impl std::fmt::Debug for MappedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedWindow")
            .field("ptr", &format_args!("{:p}", self.map))
            .field("phys_base", &format_args!("{:#x}", self.phys_base))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

// SAFETY: Send - MappedWindow owns its mapping exclusively; the mapping is
// process-wide and stays valid when moved between threads.
unsafe impl Send for MappedWindow {}

impl MappedWindow {
    /// Map `size` bytes of physical memory starting at `phys_base`.
    ///
    /// `phys_base` need not be page aligned; the mapping is widened to the
    /// enclosing pages and the window starts at the requested address.
    ///
    /// # Errors
    ///
    /// [`NnaError::Io`] if the device cannot be opened (usually missing
    /// root privileges), [`NnaError::MapFailed`] if the mapping is refused
    /// by the kernel.
    pub fn open(device: &Path, phys_base: u64, size: usize) -> Result<Self> {
        if size == 0 || size % 4 != 0 {
            return Err(NnaError::map_failed(format!(
                "window size {size:#x} is not a non-zero multiple of 4"
            )));
        }

        let fd = rustix::fs::open(
            device,
            OFlags::RDWR | OFlags::SYNC | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| {
            let err = std::io::Error::from(e);
            std::io::Error::new(err.kind(), format!("cannot open {}: {err}", device.display()))
        })?;

        let page = rustix::param::page_size() as u64;
        let aligned = phys_base & !(page - 1);
        let head = usize::try_from(phys_base - aligned)
            .map_err(|_| NnaError::map_failed("page offset does not fit usize"))?;
        let map_len = head + size;

        // SAFETY: mmap of device memory. The fd is open for read/write, the
        // offset is page aligned and the length is non-zero. The result is
        // checked and the mapping is released exactly once in Drop.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                map_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                aligned,
            )
        }
        .map_err(|e| NnaError::map_failed(format!("mmap {phys_base:#x}+{size:#x}: {e}")))?;

        let map = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| NnaError::map_failed("mmap returned a null pointer"))?;

        tracing::info!(
            "Mapped {} window {phys_base:#x}+{size:#x} at {map:p}",
            device.display()
        );

        Ok(Self {
            map,
            map_len,
            head,
            size,
            phys_base,
            _fd: fd,
        })
    }

    /// Physical address of offset 0.
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    fn register(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "Register offset {offset:#x} out of bounds (window {:#x})",
            self.size
        );
        // SAFETY: head + offset + 4 <= map_len, checked above.
        unsafe { self.map.as_ptr().add(self.head + offset).cast::<u32>() }
    }
}

impl RegisterIo for MappedWindow {
    /// # Panics
    ///
    /// Panics if `offset` is unaligned or outside the window.
    fn read32(&mut self, offset: usize) -> u32 {
        let reg = self.register(offset);
        // SAFETY: read_volatile necessary for MMIO - hardware can change value.
        // reg is in bounds and aligned (checked in register()).
        unsafe { std::ptr::read_volatile(reg) }
    }

    /// # Panics
    ///
    /// Panics if `offset` is unaligned or outside the window.
    fn write32(&mut self, offset: usize, value: u32) {
        let reg = self.register(offset);
        // SAFETY: write_volatile necessary for MMIO - triggers hardware side effects.
        // reg is in bounds and aligned (checked in register()).
        unsafe { std::ptr::write_volatile(reg, value) }
    }

    fn window_size(&self) -> usize {
        self.size
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        // SAFETY: map/map_len came from a successful mmap and Drop runs once.
        unsafe {
            // Ignore error in Drop (can't propagate)
            let _ = munmap(self.map.as_ptr().cast(), self.map_len);
        }
        tracing::debug!("Unmapped window {:#x}", self.phys_base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_device_fails() {
        let err = MappedWindow::open(Path::new("/nonexistent/mem"), 0x0240_0000, 0x2_0000)
            .unwrap_err();
        let NnaError::Io { source } = &err else {
            panic!("expected an I/O error, got {err}");
        };
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().contains("/nonexistent/mem"), "{err}");
    }

    #[test]
    fn zero_sized_window_rejected() {
        let err = MappedWindow::open(Path::new("/dev/mem"), 0x0240_0000, 0).unwrap_err();
        assert!(matches!(err, NnaError::MapFailed { .. }));
    }
}
