//! Software register window.
//!
//! An in-memory register file implementing [`RegisterIo`]. It lets the
//! whole compile-and-run path execute without hardware:
//!
//! 1. **Dry runs**: `nna plan-conv` prints the register program a layer
//!    would write.
//! 2. **CI without hardware**: orchestrator scenarios script the interrupt
//!    status register and assert on the recorded write log.
//!
//! Reads return the last written value unless a per-offset read script is
//! queued with [`SoftwareWindow::script_reads`]; the final scripted value
//! sticks once the queue drains.

use crate::mmio::RegisterIo;
use std::collections::{HashMap, VecDeque};

/// In-memory register file.
#[derive(Debug, Clone)]
pub struct SoftwareWindow {
    size: usize,
    regs: HashMap<usize, u32>,
    scripts: HashMap<usize, VecDeque<u32>>,
    writes: Vec<(usize, u32)>,
    reads: HashMap<usize, u32>,
}

impl SoftwareWindow {
    /// Create a zeroed window of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            regs: HashMap::new(),
            scripts: HashMap::new(),
            writes: Vec::new(),
            reads: HashMap::new(),
        }
    }

    /// Window sized like the V831 NNA register window.
    pub fn nna() -> Self {
        Self::new(nna_chip::window::V831.nna_size)
    }

    /// Window sized like the V831 clock control unit.
    pub fn ccu() -> Self {
        Self::new(nna_chip::window::V831.ccu_size)
    }

    /// Preset a register without recording a write.
    pub fn set(&mut self, offset: usize, value: u32) {
        self.check(offset);
        self.regs.insert(offset, value);
    }

    /// Queue values returned by successive reads of `offset`.
    pub fn script_reads(&mut self, offset: usize, values: impl IntoIterator<Item = u32>) {
        self.check(offset);
        self.scripts.entry(offset).or_default().extend(values);
    }

    /// Current value of a register.
    pub fn peek(&self, offset: usize) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    /// Every write, in issue order.
    pub fn writes(&self) -> &[(usize, u32)] {
        &self.writes
    }

    /// Writes to one offset, in issue order.
    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Number of reads issued to `offset`.
    pub fn read_count(&self, offset: usize) -> u32 {
        self.reads.get(&offset).copied().unwrap_or(0)
    }

    /// Forget recorded writes and read counts; register contents are kept.
    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.reads.clear();
    }

    fn check(&self, offset: usize) {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "Register offset {offset:#x} out of bounds (window {:#x})",
            self.size
        );
    }
}

impl RegisterIo for SoftwareWindow {
    fn read32(&mut self, offset: usize) -> u32 {
        self.check(offset);
        *self.reads.entry(offset).or_insert(0) += 1;
        if let Some(queue) = self.scripts.get_mut(&offset) {
            if let Some(value) = queue.pop_front() {
                self.regs.insert(offset, value);
            }
        }
        self.peek(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        self.check(offset);
        tracing::trace!("write {offset:#06x} <- {value:#010x}");
        self.writes.push((offset, value));
        self.regs.insert(offset, value);
    }

    fn window_size(&self) -> usize {
        self.size
    }
}
