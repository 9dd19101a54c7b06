//! Compiled register programs.
//!
//! Engine programmers never touch a register window directly: they compile
//! a descriptor into a [`RegisterProgram`], an ordered list of writes. The
//! orchestrator validates and compiles every engine of a run first, then
//! replays the programs, so a rejected descriptor never leaves hardware
//! half-programmed.

use crate::mmio::RegisterIo;
use std::fmt;

/// One register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    /// Window-relative register offset.
    pub offset: usize,
    /// Value written.
    pub value: u32,
}

/// Ordered list of register writes for one engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterProgram {
    engine: &'static str,
    writes: Vec<RegWrite>,
}

impl RegisterProgram {
    /// Empty program for `engine`.
    pub fn new(engine: &'static str) -> Self {
        Self {
            engine,
            writes: Vec::new(),
        }
    }

    /// Engine this program configures.
    pub const fn engine(&self) -> &'static str {
        self.engine
    }

    /// Append a write.
    pub fn push(&mut self, offset: usize, value: u32) {
        self.writes.push(RegWrite { offset, value });
    }

    /// Append a 64-bit address as a low/high register pair.
    pub fn push_addr(&mut self, low: usize, high: usize, addr: u64) {
        #[allow(clippy::cast_possible_truncation)]
        self.push(low, addr as u32);
        self.push(high, (addr >> 32) as u32);
    }

    /// Writes in issue order.
    pub fn writes(&self) -> &[RegWrite] {
        &self.writes
    }

    /// Number of writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// True when the program writes nothing.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Last value this program writes to `offset`.
    pub fn value_at(&self, offset: usize) -> Option<u32> {
        self.writes
            .iter()
            .rev()
            .find(|w| w.offset == offset)
            .map(|w| w.value)
    }

    /// Issue every write, in order, to `io`.
    pub fn apply<R: RegisterIo + ?Sized>(&self, io: &mut R) {
        for w in &self.writes {
            tracing::trace!("{}: {:#06x} <- {:#010x}", self.engine, w.offset, w.value);
            io.write32(w.offset, w.value);
        }
        tracing::debug!("{}: applied {} register writes", self.engine, self.writes.len());
    }
}

impl fmt::Display for RegisterProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {} ({} writes)", self.engine, self.writes.len())?;
        for w in &self.writes {
            writeln!(f, "{:#06x} = {:#010x}", w.offset, w.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SoftwareWindow;

    #[test]
    fn apply_preserves_order() {
        let mut p = RegisterProgram::new("test");
        p.push(0x10, 1);
        p.push(0x08, 2);
        p.push(0x10, 3);
        let mut w = SoftwareWindow::new(0x100);
        p.apply(&mut w);
        assert_eq!(w.writes(), &[(0x10, 1), (0x08, 2), (0x10, 3)]);
        assert_eq!(p.value_at(0x10), Some(3));
        assert_eq!(p.value_at(0x0C), None);
    }

    #[test]
    fn address_pair_splits_words() {
        let mut p = RegisterProgram::new("test");
        p.push_addr(0x20, 0x24, 0x1_4000_0040);
        assert_eq!(p.value_at(0x20), Some(0x4000_0040));
        assert_eq!(p.value_at(0x24), Some(1));
    }

    #[test]
    fn display_lists_writes() {
        let mut p = RegisterProgram::new("cdma");
        p.push(0x3010, 1);
        let text = p.to_string();
        assert!(text.starts_with("# cdma (1 writes)"));
        assert!(text.contains("0x3010 = 0x00000001"));
    }
}
