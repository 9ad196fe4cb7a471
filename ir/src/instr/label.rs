//! Labels, virtual registers and the label allocation service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque name for a position in the instruction stream.
///
/// Labels are compared by identity and minted only by [`LabelAllocator`];
/// a single allocator spans a compilation unit, so labels created for
/// synthetic blocks never collide with labels already present in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(u32);

impl Label {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A virtual register produced by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable(u32);

impl Variable {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Mints fresh, unique labels.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    next: u32,
}

impl LabelAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a label never handed out before by this allocator.
    pub fn fresh(&mut self) -> Label {
        let label = Label(self.next);
        self.next += 1;
        label
    }

    /// Number of labels minted so far.
    pub fn minted(&self) -> u32 {
        self.next
    }
}
