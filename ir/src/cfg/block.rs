//! Basic blocks: maximal straight-line instruction runs.

use super::graph::VertexId;
use crate::instr::{Instr, Label};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for basic blocks. Doubles as the dense arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u32);

impl BlockId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl VertexId for BlockId {
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A basic block: one entry point, one exit point.
///
/// Blocks are append-only while the construction pass is running and
/// immutable afterwards. The sealing control instruction, when present, is
/// retained as the block's last instruction; label and region-marker
/// pseudo-instructions never appear in block contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: Label,
    pub instrs: Vec<Instr>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, label: Label) -> Self {
        Self {
            id,
            label,
            instrs: Vec::new(),
        }
    }

    /// Whether any instruction in this block can raise an exception.
    pub fn can_raise(&self) -> bool {
        self.instrs.iter().any(Instr::can_raise)
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{LabelAllocator, Operand, Variable};

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", BlockId::new(3)), "bb3");
    }

    #[test]
    fn can_raise_inspects_contents() {
        let mut labels = LabelAllocator::new();
        let mut block = BasicBlock::new(BlockId::new(0), labels.fresh());
        assert!(block.is_empty());

        block.instrs.push(Instr::Copy {
            dest: Variable::new(0),
            src: Operand::Int(1),
        });
        assert!(!block.can_raise());

        block.instrs.push(Instr::Throw {
            exception: Operand::Var(Variable::new(0)),
        });
        assert!(block.can_raise());
        assert_eq!(block.len(), 2);
    }
}
