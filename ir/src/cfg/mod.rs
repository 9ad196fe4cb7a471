//! Control flow graph construction over the linear instruction stream.
//!
//! Key pieces:
//! - [`DirectedGraph`] — typed-edge digraph over arena-indexed vertices
//! - [`BasicBlock`] / [`BlockId`] — straight-line instruction runs
//! - [`ExceptionRegion`] / [`RegionId`] — protected regions and their handlers
//! - [`Cfg`] — the finished graph plus the rescuer/ensurer handler maps
//!
//! Construction is a single stateful pass over the stream (`builder`),
//! followed by exception-region resolution, exit wiring and a structural
//! cleanup pass that drops infeasible exception edges and orphaned blocks.

pub(crate) mod block;
pub(crate) mod builder;
pub(crate) mod cleanup;
pub(crate) mod dump;
pub(crate) mod graph;
pub(crate) mod region;

pub use self::block::{BasicBlock, BlockId};
pub use self::dump::{dump_cfg, dump_handler_tables};
pub use self::graph::{DirectedGraph, Edge, VertexId};
pub use self::region::{ExceptionRegion, RegionId};

use crate::instr::{Instr, Label, LabelAllocator, Opcode};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a control edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Implicit flow into the lexically next block.
    FallThrough,
    /// Taken branch or jump to an explicit target.
    Regular,
    /// Flow into a rescue or ensure handler when an instruction raises.
    Exception,
    /// Flow into the synthetic exit block.
    Exit,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeKind::FallThrough => "fallthrough",
            EdgeKind::Regular => "regular",
            EdgeKind::Exception => "exception",
            EdgeKind::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// A finished control flow graph.
///
/// Produced by [`Cfg::build`] and immutable afterwards. Every graph has a
/// synthetic entry block with no incoming edges and a synthetic exit block
/// with no outgoing edges; after cleanup every other block is reachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    pub(crate) blocks: Vec<Option<BasicBlock>>,
    pub(crate) graph: DirectedGraph<BlockId, EdgeKind>,
    pub(crate) entry: BlockId,
    pub(crate) exit: BlockId,
    pub(crate) block_of_label: FxHashMap<Label, BlockId>,
    pub(crate) rescuers: IndexMap<BlockId, BlockId>,
    pub(crate) ensurers: IndexMap<BlockId, BlockId>,
    pub(crate) regions: Vec<ExceptionRegion>,
    pub(crate) outermost: Vec<RegionId>,
}

impl Cfg {
    /// Builds the control flow graph for `instrs`.
    ///
    /// `labels` must be the allocator that minted the labels appearing in the
    /// stream; it is borrowed to mint labels for the synthetic blocks and for
    /// any nested closure builds triggered by call instructions.
    pub fn build(instrs: Vec<Instr>, labels: &mut LabelAllocator) -> Result<Self, CfgBuildError> {
        builder::CfgBuilder::new(labels).build(instrs)
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn exit(&self) -> BlockId {
        self.exit
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index()).and_then(|slot| slot.as_ref())
    }

    /// Live blocks in creation order (entry first, exit last).
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn block_count(&self) -> usize {
        self.blocks.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn block_for_label(&self, label: Label) -> Option<BlockId> {
        self.block_of_label.get(&label).copied()
    }

    pub fn graph(&self) -> &DirectedGraph<BlockId, EdgeKind> {
        &self.graph
    }

    /// First block of the rescue handler protecting `id`, if any.
    pub fn rescuer_of(&self, id: BlockId) -> Option<BlockId> {
        self.rescuers.get(&id).copied()
    }

    /// First block of the ensure handler protecting `id`, if any.
    pub fn ensurer_of(&self, id: BlockId) -> Option<BlockId> {
        self.ensurers.get(&id).copied()
    }

    pub fn rescuers(&self) -> &IndexMap<BlockId, BlockId> {
        &self.rescuers
    }

    pub fn ensurers(&self) -> &IndexMap<BlockId, BlockId> {
        &self.ensurers
    }

    pub fn region(&self, id: RegionId) -> Option<&ExceptionRegion> {
        self.regions.get(id.index())
    }

    /// All regions in creation order (outer regions before the regions they
    /// contain).
    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    /// Regions not nested inside any other region.
    pub fn outermost_regions(&self) -> &[RegionId] {
        &self.outermost
    }
}

/// Errors that can occur during CFG construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgBuildError {
    /// A block-ending instruction whose kind is outside the recognized
    /// closed set.
    UnsupportedTerminator { op: Opcode },

    /// A region end marker with no matching open region.
    UnmatchedRegionEnd { position: usize },

    /// A label referenced as a jump, branch or handler target but never
    /// defined in the stream.
    UndefinedLabel { label: Label },
}

impl fmt::Display for CfgBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfgBuildError::UnsupportedTerminator { op } => {
                write!(f, "unsupported block-ending instruction `{}`", op)
            }
            CfgBuildError::UnmatchedRegionEnd { position } => {
                write!(
                    f,
                    "region end marker at instruction {} has no matching open region",
                    position
                )
            }
            CfgBuildError::UndefinedLabel { label } => {
                write!(f, "label {} is referenced but never defined", label)
            }
        }
    }
}

impl std::error::Error for CfgBuildError {}
