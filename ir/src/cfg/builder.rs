//! The CFG construction pass.
//!
//! One stateful walk over the instruction stream partitions it into basic
//! blocks and wires the control edges. Three pieces of deferred bookkeeping
//! make the pass single-shot:
//!
//! - forward references: an edge whose target label has no block yet is
//!   parked under that label and drained when the label's block appears;
//! - return addresses: `set_return_address` and `jump_indirect` for the same
//!   variable may arrive in either order, so both sides are buffered and
//!   reconciled whichever shows up second;
//! - region stack: open protected regions mirror lexical nesting; every block
//!   created while regions are open joins the innermost one.
//!
//! After the walk, regions are resolved into handler edges and the
//! rescuer/ensurer maps, the synthetic exit block is wired, and the cleanup
//! passes run.

use super::cleanup;
use super::region::{ExceptionRegion, RegionId};
use super::{BasicBlock, BlockId, Cfg, CfgBuildError, DirectedGraph, EdgeKind};
use crate::instr::{Instr, Label, LabelAllocator, Variable};
use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use log::{debug, trace, warn};

pub(crate) struct CfgBuilder<'a> {
    labels: &'a mut LabelAllocator,
    blocks: Vec<BasicBlock>,
    graph: DirectedGraph<BlockId, EdgeKind>,
    block_of_label: FxHashMap<Label, BlockId>,

    /// Sources waiting for a target label that has no block yet.
    forward_refs: FxHashMap<Label, Vec<BlockId>>,
    /// Targets recorded against a return-address variable before its
    /// indirect jump has been seen.
    pending_ret_addrs: FxHashMap<Variable, FxHashSet<Label>>,
    /// Block containing the indirect jump consuming a return-address
    /// variable, for set-address instructions that arrive later.
    jump_sites: FxHashMap<Variable, BlockId>,

    return_blocks: Vec<BlockId>,
    throw_blocks: Vec<BlockId>,

    regions: Vec<ExceptionRegion>,
    open_regions: Vec<RegionId>,
    outermost: Vec<RegionId>,
    rescuers: IndexMap<BlockId, BlockId>,
    ensurers: IndexMap<BlockId, BlockId>,
}

impl<'a> CfgBuilder<'a> {
    pub(crate) fn new(labels: &'a mut LabelAllocator) -> Self {
        Self {
            labels,
            blocks: Vec::new(),
            graph: DirectedGraph::new(),
            block_of_label: FxHashMap::default(),
            forward_refs: FxHashMap::default(),
            pending_ret_addrs: FxHashMap::default(),
            jump_sites: FxHashMap::default(),
            return_blocks: Vec::new(),
            throw_blocks: Vec::new(),
            regions: Vec::new(),
            open_regions: Vec::new(),
            outermost: Vec::new(),
            rescuers: IndexMap::new(),
            ensurers: IndexMap::new(),
        }
    }

    pub(crate) fn build(mut self, instrs: Vec<Instr>) -> Result<Cfg, CfgBuildError> {
        let entry = self.synthetic_block();
        let first = self.synthetic_block();

        let mut curr = first;
        let mut bb_ended = false;
        let mut fall_through = true;

        for (pos, instr) in instrs.into_iter().enumerate() {
            if let Instr::Label(label) = instr {
                let next = self.new_block(label);
                if fall_through {
                    self.graph.add_edge(curr, next, EdgeKind::FallThrough);
                }
                if let Some(sources) = self.forward_refs.remove(&label) {
                    for source in sources {
                        self.graph.add_edge(source, next, EdgeKind::Regular);
                    }
                }
                curr = next;
                bb_ended = false;
                fall_through = true;
                continue;
            }

            // A sealed block stays open for region end markers only.
            if bb_ended && !matches!(instr, Instr::RegionEnd) {
                let next = self.synthetic_block();
                if fall_through {
                    self.graph.add_edge(curr, next, EdgeKind::FallThrough);
                }
                curr = next;
                bb_ended = false;
                fall_through = true;
            }

            match instr {
                Instr::RegionStart { rescue, ensure } => self.open_region(curr, rescue, ensure),
                Instr::RegionEnd => self.close_region(curr, pos)?,
                Instr::SetReturnAddress { dest, target } => {
                    match self.jump_sites.get(&dest) {
                        Some(&site) => self.add_target_edge(site, target),
                        None => {
                            self.pending_ret_addrs
                                .entry(dest)
                                .or_default()
                                .insert(target);
                        }
                    }
                    self.push_instr(curr, Instr::SetReturnAddress { dest, target });
                }
                Instr::Call {
                    dest,
                    method,
                    args,
                    closure,
                } => {
                    if let Some(scope) = closure.as_ref() {
                        scope.build_cfg(self.labels)?;
                    }
                    self.push_instr(
                        curr,
                        Instr::Call {
                            dest,
                            method,
                            args,
                            closure,
                        },
                    );
                }
                instr if instr.ends_block() => {
                    bb_ended = true;
                    fall_through = self.seal_with_terminator(curr, instr)?;
                }
                instr => self.push_instr(curr, instr),
            }
        }

        if !self.open_regions.is_empty() {
            warn!(
                "{} exception region(s) left open at end of stream",
                self.open_regions.len()
            );
        }
        if let Some(&label) = self.forward_refs.keys().min() {
            return Err(CfgBuildError::UndefinedLabel { label });
        }
        self.resolve_regions()?;

        let exit = self.synthetic_block();
        self.graph.add_edge(entry, exit, EdgeKind::Exit);
        self.graph.add_edge(entry, first, EdgeKind::FallThrough);
        for block in std::mem::take(&mut self.return_blocks) {
            self.graph.add_edge(block, exit, EdgeKind::Exit);
        }
        for block in std::mem::take(&mut self.throw_blocks) {
            self.graph.add_edge(block, exit, EdgeKind::Exit);
        }
        if fall_through {
            self.graph.add_edge(curr, exit, EdgeKind::Exit);
        }

        let mut cfg = Cfg {
            blocks: self.blocks.into_iter().map(Some).collect(),
            graph: self.graph,
            entry,
            exit,
            block_of_label: self.block_of_label,
            rescuers: self.rescuers,
            ensurers: self.ensurers,
            regions: self.regions,
            outermost: self.outermost,
        };
        cleanup::remove_infeasible_exception_edges(&mut cfg);
        cleanup::remove_orphaned_blocks(&mut cfg);
        debug!(
            "built CFG: {} blocks, {} edges, {} region(s)",
            cfg.block_count(),
            cfg.graph.edge_count(),
            cfg.regions.len()
        );
        Ok(cfg)
    }

    /// Stores the terminator in `block` and wires its edges. Returns whether
    /// control may still fall through to the lexically next block.
    fn seal_with_terminator(
        &mut self,
        block: BlockId,
        instr: Instr,
    ) -> Result<bool, CfgBuildError> {
        let fall_through = match instr {
            Instr::Branch { cond, target } => {
                self.push_instr(block, Instr::Branch { cond, target });
                self.add_target_edge(block, target);
                true
            }
            Instr::Jump { target } => {
                self.push_instr(block, Instr::Jump { target });
                self.add_target_edge(block, target);
                false
            }
            Instr::Return { value } => {
                self.push_instr(block, Instr::Return { value });
                self.return_blocks.push(block);
                false
            }
            Instr::Throw { exception } => {
                self.push_instr(block, Instr::Throw { exception });
                self.throw_blocks.push(block);
                false
            }
            Instr::JumpIndirect { addr } => {
                self.push_instr(block, Instr::JumpIndirect { addr });
                let targets: Vec<Label> = self
                    .pending_ret_addrs
                    .get(&addr)
                    .map(|labels| labels.iter().copied().collect())
                    .unwrap_or_default();
                for target in targets {
                    self.add_target_edge(block, target);
                }
                self.jump_sites.insert(addr, block);
                false
            }
            other => {
                return Err(CfgBuildError::UnsupportedTerminator { op: other.opcode() });
            }
        };
        Ok(fall_through)
    }

    /// Connects `source` to the block for `target`, or parks the edge as a
    /// forward reference if that block does not exist yet.
    fn add_target_edge(&mut self, source: BlockId, target: Label) {
        match self.block_of_label.get(&target) {
            Some(&block) => {
                self.graph.add_edge(source, block, EdgeKind::Regular);
            }
            None => self.forward_refs.entry(target).or_default().push(source),
        }
    }

    fn open_region(&mut self, curr: BlockId, rescue: Label, ensure: Option<Label>) {
        let id = RegionId::new(self.regions.len() as u32);
        let mut region = ExceptionRegion::new(rescue, ensure);
        region.blocks.push(curr);
        match self.open_regions.last() {
            Some(&parent) => self.regions[parent.index()].children.push(id),
            None => self.outermost.push(id),
        }
        self.regions.push(region);
        self.open_regions.push(id);
        trace!("opened region {} with rescue target {}", id, rescue);
    }

    fn close_region(&mut self, curr: BlockId, position: usize) -> Result<(), CfgBuildError> {
        let top = self
            .open_regions
            .pop()
            .ok_or(CfgBuildError::UnmatchedRegionEnd { position })?;
        self.regions[top.index()].end_block = Some(curr);
        Ok(())
    }

    /// Resolves every region once: looks up the handler blocks and stamps
    /// each exclusive member with its handler edges and map entries. Regions
    /// resolve in creation order, so members shared with a nested region end
    /// up mapped to the innermost handler.
    fn resolve_regions(&mut self) -> Result<(), CfgBuildError> {
        for index in 0..self.regions.len() {
            let rescue_label = self.regions[index].rescue_label;
            let ensure_label = self.regions[index].ensure_label;
            let rescue_block = self.handler_block(rescue_label)?;
            let ensure_block = match ensure_label {
                Some(label) => Some(self.handler_block(label)?),
                None => None,
            };
            self.regions[index].rescue_block = Some(rescue_block);
            self.regions[index].ensure_block = ensure_block;

            let members = self.regions[index].blocks.clone();
            for member in members {
                self.rescuers.insert(member, rescue_block);
                self.graph.add_edge(member, rescue_block, EdgeKind::Exception);
                if let Some(ensure_block) = ensure_block {
                    self.ensurers.insert(member, ensure_block);
                    // Conservative: unwind and re-raise paths reach the
                    // ensure block without passing through the rescue block.
                    self.graph.add_edge(member, ensure_block, EdgeKind::Exception);
                }
            }
        }
        Ok(())
    }

    fn handler_block(&self, label: Label) -> Result<BlockId, CfgBuildError> {
        self.block_of_label
            .get(&label)
            .copied()
            .ok_or(CfgBuildError::UndefinedLabel { label })
    }

    fn new_block(&mut self, label: Label) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, label));
        self.graph.add_vertex(id);
        self.block_of_label.insert(label, id);
        if let Some(&top) = self.open_regions.last() {
            self.regions[top.index()].blocks.push(id);
        }
        trace!("created {} for {}", id, label);
        id
    }

    fn synthetic_block(&mut self) -> BlockId {
        let label = self.labels.fresh();
        self.new_block(label)
    }

    fn push_instr(&mut self, block: BlockId, instr: Instr) {
        self.blocks[block.index()].instrs.push(instr);
    }
}
