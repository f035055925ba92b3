//! Loop nesting and dominance summaries.
//!
//! Immutable snapshots computed once per function and consumed read-only by
//! the classification stage:
//! - `DominatorSummary`: dominator tree over basic blocks, with an
//!   instruction-level `dominates` query;
//! - `LoopsSummary`: natural loops discovered from back edges, the loop
//!   nesting tree, and the block-to-innermost-loop map.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{BlockId, Function, ValueId};

/// Dominator tree of one function.
#[derive(Debug, Clone)]
pub struct DominatorSummary {
    /// Immediate dominator of each block (`None` for the entry and for
    /// unreachable blocks)
    idom: Vec<Option<BlockId>>,
    /// Reverse-postorder index of each block, used as the iteration order
    rpo_index: Vec<usize>,
}

impl DominatorSummary {
    /// Compute the dominator tree with the iterative algorithm over a
    /// reverse postorder of the CFG.
    pub fn compute(func: &Function) -> Self {
        let n = func.num_blocks();
        let mut rpo = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        // Iterative postorder DFS from the entry.
        let mut stack = vec![(func.entry, 0usize)];
        visited[func.entry.0 as usize] = true;
        while let Some(&mut (block, ref mut next)) = stack.last_mut() {
            let succs = func.successors_of(block);
            if *next < succs.len() {
                let succ = succs[*next];
                *next += 1;
                if !visited[succ.0 as usize] {
                    visited[succ.0 as usize] = true;
                    stack.push((succ, 0));
                }
            } else {
                rpo.push(block);
                stack.pop();
            }
        }
        rpo.reverse();

        let mut rpo_index = vec![usize::MAX; n];
        for (i, &b) in rpo.iter().enumerate() {
            rpo_index[b.0 as usize] = i;
        }

        let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); n];
        for b in func.block_ids() {
            for &succ in func.successors_of(b) {
                preds[succ.0 as usize].push(b);
            }
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        idom[func.entry.0 as usize] = Some(func.entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &p in &preds[b.0 as usize] {
                    if idom[p.0 as usize].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => Self::intersect(&idom, &rpo_index, p, cur),
                    });
                }
                if new_idom.is_some() && idom[b.0 as usize] != new_idom {
                    idom[b.0 as usize] = new_idom;
                    changed = true;
                }
            }
        }
        // The entry's self-idom was only a fixpoint anchor.
        idom[func.entry.0 as usize] = None;

        Self { idom, rpo_index }
    }

    fn intersect(
        idom: &[Option<BlockId>],
        rpo_index: &[usize],
        mut a: BlockId,
        mut b: BlockId,
    ) -> BlockId {
        while a != b {
            while rpo_index[a.0 as usize] > rpo_index[b.0 as usize] {
                a = idom[a.0 as usize].expect("processed block has idom");
            }
            while rpo_index[b.0 as usize] > rpo_index[a.0 as usize] {
                b = idom[b.0 as usize].expect("processed block has idom");
            }
        }
        a
    }

    /// Whether block `a` dominates block `b` (reflexive).
    pub fn dominates_block(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom[cur.0 as usize] {
                Some(next) => cur = next,
                None => return false,
            }
        }
    }

    /// Whether instruction `a` dominates instruction `b`: same block compares
    /// program order, otherwise block dominance (non-reflexive on values).
    pub fn dominates(&self, func: &Function, a: ValueId, b: ValueId) -> bool {
        let (ba, bb) = match (func.block_of(a), func.block_of(b)) {
            (Some(x), Some(y)) => (x, y),
            _ => return false,
        };
        if ba == bb {
            let (pa, pb) = (
                func.position_in_block(a).unwrap_or(usize::MAX),
                func.position_in_block(b).unwrap_or(usize::MAX),
            );
            return pa < pb;
        }
        self.dominates_block(ba, bb)
    }

    /// Reverse-postorder index of a block (`usize::MAX` if unreachable).
    pub fn rpo_index(&self, b: BlockId) -> usize {
        self.rpo_index[b.0 as usize]
    }
}

/// A unique identifier for a loop within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub u32);

impl std::fmt::Display for LoopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// One natural loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    pub header: BlockId,
    pub latches: Vec<BlockId>,
    /// Blocks of the loop, including sub-loop blocks
    pub blocks: BTreeSet<BlockId>,
    pub parent: Option<LoopId>,
    pub children: Vec<LoopId>,
    /// Nesting depth, 1 for top-level loops
    pub depth: usize,
}

/// Immutable snapshot of the loop nesting of one function.
#[derive(Debug, Clone, Default)]
pub struct LoopsSummary {
    loops: Vec<LoopInfo>,
    /// Innermost loop of each block
    block_to_loop: BTreeMap<BlockId, LoopId>,
}

impl LoopsSummary {
    /// Discover natural loops from back edges (`latch -> header` where the
    /// header dominates the latch), merging loops that share a header, then
    /// derive the nesting tree from block containment.
    pub fn compute(func: &Function, doms: &DominatorSummary) -> Self {
        // Back edges, grouped by header, in block layout order.
        let mut latches_of: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
        for b in func.block_ids() {
            for &succ in func.successors_of(b) {
                if doms.dominates_block(succ, b) {
                    latches_of.entry(succ).or_default().push(b);
                }
            }
        }

        let mut loops: Vec<LoopInfo> = Vec::new();
        for (&header, latches) in &latches_of {
            let mut blocks: BTreeSet<BlockId> = BTreeSet::new();
            blocks.insert(header);
            // Walk predecessors backwards from each latch up to the header.
            let mut queue: Vec<BlockId> = latches.clone();
            while let Some(b) = queue.pop() {
                if !blocks.insert(b) {
                    continue;
                }
                for p in func.block_ids() {
                    if func.successors_of(p).contains(&b) {
                        queue.push(p);
                    }
                }
            }
            loops.push(LoopInfo {
                header,
                latches: latches.clone(),
                blocks,
                parent: None,
                children: Vec::new(),
                depth: 1,
            });
        }

        // Nesting: loop A is nested in B iff A's blocks are a strict subset
        // of B's (headers differ by construction). The parent is the
        // smallest enclosing loop.
        let ids: Vec<LoopId> = (0..loops.len() as u32).map(LoopId).collect();
        for &a in &ids {
            let mut parent: Option<LoopId> = None;
            for &b in &ids {
                if a == b {
                    continue;
                }
                let (la, lb) = (&loops[a.0 as usize], &loops[b.0 as usize]);
                if la.blocks.is_subset(&lb.blocks) && la.blocks.len() < lb.blocks.len() {
                    parent = match parent {
                        None => Some(b),
                        Some(p) if loops[b.0 as usize].blocks.len()
                            < loops[p.0 as usize].blocks.len() => Some(b),
                        keep => keep,
                    };
                }
            }
            loops[a.0 as usize].parent = parent;
        }
        for &a in &ids {
            if let Some(p) = loops[a.0 as usize].parent {
                loops[p.0 as usize].children.push(a);
            }
        }
        for &a in &ids {
            let mut depth = 1;
            let mut cur = loops[a.0 as usize].parent;
            while let Some(p) = cur {
                depth += 1;
                cur = loops[p.0 as usize].parent;
            }
            loops[a.0 as usize].depth = depth;
        }

        // Innermost loop per block: the containing loop of greatest depth.
        let mut block_to_loop: BTreeMap<BlockId, LoopId> = BTreeMap::new();
        for &id in &ids {
            for &b in &loops[id.0 as usize].blocks {
                let replace = match block_to_loop.get(&b) {
                    None => true,
                    Some(&prev) => loops[id.0 as usize].depth > loops[prev.0 as usize].depth,
                };
                if replace {
                    block_to_loop.insert(b, id);
                }
            }
        }

        Self { loops, block_to_loop }
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn loop_info(&self, l: LoopId) -> &LoopInfo {
        &self.loops[l.0 as usize]
    }

    pub fn header(&self, l: LoopId) -> BlockId {
        self.loops[l.0 as usize].header
    }

    /// Innermost loop containing a block.
    pub fn loop_of_block(&self, b: BlockId) -> Option<LoopId> {
        self.block_to_loop.get(&b).copied()
    }

    /// Innermost loop containing an instruction.
    pub fn loop_of_instr(&self, func: &Function, v: ValueId) -> Option<LoopId> {
        func.block_of(v).and_then(|b| self.loop_of_block(b))
    }

    /// Whether `b` is within the loop, sub-loops included.
    pub fn contains_block(&self, l: LoopId, b: BlockId) -> bool {
        self.loops[l.0 as usize].blocks.contains(&b)
    }

    /// Roots of the loop nesting tree.
    pub fn roots(&self) -> Vec<LoopId> {
        (0..self.loops.len() as u32)
            .map(LoopId)
            .filter(|&l| self.loops[l.0 as usize].parent.is_none())
            .collect()
    }

    /// All loops, innermost-last within each nest.
    pub fn loop_ids(&self) -> impl Iterator<Item = LoopId> {
        (0..self.loops.len() as u32).map(LoopId)
    }

    /// Whether a value defined by an instruction is invariant with respect to
    /// the loop (defined outside it, or not an instruction at all).
    pub fn is_loop_invariant(&self, func: &Function, l: LoopId, v: ValueId) -> bool {
        match func.block_of(v) {
            Some(b) => !self.contains_block(l, b),
            None => true,
        }
    }
}
