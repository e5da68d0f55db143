//! # Loop Analysis
//!
//! Finds back-edges (control edges whose target dominates their source),
//! builds natural loops from them, and assembles a loop forest per function.
//! A loop's body is every region that reaches the latch without passing
//! through the header, discovered by backward reachability over the union
//! of explicit control edges and structural region-tree adjacency.

use crate::foundation::{Context, NodeId, RegionId};
use crate::pass::{
    run_analysis, AnalysisPass, AnalysisResult, Pass, PassContext, PassId, PassResult,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Tag of the loop analysis pass.
pub const LOOP_ANALYSIS: PassId = PassId("loop-analysis");

/// Index of a loop inside its function's [`LoopTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(pub usize);

/// A single natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    /// Header region (where the condition is checked)
    pub header: RegionId,
    /// Body regions, excluding the header
    pub body_regions: FxHashSet<RegionId>,
    /// Regions that jump back to the header
    pub latches: Vec<RegionId>,
    /// Targets of edges leaving the loop
    pub exits: Vec<RegionId>,
    /// Enclosing loop, if any
    pub parent: Option<LoopId>,
    /// Loops nested directly inside this one
    pub children: Vec<LoopId>,
    /// Nesting depth; 0 = outermost
    pub depth: usize,
}

impl Loop {
    pub fn contains(&self, region: RegionId) -> bool {
        region == self.header || self.body_regions.contains(&region)
    }

    /// A natural loop has a single latch.
    pub fn is_natural(&self) -> bool {
        self.latches.len() == 1
    }

    /// Header plus body.
    pub fn all_regions(&self) -> Vec<RegionId> {
        let mut all = vec![self.header];
        all.extend(self.body_regions.iter().copied());
        all
    }
}

/// The loop forest of one function.
#[derive(Debug, Default)]
pub struct LoopTree {
    pub loops: Vec<Loop>,
    /// Loops not nested in any other loop
    pub root_loops: Vec<LoopId>,
    /// Innermost loop containing each region
    pub region_to_loop: FxHashMap<RegionId, LoopId>,
    /// Maximum nesting depth across the tree
    pub max_depth: usize,
}

impl LoopTree {
    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.0]
    }

    /// Innermost loop containing a region.
    pub fn loop_for(&self, region: RegionId) -> Option<LoopId> {
        self.region_to_loop.get(&region).copied()
    }

    /// Visit loops in post-order (children before parent).
    pub fn visit_post_order(&self, mut f: impl FnMut(LoopId, &Loop)) {
        for &root in &self.root_loops {
            self.visit_post_order_impl(root, &mut f);
        }
    }

    /// Visit loops in pre-order (parent before children).
    pub fn visit_pre_order(&self, mut f: impl FnMut(LoopId, &Loop)) {
        for &root in &self.root_loops {
            self.visit_pre_order_impl(root, &mut f);
        }
    }

    fn visit_post_order_impl(&self, id: LoopId, f: &mut impl FnMut(LoopId, &Loop)) {
        for &child in &self.loops[id.0].children {
            self.visit_post_order_impl(child, f);
        }
        f(id, &self.loops[id.0]);
    }

    fn visit_pre_order_impl(&self, id: LoopId, f: &mut impl FnMut(LoopId, &Loop)) {
        f(id, &self.loops[id.0]);
        for &child in &self.loops[id.0].children {
            self.visit_pre_order_impl(child, f);
        }
    }
}

/// Result of loop analysis for a module: one loop tree per function.
#[derive(Debug, Default)]
pub struct LoopAnalysisResult {
    trees: FxHashMap<NodeId, LoopTree>,
    total_loops: usize,
    max_nesting_depth: usize,
}

impl AnalysisResult for LoopAnalysisResult {
    fn invalidated_by(&self, _transform: PassId) -> bool {
        // conservatively, every transform invalidates loop structure
        true
    }
}

impl LoopAnalysisResult {
    pub fn loops_for_function(&self, function: NodeId) -> Option<&LoopTree> {
        self.trees.get(&function)
    }

    /// Innermost loop containing a region, searching across all functions.
    pub fn loop_for_region(&self, region: RegionId) -> Option<(NodeId, LoopId)> {
        let mut functions: Vec<&NodeId> = self.trees.keys().collect();
        functions.sort_unstable();
        for &func in functions {
            if let Some(id) = self.trees[&func].loop_for(region) {
                return Some((func, id));
            }
        }
        None
    }

    pub fn total_loops(&self) -> usize {
        self.total_loops
    }

    pub fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }
}

/// Analysis pass that detects loops in all functions of a module.
#[derive(Debug, Default)]
pub struct LoopAnalysisPass;

impl Pass for LoopAnalysisPass {
    fn id(&self) -> PassId {
        LOOP_ANALYSIS
    }

    fn name(&self) -> &'static str {
        "loop-analysis"
    }

    fn description(&self) -> &'static str {
        "analyzes loop structure and builds loop trees for optimization"
    }

    fn is_analysis(&self) -> bool {
        true
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        let succeeded = run_analysis(self, ir, ctx)?;
        if succeeded {
            if let Some(result) = ctx.get_result::<LoopAnalysisResult>(LOOP_ANALYSIS) {
                let (total, depth) = (result.total_loops as u64, result.max_nesting_depth as u64);
                ctx.update_stat("loop_analysis.total_loops", total);
                ctx.update_stat("loop_analysis.max_nesting_depth", depth);
            }
        }
        Ok(succeeded)
    }
}

impl AnalysisPass for LoopAnalysisPass {
    fn analyze(&mut self, ir: &Context, ctx: &PassContext) -> Option<Box<dyn AnalysisResult>> {
        let mut result = LoopAnalysisResult::default();
        let module = ctx.module();

        for func in ir.module(module).functions.clone() {
            let Some(body) = ir.function_body(module, func) else {
                continue;
            };
            let tree = analyze_function(ir, body);
            result.total_loops += tree.loops.len();
            result.max_nesting_depth = result.max_nesting_depth.max(tree.max_depth);
            result.trees.insert(func, tree);
        }

        Some(Box::new(result))
    }
}

struct BackEdge {
    source: RegionId,
    target: RegionId,
}

/// Build the loop tree of one function body.
pub fn analyze_function(ir: &Context, body: RegionId) -> LoopTree {
    let regions = ir.region_subtree(body);
    let back_edges = find_back_edges(ir, &regions);

    let mut loops = Vec::new();
    for edge in &back_edges {
        loops.push(build_natural_loop(ir, &regions, edge));
    }

    build_loop_tree(loops)
}

fn find_back_edges(ir: &Context, regions: &[RegionId]) -> Vec<BackEdge> {
    let mut edges = Vec::new();
    for &region in regions {
        for &node in &ir.region(region).nodes {
            if !ir.node(node).op.is_terminator() {
                continue;
            }
            for target in ir.terminator_targets(node) {
                // back-edge: target dominates source
                if ir.region_dominates(target, region) {
                    edges.push(BackEdge { source: region, target });
                }
            }
        }
    }
    edges
}

fn build_natural_loop(ir: &Context, regions: &[RegionId], edge: &BackEdge) -> Loop {
    let header = edge.target;
    let latch = edge.source;

    let body_regions = find_loop_body(ir, regions, header, latch);
    let mut lp = Loop {
        header,
        body_regions,
        latches: vec![latch],
        exits: Vec::new(),
        parent: None,
        children: Vec::new(),
        depth: 0,
    };

    for region in lp.all_regions() {
        for &node in &ir.region(region).nodes {
            if !ir.node(node).op.is_terminator() {
                continue;
            }
            for target in ir.terminator_targets(node) {
                if !lp.contains(target) && !lp.exits.contains(&target) {
                    lp.exits.push(target);
                }
            }
        }
    }

    lp
}

/// All regions that can reach the latch without passing through the header.
/// Predecessor edges are the union of explicit control edges and
/// region-tree adjacency (parent-child in either direction, for structured
/// constructs).
fn find_loop_body(
    ir: &Context,
    regions: &[RegionId],
    header: RegionId,
    latch: RegionId,
) -> FxHashSet<RegionId> {
    let mut preds: FxHashMap<RegionId, Vec<RegionId>> = FxHashMap::default();
    for &region in regions {
        for &node in &ir.region(region).nodes {
            if !ir.node(node).op.is_terminator() {
                continue;
            }
            for target in ir.terminator_targets(node) {
                preds.entry(target).or_default().push(region);
            }
        }
        if let Some(parent) = ir.region(region).parent {
            if regions.contains(&parent) {
                preds.entry(region).or_default().push(parent);
                preds.entry(parent).or_default().push(region);
            }
        }
    }

    let mut body = FxHashSet::default();
    let mut worklist = vec![latch];
    if latch != header {
        body.insert(latch);
    }
    while let Some(current) = worklist.pop() {
        if current == header {
            continue;
        }
        for &pred in preds.get(&current).map_or(&[][..], Vec::as_slice) {
            if pred != header && body.insert(pred) {
                worklist.push(pred);
            }
        }
    }

    body
}

fn build_loop_tree(mut loops: Vec<Loop>) -> LoopTree {
    let mut tree = LoopTree::default();
    if loops.is_empty() {
        return tree;
    }

    // parent = smallest other loop containing this loop's header
    let containment: Vec<Option<LoopId>> = (0..loops.len())
        .map(|i| {
            let mut best: Option<(usize, usize)> = None;
            for (j, candidate) in loops.iter().enumerate() {
                if i == j || !candidate.contains(loops[i].header) {
                    continue;
                }
                let size = candidate.body_regions.len() + 1;
                if best.is_none_or(|(_, best_size)| size < best_size) {
                    best = Some((j, size));
                }
            }
            best.map(|(j, _)| LoopId(j))
        })
        .collect();

    for (i, parent) in containment.iter().enumerate() {
        loops[i].parent = *parent;
        if let Some(p) = parent {
            let child = LoopId(i);
            loops[p.0].children.push(child);
        }
    }

    for i in 0..loops.len() {
        let mut depth = 0;
        let mut parent = loops[i].parent;
        while let Some(p) = parent {
            depth += 1;
            parent = loops[p.0].parent;
        }
        loops[i].depth = depth;
        tree.max_depth = tree.max_depth.max(depth);
    }

    for (i, lp) in loops.iter().enumerate() {
        let id = LoopId(i);
        for region in lp.all_regions() {
            // innermost loop wins: prefer maximum depth
            let replace = tree
                .region_to_loop
                .get(&region)
                .is_none_or(|existing| loops[existing.0].depth < lp.depth);
            if replace {
                tree.region_to_loop.insert(region, id);
            }
        }
        if lp.parent.is_none() {
            tree.root_loops.push(id);
        }
    }

    tree.loops = loops;
    tree
}
