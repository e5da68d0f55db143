//! # Aggressive Dead Code Elimination
//!
//! Two phases. First, mark regions reachable from function bodies, the
//! module root and rodata by following explicit control-flow edges and call
//! edges into callee bodies. Second, close a critical-node live set
//! backwards over inputs inside reachable regions. Unreachable regions are
//! detached from their parents; dead nodes are unlinked from reachable
//! regions. Simplification is constfold's job, not ours.

use crate::foundation::{Context, ModuleId, NodeId, NodeOp, NodeProps, RegionId};
use crate::pass::{Pass, PassContext, PassId, PassResult, TransformPass};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Tag of the ADCE pass.
pub const ADCE: PassId = PassId("aggressive-dead-code-elimination");

/// Aggressive dead code elimination pass.
#[derive(Debug, Default)]
pub struct AdcePass {
    reachable_regions: FxHashSet<RegionId>,
    live_nodes: FxHashSet<NodeId>,
}

impl Pass for AdcePass {
    fn id(&self) -> PassId {
        ADCE
    }

    fn name(&self) -> &'static str {
        "aggressive-dead-code-elimination"
    }

    fn description(&self) -> &'static str {
        "aggressively removes unreachable code and dead control flow"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        self.reachable_regions.clear();
        self.live_nodes.clear();

        let module = ctx.module();
        self.mark_reachable_regions(ir, module);
        self.mark_live_nodes(ir);

        let removed_regions = self.remove_unreachable_regions(ir, module);
        let removed_nodes = self.remove_dead_nodes(ir);

        ctx.update_stat("adce.removed_regions", removed_regions);
        ctx.update_stat("adce.removed_nodes", removed_nodes);
        Ok(true)
    }
}

impl TransformPass for AdcePass {}

impl AdcePass {
    fn mark_reachable_regions(&mut self, ir: &Context, module: ModuleId) {
        for func in &ir.module(module).functions {
            if ir.node(*func).op == NodeOp::Function {
                if let Some(body) = ir.function_body(module, *func) {
                    self.mark_region_reachable(ir, module, body);
                }
            }
        }

        // the module's global scopes are always alive
        self.mark_region_reachable(ir, module, ir.module(module).root);
        self.mark_region_reachable(ir, module, ir.module(module).rodata);
    }

    fn mark_region_reachable(&mut self, ir: &Context, module: ModuleId, region: RegionId) {
        if !self.reachable_regions.insert(region) {
            return;
        }

        for &node in &ir.region(region).nodes {
            match ir.node(node).op {
                NodeOp::Branch => {
                    // a literal condition makes only the taken edge reachable
                    match constant_branch_taken(ir, node) {
                        Some(target) => self.mark_region_reachable(ir, module, target),
                        None => {
                            for target in ir.terminator_targets(node) {
                                self.mark_region_reachable(ir, module, target);
                            }
                        }
                    }
                }
                NodeOp::Jump | NodeOp::Invoke => {
                    for target in ir.terminator_targets(node) {
                        self.mark_region_reachable(ir, module, target);
                    }
                }
                NodeOp::Call => {
                    // calls can reach other functions
                    if let Some(&callee) = ir.node(node).inputs.first() {
                        if ir.node(callee).op == NodeOp::Function {
                            if let Some(body) = ir.function_body(module, callee) {
                                self.mark_region_reachable(ir, module, body);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn mark_live_nodes(&mut self, ir: &Context) {
        let mut worklist = VecDeque::new();
        let mut regions: Vec<RegionId> = self.reachable_regions.iter().copied().collect();
        regions.sort_unstable();
        for region in regions {
            for &node in &ir.region(region).nodes {
                if is_critical_node(ir, node) && self.live_nodes.insert(node) {
                    worklist.push_back(node);
                }
            }
        }

        // propagate liveness backwards through def-use chains
        while let Some(current) = worklist.pop_front() {
            for &input in &ir.node(current).inputs {
                if self.live_nodes.insert(input) {
                    worklist.push_back(input);
                }
            }
        }
    }

    fn remove_unreachable_regions(&mut self, ir: &mut Context, module: ModuleId) -> u64 {
        let mut all_regions = Vec::new();
        for root in [ir.module(module).root, ir.module(module).rodata] {
            all_regions.extend(ir.region_subtree(root));
        }

        let mut removed = 0;
        for region in all_regions {
            if !self.reachable_regions.contains(&region) {
                ir.detach_region(region);
                removed += 1;
            }
        }
        removed
    }

    fn remove_dead_nodes(&mut self, ir: &mut Context) -> u64 {
        let mut removed = 0;
        let mut regions: Vec<RegionId> = self.reachable_regions.iter().copied().collect();
        regions.sort_unstable();
        for region in regions {
            let nodes = ir.region(region).nodes.clone();
            for node in nodes {
                if !self.live_nodes.contains(&node) {
                    ir.erase_node(node);
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// Target region of a branch whose condition is a literal, or `None` when
/// the condition is not statically known.
fn constant_branch_taken(ir: &Context, branch: NodeId) -> Option<RegionId> {
    let n = ir.node(branch);
    if n.inputs.len() < 3 {
        return None;
    }
    let cond = n.inputs[0];
    if ir.node(cond).op != NodeOp::Lit {
        return None;
    }
    let taken = ir
        .node(cond)
        .data
        .as_bool()
        .or_else(|| ir.node(cond).data.as_i64().map(|v| v != 0))?;

    let entry = if taken { n.inputs[1] } else { n.inputs[2] };
    if ir.node(entry).op == NodeOp::Entry {
        ir.node(entry).parent_region
    } else {
        None
    }
}

/// The critical set: structural, control-flow and side-effecting ops plus
/// anything marked NO_OPTIMIZE.
fn is_critical_node(ir: &Context, node: NodeId) -> bool {
    let n = ir.node(node);
    match n.op {
        NodeOp::Entry
        | NodeOp::Exit
        | NodeOp::Function
        | NodeOp::Ret
        | NodeOp::Jump
        | NodeOp::Branch
        | NodeOp::Invoke
        | NodeOp::Store
        | NodeOp::PtrStore
        | NodeOp::AtomicStore
        | NodeOp::Free
        | NodeOp::Call => true,
        _ => n.props.contains(NodeProps::NO_OPTIMIZE),
    }
}
