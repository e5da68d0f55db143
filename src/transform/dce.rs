//! # Dead Code Elimination
//!
//! Mark-sweep over def-use chains. Roots are structural nodes, control
//! flow, side effects, calls (conservatively), NO_OPTIMIZE nodes and
//! everything in a global scope; liveness closes backwards over inputs and
//! every unmarked node is unlinked and removed.

use crate::foundation::{Context, NodeId, NodeOp, RegionId};
use crate::pass::{Pass, PassContext, PassId, PassResult, TransformPass};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Tag of the DCE pass.
pub const DCE: PassId = PassId("dead-code-elimination");

/// Dead code elimination pass.
#[derive(Debug, Default)]
pub struct DcePass {
    alive: FxHashSet<NodeId>,
    dead: Vec<NodeId>,
}

impl Pass for DcePass {
    fn id(&self) -> PassId {
        DCE
    }

    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn description(&self) -> &'static str {
        "eliminates code that has no observable effects"
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        self.alive.clear();
        self.dead.clear();

        let module = ctx.module();
        let root = ir.module(module).root;
        let rodata = ir.module(module).rodata;

        self.find_live_nodes(ir, root);
        self.find_live_nodes(ir, rodata);
        self.find_dead_nodes(ir, root);

        let removed = self.remove_dead_nodes(ir);
        ctx.update_stat("dce.removed_nodes", removed);
        Ok(true)
    }
}

impl TransformPass for DcePass {}

impl DcePass {
    fn find_live_nodes(&mut self, ir: &Context, region: RegionId) {
        let mut worklist = VecDeque::new();
        for &region in &ir.region_subtree(region) {
            for &node in &ir.region(region).nodes {
                if is_root_node(ir, node) && self.alive.insert(node) {
                    worklist.push_back(node);
                }
            }
        }

        while let Some(current) = worklist.pop_front() {
            for &input in &ir.node(current).inputs {
                if self.alive.insert(input) {
                    worklist.push_back(input);
                }
            }
        }
    }

    fn find_dead_nodes(&mut self, ir: &Context, root: RegionId) {
        for &region in &ir.region_subtree(root) {
            for &node in &ir.region(region).nodes {
                if !self.alive.contains(&node) {
                    self.dead.push(node);
                }
            }
        }
    }

    fn remove_dead_nodes(&mut self, ir: &mut Context) -> u64 {
        let mut removed = 0;
        for &node in &self.dead {
            ir.erase_node(node);
            removed += 1;
        }
        removed
    }
}

fn is_root_node(ir: &Context, node: NodeId) -> bool {
    let n = ir.node(node);

    if n.parent_region.is_some_and(|r| ir.region(r).is_global_scope()) {
        return true;
    }

    match n.op {
        // structural nodes are preserved
        NodeOp::Entry | NodeOp::Function | NodeOp::Ret | NodeOp::Exit | NodeOp::Param => true,
        // control flow must be preserved
        NodeOp::Branch | NodeOp::Jump | NodeOp::Invoke => true,
        // side effects
        NodeOp::Store | NodeOp::PtrStore | NodeOp::AtomicStore | NodeOp::Free => true,
        // conservatively assume all calls have side effects; precise call
        // liveness belongs to IPO
        NodeOp::Call => true,
        _ => n.props.contains(crate::foundation::NodeProps::NO_OPTIMIZE),
    }
}
