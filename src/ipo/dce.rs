//! # IPO Dead Function Elimination
//!
//! Marks every DRIVER or EXPORT function live, propagates liveness over
//! call-graph callees, and removes every unreached function from its
//! module's function list, detaching its body region from the region tree.

use crate::foundation::{Context, ModuleId, NodeId, NodeOp, NodeProps};
use crate::ipo::callgraph::{build_call_graph, CallGraph, CallGraphResult, CALL_GRAPH};
use crate::ipo::context::IpoPassContext;
use crate::ipo::pass::IpoPass;
use crate::pass::{PassId, PassResult};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Tag of the IPO dead function elimination pass.
pub const IPO_DCE: PassId = PassId("ipo-dead-code-elimination");

/// IPO pass removing functions unreachable from any entry point.
#[derive(Debug, Default)]
pub struct IpoDcePass;

impl IpoPass for IpoDcePass {
    fn id(&self) -> PassId {
        IPO_DCE
    }

    fn name(&self) -> &'static str {
        "ipo-dead-code-elimination"
    }

    fn description(&self) -> &'static str {
        "removes functions that are unreachable from any entry point"
    }

    fn required(&self) -> Vec<PassId> {
        vec![CALL_GRAPH]
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut IpoPassContext) -> PassResult<bool> {
        let modules: Vec<ModuleId> = ctx.modules().to_vec();

        // recompute the graph if no fresh result is cached
        let local;
        let graph: &CallGraph = match ctx.get_result::<CallGraphResult>(CALL_GRAPH) {
            Some(result) => result.graph(),
            None => {
                local = build_call_graph(ir, &modules);
                local.graph()
            }
        };

        let mut reachable = FxHashSet::default();
        mark_entry_points(ir, &modules, &mut reachable);
        propagate_reachability(graph, &mut reachable);

        let mut removed = 0u64;
        for &module in &modules {
            removed += remove_unreachable_functions(ir, module, &reachable);
        }

        ctx.update_stat("ipo_dce.removed_functions", removed);
        Ok(true)
    }
}

fn mark_entry_points(ir: &Context, modules: &[ModuleId], reachable: &mut FxHashSet<NodeId>) {
    for &module in modules {
        for &func in &ir.module(module).functions {
            if ir.node(func).op == NodeOp::Function && is_entry_point(ir, func) {
                reachable.insert(func);
            }
        }
    }
}

fn is_entry_point(ir: &Context, func: NodeId) -> bool {
    let props = ir.node(func).props;
    props.contains(NodeProps::DRIVER) || props.contains(NodeProps::EXPORT)
}

fn propagate_reachability(graph: &CallGraph, reachable: &mut FxHashSet<NodeId>) {
    let mut worklist: VecDeque<NodeId> = reachable.iter().copied().collect();
    while let Some(current) = worklist.pop_front() {
        for callee in graph.callees(current) {
            if reachable.insert(callee) {
                worklist.push_back(callee);
            }
        }
    }
}

fn remove_unreachable_functions(
    ir: &mut Context,
    module: ModuleId,
    reachable: &FxHashSet<NodeId>,
) -> u64 {
    let doomed: Vec<NodeId> = ir
        .module(module)
        .functions
        .iter()
        .copied()
        .filter(|&f| ir.node(f).op == NodeOp::Function && !reachable.contains(&f))
        .collect();

    for &func in &doomed {
        if let Some(body) = ir.function_body(module, func) {
            ir.detach_region(body);
        }
        ir.module_mut(module).functions.retain(|&f| f != func);
        ir.unlink_inputs(func);
        ir.node_mut(func).users.clear();
        ir.remove_node_from_region(func);
    }

    doomed.len() as u64
}
