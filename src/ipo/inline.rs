//! # Inlining
//!
//! Per call site: small callees with constant arguments are specialized
//! first (and the call redirected); otherwise the callee body is cloned,
//! its parameters substituted by the call arguments, the clone's nodes
//! spliced into the caller immediately before the call, and every use of
//! the call's value replaced by the clone's return value. Recursion, both
//! direct and through a call-graph cycle, is rejected.

use crate::foundation::{Context, ModuleId, NodeId, NodeOp};
use crate::ipo::callgraph::{build_call_graph, CallGraphResult, CALL_GRAPH};
use crate::ipo::context::IpoPassContext;
use crate::ipo::pass::IpoPass;
use crate::ipo::specializer::{
    estimate_function_size, find_function_module, param_index, FunctionSpecializer, LatticeValue,
    SpecializationRequest,
};
use crate::pass::{PassId, PassResult};
use rustc_hash::FxHashMap;

/// Tag of the IPO inlining pass.
pub const IPO_INLINING: PassId = PassId("ipo-inlining");

/// A function call that could be inlined or specialized.
#[derive(Debug, Clone)]
struct InlineCandidate {
    call_site: NodeId,
    callee: NodeId,
    caller_module: ModuleId,
    callee_module: ModuleId,
    function_size: usize,
    benefit_score: usize,
    has_constant_args: bool,
}

/// IPO pass performing function inlining and constant-argument
/// specialization.
pub struct IpoInliningPass {
    max_inline_size: usize,
    min_benefit_threshold: usize,
    enable_specialization: bool,
    specializer: FunctionSpecializer,
}

impl Default for IpoInliningPass {
    fn default() -> Self {
        IpoInliningPass {
            // keep it small for real inlining
            max_inline_size: 15,
            min_benefit_threshold: 3,
            enable_specialization: true,
            specializer: FunctionSpecializer::new(),
        }
    }
}

impl IpoInliningPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_inline_size(&mut self, size: usize) {
        self.max_inline_size = size;
    }

    pub fn set_enable_specialization(&mut self, enabled: bool) {
        self.enable_specialization = enabled;
    }
}

impl IpoPass for IpoInliningPass {
    fn id(&self) -> PassId {
        IPO_INLINING
    }

    fn name(&self) -> &'static str {
        "ipo-inlining"
    }

    fn description(&self) -> &'static str {
        "inlines small functions and specializes functions with constant arguments"
    }

    fn required(&self) -> Vec<PassId> {
        vec![CALL_GRAPH]
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut IpoPassContext) -> PassResult<bool> {
        let modules: Vec<ModuleId> = ctx.modules().to_vec();

        let local;
        let graph_result = match ctx.get_result::<CallGraphResult>(CALL_GRAPH) {
            Some(result) => result,
            None => {
                local = build_call_graph(ir, &modules);
                &local
            }
        };
        let graph = graph_result.graph();

        // collect and filter candidates while the graph is borrowed
        let mut accepted = Vec::new();
        for cg_node in graph.nodes() {
            let caller = cg_node.function;
            for &call_site in &cg_node.call_sites {
                let Some(candidate) = make_candidate(ir, call_site, caller, &modules) else {
                    continue;
                };
                if candidate.function_size > self.max_inline_size {
                    continue;
                }
                if candidate.benefit_score < self.min_benefit_threshold {
                    continue;
                }
                // reject direct recursion and cycles containing the caller
                if candidate.callee == caller || graph.reaches(candidate.callee, caller) {
                    continue;
                }
                accepted.push(candidate);
            }
        }

        let mut inlined = 0u64;
        let mut specialized = 0u64;
        for candidate in accepted {
            if candidate.has_constant_args
                && self.enable_specialization
                && self.try_specialize(ir, &candidate, &modules)
            {
                specialized += 1;
            } else if try_inline(ir, &candidate) {
                inlined += 1;
            }
        }

        ctx.update_stat("ipo_inline.inlined_calls", inlined);
        ctx.update_stat("ipo_inline.specialized_calls", specialized);
        Ok(true)
    }
}

impl IpoInliningPass {
    fn try_specialize(
        &mut self,
        ir: &mut Context,
        candidate: &InlineCandidate,
        modules: &[ModuleId],
    ) -> bool {
        let mut request = SpecializationRequest {
            original: candidate.callee,
            specialized_params: constant_arguments(ir, candidate.call_site),
            call_sites: vec![candidate.call_site],
            benefit_score: 0.0,
        };
        if request.specialized_params.is_empty() {
            return false;
        }
        request.benefit_score =
            FunctionSpecializer::calculate_benefit_score(ir, &request, modules);

        if !self.specializer.should_specialize(ir, &request, modules) {
            return false;
        }
        let Some(clone) =
            self.specializer
                .specialize_function(ir, &request, candidate.callee_module, modules)
        else {
            return false;
        };

        let sites = request.call_sites.clone();
        FunctionSpecializer::redirect_call_sites(ir, &request, &sites, clone) > 0
    }
}

fn make_candidate(
    ir: &Context,
    call_site: NodeId,
    caller: NodeId,
    modules: &[ModuleId],
) -> Option<InlineCandidate> {
    // only plain calls with a direct function target are inlinable
    if ir.node(call_site).op != NodeOp::Call {
        return None;
    }
    if ir.node(call_site).parent_region.is_none() {
        return None;
    }
    let &callee = ir.node(call_site).inputs.first()?;
    if ir.node(callee).op != NodeOp::Function {
        return None;
    }

    let (caller_module, _) = find_function_module(ir, caller, modules)?;
    let (callee_module, _) = find_function_module(ir, callee, modules)?;
    let function_size = estimate_function_size(ir, callee, modules);
    let has_constant_args = ir.node(call_site).inputs[1..]
        .iter()
        .any(|&arg| ir.node(arg).op == NodeOp::Lit);

    Some(InlineCandidate {
        call_site,
        callee,
        caller_module,
        callee_module,
        function_size,
        benefit_score: calculate_benefit(ir, call_site, function_size, has_constant_args),
        has_constant_args,
    })
}

/// Small callees and constant-fed calls are worth more; size eats into the
/// score.
fn calculate_benefit(
    ir: &Context,
    call_site: NodeId,
    function_size: usize,
    has_constant_args: bool,
) -> usize {
    let mut score = 10usize.saturating_sub(function_size / 2);
    if has_constant_args {
        score += 2;
    }
    score += ir.node(call_site).users.len().min(3);
    score
}

/// Constant (index, value) pairs from a call's argument list.
fn constant_arguments(ir: &Context, call_site: NodeId) -> Vec<(usize, LatticeValue)> {
    ir.node(call_site).inputs[1..]
        .iter()
        .enumerate()
        .filter(|(_, &arg)| ir.node(arg).op == NodeOp::Lit)
        .map(|(i, &arg)| (i, LatticeValue::Constant(ir.node(arg).data.clone())))
        .collect()
}

/// Inline the callee's body at the call site. The callee must be a
/// single-region function ending in one `ret`; anything else is not a
/// profitable inline at these sizes.
fn try_inline(ir: &mut Context, candidate: &InlineCandidate) -> bool {
    let Some(callee_body) = ir.function_body(candidate.callee_module, candidate.callee) else {
        return false;
    };
    if !ir.region(callee_body).children.is_empty() {
        return false;
    }

    let body_nodes = ir.region(callee_body).nodes.clone();
    let mut ret_node = None;
    for &node in &body_nodes {
        let op = ir.node(node).op;
        if op == NodeOp::Ret {
            if ret_node.is_some() {
                return false;
            }
            ret_node = Some(node);
        } else if op.is_terminator() {
            return false;
        }
    }
    let Some(ret) = ret_node else {
        return false;
    };

    let Some(call_region) = ir.node(candidate.call_site).parent_region else {
        return false;
    };
    if ir.region(call_region).module != candidate.caller_module {
        return false;
    }

    // clone the body: fresh nodes, then re-link through the mapping
    let mut mapping: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    for &node in &body_nodes {
        let (op, ty, data, str_id, props) = {
            let n = ir.node(node);
            (n.op, n.ty, n.data.clone(), n.str_id, n.props)
        };
        let fresh = ir.create_node(op, ty);
        let f = ir.node_mut(fresh);
        f.data = data;
        f.str_id = str_id;
        f.props = props;
        mapping.insert(node, fresh);
    }
    for &node in &body_nodes {
        let fresh = mapping[&node];
        for input in ir.node(node).inputs.clone() {
            let resolved = mapping.get(&input).copied().unwrap_or(input);
            ir.add_input(fresh, resolved);
        }
    }

    // substitute parameters with the call-site arguments
    let args: Vec<NodeId> = ir.node(candidate.call_site).inputs[1..].to_vec();
    for &node in &body_nodes {
        if ir.node(node).op != NodeOp::Param {
            continue;
        }
        let Some(index) = param_index(ir, node) else {
            continue;
        };
        let Some(&arg) = args.get(index) else {
            continue;
        };
        let clone = mapping[&node];
        ir.replace_all_uses(clone, arg);
        ir.unlink_inputs(clone);
    }

    // the inlined result is the clone of the ret's operand
    let result = ir
        .node(ret)
        .inputs
        .first()
        .map(|&v| mapping.get(&v).copied().unwrap_or(v));

    // splice the surviving clones in, immediately before the call site
    for &node in &body_nodes {
        let clone = mapping[&node];
        match ir.node(node).op {
            NodeOp::Entry | NodeOp::Param | NodeOp::Ret => {
                ir.unlink_inputs(clone);
            }
            _ => {
                ir.insert_node_before(call_region, candidate.call_site, clone);
            }
        }
    }

    // the call's value becomes the inlined result
    if let Some(result) = result {
        ir.replace_all_uses(candidate.call_site, result);
    }
    ir.erase_node(candidate.call_site);
    true
}
