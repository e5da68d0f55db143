//! Interprocedural scenarios: call-graph construction, dead-function
//! elimination across modules, per-module GVN, specialization (including
//! the clone cache), and inlining.

mod common;

use common::{assert_well_formed, count_op};
use midlayer::builder::Builder;
use midlayer::foundation::{Context, ModuleId, NodeId, NodeOp, NodeProps, Type, TypedData};
use midlayer::ipo::callgraph::{build_call_graph, ModuleCallSummary, CALL_GRAPH};
use midlayer::ipo::specializer::{FunctionSpecializer, LatticeValue, SpecializationRequest};
use midlayer::ipo::{CallGraphAnalysisPass, CallGraphResult, IpoDcePass, IpoGvnPass, IpoInliningPass, IpoPassManager};

/// main (DRIVER) calls used; a dead function exists in both modules.
fn build_dce_scenario(ctx: &mut Context) -> (ModuleId, ModuleId) {
    let m1 = ctx.create_module("m1").unwrap();
    let m2 = ctx.create_module("m2").unwrap();

    let mut b = Builder::new(ctx, m1);
    let used = b.create_function("used", Type::VOID, &[], NodeProps::empty());
    b.ret(None);
    let _main = b.create_function("main", Type::I32, &[], NodeProps::DRIVER);
    b.call(Type::VOID, used.function, &[]);
    let zero = b.lit_i32(0);
    b.ret(Some(zero));
    let _dead1 = b.create_function("dead", Type::VOID, &[], NodeProps::empty());
    b.ret(None);

    let mut b = Builder::new(ctx, m2);
    let _dead2 = b.create_function("dead", Type::VOID, &[], NodeProps::empty());
    b.ret(None);

    (m1, m2)
}

#[test]
fn test_call_graph_edges_and_queries() {
    let mut ctx = Context::new();
    let (m1, m2) = build_dce_scenario(&mut ctx);

    let result = build_call_graph(&ctx, &[m1, m2]);
    let graph = result.graph();

    let main = ctx.find_function(m1, "main").unwrap();
    let used = ctx.find_function(m1, "used").unwrap();
    let dead = ctx.find_function(m1, "dead").unwrap();

    assert!(graph.calls(main, used));
    assert_eq!(graph.callees(main), vec![used]);
    assert_eq!(graph.callers(used), vec![main]);
    assert!(!graph.has_cycles());
    assert!(graph.entry_points().contains(&main));
    assert!(graph.leaf_functions().contains(&used));
    assert!(graph.leaf_functions().contains(&dead));
    assert!(graph.reaches(main, used));
    assert!(!graph.reaches(used, main));

    // post-order puts callees before callers
    let order = graph.post_order();
    let main_pos = order.iter().position(|&f| f == main).unwrap();
    let used_pos = order.iter().position(|&f| f == used).unwrap();
    assert!(used_pos < main_pos);
}

#[test]
fn test_ipo_dce_prunes_dead_functions_in_every_module() {
    let mut ctx = Context::new();
    let (m1, m2) = build_dce_scenario(&mut ctx);

    let mut pm = IpoPassManager::new(vec![m1, m2], 2, false, 0);
    pm.register(Box::new(CallGraphAnalysisPass)).unwrap();
    pm.register(Box::new(IpoDcePass)).unwrap();
    assert!(pm.run_all(&mut ctx).unwrap());

    assert_eq!(pm.context().get_stat("ipo_dce.removed_functions"), 2);
    assert!(ctx.find_function(m1, "main").is_some());
    assert!(ctx.find_function(m1, "used").is_some());
    assert!(ctx.find_function(m1, "dead").is_none());
    assert!(ctx.find_function(m2, "dead").is_none());

    // the dead bodies are detached from the region tree
    assert_well_formed(&ctx, m1);
    assert_well_formed(&ctx, m2);

    // idempotent
    assert!(pm.run_all(&mut ctx).unwrap());
    assert_eq!(pm.context().get_stat("ipo_dce.removed_functions"), 2);
}

#[test]
fn test_ipo_dce_survivors_match_reachability() {
    let mut ctx = Context::new();
    let (m1, m2) = build_dce_scenario(&mut ctx);

    let mut pm = IpoPassManager::new(vec![m1, m2], 2, false, 0);
    pm.register(Box::new(CallGraphAnalysisPass)).unwrap();
    pm.register(Box::new(IpoDcePass)).unwrap();
    assert!(pm.run_all(&mut ctx).unwrap());

    // no surviving function can reach a dropped one
    let result = build_call_graph(&ctx, &[m1, m2]);
    for node in result.graph().nodes() {
        for callee in result.graph().callees(node.function) {
            let in_m1 = ctx.module(m1).functions.contains(&callee);
            let in_m2 = ctx.module(m2).functions.contains(&callee);
            assert!(in_m1 || in_m2, "survivor calls a removed function");
        }
    }
}

#[test]
fn test_ipo_gvn_accumulates_across_modules() {
    let mut ctx = Context::new();
    let m1 = ctx.create_module("gvn1").unwrap();
    let m2 = ctx.create_module("gvn2").unwrap();

    for &m in &[m1, m2] {
        let mut b = Builder::new(&mut ctx, m);
        let _f = b.create_function("f", Type::I32, &[], NodeProps::empty());
        let a = b.lit_i32(3);
        let c = b.lit_i32(4);
        let x = b.add(Type::I32, a, c);
        let y = b.add(Type::I32, a, c);
        let z = b.mul(Type::I32, x, y);
        b.ret(Some(z));
    }

    let mut pm = IpoPassManager::new(vec![m1, m2], 2, false, 0);
    pm.register(Box::new(IpoGvnPass)).unwrap();
    assert!(pm.run_all(&mut ctx).unwrap());

    assert_eq!(pm.context().get_stat("ipo_gvn.total_eliminated"), 2);
    assert_eq!(count_op(&ctx, m1, NodeOp::Add), 1);
    assert_eq!(count_op(&ctx, m2, NodeOp::Add), 1);
    assert_well_formed(&ctx, m1);
    assert_well_formed(&ctx, m2);
}

/// callee(a, b) { ret a + b } plus one call site with a literal second arg.
fn build_specialization_scenario(ctx: &mut Context) -> (ModuleId, NodeId, NodeId) {
    let m = ctx.create_module("spec").unwrap();
    let mut b = Builder::new(ctx, m);
    let callee = b.create_function(
        "add_k",
        Type::I32,
        &[("a", Type::I32), ("k", Type::I32)],
        NodeProps::empty(),
    );
    let sum = b.add(Type::I32, callee.params[0], callee.params[1]);
    b.ret(Some(sum));

    let caller = b.create_function("caller", Type::I32, &[("x", Type::I32)], NodeProps::DRIVER);
    let five = b.lit_i32(5);
    let call = b.call(Type::I32, callee.function, &[caller.params[0], five]);
    b.ret(Some(call));

    (m, callee.function, call)
}

#[test]
fn test_specialization_cache_returns_the_same_clone() {
    let mut ctx = Context::new();
    let (m, callee, call) = build_specialization_scenario(&mut ctx);

    let request = SpecializationRequest {
        original: callee,
        specialized_params: vec![(1, LatticeValue::Constant(TypedData::I32(5)))],
        call_sites: vec![call],
        benefit_score: 4.0,
    };

    let mut spec = FunctionSpecializer::new();
    assert!(spec.should_specialize(&ctx, &request, &[m]));

    let clone_a = spec.specialize_function(&mut ctx, &request, m, &[m]).unwrap();
    let clone_b = spec.specialize_function(&mut ctx, &request, m, &[m]).unwrap();
    assert_eq!(clone_a, clone_b, "identical requests reuse the cached clone");

    let clone_name = ctx.str(ctx.node(clone_a).str_id).to_string();
    assert!(clone_name.starts_with("add_k.__spec_"));
    assert!(ctx.module(m).functions.contains(&clone_a));

    // the clone's body has a literal where the parameter was
    let body = ctx.function_body(m, clone_a).unwrap();
    let params: Vec<_> = ctx
        .region(body)
        .nodes
        .iter()
        .filter(|&&n| ctx.node(n).op == NodeOp::Param)
        .collect();
    assert_eq!(params.len(), 1, "the specialized parameter is gone");
}

#[test]
fn test_redirected_call_sites_drop_constant_arguments() {
    let mut ctx = Context::new();
    let (m, callee, call) = build_specialization_scenario(&mut ctx);

    let request = SpecializationRequest {
        original: callee,
        specialized_params: vec![(1, LatticeValue::Constant(TypedData::I32(5)))],
        call_sites: vec![call],
        benefit_score: 4.0,
    };

    let mut spec = FunctionSpecializer::new();
    let clone = spec.specialize_function(&mut ctx, &request, m, &[m]).unwrap();
    let redirected =
        FunctionSpecializer::redirect_call_sites(&mut ctx, &request, &[call], clone);
    assert_eq!(redirected, 1);

    // [clone, x]: the function operand swapped, the constant slot dropped
    assert_eq!(ctx.node(call).inputs.len(), 2);
    assert_eq!(ctx.node(call).inputs[0], clone);
    assert!(ctx.node(clone).users.contains(&call));
    assert_well_formed(&ctx, m);
}

#[test]
fn test_inlining_splices_small_callee() {
    let mut ctx = Context::new();
    let m = ctx.create_module("inline").unwrap();
    let mut b = Builder::new(&mut ctx, m);
    let tiny = b.create_function("tiny", Type::I32, &[("v", Type::I32)], NodeProps::empty());
    let one = b.lit_i32(1);
    let bump = b.add(Type::I32, tiny.params[0], one);
    b.ret(Some(bump));

    let caller = b.create_function("caller", Type::I32, &[("x", Type::I32)], NodeProps::DRIVER);
    let call = b.call(Type::I32, tiny.function, &[caller.params[0]]);
    b.ret(Some(call));

    let mut pm = IpoPassManager::new(vec![m], 2, false, 0);
    pm.register(Box::new(CallGraphAnalysisPass)).unwrap();
    pm.register(Box::new(IpoInliningPass::default())).unwrap();
    assert!(pm.run_all(&mut ctx).unwrap());

    assert_eq!(pm.context().get_stat("ipo_inline.inlined_calls"), 1);
    assert_eq!(count_op(&ctx, m, NodeOp::Call), 0, "the call site is gone");

    // the caller's return now reads an inlined add of its own parameter
    let caller_body = ctx.function_body(m, caller.function).unwrap();
    let ret = ctx
        .region(caller_body)
        .nodes
        .iter()
        .copied()
        .find(|&n| ctx.node(n).op == NodeOp::Ret)
        .unwrap();
    let result = ctx.node(ret).inputs[0];
    assert_eq!(ctx.node(result).op, NodeOp::Add);
    assert!(ctx.node(result).inputs.contains(&caller.params[0]));
    assert_well_formed(&ctx, m);
}

#[test]
fn test_constant_call_prefers_specialization() {
    let mut ctx = Context::new();
    let (m, _callee, call) = build_specialization_scenario(&mut ctx);

    let mut pm = IpoPassManager::new(vec![m], 2, false, 0);
    pm.register(Box::new(CallGraphAnalysisPass)).unwrap();
    pm.register(Box::new(IpoInliningPass::default())).unwrap();
    assert!(pm.run_all(&mut ctx).unwrap());

    assert_eq!(pm.context().get_stat("ipo_inline.specialized_calls"), 1);
    assert_eq!(pm.context().get_stat("ipo_inline.inlined_calls"), 0);

    // the call survives but targets the specialized clone with one fewer arg
    let target = ctx.node(call).inputs[0];
    let target_name = ctx.str(ctx.node(target).str_id).to_string();
    assert!(target_name.starts_with("add_k.__spec_"));
    assert_eq!(ctx.node(call).inputs.len(), 2);
    assert_well_formed(&ctx, m);
}

#[test]
fn test_recursive_calls_are_never_inlined() {
    let mut ctx = Context::new();
    let m = ctx.create_module("recursion").unwrap();
    let mut b = Builder::new(&mut ctx, m);
    let f = b.create_function("loopy", Type::I32, &[("v", Type::I32)], NodeProps::DRIVER);
    let call = b.call(Type::I32, f.function, &[f.params[0]]);
    b.ret(Some(call));

    let mut pm = IpoPassManager::new(vec![m], 2, false, 0);
    pm.register(Box::new(CallGraphAnalysisPass)).unwrap();
    pm.register(Box::new(IpoInliningPass::default())).unwrap();
    assert!(pm.run_all(&mut ctx).unwrap());

    assert_eq!(pm.context().get_stat("ipo_inline.inlined_calls"), 0);
    assert_eq!(pm.context().get_stat("ipo_inline.specialized_calls"), 0);
    assert_eq!(count_op(&ctx, m, NodeOp::Call), 1, "the recursive call survives");
}

#[test]
fn test_call_graph_result_registers_module_dependencies() {
    let mut ctx = Context::new();
    let (m1, m2) = build_dce_scenario(&mut ctx);

    let mut pm = IpoPassManager::new(vec![m1, m2], 2, false, 0);
    pm.register(Box::new(CallGraphAnalysisPass)).unwrap();
    assert!(pm.run_all(&mut ctx).unwrap());

    let result = pm
        .context()
        .get_result::<CallGraphResult>(CALL_GRAPH)
        .expect("call graph cached under its tag");
    assert!(pm.context().get_stat("callgraph.functions_analyzed") >= 4);
    assert!(pm.context().get_stat("callgraph.total_edges") >= 1);
    let _ = result;

    // per-module summaries live under string keys with wildcard semantics
    assert!(pm.context().has_keyed_result("call_graph.m1"));
    assert!(pm.context().has_keyed_result("call_graph.m2"));
    let summary = pm
        .context()
        .get_keyed_result::<ModuleCallSummary>("call_graph.m1")
        .unwrap();
    assert_eq!(summary.functions.len(), 3);
    assert_eq!(summary.outgoing_edges, 1);

    pm.context_mut().invalidate_matching("call_graph.*");
    assert!(!pm.context().has_keyed_result("call_graph.m1"));
    assert!(!pm.context().has_keyed_result("call_graph.m2"));
}
