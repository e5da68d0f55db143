//! Loop analysis scenarios: back-edge detection, natural-loop bodies, the
//! loop forest, and the dominance property every reported loop must obey.

mod common;

use common::assert_well_formed;
use midlayer::analysis::loops::{LoopAnalysisResult, LOOP_ANALYSIS};
use midlayer::builder::Builder;
use midlayer::foundation::{Context, ModuleId, NodeProps, RegionId, Type};
use midlayer::pass::PassManager;
use midlayer::LoopAnalysisPass;

/// Nested `while i<n { while j<n { ... } }` shape. Returns the regions
/// (function body, outer cond, outer body, inner cond, inner body).
fn build_nested_loops(
    ctx: &mut Context,
    module: ModuleId,
) -> (RegionId, RegionId, RegionId, RegionId, RegionId) {
    let mut b = Builder::new(ctx, module);
    let f = b.create_function("nested", Type::VOID, &[], NodeProps::empty());

    let (outer_cond, outer_body) = b.while_blocks("outer");
    let after = b.create_block("after", None);
    b.jump(outer_cond);

    b.set_insert_region(outer_cond);
    let oc = b.lit_bool(true);
    b.branch(oc, outer_body, after);

    b.set_insert_region(outer_body);
    let (inner_cond, inner_body) = b.while_blocks("inner");
    let inner_after = b.create_block("inner.after", None);
    b.jump(inner_cond);

    b.set_insert_region(inner_cond);
    let ic = b.lit_bool(true);
    b.branch(ic, inner_body, inner_after);

    b.set_insert_region(inner_body);
    b.jump(inner_cond);

    // close the outer loop from its body
    b.set_insert_region(outer_body);
    b.jump(outer_cond);

    b.set_insert_region(after);
    b.ret(None);

    (f.body, outer_cond, outer_body, inner_cond, inner_body)
}

#[test]
fn test_nested_whiles_build_a_two_loop_forest() {
    let mut ctx = Context::new();
    let m = ctx.create_module("loops").unwrap();
    let (_body, outer_cond, _outer_body, inner_cond, _inner_body) =
        build_nested_loops(&mut ctx, m);

    let mut pm = PassManager::new(m, 2, false, 0);
    pm.register(Box::new(LoopAnalysisPass)).unwrap();
    assert!(pm.run_pass(&mut ctx, LOOP_ANALYSIS).unwrap());

    assert_eq!(pm.context().get_stat("loop_analysis.total_loops"), 2);
    assert_eq!(pm.context().get_stat("loop_analysis.max_nesting_depth"), 1);

    let result = pm
        .context()
        .get_result::<LoopAnalysisResult>(LOOP_ANALYSIS)
        .expect("loop analysis stored a result");

    let func = ctx.find_function(m, "nested").unwrap();
    let tree = result.loops_for_function(func).unwrap();
    assert_eq!(tree.loops.len(), 2);

    let outer = tree.loop_for(outer_cond).expect("outer cond is in a loop");
    let inner = tree.loop_for(inner_cond).expect("inner cond is in a loop");
    assert_ne!(outer, inner);
    assert_eq!(tree.get(inner).parent, Some(outer), "inner nests in outer");
    assert_eq!(tree.get(outer).parent, None);
    assert_eq!(tree.get(inner).depth, 1);
    assert_eq!(tree.get(outer).depth, 0);

    assert_well_formed(&ctx, m);
}

#[test]
fn test_loop_headers_dominate_their_bodies_and_latches() {
    let mut ctx = Context::new();
    let m = ctx.create_module("loops_dom").unwrap();
    build_nested_loops(&mut ctx, m);

    let mut pm = PassManager::new(m, 2, false, 0);
    pm.register(Box::new(LoopAnalysisPass)).unwrap();
    assert!(pm.run_pass(&mut ctx, LOOP_ANALYSIS).unwrap());

    let result = pm
        .context()
        .get_result::<LoopAnalysisResult>(LOOP_ANALYSIS)
        .unwrap();
    let func = ctx.find_function(m, "nested").unwrap();
    let tree = result.loops_for_function(func).unwrap();

    for lp in &tree.loops {
        for &region in &lp.body_regions {
            assert!(
                ctx.region_dominates(lp.header, region),
                "header must dominate every body region"
            );
        }
        for &latch in &lp.latches {
            assert!(ctx.region_dominates(lp.header, latch));
            // every latch jumps back to the header
            let targets: Vec<_> = ctx
                .region(latch)
                .nodes
                .iter()
                .flat_map(|&n| ctx.terminator_targets(n))
                .collect();
            assert!(targets.contains(&lp.header));
        }
        assert!(lp.is_natural());
    }
}

#[test]
fn test_straight_line_code_has_no_loops() {
    let mut ctx = Context::new();
    let m = ctx.create_module("noloop").unwrap();
    let mut b = Builder::new(&mut ctx, m);
    let _f = b.create_function("flat", Type::I32, &[], NodeProps::empty());
    let x = b.lit_i32(1);
    b.ret(Some(x));

    let mut pm = PassManager::new(m, 2, false, 0);
    pm.register(Box::new(LoopAnalysisPass)).unwrap();
    assert!(pm.run_pass(&mut ctx, LOOP_ANALYSIS).unwrap());
    assert_eq!(pm.context().get_stat("loop_analysis.total_loops"), 0);
}

#[test]
fn test_pre_and_post_order_visitors() {
    let mut ctx = Context::new();
    let m = ctx.create_module("loops_visit").unwrap();
    build_nested_loops(&mut ctx, m);

    let mut pm = PassManager::new(m, 2, false, 0);
    pm.register(Box::new(LoopAnalysisPass)).unwrap();
    assert!(pm.run_pass(&mut ctx, LOOP_ANALYSIS).unwrap());

    let result = pm
        .context()
        .get_result::<LoopAnalysisResult>(LOOP_ANALYSIS)
        .unwrap();
    let func = ctx.find_function(m, "nested").unwrap();
    let tree = result.loops_for_function(func).unwrap();

    let mut pre_depths = Vec::new();
    tree.visit_pre_order(|_, lp| pre_depths.push(lp.depth));
    assert_eq!(pre_depths, vec![0, 1], "parents before children");

    let mut post_depths = Vec::new();
    tree.visit_post_order(|_, lp| post_depths.push(lp.depth));
    assert_eq!(post_depths, vec![1, 0], "children before parents");
}
