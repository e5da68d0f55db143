//! Shared helpers for the integration suite: IR well-formedness checks and
//! structural snapshots for idempotence assertions.
#![allow(dead_code)]

use midlayer::foundation::{Context, ModuleId, NodeOp, NodeProps};
use std::collections::HashSet;

/// Assert the universal IR invariants for a module: def-use consistency,
/// region ownership, rodata immutability, an acyclic region tree, and
/// entry-targeting terminators.
pub fn assert_well_formed(ctx: &Context, module: ModuleId) {
    let mut seen_regions = HashSet::new();

    for &region in &ctx.module(module).regions {
        assert!(
            seen_regions.insert(region),
            "region {region:?} appears twice in the module region list"
        );

        // region tree has no cycles
        let mut ancestor = ctx.region(region).parent;
        let mut hops = 0;
        while let Some(a) = ancestor {
            assert_ne!(a, region, "region tree contains a cycle at {region:?}");
            ancestor = ctx.region(a).parent;
            hops += 1;
            assert!(hops < 10_000, "runaway parent chain at {region:?}");
        }

        for &node in &ctx.region(region).nodes {
            assert_eq!(
                ctx.node(node).parent_region,
                Some(region),
                "node {node} is in region {region:?} but does not point back at it"
            );

            // def-use consistency, both directions
            for &input in &ctx.node(node).inputs {
                assert!(
                    ctx.node(input).users.contains(&node),
                    "def-use broken: {node} reads {input} but is not in its users"
                );
            }
            for &user in &ctx.node(node).users {
                assert!(
                    ctx.node(user).inputs.contains(&node),
                    "def-use broken: {user} is a user of {node} but does not read it"
                );
            }

            // every terminator target is an entry node
            if ctx.node(node).op.is_terminator() && ctx.node(node).op != NodeOp::Ret {
                for target in ctx.terminator_targets(node) {
                    let entry = ctx.region(target).first_node().expect("empty target region");
                    assert_eq!(ctx.node(entry).op, NodeOp::Entry);
                }
            }
        }
    }

    // rodata holds only READONLY literals
    let rodata = ctx.module(module).rodata;
    for &node in &ctx.region(rodata).nodes {
        assert_eq!(ctx.node(node).op, NodeOp::Lit);
        assert!(ctx.node(node).props.contains(NodeProps::READONLY));
    }
}

/// Structural snapshot of a module: per region, the node ops and operand
/// ids in order. Two identical snapshots mean the IR did not change.
pub fn snapshot(ctx: &Context, module: ModuleId) -> Vec<String> {
    let mut lines = Vec::new();
    for region in ctx.region_subtree(ctx.module(module).root) {
        let mut line = format!("{}:", ctx.region_name(region));
        for &node in &ctx.region(region).nodes {
            line.push_str(&format!(
                " {}({:?})",
                ctx.node(node).op.mnemonic(),
                ctx.node(node).inputs
            ));
        }
        lines.push(line);
    }
    lines
}

/// Count the nodes with a given op across a module's root subtree.
pub fn count_op(ctx: &Context, module: ModuleId, op: NodeOp) -> usize {
    ctx.region_subtree(ctx.module(module).root)
        .iter()
        .flat_map(|&r| ctx.region(r).nodes.iter())
        .filter(|&&n| ctx.node(n).op == op)
        .count()
}
