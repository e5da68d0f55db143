//! # Reassociation
//!
//! Flattens trees of the same associative-commutative op (add, mul, band,
//! bor, bxor), partitions operands into constants and non-constants, builds
//! a balanced binary tree per partition and combines them. Constants end up
//! adjacent, which exposes them to constant folding in a later phase. Only
//! rewrites when at least two constants appear or the flattened arity
//! exceeds two.

use crate::foundation::{Context, NodeId, NodeOp, RegionId, Type};
use crate::pass::{Pass, PassContext, PassId, PassResult, TransformPass};

/// Tag of the reassociation pass.
pub const REASSOCIATE: PassId = PassId("reassociate");

/// Reassociation pass.
#[derive(Debug, Default)]
pub struct ReassociatePass;

impl Pass for ReassociatePass {
    fn id(&self) -> PassId {
        REASSOCIATE
    }

    fn name(&self) -> &'static str {
        "reassociate"
    }

    fn description(&self) -> &'static str {
        "reorders associative expressions to expose folding opportunities"
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        let module = ctx.module();
        let root = ir.module(module).root;
        let count = process_region(ir, root);
        if count > 0 {
            ctx.update_stat("reassociate.count", count);
        }
        Ok(true)
    }
}

impl TransformPass for ReassociatePass {}

fn process_region(ir: &mut Context, region: RegionId) -> u64 {
    let mut count = 0;
    let nodes = ir.region(region).nodes.clone();
    for node in nodes {
        if ir.node(node).parent_region == Some(region) && reassociate(ir, region, node) {
            count += 1;
        }
    }

    let children = ir.region(region).children.clone();
    for child in children {
        count += process_region(ir, child);
    }
    count
}

fn reassociate(ir: &mut Context, region: RegionId, node: NodeId) -> bool {
    let op = ir.node(node).op;
    if !op.is_reassociable() || ir.node(node).is_volatile() {
        return false;
    }

    let mut constants = Vec::new();
    let mut variables = Vec::new();
    extract_operands(ir, node, op, &mut constants, &mut variables);

    // a two-operand tree with fewer than two constants gains nothing
    if constants.len() < 2 && constants.len() + variables.len() <= 2 {
        return false;
    }

    // already partitioned and balanced: rewriting would only churn nodes
    if is_canonical(ir, node, op, &constants, &variables) {
        return false;
    }

    let ty = ir.node(node).ty;
    let const_part = build_balanced_tree(ir, region, op, ty, &constants, node);
    let var_part = build_balanced_tree(ir, region, op, ty, &variables, node);

    let result = match (const_part, var_part) {
        (Some(c), Some(v)) => {
            let combined = ir.create_node(op, ty);
            ir.add_input(combined, c);
            ir.add_input(combined, v);
            ir.insert_node_before(region, node, combined);
            combined
        }
        (Some(c), None) => c,
        (None, Some(v)) => v,
        (None, None) => return false,
    };

    ir.replace_all_uses(node, result);
    if ir.node(node).users.is_empty() {
        ir.erase_node(node);
    }
    true
}

/// Flatten same-op subtrees into one operand list, splitting constants
/// from everything else.
fn extract_operands(
    ir: &Context,
    node: NodeId,
    op: NodeOp,
    constants: &mut Vec<NodeId>,
    variables: &mut Vec<NodeId>,
) {
    if ir.node(node).op == op {
        for &input in &ir.node(node).inputs {
            extract_operands(ir, input, op, constants, variables);
        }
    } else if is_constant(ir, node) {
        constants.push(node);
    } else {
        variables.push(node);
    }
}

/// Pairwise tree build: each level halves the operand count.
fn build_balanced_tree(
    ir: &mut Context,
    region: RegionId,
    op: NodeOp,
    ty: Type,
    operands: &[NodeId],
    insertion_point: NodeId,
) -> Option<NodeId> {
    if operands.is_empty() {
        return None;
    }
    if operands.len() == 1 {
        return Some(operands[0]);
    }

    let mut level = operands.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if let [a, b] = pair {
                let combined = ir.create_node(op, ty);
                ir.add_input(combined, *a);
                ir.add_input(combined, *b);
                ir.insert_node_before(region, insertion_point, combined);
                next.push(combined);
            } else {
                // odd operand passes straight up
                next.push(pair[0]);
            }
        }
        level = next;
    }
    Some(level[0])
}

/// The canonical shape this pass produces: constants gathered in a
/// balanced left subtree, non-constants in a balanced right subtree.
fn is_canonical(
    ir: &Context,
    node: NodeId,
    op: NodeOp,
    constants: &[NodeId],
    variables: &[NodeId],
) -> bool {
    if constants.is_empty() || variables.is_empty() {
        // a single partition is canonical once its tree is balanced
        return is_balanced_subtree(ir, node, op);
    }

    let inputs = &ir.node(node).inputs;
    if inputs.len() != 2 {
        return false;
    }
    let (c, v) = (inputs[0], inputs[1]);
    is_constant(ir, c)
        && !has_constant_leaf(ir, v, op)
        && is_balanced_subtree(ir, c, op)
        && is_balanced_subtree(ir, v, op)
}

/// Whether a flattened same-op subtree has the minimal possible depth.
fn is_balanced_subtree(ir: &Context, node: NodeId, op: NodeOp) -> bool {
    let (depth, leaves) = subtree_shape(ir, node, op);
    depth == ceil_log2(leaves)
}

fn subtree_shape(ir: &Context, node: NodeId, op: NodeOp) -> (u32, u64) {
    if ir.node(node).op != op || ir.node(node).inputs.is_empty() {
        return (0, 1);
    }
    let mut depth = 0;
    let mut leaves = 0;
    for &input in &ir.node(node).inputs {
        let (d, l) = subtree_shape(ir, input, op);
        depth = depth.max(d + 1);
        leaves += l;
    }
    (depth, leaves)
}

fn ceil_log2(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros()
    }
}

fn has_constant_leaf(ir: &Context, node: NodeId, op: NodeOp) -> bool {
    if ir.node(node).op == op && !ir.node(node).inputs.is_empty() {
        ir.node(node)
            .inputs
            .iter()
            .any(|&input| has_constant_leaf(ir, input, op))
    } else {
        is_constant(ir, node)
    }
}

/// A literal, or a reassociable subtree whose leaves are all literals.
fn is_constant(ir: &Context, node: NodeId) -> bool {
    let n = ir.node(node);
    if n.op == NodeOp::Lit {
        return true;
    }
    if n.op.is_reassociable() && !n.inputs.is_empty() {
        return n.inputs.iter().all(|&input| is_constant(ir, input));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4), 2);
        assert_eq!(ceil_log2(5), 3);
        assert_eq!(ceil_log2(8), 3);
    }
}
