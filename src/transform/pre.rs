//! # Partial Redundancy Elimination
//!
//! Groups expression nodes of a function by a commutativity-normalized
//! structural hash, finds groups whose members compute the same value, and
//! hoists one instance into the deepest common dominator region. Every
//! dominated occurrence is then replaced by the hoisted node. Hoisting is
//! refused when operands are unavailable at the target or the target's
//! dominance could be subverted by unstructured control flow.

use crate::foundation::{Context, NodeId, RegionId};
use crate::pass::{Pass, PassContext, PassId, PassResult, TransformPass};
use rustc_hash::FxHashMap;

/// Tag of the PRE pass.
pub const PRE: PassId = PassId("partial-redundancy-elimination");

type ExprHash = u64;

/// Partial redundancy elimination pass.
#[derive(Debug, Default)]
pub struct PrePass;

impl Pass for PrePass {
    fn id(&self) -> PassId {
        PRE
    }

    fn name(&self) -> &'static str {
        "partial-redundancy-elimination"
    }

    fn description(&self) -> &'static str {
        "hoists partially redundant expressions into a common dominator"
    }

    fn min_opt_level(&self) -> u8 {
        2
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        let module = ctx.module();
        let mut hoisted = 0u64;
        for func in ir.module(module).functions.clone() {
            if let Some(body) = ir.function_body(module, func) {
                hoisted += process_function(ir, body);
            }
        }
        if hoisted > 0 {
            ctx.update_stat("pre.hoisted_expressions", hoisted);
        }
        Ok(true)
    }
}

impl TransformPass for PrePass {}

fn process_function(ir: &mut Context, body: RegionId) -> u64 {
    let mut groups: FxHashMap<ExprHash, Vec<NodeId>> = FxHashMap::default();
    for region in ir.region_subtree(body) {
        for &node in &ir.region(region).nodes {
            if is_eligible(ir, node) {
                groups.entry(expr_hash(ir, node)).or_default().push(node);
            }
        }
    }

    let mut hashes: Vec<ExprHash> = groups.keys().copied().collect();
    hashes.sort_unstable();

    let mut hoisted = 0;
    for hash in hashes {
        let members = &groups[&hash];
        if members.len() >= 2 && try_hoist(ir, members) {
            hoisted += 1;
        }
    }
    hoisted
}

fn try_hoist(ir: &mut Context, members: &[NodeId]) -> bool {
    if !all_equivalent(ir, members) {
        return false;
    }

    let regions: Vec<RegionId> = members
        .iter()
        .filter_map(|&n| ir.node(n).parent_region)
        .collect();
    if regions.len() != members.len() {
        return false;
    }

    // tree-LCA over the region hierarchy
    let mut target = regions[0];
    for &region in &regions[1..] {
        target = match common_dominator(ir, target, region) {
            Some(t) => t,
            None => return false,
        };
    }

    if !is_safe_hoist_target(ir, target) {
        return false;
    }
    for &region in &regions {
        if !ir.region_dominates(target, region) {
            return false;
        }
    }

    let template = members[0];
    if !inputs_available_at(ir, template, target) {
        return false;
    }

    // synthesize the hoisted instance at the end of the dominator, before
    // its terminator if it has one
    let (op, ty, data) = {
        let t = ir.node(template);
        (t.op, t.ty, t.data.clone())
    };
    let hoisted = ir.create_node(op, ty);
    ir.node_mut(hoisted).data = data;
    for input in ir.node(template).inputs.clone() {
        ir.add_input(hoisted, input);
    }
    match ir.region(target).last_node().filter(|&n| ir.node(n).op.is_terminator()) {
        Some(terminator) => ir.insert_node_before(target, terminator, hoisted),
        None => ir.append_node(target, hoisted),
    }

    for &member in members {
        ir.replace_all_uses(member, hoisted);
        ir.erase_node(member);
    }
    true
}

fn all_equivalent(ir: &Context, members: &[NodeId]) -> bool {
    let first = members[0];
    members[1..].iter().all(|&m| equivalent(ir, first, m))
}

fn equivalent(ir: &Context, a: NodeId, b: NodeId) -> bool {
    let (na, nb) = (ir.node(a), ir.node(b));
    if na.op != nb.op || na.ty != nb.ty || na.inputs.len() != nb.inputs.len() {
        return false;
    }
    if na.op.is_commutative() {
        let mut ia = na.inputs.clone();
        let mut ib = nb.inputs.clone();
        ia.sort_unstable();
        ib.sort_unstable();
        ia == ib
    } else {
        na.inputs == nb.inputs
    }
}

fn common_dominator(ir: &Context, a: RegionId, b: RegionId) -> Option<RegionId> {
    if ir.region_dominates(a, b) {
        return Some(a);
    }
    if ir.region_dominates(b, a) {
        return Some(b);
    }
    let mut ancestor = ir.region(a).parent;
    while let Some(current) = ancestor {
        if ir.region_dominates(current, b) {
            return Some(current);
        }
        ancestor = ir.region(current).parent;
    }
    None
}

/// Every operand must be defined in a region that dominates the target.
fn inputs_available_at(ir: &Context, node: NodeId, target: RegionId) -> bool {
    ir.node(node).inputs.iter().all(|&input| {
        ir.node(input)
            .parent_region
            .is_some_and(|r| ir.region_dominates(r, target) || ir.region(r).is_global_scope())
    })
}

/// A region whose terminators all stay within its own subtree cannot have
/// its dominance subverted by the hoist.
fn is_safe_hoist_target(ir: &Context, target: RegionId) -> bool {
    for &node in &ir.region(target).nodes {
        if !ir.node(node).op.is_terminator() {
            continue;
        }
        for t in ir.terminator_targets(node) {
            if !ir.region_dominates_via_tree(target, t) {
                return false;
            }
        }
    }
    true
}

fn is_eligible(ir: &Context, node: NodeId) -> bool {
    let n = ir.node(node);
    !n.is_volatile()
        && !n.inputs.is_empty()
        && (n.op.is_arithmetic() || n.op.is_comparison() || n.op.is_bitwise())
}

/// Structural hash of (op, type, operand sources), with commutative
/// operands order-normalized.
fn expr_hash(ir: &Context, node: NodeId) -> ExprHash {
    let n = ir.node(node);
    let mut operands: Vec<u32> = n.inputs.iter().map(|i| i.0).collect();
    if n.op.is_commutative() {
        operands.sort_unstable();
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&(n.op as u16).to_le_bytes());
    hasher.update(&n.ty.0.to_le_bytes());
    for id in &operands {
        hasher.update(&id.to_le_bytes());
    }
    let low = hasher.finalize();

    let mut hi = crc32fast::Hasher::new_with_initial(0x85EB_CA6B);
    for id in operands.iter().rev() {
        hi.update(&id.to_le_bytes());
    }
    hi.update(&n.ty.0.to_le_bytes());
    (u64::from(hi.finalize()) << 32) | u64::from(low)
}
