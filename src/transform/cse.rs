//! # Common Subexpression Elimination
//!
//! Value numbering over the region tree. Two nodes receive the same value
//! number iff they compute the same value under the alias model:
//!
//! * literals hash their type and payload bytes;
//! * pure expressions hash (op, type, input numbers), sorting the input
//!   numbers of commutative ops;
//! * loads additionally hash the set of stores the alias analysis marks as
//!   possibly modifying them;
//! * side-effecting nodes are never numbered.
//!
//! A node whose number already maps to a surviving, dominating node is
//! replaced by it. Value numbers are 64-bit structural hashes; operand-level
//! equivalence is re-verified before any replacement so a hash collision can
//! never merge inequivalent nodes.

use crate::analysis::alias::{memory_address, LocalAliasResult, LOCAL_ALIAS_ANALYSIS};
use crate::foundation::{Context, ModuleId, NodeId, NodeOp, RegionId};
use crate::pass::{Pass, PassContext, PassError, PassId, PassResult, TransformPass};
use rustc_hash::FxHashMap;

/// Tag of the CSE pass.
pub const CSE: PassId = PassId("common-subexpression-elimination");

type ValueNumber = u64;

/// Common subexpression elimination via value numbering.
#[derive(Debug, Default)]
pub struct CsePass {
    value_numbers: FxHashMap<NodeId, ValueNumber>,
    expression_to_node: FxHashMap<ValueNumber, NodeId>,
}

impl Pass for CsePass {
    fn id(&self) -> PassId {
        CSE
    }

    fn name(&self) -> &'static str {
        "common-subexpression-elimination"
    }

    fn description(&self) -> &'static str {
        "eliminates redundant computations using value numbering"
    }

    fn required(&self) -> Vec<PassId> {
        vec![LOCAL_ALIAS_ANALYSIS]
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        let module = ctx.module();
        let Some(alias) = ctx.get_result::<LocalAliasResult>(LOCAL_ALIAS_ANALYSIS) else {
            return Err(PassError::MissingAnalysis {
                required: LOCAL_ALIAS_ANALYSIS,
                dependent: CSE,
            });
        };

        let mut eliminated = 0u64;
        for func in ir.module(module).functions.clone() {
            eliminated += self.process_function(ir, module, func, alias);
        }

        ctx.update_stat("cse.eliminated_expressions", eliminated);
        Ok(true)
    }
}

impl TransformPass for CsePass {}

impl CsePass {
    fn process_function(
        &mut self,
        ir: &mut Context,
        module: ModuleId,
        func: NodeId,
        alias: &LocalAliasResult,
    ) -> u64 {
        // numbering never crosses function boundaries
        self.value_numbers.clear();
        self.expression_to_node.clear();

        let Some(body) = ir.function_body(module, func) else {
            return 0;
        };
        self.process_region(ir, body, alias)
    }

    fn process_region(
        &mut self,
        ir: &mut Context,
        region: RegionId,
        alias: &LocalAliasResult,
    ) -> u64 {
        let mut eliminated = 0;
        let nodes = ir.region(region).nodes.clone();
        for node in nodes {
            if ir.node(node).parent_region != Some(region) {
                continue;
            }
            if !is_eligible(ir, node) {
                continue;
            }

            let vn = self.compute_value_number(ir, node, alias);
            let mut replaced = false;
            if let Some(existing) = self.expression_to_node.get(&vn).copied() {
                let dominates = existing != node
                    && ir
                        .node(existing)
                        .parent_region
                        .is_some_and(|r| ir.region_dominates(r, region));
                if dominates && self.are_equivalent(ir, existing, node, alias) {
                    ir.replace_all_uses(node, existing);
                    ir.erase_node(node);
                    eliminated += 1;
                    replaced = true;
                }
            }
            if !replaced {
                self.expression_to_node.insert(vn, node);
                self.value_numbers.insert(node, vn);
            }
        }

        let children = ir.region(region).children.clone();
        for child in children {
            eliminated += self.process_region(ir, child, alias);
        }
        eliminated
    }

    fn compute_value_number(
        &mut self,
        ir: &Context,
        node: NodeId,
        alias: &LocalAliasResult,
    ) -> ValueNumber {
        if let Some(&vn) = self.value_numbers.get(&node) {
            return vn;
        }

        let n = ir.node(node);
        let vn = match n.op {
            NodeOp::Lit => hash_parts(0x11, n.ty.0, &n.data.hash_bytes()),
            op if op.is_load() => self.compute_load_value_number(ir, node, alias),
            _ => self.compute_expression_value_number(ir, node, alias),
        };
        self.value_numbers.insert(node, vn);
        vn
    }

    fn compute_expression_value_number(
        &mut self,
        ir: &Context,
        node: NodeId,
        alias: &LocalAliasResult,
    ) -> ValueNumber {
        let n = ir.node(node);
        let mut input_numbers: Vec<ValueNumber> = n
            .inputs
            .iter()
            .map(|&input| self.operand_number(ir, input, alias))
            .collect();
        if n.op.is_commutative() {
            input_numbers.sort_unstable();
        }

        let mut bytes = Vec::with_capacity(8 * input_numbers.len());
        for vn in &input_numbers {
            bytes.extend_from_slice(&vn.to_le_bytes());
        }
        hash_parts(0x20 + n.op as u64, n.ty.0, &bytes)
    }

    fn compute_load_value_number(
        &mut self,
        ir: &Context,
        node: NodeId,
        alias: &LocalAliasResult,
    ) -> ValueNumber {
        let addr_number = memory_address(ir, node)
            .map_or(0, |addr| self.operand_number(ir, addr, alias));

        // the set of may-modifying stores is part of a load's identity
        let mut store_ids: Vec<u32> = alias
            .affecting_stores(node)
            .iter()
            .map(|s| s.0)
            .collect();
        store_ids.sort_unstable();

        let mut bytes = Vec::with_capacity(8 + 4 * store_ids.len());
        bytes.extend_from_slice(&addr_number.to_le_bytes());
        for id in store_ids {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        hash_parts(0x90, ir.node(node).ty.0, &bytes)
    }

    /// Number an operand: eligible nodes get structural numbers; opaque
    /// nodes (params, calls, allocations) get a number derived from their
    /// identity so distinct unknowns never collide.
    fn operand_number(
        &mut self,
        ir: &Context,
        node: NodeId,
        alias: &LocalAliasResult,
    ) -> ValueNumber {
        if let Some(&vn) = self.value_numbers.get(&node) {
            return vn;
        }
        if is_eligible(ir, node) || ir.node(node).op == NodeOp::Lit {
            return self.compute_value_number(ir, node, alias);
        }
        let vn = hash_parts(0xFF, 0, &node.0.to_le_bytes());
        self.value_numbers.insert(node, vn);
        vn
    }

    fn are_equivalent(
        &mut self,
        ir: &Context,
        a: NodeId,
        b: NodeId,
        alias: &LocalAliasResult,
    ) -> bool {
        let (na, nb) = (ir.node(a), ir.node(b));
        if na.op != nb.op || na.ty != nb.ty || na.inputs.len() != nb.inputs.len() {
            return false;
        }

        if na.op == NodeOp::Lit {
            return na.data == nb.data;
        }

        if na.op.is_load() {
            let (Some(addr_a), Some(addr_b)) = (memory_address(ir, a), memory_address(ir, b))
            else {
                return false;
            };
            return alias.must_alias(addr_a, addr_b)
                && alias.affecting_stores(a) == alias.affecting_stores(b);
        }

        let mut numbers_a: Vec<ValueNumber> = na
            .inputs
            .iter()
            .map(|&i| self.operand_number(ir, i, alias))
            .collect();
        let mut numbers_b: Vec<ValueNumber> = nb
            .inputs
            .iter()
            .map(|&i| self.operand_number(ir, i, alias))
            .collect();
        if na.op.is_commutative() {
            numbers_a.sort_unstable();
            numbers_b.sort_unstable();
        }
        numbers_a == numbers_b
    }
}

/// Pure expression nodes are eligible; anything with side effects (stores,
/// calls, control flow, allocations, atomics) is not.
fn is_eligible(ir: &Context, node: NodeId) -> bool {
    let n = ir.node(node);
    if n.is_volatile() || n.inputs.is_empty() {
        return false;
    }
    matches!(
        n.op,
        NodeOp::Add
            | NodeOp::Sub
            | NodeOp::Mul
            | NodeOp::Div
            | NodeOp::Mod
            | NodeOp::Gt
            | NodeOp::Gte
            | NodeOp::Lt
            | NodeOp::Lte
            | NodeOp::Eq
            | NodeOp::Neq
            | NodeOp::Band
            | NodeOp::Bor
            | NodeOp::Bxor
            | NodeOp::Bnot
            | NodeOp::Bshl
            | NodeOp::Bshr
            | NodeOp::ReinterpretCast
            | NodeOp::PtrAdd
            | NodeOp::VectorBuild
            | NodeOp::VectorExtract
            | NodeOp::VectorSplat
    ) || (matches!(n.op, NodeOp::Load | NodeOp::PtrLoad) && !has_volatile_address(ir, node))
}

fn has_volatile_address(ir: &Context, load: NodeId) -> bool {
    memory_address(ir, load).is_some_and(|addr| ir.node(addr).is_volatile())
}

/// Deterministic structural hash: crc32 over the discriminant, the type
/// bits and the payload, widened with a second pass to 64 bits.
fn hash_parts(discriminant: u64, ty_bits: u16, payload: &[u8]) -> ValueNumber {
    let mut lo = crc32fast::Hasher::new();
    lo.update(&discriminant.to_le_bytes());
    lo.update(&ty_bits.to_le_bytes());
    lo.update(payload);
    let low = lo.finalize();

    let mut hi = crc32fast::Hasher::new_with_initial(0x9E37_79B9);
    hi.update(payload);
    hi.update(&ty_bits.to_le_bytes());
    hi.update(&discriminant.to_le_bytes());
    let high = hi.finalize();

    (u64::from(high) << 32) | u64::from(low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_parts_is_deterministic() {
        let a = hash_parts(0x20, 4, &[1, 2, 3]);
        let b = hash_parts(0x20, 4, &[1, 2, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_parts_separates_discriminants() {
        // same payload under different op discriminants must not collide
        assert_ne!(hash_parts(0x20, 4, &[7]), hash_parts(0x21, 4, &[7]));
        assert_ne!(hash_parts(0x20, 4, &[7]), hash_parts(0x20, 5, &[7]));
    }
}
