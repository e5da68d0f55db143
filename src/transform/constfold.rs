//! # Constant Folding
//!
//! Evaluates arithmetic, comparison and bitwise nodes whose inputs are all
//! literals, replacing them with fresh literal nodes computed in the node's
//! declared numeric type. Division by zero is never folded. Same-type
//! reinterpret casts are shorted to their source (copy propagation).

use crate::foundation::{Context, NodeId, NodeOp, RegionId, Type, TypedData};
use crate::pass::{Pass, PassContext, PassId, PassResult, TransformPass};

/// Tag of the constant folding pass.
pub const CONSTANT_FOLDING: PassId = PassId("constant-folding");

/// Constant folding optimization pass.
#[derive(Debug, Default)]
pub struct ConstantFoldingPass;

impl Pass for ConstantFoldingPass {
    fn id(&self) -> PassId {
        CONSTANT_FOLDING
    }

    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn description(&self) -> &'static str {
        "evaluates constant expressions at compile time"
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        let module = ctx.module();
        let root = ir.module(module).root;
        let folded = process_region(ir, root);
        ctx.update_stat("constfold.folded_expressions", folded);
        Ok(true)
    }
}

impl TransformPass for ConstantFoldingPass {}

fn process_region(ir: &mut Context, region: RegionId) -> u64 {
    let mut folded = 0;
    let nodes = ir.region(region).nodes.clone();
    for node in nodes {
        if ir.node(node).parent_region != Some(region) {
            continue;
        }
        if try_fold(ir, region, node) {
            folded += 1;
        } else if try_propagate_copy(ir, node) {
            folded += 1;
        }
    }

    let children = ir.region(region).children.clone();
    for child in children {
        folded += process_region(ir, child);
    }
    folded
}

fn try_fold(ir: &mut Context, region: RegionId, node: NodeId) -> bool {
    let op = ir.node(node).op;
    if !(op.is_arithmetic() || op.is_comparison() || op.is_bitwise()) {
        return false;
    }
    if ir.node(node).is_volatile() || has_global_inputs(ir, node) {
        return false;
    }

    let inputs = ir.node(node).inputs.clone();
    if inputs.is_empty() || !inputs.iter().all(|&i| ir.node(i).op == NodeOp::Lit) {
        return false;
    }

    let ty = ir.node(node).ty;
    let value = match (op, inputs.as_slice()) {
        (NodeOp::Bnot, [a]) => fold_unary(op, ty, &ir.node(*a).data),
        (_, [a, b]) => {
            let (da, db) = (ir.node(*a).data.clone(), ir.node(*b).data.clone());
            fold_binary(op, ty, &da, &db)
        }
        _ => None,
    };
    let Some(value) = value else {
        return false;
    };

    let lit = ir.create_node(NodeOp::Lit, ty);
    ir.node_mut(lit).data = value;
    ir.insert_node_before(region, node, lit);
    ir.replace_all_uses(node, lit);
    ir.erase_node(node);
    true
}

/// Shorts a same-type reinterpret cast to its operand.
fn try_propagate_copy(ir: &mut Context, node: NodeId) -> bool {
    if ir.node(node).op != NodeOp::ReinterpretCast || ir.node(node).is_volatile() {
        return false;
    }
    let Some(&source) = ir.node(node).inputs.first() else {
        return false;
    };
    if ir.node(node).ty != ir.node(source).ty {
        return false;
    }
    ir.replace_all_uses(node, source);
    ir.erase_node(node);
    true
}

fn has_global_inputs(ir: &Context, node: NodeId) -> bool {
    ir.node(node).inputs.iter().any(|&input| {
        ir.node(input)
            .parent_region
            .is_some_and(|r| ir.region(r).is_global_scope())
    })
}

fn fold_unary(op: NodeOp, ty: Type, a: &TypedData) -> Option<TypedData> {
    if op != NodeOp::Bnot {
        return None;
    }
    let value = a.as_i64()?;
    int_result(ty, !value)
}

fn fold_binary(op: NodeOp, ty: Type, a: &TypedData, b: &TypedData) -> Option<TypedData> {
    if op.is_comparison() {
        return fold_comparison(op, a, b);
    }

    if ty.is_float() {
        let (x, y) = (a.as_f64()?, b.as_f64()?);
        let value = match op {
            NodeOp::Add => x + y,
            NodeOp::Sub => x - y,
            NodeOp::Mul => x * y,
            NodeOp::Div => {
                if y == 0.0 {
                    return None;
                }
                x / y
            }
            NodeOp::Mod => {
                if y == 0.0 {
                    return None;
                }
                x % y
            }
            _ => return None,
        };
        return match ty {
            Type::F32 => Some(TypedData::F32(value as f32)),
            Type::F64 => Some(TypedData::F64(value)),
            _ => None,
        };
    }

    let (x, y) = (a.as_i64()?, b.as_i64()?);
    let value = match op {
        NodeOp::Add => x.wrapping_add(y),
        NodeOp::Sub => x.wrapping_sub(y),
        NodeOp::Mul => x.wrapping_mul(y),
        NodeOp::Div => {
            // division by zero is not folded
            if y == 0 {
                return None;
            }
            x.wrapping_div(y)
        }
        NodeOp::Mod => {
            if y == 0 {
                return None;
            }
            x.wrapping_rem(y)
        }
        NodeOp::Band => x & y,
        NodeOp::Bor => x | y,
        NodeOp::Bxor => x ^ y,
        NodeOp::Bshl => x.wrapping_shl(y as u32),
        NodeOp::Bshr => x.wrapping_shr(y as u32),
        _ => return None,
    };
    int_result(ty, value)
}

fn fold_comparison(op: NodeOp, a: &TypedData, b: &TypedData) -> Option<TypedData> {
    let result = if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        match op {
            NodeOp::Gt => x > y,
            NodeOp::Gte => x >= y,
            NodeOp::Lt => x < y,
            NodeOp::Lte => x <= y,
            NodeOp::Eq => x == y,
            NodeOp::Neq => x != y,
            _ => return None,
        }
    } else {
        let (x, y) = (a.as_i64()?, b.as_i64()?);
        match op {
            NodeOp::Gt => x > y,
            NodeOp::Gte => x >= y,
            NodeOp::Lt => x < y,
            NodeOp::Lte => x <= y,
            NodeOp::Eq => x == y,
            NodeOp::Neq => x != y,
            _ => return None,
        }
    };
    Some(TypedData::Bool(result))
}

/// Truncate a folded value into the node's declared integer type.
fn int_result(ty: Type, value: i64) -> Option<TypedData> {
    match ty {
        Type::BOOL => Some(TypedData::Bool(value != 0)),
        Type::I8 => Some(TypedData::I8(value as i8)),
        Type::I16 => Some(TypedData::I16(value as i16)),
        Type::I32 => Some(TypedData::I32(value as i32)),
        Type::I64 => Some(TypedData::I64(value)),
        Type::U8 => Some(TypedData::U8(value as u8)),
        Type::U16 => Some(TypedData::U16(value as u16)),
        Type::U32 => Some(TypedData::U32(value as u32)),
        Type::U64 => Some(TypedData::U64(value as u64)),
        _ => None,
    }
}
