//! # Scalar Replacement of Aggregates
//!
//! Replaces struct stack allocations with one scalar allocation per field
//! when every access follows the field pattern
//! `addr_of -> ptr_add(const field offset) -> ptr_load/ptr_store`.
//! A non-constant offset, a direct (non-field-indexed) load or store, or
//! the base pointer reaching a call or return disqualifies the whole
//! allocation. A field whose derived pointer leaks into a call or return
//! escapes: escaping fields are kept together in a reduced struct while the
//! rest are promoted to scalars.

use crate::foundation::{Context, ModuleId, NodeId, NodeOp, StrId, Type, TypeData, TypedData};
use crate::pass::{Pass, PassContext, PassId, PassResult, TransformPass};
use crate::analysis::alias::LOCAL_ALIAS_ANALYSIS;
use rustc_hash::FxHashSet;

/// Tag of the SROA pass.
pub const SROA: PassId = PassId("scalar-replacement-of-aggregates");

/// One observed field access.
#[derive(Debug, Clone, Copy)]
struct FieldAccess {
    /// The PTR_LOAD/PTR_STORE node
    access: NodeId,
    /// The PTR_ADD producing the field pointer
    field_ptr: NodeId,
    field_index: usize,
    is_store: bool,
}

#[derive(Debug)]
struct AllocationInfo {
    alloc: NodeId,
    fields: Vec<(StrId, Type)>,
    offsets: Vec<u64>,
    accesses: Vec<FieldAccess>,
    /// Field pointers (PTR_ADD nodes) per candidate, for cleanup
    field_ptrs: Vec<NodeId>,
    /// ADDR_OF nodes deriving from the allocation
    addr_nodes: Vec<NodeId>,
    escaped_fields: FxHashSet<usize>,
}

/// Scalar replacement of aggregates pass.
#[derive(Debug, Default)]
pub struct SroaPass;

impl Pass for SroaPass {
    fn id(&self) -> PassId {
        SROA
    }

    fn name(&self) -> &'static str {
        "scalar-replacement-of-aggregates"
    }

    fn description(&self) -> &'static str {
        "promotes struct allocations to scalar allocations"
    }

    fn required(&self) -> Vec<PassId> {
        vec![LOCAL_ALIAS_ANALYSIS]
    }

    fn min_opt_level(&self) -> u8 {
        2
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        let module = ctx.module();

        let mut candidates = Vec::new();
        for func in ir.module(module).functions.clone() {
            let Some(body) = ir.function_body(module, func) else {
                continue;
            };
            for region in ir.region_subtree(body) {
                for &node in &ir.region(region).nodes.clone() {
                    if let Some(info) = analyze_candidate(ir, node) {
                        candidates.push(info);
                    }
                }
            }
        }

        let mut promoted = 0u64;
        let mut replacements = 0u64;
        for info in candidates {
            if let Some(scalars) = transform_allocation(ir, module, &info) {
                promoted += 1;
                replacements += scalars;
            }
        }

        ctx.update_stat("sroa.promoted_allocations", promoted);
        ctx.update_stat("sroa.scalar_replacements", replacements);
        Ok(true)
    }
}

impl TransformPass for SroaPass {}

/// Check a node for the struct-allocation candidate pattern and collect its
/// accesses. Returns `None` when the node is not a candidate or something
/// disqualifies the whole allocation.
fn analyze_candidate(ir: &Context, node: NodeId) -> Option<AllocationInfo> {
    if ir.node(node).op != NodeOp::StackAlloc || ir.node(node).is_volatile() {
        return None;
    }
    let pointee = ir.pointee_of(ir.node(node).ty)?;
    if !pointee.is_struct() {
        return None;
    }
    let (fields, offsets) = match ir.get_type(pointee) {
        Ok(TypeData::Struct { fields, .. }) => {
            (fields.clone(), ir.types().field_offsets(fields))
        }
        _ => return None,
    };
    if fields.is_empty() {
        return None;
    }

    let mut info = AllocationInfo {
        alloc: node,
        fields,
        offsets,
        accesses: Vec::new(),
        field_ptrs: Vec::new(),
        addr_nodes: Vec::new(),
        escaped_fields: FxHashSet::default(),
    };

    for &user in &ir.node(node).users {
        match ir.node(user).op {
            NodeOp::AddrOf => {
                info.addr_nodes.push(user);
                if !analyze_address_uses(ir, user, &mut info) {
                    return None;
                }
            }
            // the base pointer reaching anything else disqualifies
            _ => return None,
        }
    }

    if info.accesses.is_empty() && info.escaped_fields.is_empty() {
        return None;
    }
    Some(info)
}

/// Analyze uses of one ADDR_OF over the allocation. Returns false when the
/// whole allocation is disqualified.
fn analyze_address_uses(ir: &Context, addr: NodeId, info: &mut AllocationInfo) -> bool {
    for &user in &ir.node(addr).users {
        match ir.node(user).op {
            NodeOp::PtrAdd => {
                let inputs = &ir.node(user).inputs;
                if inputs.first() != Some(&addr) {
                    return false;
                }
                let Some(&offset_node) = inputs.get(1) else {
                    return false;
                };
                // only constant offsets that land exactly on a field
                let Some(offset) = literal_offset(ir, offset_node) else {
                    return false;
                };
                let Some(field_index) = info.offsets.iter().position(|&o| o as i64 == offset)
                else {
                    return false;
                };

                info.field_ptrs.push(user);
                if !analyze_field_ptr_uses(ir, user, field_index, info) {
                    return false;
                }
            }
            // a direct dereference of the aggregate is not field-indexed
            NodeOp::PtrLoad | NodeOp::PtrStore | NodeOp::Load | NodeOp::Store => return false,
            // the whole-struct pointer escaping is fatal
            NodeOp::Call | NodeOp::Invoke | NodeOp::Ret => return false,
            _ => return false,
        }
    }
    true
}

fn analyze_field_ptr_uses(
    ir: &Context,
    field_ptr: NodeId,
    field_index: usize,
    info: &mut AllocationInfo,
) -> bool {
    for &user in &ir.node(field_ptr).users {
        let n = ir.node(user);
        match n.op {
            NodeOp::PtrLoad if n.inputs.first() == Some(&field_ptr) => {
                info.accesses.push(FieldAccess {
                    access: user,
                    field_ptr,
                    field_index,
                    is_store: false,
                });
            }
            NodeOp::PtrStore if n.inputs.get(1) == Some(&field_ptr) => {
                info.accesses.push(FieldAccess {
                    access: user,
                    field_ptr,
                    field_index,
                    is_store: true,
                });
            }
            // the field pointer leaking keeps this field aggregated
            NodeOp::Call | NodeOp::Invoke | NodeOp::Ret | NodeOp::PtrStore => {
                info.escaped_fields.insert(field_index);
            }
            _ => return false,
        }
    }
    true
}

/// Rewrite a promotable allocation. Returns the number of scalar
/// allocations created, or `None` when nothing was rewritten.
fn transform_allocation(ir: &mut Context, _module: ModuleId, info: &AllocationInfo) -> Option<u64> {
    let region = ir.node(info.alloc).parent_region?;

    // one scalar slot per promoted field, inserted where the aggregate was
    let mut scalar_allocs: Vec<Option<NodeId>> = vec![None; info.fields.len()];
    let mut created = 0u64;
    for (index, (name, field_ty)) in info.fields.iter().enumerate() {
        if info.escaped_fields.contains(&index) {
            continue;
        }
        let ptr_ty = ir.create_pointer_type(*field_ty, 0).ok()?;
        let scalar = ir.create_node(NodeOp::StackAlloc, ptr_ty);
        ir.node_mut(scalar).str_id = *name;
        ir.insert_node_before(region, info.alloc, scalar);
        scalar_allocs[index] = Some(scalar);
        created += 1;
    }

    // loads become typed loads from the scalar; stores typed stores to it
    for access in &info.accesses {
        let Some(scalar) = scalar_allocs[access.field_index] else {
            continue;
        };
        let field_ty = info.fields[access.field_index].1;
        if access.is_store {
            let value = ir.node(access.access).inputs.first().copied()?;
            ir.unlink_inputs(access.access);
            let n = ir.node_mut(access.access);
            n.op = NodeOp::Store;
            ir.add_input(access.access, value);
            ir.add_input(access.access, scalar);
        } else {
            ir.unlink_inputs(access.access);
            let n = ir.node_mut(access.access);
            n.op = NodeOp::Load;
            n.ty = field_ty;
            ir.add_input(access.access, scalar);
        }
    }

    if info.escaped_fields.is_empty() {
        // full promotion: the aggregate and its address chain disappear
        for &field_ptr in &info.field_ptrs {
            if ir.node(field_ptr).users.is_empty() {
                ir.erase_node(field_ptr);
            }
        }
        for &addr in &info.addr_nodes {
            if ir.node(addr).users.is_empty() {
                ir.erase_node(addr);
            }
        }
        ir.erase_node(info.alloc);
        return Some(created);
    }

    // partial promotion: escaping fields stay in a reduced aggregate, in
    // declaration order
    let kept: Vec<(StrId, Type)> = info
        .fields
        .iter()
        .enumerate()
        .filter(|(i, _)| info.escaped_fields.contains(i))
        .map(|(_, f)| *f)
        .collect();
    let kept_indices: Vec<usize> = (0..info.fields.len())
        .filter(|i| info.escaped_fields.contains(i))
        .collect();

    let reduced_offsets = ir.types().field_offsets(&kept);
    let reduced_size: u32 = kept
        .iter()
        .zip(&reduced_offsets)
        .map(|((_, ty), &off)| off as u32 + ir.types().size_of(*ty) as u32)
        .max()
        .unwrap_or(0);
    let reduced_ty = ir
        .create_struct_type(kept.clone(), reduced_size, 8)
        .ok()?;
    let reduced_ptr_ty = ir.create_pointer_type(reduced_ty, 0).ok()?;

    let reduced_alloc = ir.create_node(NodeOp::StackAlloc, reduced_ptr_ty);
    let alloc_name = ir.node(info.alloc).str_id;
    ir.node_mut(reduced_alloc).str_id = alloc_name;
    ir.insert_node_before(region, info.alloc, reduced_alloc);

    // remap surviving field pointers onto the reduced layout
    for &field_ptr in &info.field_ptrs {
        if ir.node(field_ptr).users.is_empty() {
            ir.erase_node(field_ptr);
            continue;
        }
        let Some(&offset_node) = ir.node(field_ptr).inputs.get(1) else {
            continue;
        };
        let Some(old_offset) = literal_offset(ir, offset_node) else {
            continue;
        };
        let Some(old_index) = info.offsets.iter().position(|&o| o as i64 == old_offset) else {
            continue;
        };
        let Some(new_slot) = kept_indices.iter().position(|&k| k == old_index) else {
            continue;
        };

        let new_offset = ir.create_node(NodeOp::Lit, Type::I64);
        ir.node_mut(new_offset).data = TypedData::I64(reduced_offsets[new_slot] as i64);
        let ptr_region = ir.node(field_ptr).parent_region.unwrap_or(region);
        ir.insert_node_before(ptr_region, field_ptr, new_offset);

        let old_input = ir.node(field_ptr).inputs[1];
        ir.node_mut(field_ptr).inputs[1] = new_offset;
        let fp = field_ptr;
        ir.node_mut(old_input).users.retain(|&u| u != fp);
        ir.node_mut(new_offset).users.push(field_ptr);
    }

    ir.replace_all_uses(info.alloc, reduced_alloc);
    ir.erase_node(info.alloc);
    Some(created)
}

fn literal_offset(ir: &Context, node: NodeId) -> Option<i64> {
    if ir.node(node).op != NodeOp::Lit {
        return None;
    }
    ir.node(node).data.as_i64()
}
