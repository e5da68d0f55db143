//! # IR Builder
//!
//! The sole legal way to construct IR. Wraps a module and an insertion
//! region and emits nodes through the context's def-use-maintaining
//! helpers: functions with parameter nodes, typed literals, expression
//! nodes, memory operations, calls, and control flow with `entry`-marked
//! target blocks.
//!
//! ```text
//! front-end -> [Builder] -> Module/Region/Node web -> PassManager
//! ```

use crate::foundation::{
    AtomicOrdering, Context, ModuleId, NodeId, NodeOp, NodeProps, RegionId, Type, TypedData,
};

/// A freshly built function: its node, body region and parameter nodes.
#[derive(Debug, Clone)]
pub struct BuiltFunction {
    pub function: NodeId,
    pub body: RegionId,
    pub params: Vec<NodeId>,
}

/// Builder over one module with a current insertion region.
pub struct Builder<'ctx> {
    ctx: &'ctx mut Context,
    module: ModuleId,
    insert_region: Option<RegionId>,
}

impl<'ctx> Builder<'ctx> {
    pub fn new(ctx: &'ctx mut Context, module: ModuleId) -> Self {
        Builder {
            ctx,
            module,
            insert_region: None,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn context(&mut self) -> &mut Context {
        self.ctx
    }

    /// Region new nodes are appended to.
    pub fn insert_region(&self) -> Option<RegionId> {
        self.insert_region
    }

    pub fn set_insert_region(&mut self, region: RegionId) {
        self.insert_region = Some(region);
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    /// Create a function: a FUNCTION node in the module root, a body region
    /// named after it with an `entry` marker, and one PARAM node per
    /// parameter. Leaves the insertion point at the body.
    pub fn create_function(
        &mut self,
        name: &str,
        ret: Type,
        params: &[(&str, Type)],
        props: NodeProps,
    ) -> BuiltFunction {
        let param_types: Vec<Type> = params.iter().map(|(_, t)| *t).collect();
        let fn_ty = self
            .ctx
            .create_function_type(ret, param_types, false)
            .unwrap_or(Type::VOID);

        let function = self.ctx.create_node(NodeOp::Function, fn_ty);
        let name_id = self.ctx.intern(name);
        self.ctx.node_mut(function).str_id = name_id;
        self.ctx.node_mut(function).props = props;
        let root = self.ctx.module(self.module).root;
        self.ctx.append_node(root, function);
        self.ctx.add_function(self.module, function);

        let body = self.ctx.create_region(self.module, name, None);
        let entry = self.ctx.create_node(NodeOp::Entry, Type::VOID);
        self.ctx.append_node(body, entry);

        let mut param_nodes = Vec::with_capacity(params.len());
        for (index, (param_name, param_ty)) in params.iter().enumerate() {
            let param = self.ctx.create_node(NodeOp::Param, *param_ty);
            let id = self.ctx.intern(param_name);
            self.ctx.node_mut(param).str_id = id;
            self.ctx.node_mut(param).data = TypedData::U32(index as u32);
            self.ctx.append_node(body, param);
            param_nodes.push(param);
        }

        self.insert_region = Some(body);
        BuiltFunction {
            function,
            body,
            params: param_nodes,
        }
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Create a block region with an `entry` marker. Defaults to a child of
    /// the current insertion region.
    pub fn create_block(&mut self, name: &str, parent: Option<RegionId>) -> RegionId {
        let parent = parent.or(self.insert_region);
        let region = self.ctx.create_region(self.module, name, parent);
        let entry = self.ctx.create_node(NodeOp::Entry, Type::VOID);
        self.ctx.append_node(region, entry);
        region
    }

    /// The `entry` marker of a block, used as a control-flow operand.
    pub fn entry_of(&self, region: RegionId) -> Option<NodeId> {
        self.ctx
            .region(region)
            .first_node()
            .filter(|&n| self.ctx.node(n).op == NodeOp::Entry)
    }

    /// Structured if: `<name>.then` and `<name>.else` blocks under the
    /// current region. The caller emits the branch and the contents.
    pub fn if_blocks(&mut self, name: &str) -> (RegionId, RegionId) {
        let then_region = self.create_block(&format!("{name}.then"), None);
        let else_region = self.create_block(&format!("{name}.else"), None);
        (then_region, else_region)
    }

    /// Structured while: a `<name>.cond` block under the current region and
    /// a `<name>.body` block nested inside it, so the condition dominates
    /// the body and the back-edge jump from body to cond closes the loop.
    pub fn while_blocks(&mut self, name: &str) -> (RegionId, RegionId) {
        let cond = self.create_block(&format!("{name}.cond"), None);
        let body = self.create_block(&format!("{name}.body"), Some(cond));
        (cond, body)
    }

    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    pub fn lit(&mut self, data: TypedData, ty: Type) -> NodeId {
        let node = self.ctx.create_node(NodeOp::Lit, ty);
        self.ctx.node_mut(node).data = data;
        self.attach(node)
    }

    pub fn lit_bool(&mut self, value: bool) -> NodeId {
        self.lit(TypedData::Bool(value), Type::BOOL)
    }

    pub fn lit_i32(&mut self, value: i32) -> NodeId {
        self.lit(TypedData::I32(value), Type::I32)
    }

    pub fn lit_i64(&mut self, value: i64) -> NodeId {
        self.lit(TypedData::I64(value), Type::I64)
    }

    pub fn lit_u64(&mut self, value: u64) -> NodeId {
        self.lit(TypedData::U64(value), Type::U64)
    }

    pub fn lit_f64(&mut self, value: f64) -> NodeId {
        self.lit(TypedData::F64(value), Type::F64)
    }

    /// Intern a string literal into the module's rodata region.
    pub fn lit_str(&mut self, value: &str) -> NodeId {
        self.ctx.intern_string_literal(self.module, value)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn binary(&mut self, op: NodeOp, ty: Type, lhs: NodeId, rhs: NodeId) -> NodeId {
        let node = self.ctx.create_node(op, ty);
        self.ctx.add_input(node, lhs);
        self.ctx.add_input(node, rhs);
        self.attach(node)
    }

    pub fn unary(&mut self, op: NodeOp, ty: Type, operand: NodeId) -> NodeId {
        let node = self.ctx.create_node(op, ty);
        self.ctx.add_input(node, operand);
        self.attach(node)
    }

    pub fn add(&mut self, ty: Type, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(NodeOp::Add, ty, lhs, rhs)
    }

    pub fn sub(&mut self, ty: Type, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(NodeOp::Sub, ty, lhs, rhs)
    }

    pub fn mul(&mut self, ty: Type, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(NodeOp::Mul, ty, lhs, rhs)
    }

    pub fn div(&mut self, ty: Type, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(NodeOp::Div, ty, lhs, rhs)
    }

    pub fn lt(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(NodeOp::Lt, Type::BOOL, lhs, rhs)
    }

    pub fn eq(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.binary(NodeOp::Eq, Type::BOOL, lhs, rhs)
    }

    pub fn cast(&mut self, ty: Type, operand: NodeId) -> NodeId {
        self.unary(NodeOp::ReinterpretCast, ty, operand)
    }

    pub fn vector_build(&mut self, ty: Type, elems: &[NodeId]) -> NodeId {
        let node = self.ctx.create_node(NodeOp::VectorBuild, ty);
        for &e in elems {
            self.ctx.add_input(node, e);
        }
        self.attach(node)
    }

    pub fn vector_splat(&mut self, ty: Type, value: NodeId) -> NodeId {
        self.unary(NodeOp::VectorSplat, ty, value)
    }

    pub fn vector_extract(&mut self, ty: Type, vector: NodeId, index: NodeId) -> NodeId {
        self.binary(NodeOp::VectorExtract, ty, vector, index)
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    /// Allocate a stack slot of the given pointee type; the node's type is
    /// a pointer to it.
    pub fn stack_alloc(&mut self, pointee: Type) -> NodeId {
        let ptr_ty = self.ctx.create_pointer_type(pointee, 0).unwrap_or(pointee);
        let node = self.ctx.create_node(NodeOp::StackAlloc, ptr_ty);
        self.attach(node)
    }

    /// Allocate heap memory; `size` is a byte-count operand.
    pub fn heap_alloc(&mut self, pointee: Type, size: NodeId) -> NodeId {
        let ptr_ty = self.ctx.create_pointer_type(pointee, 0).unwrap_or(pointee);
        let node = self.ctx.create_node(NodeOp::HeapAlloc, ptr_ty);
        self.ctx.add_input(node, size);
        self.attach(node)
    }

    pub fn free(&mut self, ptr: NodeId) -> NodeId {
        let node = self.ctx.create_node(NodeOp::Free, Type::VOID);
        self.ctx.add_input(node, ptr);
        self.attach(node)
    }

    /// Address of a variable or slot.
    pub fn addr_of(&mut self, target: NodeId) -> NodeId {
        let target_ty = self.ctx.node(target).ty;
        let ptr_ty = if target_ty.is_pointer() {
            target_ty
        } else {
            self.ctx.create_pointer_type(target_ty, 0).unwrap_or(target_ty)
        };
        let node = self.ctx.create_node(NodeOp::AddrOf, ptr_ty);
        self.ctx.add_input(node, target);
        self.attach(node)
    }

    /// Pointer displacement; the result keeps the base pointer's type.
    pub fn ptr_add(&mut self, base: NodeId, offset: NodeId) -> NodeId {
        let node = self.ctx.create_node(NodeOp::PtrAdd, self.ctx.node(base).ty);
        self.ctx.add_input(node, base);
        self.ctx.add_input(node, offset);
        self.attach(node)
    }

    pub fn load(&mut self, ty: Type, addr: NodeId) -> NodeId {
        let node = self.ctx.create_node(NodeOp::Load, ty);
        self.ctx.add_input(node, addr);
        self.attach(node)
    }

    /// Store; inputs are [value, address].
    pub fn store(&mut self, value: NodeId, addr: NodeId) -> NodeId {
        let node = self.ctx.create_node(NodeOp::Store, Type::VOID);
        self.ctx.add_input(node, value);
        self.ctx.add_input(node, addr);
        self.attach(node)
    }

    pub fn ptr_load(&mut self, ty: Type, ptr: NodeId) -> NodeId {
        let node = self.ctx.create_node(NodeOp::PtrLoad, ty);
        self.ctx.add_input(node, ptr);
        self.attach(node)
    }

    pub fn ptr_store(&mut self, value: NodeId, ptr: NodeId) -> NodeId {
        let node = self.ctx.create_node(NodeOp::PtrStore, Type::VOID);
        self.ctx.add_input(node, value);
        self.ctx.add_input(node, ptr);
        self.attach(node)
    }

    pub fn atomic_load(&mut self, ty: Type, addr: NodeId, ordering: AtomicOrdering) -> NodeId {
        let node = self.ctx.create_node(NodeOp::AtomicLoad, ty);
        self.ctx.node_mut(node).data = TypedData::Atomic { ordering, exclusive: false };
        self.ctx.add_input(node, addr);
        self.attach(node)
    }

    pub fn atomic_store(
        &mut self,
        value: NodeId,
        addr: NodeId,
        ordering: AtomicOrdering,
    ) -> NodeId {
        let node = self.ctx.create_node(NodeOp::AtomicStore, Type::VOID);
        self.ctx.node_mut(node).data = TypedData::Atomic { ordering, exclusive: false };
        self.ctx.add_input(node, value);
        self.ctx.add_input(node, addr);
        self.attach(node)
    }

    pub fn atomic_cas(
        &mut self,
        ty: Type,
        addr: NodeId,
        expected: NodeId,
        desired: NodeId,
        ordering: AtomicOrdering,
    ) -> NodeId {
        let node = self.ctx.create_node(NodeOp::AtomicCas, ty);
        self.ctx.node_mut(node).data = TypedData::Atomic { ordering, exclusive: true };
        self.ctx.add_input(node, addr);
        self.ctx.add_input(node, expected);
        self.ctx.add_input(node, desired);
        self.attach(node)
    }

    // ------------------------------------------------------------------
    // Calls and control flow
    // ------------------------------------------------------------------

    /// Direct or indirect call; inputs are [callee, args...].
    pub fn call(&mut self, ret_ty: Type, callee: NodeId, args: &[NodeId]) -> NodeId {
        let node = self.ctx.create_node(NodeOp::Call, ret_ty);
        self.ctx.add_input(node, callee);
        for &arg in args {
            self.ctx.add_input(node, arg);
        }
        self.attach(node)
    }

    /// Call with exception edges; the last two inputs are the normal and
    /// exception `entry` nodes.
    pub fn invoke(
        &mut self,
        ret_ty: Type,
        callee: NodeId,
        args: &[NodeId],
        normal: RegionId,
        exceptional: RegionId,
    ) -> Option<NodeId> {
        let normal_entry = self.entry_of(normal)?;
        let exception_entry = self.entry_of(exceptional)?;
        let node = self.ctx.create_node(NodeOp::Invoke, ret_ty);
        self.ctx.add_input(node, callee);
        for &arg in args {
            self.ctx.add_input(node, arg);
        }
        self.ctx.add_input(node, normal_entry);
        self.ctx.add_input(node, exception_entry);
        self.ctx.region_mut(normal).control_dependency = Some(node);
        self.ctx.region_mut(exceptional).control_dependency = Some(node);
        Some(self.attach(node))
    }

    /// Unconditional jump to a block's entry.
    pub fn jump(&mut self, target: RegionId) -> Option<NodeId> {
        let entry = self.entry_of(target)?;
        let node = self.ctx.create_node(NodeOp::Jump, Type::VOID);
        self.ctx.add_input(node, entry);
        Some(self.attach(node))
    }

    /// Conditional jump; inputs are [cond, true entry, false entry].
    pub fn branch(&mut self, cond: NodeId, on_true: RegionId, on_false: RegionId) -> Option<NodeId> {
        let true_entry = self.entry_of(on_true)?;
        let false_entry = self.entry_of(on_false)?;
        let node = self.ctx.create_node(NodeOp::Branch, Type::VOID);
        self.ctx.add_input(node, cond);
        self.ctx.add_input(node, true_entry);
        self.ctx.add_input(node, false_entry);
        self.ctx.region_mut(on_true).control_dependency = Some(node);
        self.ctx.region_mut(on_false).control_dependency = Some(node);
        Some(self.attach(node))
    }

    /// Return, with or without a value.
    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        let node = self.ctx.create_node(NodeOp::Ret, Type::VOID);
        if let Some(v) = value {
            self.ctx.add_input(node, v);
        }
        self.attach(node)
    }

    pub fn exit(&mut self) -> NodeId {
        let node = self.ctx.create_node(NodeOp::Exit, Type::VOID);
        self.attach(node)
    }

    fn attach(&mut self, node: NodeId) -> NodeId {
        if let Some(region) = self.insert_region {
            self.ctx.append_node(region, node);
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_skeleton() {
        let mut ctx = Context::new();
        let m = ctx.create_module("m").unwrap();
        let mut b = Builder::new(&mut ctx, m);
        let f = b.create_function("sum", Type::I32, &[("a", Type::I32), ("b", Type::I32)], NodeProps::empty());
        let result = b.add(Type::I32, f.params[0], f.params[1]);
        b.ret(Some(result));

        assert_eq!(ctx.find_function(m, "sum"), Some(f.function));
        assert_eq!(ctx.function_body(m, f.function), Some(f.body));
        assert!(ctx.region_is_terminated(f.body));
        assert_eq!(ctx.node(f.params[0]).op, NodeOp::Param);
    }

    #[test]
    fn test_branch_targets_entries() {
        let mut ctx = Context::new();
        let m = ctx.create_module("m").unwrap();
        let mut b = Builder::new(&mut ctx, m);
        let f = b.create_function("f", Type::VOID, &[], NodeProps::empty());
        let (t, e) = b.if_blocks("check");
        let cond = b.lit_bool(true);
        let branch = b.branch(cond, t, e).unwrap();

        let targets = ctx.terminator_targets(branch);
        assert_eq!(targets, vec![t, e]);
        assert_eq!(ctx.region(t).control_dependency, Some(branch));
        let _ = f;
    }

    #[test]
    fn test_while_blocks_nest_body_in_cond() {
        let mut ctx = Context::new();
        let m = ctx.create_module("m").unwrap();
        let mut b = Builder::new(&mut ctx, m);
        let _f = b.create_function("f", Type::VOID, &[], NodeProps::empty());
        let (cond, body) = b.while_blocks("loop");
        assert_eq!(ctx.region(body).parent, Some(cond));
        assert!(ctx.region_dominates(cond, body));
    }
}
