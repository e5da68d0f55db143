//! # Local Alias Analysis
//!
//! Per-function memory-location and escape information. Walks every region
//! of every function, classifies pointer-producing nodes, records
//! allocation sites and copy chains, propagates escapes to a fixed point,
//! and relates stores to the loads they may modify.
//!
//! Precision degrades, never fails: an unknown offset or size downgrades an
//! alias verdict to MAY.

use crate::foundation::{Context, ModuleId, NodeId, NodeOp, RegionId, TypedData};
use crate::pass::{
    run_analysis, AnalysisPass, AnalysisResult, Pass, PassContext, PassId, PassResult,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

/// Tag of the local alias analysis pass.
pub const LOCAL_ALIAS_ANALYSIS: PassId = PassId("local-alias-analysis");

/// Alias relationship between two pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasVerdict {
    /// Pointers never alias
    No,
    /// Pointers might alias
    May,
    /// Pointers definitely alias
    Must,
    /// Pointers partially overlap
    Partial,
}

/// A memory location: base, byte offset (-1 when unknown), size in bytes
/// (0 when unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLocation {
    pub base: NodeId,
    pub offset: i64,
    pub size: u64,
}

/// Result of local alias analysis for one module.
#[derive(Debug, Default)]
pub struct LocalAliasResult {
    memory_locations: FxHashMap<NodeId, MemoryLocation>,
    allocation_sites: FxHashSet<NodeId>,
    escaped_pointers: FxHashSet<NodeId>,
    pointer_copies: FxHashMap<NodeId, NodeId>,
    store_to_loads: FxHashMap<NodeId, BTreeSet<NodeId>>,
    load_to_stores: FxHashMap<NodeId, BTreeSet<NodeId>>,
    all_stores: FxHashSet<NodeId>,
    all_loads: FxHashSet<NodeId>,
}

impl AnalysisResult for LocalAliasResult {
    fn invalidated_by(&self, _transform: PassId) -> bool {
        // any transform may move or delete memory operations
        true
    }
}

impl LocalAliasResult {
    pub fn add_location(&mut self, ptr: NodeId, loc: MemoryLocation) {
        self.memory_locations.insert(ptr, loc);
    }

    pub fn location(&self, ptr: NodeId) -> Option<&MemoryLocation> {
        self.memory_locations
            .get(&ptr)
            .or_else(|| self.memory_locations.get(&self.pointer_source(ptr)))
    }

    pub fn add_allocation_site(&mut self, node: NodeId) {
        self.allocation_sites.insert(node);
    }

    pub fn is_allocation_site(&self, node: NodeId) -> bool {
        self.allocation_sites.contains(&node)
    }

    pub fn mark_escaped(&mut self, ptr: NodeId) {
        self.escaped_pointers.insert(ptr);
    }

    /// Whether a pointer (or the source of its copy chain) escapes the
    /// function.
    pub fn has_escaped(&self, ptr: NodeId) -> bool {
        self.escaped_pointers.contains(&ptr)
            || self.escaped_pointers.contains(&self.pointer_source(ptr))
    }

    pub fn add_pointer_copy(&mut self, dest: NodeId, src: NodeId) {
        self.pointer_copies.insert(dest, src);
    }

    /// Ultimate source of a pointer through copy chains.
    pub fn pointer_source(&self, ptr: NodeId) -> NodeId {
        let mut current = ptr;
        let mut seen = 0usize;
        while let Some(&src) = self.pointer_copies.get(&current) {
            current = src;
            seen += 1;
            if seen > self.pointer_copies.len() {
                break;
            }
        }
        current
    }

    pub fn add_store_operation(&mut self, store: NodeId) {
        self.all_stores.insert(store);
    }

    pub fn add_load_operation(&mut self, load: NodeId) {
        self.all_loads.insert(load);
    }

    pub fn add_store_load_relation(&mut self, store: NodeId, load: NodeId) {
        self.store_to_loads.entry(store).or_default().insert(load);
        self.load_to_stores.entry(load).or_default().insert(store);
    }

    /// Stores that may modify the location a load reads, in id order.
    pub fn affecting_stores(&self, load: NodeId) -> Vec<NodeId> {
        self.load_to_stores
            .get(&load)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Loads that may observe a store, in id order.
    pub fn affected_loads(&self, store: NodeId) -> Vec<NodeId> {
        self.store_to_loads
            .get(&store)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn maybe_modified_by(&self, load: NodeId, store: NodeId) -> bool {
        self.load_to_stores
            .get(&load)
            .is_some_and(|stores| stores.contains(&store))
    }

    pub fn all_loads(&self) -> &FxHashSet<NodeId> {
        &self.all_loads
    }

    pub fn all_stores(&self) -> &FxHashSet<NodeId> {
        &self.all_stores
    }

    /// Decide the alias relationship of two pointers by comparing resolved
    /// sources and (base, offset, size) tuples.
    pub fn alias(&self, a: NodeId, b: NodeId) -> AliasVerdict {
        if a == b {
            return AliasVerdict::Must;
        }

        let src_a = self.pointer_source(a);
        let src_b = self.pointer_source(b);
        let loc_a = self.location(a);
        let loc_b = self.location(b);

        match (loc_a, loc_b) {
            (Some(la), Some(lb)) if la.base == lb.base => {
                if la.offset < 0 || lb.offset < 0 || la.size == 0 || lb.size == 0 {
                    return AliasVerdict::May;
                }
                if la.offset == lb.offset && la.size == lb.size {
                    return AliasVerdict::Must;
                }
                let a_end = la.offset + la.size as i64;
                let b_end = lb.offset + lb.size as i64;
                if a_end <= lb.offset || b_end <= la.offset {
                    return AliasVerdict::No;
                }
                AliasVerdict::Partial
            }
            _ => {
                if src_a == src_b {
                    // copies of the same pointer with no finer location info
                    return AliasVerdict::Must;
                }
                AliasVerdict::May
            }
        }
    }

    pub fn may_alias(&self, a: NodeId, b: NodeId) -> bool {
        !matches!(self.alias(a, b), AliasVerdict::No)
    }

    pub fn must_alias(&self, a: NodeId, b: NodeId) -> bool {
        self.alias(a, b) == AliasVerdict::Must
    }
}

/// Analysis pass producing a [`LocalAliasResult`] per module.
#[derive(Debug, Default)]
pub struct LocalAliasAnalysisPass;

impl Pass for LocalAliasAnalysisPass {
    fn id(&self) -> PassId {
        LOCAL_ALIAS_ANALYSIS
    }

    fn name(&self) -> &'static str {
        "local-alias-analysis"
    }

    fn description(&self) -> &'static str {
        "analyzes pointer relationships and escape behavior within function boundaries"
    }

    fn is_analysis(&self) -> bool {
        true
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        run_analysis(self, ir, ctx)
    }
}

impl AnalysisPass for LocalAliasAnalysisPass {
    fn analyze(&mut self, ir: &Context, ctx: &PassContext) -> Option<Box<dyn AnalysisResult>> {
        let mut result = LocalAliasResult::default();
        let module = ctx.module();

        let functions = ir.module(module).functions.clone();
        for func in functions {
            if let Some(body) = ir.function_body(module, func) {
                self.analyze_function(ir, module, body, &mut result);
            }
        }

        self.perform_escape_analysis(&mut result);
        self.analyze_store_load_relations(ir, &mut result);
        Some(Box::new(result))
    }
}

impl LocalAliasAnalysisPass {
    fn analyze_function(
        &self,
        ir: &Context,
        module: ModuleId,
        body: RegionId,
        result: &mut LocalAliasResult,
    ) {
        for region in ir.region_subtree(body) {
            for &node in &ir.region(region).nodes {
                self.analyze_node(ir, module, node, result);
            }
        }
    }

    fn analyze_node(
        &self,
        ir: &Context,
        _module: ModuleId,
        node: NodeId,
        result: &mut LocalAliasResult,
    ) {
        let op = ir.node(node).op;
        match op {
            NodeOp::StackAlloc | NodeOp::HeapAlloc => self.handle_allocation(ir, node, result),
            NodeOp::AddrOf => self.handle_address_of(ir, node, result),
            NodeOp::PtrAdd => self.handle_pointer_arithmetic(ir, node, result),
            NodeOp::ReinterpretCast => self.handle_cast(ir, node, result),
            NodeOp::Param => self.handle_parameter(ir, node, result),
            NodeOp::Load | NodeOp::PtrLoad | NodeOp::AtomicLoad => {
                result.add_load_operation(node);
                if ir.node(node).ty.is_pointer() {
                    // a loaded pointer could point anywhere
                    result.add_location(node, MemoryLocation { base: node, offset: -1, size: 0 });
                }
            }
            NodeOp::Store | NodeOp::PtrStore | NodeOp::AtomicStore => {
                result.add_store_operation(node);
                self.handle_store(ir, node, result);
            }
            NodeOp::Call | NodeOp::Invoke => self.handle_function_call(ir, node, result),
            NodeOp::Ret => self.handle_return(ir, node, result),
            _ => {}
        }
    }

    fn handle_allocation(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        let size = match ir.node(node).op {
            NodeOp::StackAlloc => ir
                .pointee_of(ir.node(node).ty)
                .map_or(0, |p| ir.types().size_of(p)),
            _ => ir
                .node(node)
                .inputs
                .first()
                .and_then(|&sz| Self::integer_literal(ir, sz))
                .map_or(0, |v| v as u64),
        };
        result.add_allocation_site(node);
        result.add_location(node, MemoryLocation { base: node, offset: 0, size });
    }

    fn handle_address_of(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        let Some(&target) = ir.node(node).inputs.first() else {
            return;
        };
        let base = result.pointer_source(target);
        let size = ir
            .pointee_of(ir.node(node).ty)
            .map_or_else(|| ir.types().size_of(ir.node(target).ty), |p| ir.types().size_of(p));
        result.add_location(node, MemoryLocation { base, offset: 0, size });
    }

    fn handle_pointer_arithmetic(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        let inputs = &ir.node(node).inputs;
        let (Some(&base), Some(&offset)) = (inputs.first(), inputs.get(1)) else {
            return;
        };

        let access_size = ir
            .pointee_of(ir.node(node).ty)
            .map_or(0, |p| ir.types().size_of(p));

        if let Some(constant) = Self::integer_literal(ir, offset) {
            if let Some(base_loc) = result.location(base).copied() {
                let displaced = if base_loc.offset < 0 {
                    -1
                } else {
                    base_loc.offset + constant
                };
                result.add_location(
                    node,
                    MemoryLocation {
                        base: base_loc.base,
                        offset: displaced,
                        size: access_size,
                    },
                );
                return;
            }
        }

        // unknown offset or untracked base: bottom
        let src = result.pointer_source(base);
        result.add_location(node, MemoryLocation { base: src, offset: -1, size: 0 });
    }

    fn handle_cast(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        let Some(&input) = ir.node(node).inputs.first() else {
            return;
        };
        result.add_pointer_copy(node, input);
        if let Some(loc) = result.location(input).copied() {
            result.add_location(node, loc);
        }
    }

    fn handle_parameter(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        if !ir.node(node).ty.is_pointer() {
            return;
        }
        // pointer parameters arrive from outside the function
        result.add_location(node, MemoryLocation { base: node, offset: -1, size: 0 });
        result.mark_escaped(node);
    }

    fn handle_store(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        let Some(&value) = ir.node(node).inputs.first() else {
            return;
        };
        if ir.node(value).ty.is_pointer() {
            // storing a pointer publishes it
            let src = result.pointer_source(value);
            result.mark_escaped(src);
        }
    }

    fn handle_function_call(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        let inputs = &ir.node(node).inputs;
        let args: &[NodeId] = if ir.node(node).op == NodeOp::Invoke && inputs.len() >= 3 {
            &inputs[1..inputs.len() - 2]
        } else if inputs.len() > 1 {
            &inputs[1..]
        } else {
            &[]
        };

        for &arg in args {
            if ir.node(arg).ty.is_pointer() {
                let src = result.pointer_source(arg);
                result.mark_escaped(src);
                result.mark_escaped(arg);
            }
        }
    }

    fn handle_return(&self, ir: &Context, node: NodeId, result: &mut LocalAliasResult) {
        if let Some(&value) = ir.node(node).inputs.first() {
            if ir.node(value).ty.is_pointer() {
                let src = result.pointer_source(value);
                result.mark_escaped(src);
                result.mark_escaped(value);
            }
        }
    }

    /// Fixed point: escapes flow both ways across copy chains and from a
    /// derived pointer to its base location (and back).
    fn perform_escape_analysis(&self, result: &mut LocalAliasResult) {
        loop {
            let mut changed = false;
            let copies: Vec<(NodeId, NodeId)> = result
                .pointer_copies
                .iter()
                .map(|(&d, &s)| (d, s))
                .collect();
            for (dest, src) in copies {
                if result.escaped_pointers.contains(&src)
                    && result.escaped_pointers.insert(dest)
                {
                    changed = true;
                }
                if result.escaped_pointers.contains(&dest)
                    && result.escaped_pointers.insert(src)
                {
                    changed = true;
                }
            }

            let located: Vec<(NodeId, NodeId)> = result
                .memory_locations
                .iter()
                .map(|(&ptr, loc)| (ptr, loc.base))
                .collect();
            for (ptr, base) in located {
                if ptr == base {
                    continue;
                }
                if result.escaped_pointers.contains(&base)
                    && result.escaped_pointers.insert(ptr)
                {
                    changed = true;
                }
                if result.escaped_pointers.contains(&ptr)
                    && result.escaped_pointers.insert(base)
                {
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }

    /// Relate every store to every load whose address it may modify.
    fn analyze_store_load_relations(&self, ir: &Context, result: &mut LocalAliasResult) {
        let mut stores: Vec<NodeId> = result.all_stores.iter().copied().collect();
        let mut loads: Vec<NodeId> = result.all_loads.iter().copied().collect();
        stores.sort_unstable();
        loads.sort_unstable();

        let mut related = Vec::new();
        for &store in &stores {
            let Some(saddr) = store_address(ir, store) else {
                continue;
            };
            for &load in &loads {
                let Some(laddr) = memory_address(ir, load) else {
                    continue;
                };
                if result.may_alias(saddr, laddr) {
                    related.push((store, load));
                }
            }
        }
        for (store, load) in related {
            result.add_store_load_relation(store, load);
        }
    }

    fn integer_literal(ir: &Context, node: NodeId) -> Option<i64> {
        if ir.node(node).op != NodeOp::Lit {
            return None;
        }
        match &ir.node(node).data {
            TypedData::None | TypedData::String(_) | TypedData::Atomic { .. } => None,
            data => data.as_i64(),
        }
    }
}

/// Address operand of a store node: inputs = [value, address].
pub fn store_address(ir: &Context, store: NodeId) -> Option<NodeId> {
    let n = ir.node(store);
    if n.op.is_store() {
        n.inputs.get(1).copied()
    } else {
        None
    }
}

/// Address operand of any memory operation.
pub fn memory_address(ir: &Context, mem_op: NodeId) -> Option<NodeId> {
    let n = ir.node(mem_op);
    if n.op.is_load() {
        n.inputs.first().copied()
    } else if n.op.is_store() {
        n.inputs.get(1).copied()
    } else {
        None
    }
}
