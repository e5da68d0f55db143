//! # Context
//!
//! Process-wide owner of all IR. Entities live in typed-index arenas
//! (`Vec` per kind) and are referred to by stable `u32` id newtypes; nothing
//! the context owns is freed before the context itself is dropped. Removing
//! a node from a region only detaches it.
//!
//! Every mutation that touches operand lists goes through the helpers here
//! so the def-use invariant holds at all times: for every node X and every
//! Y in X.inputs, X is in Y.users, and symmetrically.

use crate::foundation::error::{IrError, IrResult};
use crate::foundation::module::{Module, RODATA_NAME};
use crate::foundation::node::{Node, NodeOp, NodeProps};
use crate::foundation::region::Region;
use crate::foundation::strings::{StrId, StringTable};
use crate::foundation::typed_data::TypedData;
use crate::foundation::types::{Type, TypeData, TypeRegistry};
use rustc_hash::FxHashMap;

/// Stable index of a node in the context arena.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Stable index of a region in the context arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

/// Stable index of a module in the context arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ModuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Owner of all IR entities.
#[derive(Debug)]
pub struct Context {
    nodes: Vec<Node>,
    regions: Vec<Region>,
    modules: Vec<Module>,
    module_map: FxHashMap<StrId, ModuleId>,
    strings: StringTable,
    types: TypeRegistry,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Context {
            nodes: Vec::new(),
            regions: Vec::new(),
            modules: Vec::new(),
            module_map: FxHashMap::default(),
            strings: StringTable::new(),
            types: TypeRegistry::new(),
        }
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    pub fn intern(&mut self, s: &str) -> StrId {
        self.strings.intern(s)
    }

    pub fn str(&self, id: StrId) -> &str {
        self.strings.get(id)
    }

    pub fn string_table(&self) -> &StringTable {
        &self.strings
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn register_type(&mut self, data: TypeData) -> IrResult<Type> {
        self.types.register_type(data)
    }

    pub fn create_pointer_type(&mut self, pointee: Type, addr_space: u32) -> IrResult<Type> {
        self.types.create_pointer_type(pointee, addr_space)
    }

    pub fn create_array_type(&mut self, elem: Type, count: u64) -> IrResult<Type> {
        self.types.create_array_type(elem, count)
    }

    pub fn create_struct_type(
        &mut self,
        fields: Vec<(StrId, Type)>,
        size: u32,
        align: u32,
    ) -> IrResult<Type> {
        self.types.create_struct_type(fields, size, align)
    }

    pub fn create_function_type(
        &mut self,
        ret: Type,
        params: Vec<Type>,
        is_vararg: bool,
    ) -> IrResult<Type> {
        self.types.create_function_type(ret, params, is_vararg)
    }

    pub fn create_vector_type(&mut self, elem: Type, count: u32) -> IrResult<Type> {
        self.types.create_vector_type(elem, count)
    }

    pub fn get_type(&self, ty: Type) -> IrResult<&TypeData> {
        self.types.get_type(ty)
    }

    /// Pointee type of a pointer, or `None` for non-pointers.
    pub fn pointee_of(&self, ty: Type) -> Option<Type> {
        match self.types.get_type(ty) {
            Ok(TypeData::Pointer { pointee, .. }) => Some(*pointee),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// Create a module. Module names are unique within a context.
    pub fn create_module(&mut self, name: &str) -> IrResult<ModuleId> {
        let name_id = self.intern(name);
        if self.module_map.contains_key(&name_id) {
            return Err(IrError::ModuleExists(name.to_string()));
        }

        let module_id = ModuleId(self.modules.len() as u32);
        // the module must exist before its regions can name it
        self.modules.push(Module {
            name: name_id,
            root: RegionId(0),
            rodata: RegionId(0),
            regions: Vec::new(),
            functions: Vec::new(),
        });

        let root = self.alloc_region(name_id, module_id, None);
        let rodata_name = self.intern(RODATA_NAME);
        let rodata = self.alloc_region(rodata_name, module_id, None);

        let module = &mut self.modules[module_id.index()];
        module.root = root;
        module.rodata = rodata;
        self.module_map.insert(name_id, module_id);
        Ok(module_id)
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.module_map
            .iter()
            .find(|(&name_id, _)| self.strings.get(name_id) == name)
            .map(|(_, &module_id)| module_id)
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.index()]
    }

    pub fn modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
        (0..self.modules.len() as u32).map(ModuleId)
    }

    pub fn module_name(&self, id: ModuleId) -> &str {
        self.strings.get(self.modules[id.index()].name)
    }

    /// Register a function node with a module.
    pub fn add_function(&mut self, module: ModuleId, func: NodeId) {
        if self.node(func).op == NodeOp::Function {
            self.modules[module.index()].functions.push(func);
        }
    }

    /// Find a function by name; O(n) over the module's function list.
    pub fn find_function(&self, module: ModuleId, name: &str) -> Option<NodeId> {
        self.modules[module.index()]
            .functions
            .iter()
            .copied()
            .find(|&f| self.node(f).op == NodeOp::Function && self.str(self.node(f).str_id) == name)
    }

    /// Intern a string literal into the module's read-only data region.
    /// Idempotent: the same byte sequence returns the same node.
    pub fn intern_string_literal(&mut self, module: ModuleId, s: &str) -> NodeId {
        let rodata = self.modules[module.index()].rodata;
        for &node_id in &self.regions[rodata.index()].nodes {
            let node = &self.nodes[node_id.index()];
            if node.op == NodeOp::Lit
                && node.ty == Type::STRING
                && node.data.as_str() == Some(s)
            {
                return node_id;
            }
        }

        let lit = self.create_node(NodeOp::Lit, Type::STRING);
        self.nodes[lit.index()].data = TypedData::String(s.to_string());
        self.nodes[lit.index()].props |= NodeProps::READONLY;
        self.append_node(rodata, lit);
        lit
    }

    // ------------------------------------------------------------------
    // Regions
    // ------------------------------------------------------------------

    /// Create a region in a module. With no parent given, the region is
    /// parented to the module root.
    pub fn create_region(
        &mut self,
        module: ModuleId,
        name: &str,
        parent: Option<RegionId>,
    ) -> RegionId {
        let name_id = self.intern(name);
        let parent = parent.or(Some(self.modules[module.index()].root));
        let region = self.alloc_region(name_id, module, parent);
        if let Some(p) = parent {
            self.regions[p.index()].children.push(region);
        }
        region
    }

    fn alloc_region(&mut self, name: StrId, module: ModuleId, parent: Option<RegionId>) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Region::new(name, module, parent));
        self.modules[module.index()].regions.push(id);
        id
    }

    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    pub fn region_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.regions[id.index()]
    }

    pub fn region_name(&self, id: RegionId) -> &str {
        self.strings.get(self.regions[id.index()].name)
    }

    /// A region is terminated iff its last node is a terminator.
    pub fn region_is_terminated(&self, id: RegionId) -> bool {
        self.regions[id.index()]
            .last_node()
            .is_some_and(|n| self.nodes[n.index()].op.is_terminator())
    }

    /// Detach a region from its parent's child list. The region itself stays
    /// in the arena.
    pub fn detach_region(&mut self, id: RegionId) {
        if let Some(parent) = self.regions[id.index()].parent {
            self.regions[parent.index()].children.retain(|&c| c != id);
        }
        self.regions[id.index()].parent = None;
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Allocate a detached node. Attach it with `append_node` or one of the
    /// insert helpers.
    pub fn create_node(&mut self, op: NodeOp, ty: Type) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            op,
            ty,
            ..Node::default()
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a node to a region's node list.
    pub fn append_node(&mut self, region: RegionId, node: NodeId) {
        if self.regions[region.index()].nodes.contains(&node) {
            return;
        }
        self.regions[region.index()].nodes.push(node);
        self.nodes[node.index()].parent_region = Some(region);
    }

    /// Insert a node at the beginning of a region.
    pub fn prepend_node(&mut self, region: RegionId, node: NodeId) {
        if self.regions[region.index()].nodes.contains(&node) {
            return;
        }
        self.regions[region.index()].nodes.insert(0, node);
        self.nodes[node.index()].parent_region = Some(region);
    }

    /// Insert `node` before `before` in the region, appending if `before`
    /// is not found.
    pub fn insert_node_before(&mut self, region: RegionId, before: NodeId, node: NodeId) {
        if self.regions[region.index()].nodes.contains(&node) {
            return;
        }
        let pos = self.regions[region.index()].nodes.iter().position(|&n| n == before);
        match pos {
            Some(i) => {
                self.regions[region.index()].nodes.insert(i, node);
                self.nodes[node.index()].parent_region = Some(region);
            }
            None => self.append_node(region, node),
        }
    }

    /// Insert `node` after `after` in the region, appending if `after` is
    /// not found.
    pub fn insert_node_after(&mut self, region: RegionId, after: NodeId, node: NodeId) {
        if self.regions[region.index()].nodes.contains(&node) {
            return;
        }
        let pos = self.regions[region.index()].nodes.iter().position(|&n| n == after);
        match pos {
            Some(i) => {
                self.regions[region.index()].nodes.insert(i + 1, node);
                self.nodes[node.index()].parent_region = Some(region);
            }
            None => self.append_node(region, node),
        }
    }

    /// Detach a node from its region. The node is not freed; the arena owns
    /// it until context teardown.
    pub fn remove_node_from_region(&mut self, node: NodeId) {
        if let Some(region) = self.nodes[node.index()].parent_region {
            self.regions[region.index()].nodes.retain(|&n| n != node);
            self.nodes[node.index()].parent_region = None;
        }
    }

    /// Append an operand, maintaining the def-use back-link.
    pub fn add_input(&mut self, node: NodeId, input: NodeId) {
        self.nodes[node.index()].inputs.push(input);
        if !self.nodes[input.index()].users.contains(&node) {
            self.nodes[input.index()].users.push(node);
        }
    }

    /// Remove `node` from the user lists of all its inputs and clear its
    /// operand list.
    pub fn unlink_inputs(&mut self, node: NodeId) {
        let inputs = std::mem::take(&mut self.nodes[node.index()].inputs);
        for input in inputs {
            self.nodes[input.index()].users.retain(|&u| u != node);
        }
    }

    /// Redirect every use of `old` to `new`, maintaining def-use links.
    pub fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let users = self.nodes[old.index()].users.clone();
        for user in users {
            let inputs = &mut self.nodes[user.index()].inputs;
            for slot in inputs.iter_mut() {
                if *slot == old {
                    *slot = new;
                }
            }
            if !self.nodes[new.index()].users.contains(&user) {
                self.nodes[new.index()].users.push(user);
            }
        }
        self.nodes[old.index()].users.clear();
    }

    /// Replace `old` with `new` in `old`'s slot of its region, redirect all
    /// users, transfer inputs when `new` has none, and fully unlink `old`.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> bool {
        let Some(region) = self.nodes[old.index()].parent_region else {
            return false;
        };
        let Some(pos) = self.regions[region.index()].nodes.iter().position(|&n| n == old)
        else {
            return false;
        };

        self.regions[region.index()].nodes[pos] = new;
        self.nodes[new.index()].parent_region = Some(region);
        self.nodes[old.index()].parent_region = None;

        self.replace_all_uses(old, new);

        // transfer operands when the replacement has none of its own
        if self.nodes[new.index()].inputs.is_empty() && !self.nodes[old.index()].inputs.is_empty() {
            let inputs = self.nodes[old.index()].inputs.clone();
            for input in &inputs {
                let users = &mut self.nodes[input.index()].users;
                if let Some(slot) = users.iter_mut().find(|u| **u == old) {
                    *slot = new;
                } else {
                    users.push(new);
                }
            }
            self.nodes[new.index()].inputs = inputs;
            self.nodes[old.index()].inputs.clear();
        } else {
            self.unlink_inputs(old);
        }

        true
    }

    /// Detach a node from its region and from the def-use web entirely.
    pub fn erase_node(&mut self, node: NodeId) {
        self.unlink_inputs(node);
        self.remove_node_from_region(node);
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    /// Regions targeted by a terminator node, discovered through the entry
    /// nodes in its control operand slots: jump slot 0; branch slots 1 and 2;
    /// invoke's final two slots.
    pub fn terminator_targets(&self, node: NodeId) -> Vec<RegionId> {
        let n = &self.nodes[node.index()];
        let mut targets = Vec::new();
        let push_entry = |targets: &mut Vec<RegionId>, id: NodeId| {
            let entry = &self.nodes[id.index()];
            if entry.op == NodeOp::Entry {
                if let Some(region) = entry.parent_region {
                    targets.push(region);
                }
            }
        };

        match n.op {
            NodeOp::Jump => {
                if let Some(&entry) = n.inputs.first() {
                    push_entry(&mut targets, entry);
                }
            }
            NodeOp::Branch => {
                if n.inputs.len() >= 3 {
                    push_entry(&mut targets, n.inputs[1]);
                    push_entry(&mut targets, n.inputs[2]);
                }
            }
            NodeOp::Invoke => {
                if n.inputs.len() >= 2 {
                    push_entry(&mut targets, n.inputs[n.inputs.len() - 2]);
                    push_entry(&mut targets, n.inputs[n.inputs.len() - 1]);
                }
            }
            _ => {}
        }
        targets
    }

    // ------------------------------------------------------------------
    // Dominance
    // ------------------------------------------------------------------

    /// Structural dominance. Parent regions dominate children unless an
    /// unstructured jump in `dominator` or any of its ancestors targets the
    /// candidate, in which case dominance is disproved pessimistically.
    pub fn region_dominates(&self, dominator: RegionId, dominated: RegionId) -> bool {
        if dominator == dominated {
            return true;
        }

        if self.has_unstructured_jumps_to(dominator, dominated) {
            return false;
        }

        let mut ancestor = self.regions[dominator.index()].parent;
        while let Some(a) = ancestor {
            if self.has_unstructured_jumps_to(a, dominated) {
                return false;
            }
            ancestor = self.regions[a.index()].parent;
        }

        self.region_dominates_via_tree(dominator, dominated)
    }

    /// Pure tree dominance: parent regions always dominate children. Unsound
    /// in the presence of unstructured jumps; use `region_dominates` unless
    /// the caller has ruled those out.
    pub fn region_dominates_via_tree(&self, dominator: RegionId, dominated: RegionId) -> bool {
        if dominator == dominated {
            return true;
        }
        let mut ancestor = self.regions[dominated.index()].parent;
        while let Some(a) = ancestor {
            if a == dominator {
                return true;
            }
            ancestor = self.regions[a.index()].parent;
        }
        false
    }

    /// Whether `region` holds a terminator targeting `target` outside the
    /// tree-dominance relation (an unstructured edge).
    fn has_unstructured_jumps_to(&self, region: RegionId, target: RegionId) -> bool {
        for &node in &self.regions[region.index()].nodes {
            if !self.nodes[node.index()].op.is_terminator() {
                continue;
            }
            for t in self.terminator_targets(node) {
                if t == target && !self.region_dominates_via_tree(region, target) {
                    return true;
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Function helpers
    // ------------------------------------------------------------------

    /// Find the body region of a function: the child of the module root
    /// whose name matches the function's name, searching recursively.
    pub fn function_body(&self, module: ModuleId, function: NodeId) -> Option<RegionId> {
        if self.node(function).op != NodeOp::Function {
            return None;
        }
        let name = self.node(function).str_id;
        self.find_region_by_name(self.modules[module.index()].root, name)
    }

    fn find_region_by_name(&self, region: RegionId, name: StrId) -> Option<RegionId> {
        if self.regions[region.index()].name == name {
            return Some(region);
        }
        for &child in &self.regions[region.index()].children {
            if let Some(found) = self.find_region_by_name(child, name) {
                return Some(found);
            }
        }
        None
    }

    /// All regions of a subtree, preorder.
    pub fn region_subtree(&self, root: RegionId) -> Vec<RegionId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(r) = stack.pop() {
            out.push(r);
            for &child in self.regions[r.index()].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Count the nodes of a region subtree.
    pub fn subtree_node_count(&self, root: RegionId) -> usize {
        self.region_subtree(root)
            .iter()
            .map(|&r| self.regions[r.index()].nodes.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_creation_builds_root_and_rodata() {
        let mut ctx = Context::new();
        let m = ctx.create_module("main").unwrap();
        let module = ctx.module(m);
        assert_ne!(module.root, module.rodata);
        assert!(ctx.region(module.root).is_global_scope());
        assert!(ctx.region(module.rodata).is_global_scope());
        assert_eq!(ctx.region_name(module.rodata), RODATA_NAME);
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let mut ctx = Context::new();
        ctx.create_module("m").unwrap();
        assert!(matches!(ctx.create_module("m"), Err(IrError::ModuleExists(_))));
    }

    #[test]
    fn test_def_use_links() {
        let mut ctx = Context::new();
        let a = ctx.create_node(NodeOp::Lit, Type::I32);
        let b = ctx.create_node(NodeOp::Lit, Type::I32);
        let add = ctx.create_node(NodeOp::Add, Type::I32);
        ctx.add_input(add, a);
        ctx.add_input(add, b);
        assert_eq!(ctx.node(add).inputs, vec![a, b]);
        assert!(ctx.node(a).users.contains(&add));
        assert!(ctx.node(b).users.contains(&add));

        ctx.unlink_inputs(add);
        assert!(ctx.node(a).users.is_empty());
        assert!(ctx.node(add).inputs.is_empty());
    }

    #[test]
    fn test_replace_all_uses() {
        let mut ctx = Context::new();
        let a = ctx.create_node(NodeOp::Lit, Type::I32);
        let b = ctx.create_node(NodeOp::Lit, Type::I32);
        let user = ctx.create_node(NodeOp::Add, Type::I32);
        ctx.add_input(user, a);
        ctx.add_input(user, a);
        ctx.replace_all_uses(a, b);
        assert_eq!(ctx.node(user).inputs, vec![b, b]);
        assert!(ctx.node(a).users.is_empty());
        assert_eq!(ctx.node(b).users, vec![user]);
    }

    #[test]
    fn test_tree_dominance() {
        let mut ctx = Context::new();
        let m = ctx.create_module("m").unwrap();
        let root = ctx.module(m).root;
        let outer = ctx.create_region(m, "outer", None);
        let inner = ctx.create_region(m, "inner", Some(outer));
        assert!(ctx.region_dominates_via_tree(root, inner));
        assert!(ctx.region_dominates_via_tree(outer, inner));
        assert!(!ctx.region_dominates_via_tree(inner, outer));
        assert!(ctx.region_dominates(outer, inner));
    }

    #[test]
    fn test_unstructured_jump_breaks_dominance() {
        let mut ctx = Context::new();
        let m = ctx.create_module("m").unwrap();
        let a = ctx.create_region(m, "a", None);
        let b = ctx.create_region(m, "b", None);

        // entry marker in b, and a sibling jump from a targeting it
        let entry = ctx.create_node(NodeOp::Entry, Type::VOID);
        ctx.append_node(b, entry);
        let jump = ctx.create_node(NodeOp::Jump, Type::VOID);
        ctx.add_input(jump, entry);
        ctx.append_node(a, jump);

        // a does not tree-dominate b, so the jump is unstructured and
        // disproves dominance of a over b
        assert!(!ctx.region_dominates(a, b));
    }

    #[test]
    fn test_string_literal_interning_is_idempotent() {
        let mut ctx = Context::new();
        let m = ctx.create_module("m").unwrap();
        let a = ctx.intern_string_literal(m, "hello");
        let b = ctx.intern_string_literal(m, "hello");
        let c = ctx.intern_string_literal(m, "world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(ctx.node(a).props.contains(NodeProps::READONLY));
        assert_eq!(ctx.node(a).parent_region, Some(ctx.module(m).rodata));
    }

    #[test]
    fn test_insert_before_and_remove() {
        let mut ctx = Context::new();
        let m = ctx.create_module("m").unwrap();
        let r = ctx.create_region(m, "r", None);
        let a = ctx.create_node(NodeOp::Lit, Type::I32);
        let b = ctx.create_node(NodeOp::Lit, Type::I32);
        let c = ctx.create_node(NodeOp::Lit, Type::I32);
        ctx.append_node(r, a);
        ctx.append_node(r, c);
        ctx.insert_node_before(r, c, b);
        assert_eq!(ctx.region(r).nodes, vec![a, b, c]);

        ctx.remove_node_from_region(b);
        assert_eq!(ctx.region(r).nodes, vec![a, c]);
        assert_eq!(ctx.node(b).parent_region, None);
    }
}
