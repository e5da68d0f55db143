//! # Function Specialization
//!
//! Clones a function for a set of constant arguments: the clone's
//! parameters are replaced by fresh literals, the constant positions are
//! dropped from its signature and from redirected call sites, and the
//! clone's name is derived deterministically from the original name plus a
//! hash of the specialized arguments. Identical requests reuse the cached
//! clone.

use crate::foundation::{
    Context, ModuleId, NodeId, NodeOp, RegionId, Type, TypeData, TypedData,
};
use rustc_hash::FxHashMap;

/// Lattice value for constant-argument reasoning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatticeValue {
    /// Undefined / unknown
    Top,
    /// Known constant
    Constant(TypedData),
    /// Not constant; multiple values possible
    Bottom,
}

impl LatticeValue {
    pub fn is_constant(&self) -> bool {
        matches!(self, LatticeValue::Constant(_))
    }

    pub fn is_top(&self) -> bool {
        matches!(self, LatticeValue::Top)
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, LatticeValue::Bottom)
    }

    pub fn constant(&self) -> Option<&TypedData> {
        match self {
            LatticeValue::Constant(v) => Some(v),
            _ => None,
        }
    }
}

/// A request to specialize `original` for the given constant parameters.
#[derive(Debug, Clone)]
pub struct SpecializationRequest {
    /// Original function to specialize
    pub original: NodeId,
    /// (parameter index, constant value) pairs
    pub specialized_params: Vec<(usize, LatticeValue)>,
    /// Call sites that would benefit
    pub call_sites: Vec<NodeId>,
    /// Estimated benefit score
    pub benefit_score: f64,
}

impl SpecializationRequest {
    pub fn constant_parameter_count(&self) -> usize {
        self.specialized_params.len()
    }

    pub fn is_specialized_parameter(&self, index: usize) -> bool {
        self.specialized_params.iter().any(|(i, _)| *i == index)
    }

    pub fn specialized_value(&self, index: usize) -> Option<&LatticeValue> {
        self.specialized_params
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, v)| v)
    }
}

/// Creates and caches specialized function clones.
#[derive(Debug)]
pub struct FunctionSpecializer {
    cache: FxHashMap<u64, NodeId>,
    max_call_sites: usize,
    max_function_size: usize,
    min_benefit_threshold: f64,
    min_constant_args: usize,
}

impl Default for FunctionSpecializer {
    fn default() -> Self {
        FunctionSpecializer {
            cache: FxHashMap::default(),
            max_call_sites: 8,
            max_function_size: 100,
            min_benefit_threshold: 2.0,
            min_constant_args: 1,
        }
    }
}

impl FunctionSpecializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_call_sites(&mut self, max: usize) {
        self.max_call_sites = max;
    }

    pub fn set_max_function_size(&mut self, max: usize) {
        self.max_function_size = max;
    }

    pub fn set_min_benefit_threshold(&mut self, threshold: f64) {
        self.min_benefit_threshold = threshold;
    }

    /// Profitability gate: enough benefit, few enough call sites, small
    /// enough function, at least one constant argument.
    pub fn should_specialize(
        &self,
        ir: &Context,
        req: &SpecializationRequest,
        modules: &[ModuleId],
    ) -> bool {
        req.benefit_score >= self.min_benefit_threshold
            && req.call_sites.len() <= self.max_call_sites
            && estimate_function_size(ir, req.original, modules) <= self.max_function_size
            && req.constant_parameter_count() >= self.min_constant_args
    }

    /// Base 1.0 + 2.0 per constant parameter + 0.5 per call site, with
    /// static bonuses when a specialized parameter steers a branch or call.
    pub fn calculate_benefit_score(
        ir: &Context,
        req: &SpecializationRequest,
        modules: &[ModuleId],
    ) -> f64 {
        let mut score = 1.0
            + 2.0 * req.constant_parameter_count() as f64
            + 0.5 * req.call_sites.len() as f64;

        let Some((module, _)) = find_function_module(ir, req.original, modules) else {
            return score;
        };
        let Some(body) = ir.function_body(module, req.original) else {
            return score;
        };

        for region in ir.region_subtree(body) {
            for &node in &ir.region(region).nodes {
                let n = ir.node(node);
                if n.op != NodeOp::Param {
                    continue;
                }
                let Some(index) = param_index(ir, node) else {
                    continue;
                };
                if !req.is_specialized_parameter(index) {
                    continue;
                }
                for &user in &n.users {
                    match ir.node(user).op {
                        // a constant branch condition folds a whole path
                        NodeOp::Branch => score += 1.0,
                        NodeOp::Call | NodeOp::Invoke => score += 0.5,
                        op if op.is_comparison() => score += 0.5,
                        _ => {}
                    }
                }
            }
        }
        score
    }

    /// Create (or fetch from cache) the specialized clone of a function.
    pub fn specialize_function(
        &mut self,
        ir: &mut Context,
        req: &SpecializationRequest,
        target_module: ModuleId,
        modules: &[ModuleId],
    ) -> Option<NodeId> {
        if req.specialized_params.is_empty() {
            return None;
        }
        let key = specialization_key(req);
        if let Some(&cached) = self.cache.get(&key) {
            return Some(cached);
        }

        let (source_module, _) = find_function_module(ir, req.original, modules)?;
        let source_body = ir.function_body(source_module, req.original)?;

        // deterministic fresh name from the original plus the argument hash
        let original_name = ir.str(ir.node(req.original).str_id).to_string();
        let clone_name = format!("{original_name}.__spec_{key:08x}");

        // fresh function node with the constant positions dropped
        let clone_ty = reduced_function_type(ir, req)?;
        let clone = ir.create_node(NodeOp::Function, clone_ty);
        let name_id = ir.intern(&clone_name);
        let original_props = ir.node(req.original).props;
        ir.node_mut(clone).str_id = name_id;
        ir.node_mut(clone).props = original_props;
        let target_root = ir.module(target_module).root;
        ir.append_node(target_root, clone);
        ir.add_function(target_module, clone);

        // deep clone of the body region tree
        let mut mapping: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        let cloned_body =
            clone_region_tree(ir, source_body, target_module, None, &clone_name, &mut mapping);
        relink_clone(ir, &mapping);

        substitute_parameters(ir, cloned_body, req, &mapping);

        self.cache.insert(key, clone);
        Some(clone)
    }

    /// Redirect call sites to the clone, dropping the now-constant argument
    /// positions. Returns the number of redirected sites.
    pub fn redirect_call_sites(
        ir: &mut Context,
        req: &SpecializationRequest,
        call_sites: &[NodeId],
        specialized: NodeId,
    ) -> usize {
        let mut redirected = 0;
        for &call in call_sites {
            let op = ir.node(call).op;
            if !op.is_call() || ir.node(call).inputs.is_empty() {
                continue;
            }

            // swap the function operand
            let old_callee = ir.node(call).inputs[0];
            ir.node_mut(call).inputs[0] = specialized;
            ir.node_mut(old_callee).users.retain(|&u| u != call);
            if !ir.node(specialized).users.contains(&call) {
                ir.node_mut(specialized).users.push(call);
            }

            // argument slots start after the callee; invoke keeps its
            // trailing normal/exception operands
            let arg_end = if op == NodeOp::Invoke {
                ir.node(call).inputs.len().saturating_sub(2)
            } else {
                ir.node(call).inputs.len()
            };

            let mut drop_positions: Vec<usize> = req
                .specialized_params
                .iter()
                .map(|(i, _)| 1 + i)
                .filter(|&p| p < arg_end)
                .collect();
            drop_positions.sort_unstable_by(|a, b| b.cmp(a));
            for pos in drop_positions {
                let arg = ir.node_mut(call).inputs.remove(pos);
                let still_used = ir.node(call).inputs.contains(&arg);
                if !still_used {
                    ir.node_mut(arg).users.retain(|&u| u != call);
                }
            }

            redirected += 1;
        }
        redirected
    }
}

/// Deterministic cache key over the original function and its specialized
/// (index, value) pairs.
fn specialization_key(req: &SpecializationRequest) -> u64 {
    let mut lo = crc32fast::Hasher::new();
    let mut hi = crc32fast::Hasher::new_with_initial(0xC2B2_AE35);
    lo.update(&req.original.0.to_le_bytes());
    hi.update(&req.original.0.to_le_bytes());
    for (index, value) in &req.specialized_params {
        let bytes = match value {
            LatticeValue::Constant(data) => data.hash_bytes(),
            LatticeValue::Top => vec![0xF0],
            LatticeValue::Bottom => vec![0xF1],
        };
        lo.update(&(*index as u64).to_le_bytes());
        lo.update(&bytes);
        hi.update(&bytes);
        hi.update(&(*index as u64).to_le_bytes());
    }
    (u64::from(hi.finalize()) << 32) | u64::from(lo.finalize())
}

/// The clone's signature: the original function type minus the specialized
/// parameter positions.
fn reduced_function_type(ir: &mut Context, req: &SpecializationRequest) -> Option<Type> {
    let original_ty = ir.node(req.original).ty;
    let (ret, params, is_vararg) = match ir.get_type(original_ty) {
        Ok(TypeData::Function { ret, params, is_vararg }) => (*ret, params.clone(), *is_vararg),
        _ => return None,
    };
    let kept: Vec<Type> = params
        .iter()
        .enumerate()
        .filter(|(i, _)| !req.is_specialized_parameter(*i))
        .map(|(_, &t)| t)
        .collect();
    ir.create_function_type(ret, kept, is_vararg).ok()
}

/// First pass of the deep clone: fresh regions and fresh nodes with the
/// same ops, types and data, recording the old-to-new node mapping.
fn clone_region_tree(
    ir: &mut Context,
    source: RegionId,
    target_module: ModuleId,
    parent: Option<RegionId>,
    name_override: &str,
    mapping: &mut FxHashMap<NodeId, NodeId>,
) -> RegionId {
    let name = if parent.is_none() {
        name_override.to_string()
    } else {
        ir.region_name(source).to_string()
    };
    let target_parent = parent.or_else(|| Some(ir.module(target_module).root));
    let cloned = ir.create_region(target_module, &name, target_parent);

    for node in ir.region(source).nodes.clone() {
        let (op, ty, data, str_id, props) = {
            let n = ir.node(node);
            (n.op, n.ty, n.data.clone(), n.str_id, n.props)
        };
        let fresh = ir.create_node(op, ty);
        let f = ir.node_mut(fresh);
        f.data = data;
        f.str_id = str_id;
        f.props = props;
        ir.append_node(cloned, fresh);
        mapping.insert(node, fresh);
    }

    for child in ir.region(source).children.clone() {
        clone_region_tree(ir, child, target_module, Some(cloned), name_override, mapping);
    }
    cloned
}

/// Second pass: re-link inputs and users through the mapping. Operands
/// outside the clone (globals, rodata literals, function references) stay
/// as-is.
fn relink_clone(ir: &mut Context, mapping: &FxHashMap<NodeId, NodeId>) {
    let mut pairs: Vec<(NodeId, NodeId)> = mapping.iter().map(|(&o, &n)| (o, n)).collect();
    pairs.sort_unstable();
    for (old, new) in pairs {
        for input in ir.node(old).inputs.clone() {
            let resolved = mapping.get(&input).copied().unwrap_or(input);
            ir.add_input(new, resolved);
        }
    }
}

/// Replace each specialized parameter with a literal carrying the lattice
/// constant, removing the parameter node from the clone.
fn substitute_parameters(
    ir: &mut Context,
    cloned_body: RegionId,
    req: &SpecializationRequest,
    mapping: &FxHashMap<NodeId, NodeId>,
) {
    let mut params: Vec<(usize, NodeId)> = Vec::new();
    for (&old, &new) in mapping {
        if ir.node(new).op == NodeOp::Param {
            if let Some(index) = param_index(ir, old) {
                params.push((index, new));
            }
        }
    }
    params.sort_unstable();

    for (index, param) in params {
        let Some(LatticeValue::Constant(value)) = req.specialized_value(index).cloned() else {
            continue;
        };
        let lit = ir.create_node(NodeOp::Lit, ir.node(param).ty);
        ir.node_mut(lit).data = value;

        let region = ir.node(param).parent_region.unwrap_or(cloned_body);
        ir.insert_node_before(region, param, lit);
        ir.replace_all_uses(param, lit);
        ir.erase_node(param);
    }
}

/// Parameter position, stored in the param node's data payload.
pub fn param_index(ir: &Context, param: NodeId) -> Option<usize> {
    match ir.node(param).data {
        TypedData::U32(i) => Some(i as usize),
        _ => None,
    }
}

/// Which module holds a function, along with its index in that module's
/// function list.
pub fn find_function_module(
    ir: &Context,
    func: NodeId,
    modules: &[ModuleId],
) -> Option<(ModuleId, usize)> {
    for &module in modules {
        if let Some(pos) = ir.module(module).functions.iter().position(|&f| f == func) {
            return Some((module, pos));
        }
    }
    None
}

/// Node count of a function's body region tree.
pub fn estimate_function_size(ir: &Context, func: NodeId, modules: &[ModuleId]) -> usize {
    for &module in modules {
        if let Some(body) = ir.function_body(module, func) {
            return ir.subtree_node_count(body);
        }
    }
    0
}
