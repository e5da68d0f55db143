//! # Call Graph
//!
//! Cross-module call graph. Direct calls (first input is a function node)
//! become precise edges; indirect calls through a known global function
//! value become single edges; any other indirect call conservatively fans
//! out to every EXPORT function, since those are address-takable.

use crate::foundation::{Context, ModuleId, NodeId, NodeOp, NodeProps, RegionId};
use crate::ipo::context::IpoPassContext;
use crate::ipo::pass::{IpoAnalysisResult, IpoPass};
use crate::pass::{PassId, PassResult};
use rustc_hash::{FxHashMap, FxHashSet};

/// Tag of the call graph analysis pass.
pub const CALL_GRAPH: PassId = PassId("call-graph-analysis");

/// One function in the call graph.
#[derive(Debug, Default)]
pub struct CallGraphNode {
    pub function: NodeId,
    pub callees: Vec<usize>,
    pub callers: Vec<usize>,
    /// Call/invoke nodes originating from this function
    pub call_sites: Vec<NodeId>,
}

/// The call graph over every function of every module.
#[derive(Debug, Default)]
pub struct CallGraph {
    nodes: Vec<CallGraphNode>,
    index: FxHashMap<NodeId, usize>,
}

impl CallGraph {
    pub fn nodes(&self) -> &[CallGraphNode] {
        &self.nodes
    }

    pub fn get(&self, function: NodeId) -> Option<&CallGraphNode> {
        self.index.get(&function).map(|&i| &self.nodes[i])
    }

    pub fn callees(&self, function: NodeId) -> Vec<NodeId> {
        self.get(function)
            .map(|n| n.callees.iter().map(|&i| self.nodes[i].function).collect())
            .unwrap_or_default()
    }

    pub fn callers(&self, function: NodeId) -> Vec<NodeId> {
        self.get(function)
            .map(|n| n.callers.iter().map(|&i| self.nodes[i].function).collect())
            .unwrap_or_default()
    }

    /// Whether `caller` has a direct edge to `callee`.
    pub fn calls(&self, caller: NodeId, callee: NodeId) -> bool {
        self.callees(caller).contains(&callee)
    }

    /// Functions with no callers.
    pub fn entry_points(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.callers.is_empty())
            .map(|n| n.function)
            .collect()
    }

    /// Functions with no callees.
    pub fn leaf_functions(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.callees.is_empty())
            .map(|n| n.function)
            .collect()
    }

    /// Whether the graph contains a call cycle.
    pub fn has_cycles(&self) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut in_stack = vec![false; self.nodes.len()];
        for i in 0..self.nodes.len() {
            if !visited[i] && self.dfs_has_cycle(i, &mut visited, &mut in_stack) {
                return true;
            }
        }
        false
    }

    /// Whether `from` can transitively reach `to` along call edges.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let Some(&start) = self.index.get(&from) else {
            return false;
        };
        let Some(&goal) = self.index.get(&to) else {
            return false;
        };
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            if i == goal {
                return true;
            }
            if visited[i] {
                continue;
            }
            visited[i] = true;
            stack.extend(self.nodes[i].callees.iter().copied());
        }
        false
    }

    /// Post-order traversal (callees before callers).
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        for i in 0..self.nodes.len() {
            if !visited[i] {
                self.dfs_post_order(i, &mut visited, &mut order);
            }
        }
        order
    }

    /// Reverse post-order traversal (callers before callees).
    pub fn reverse_post_order(&self) -> Vec<NodeId> {
        let mut order = self.post_order();
        order.reverse();
        order
    }

    pub fn total_edges(&self) -> usize {
        self.nodes.iter().map(|n| n.callees.len()).sum()
    }

    fn get_or_create(&mut self, function: NodeId) -> usize {
        if let Some(&i) = self.index.get(&function) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(CallGraphNode {
            function,
            ..CallGraphNode::default()
        });
        self.index.insert(function, i);
        i
    }

    fn add_edge(&mut self, caller: NodeId, callee: NodeId, call_site: NodeId) {
        let caller_idx = self.get_or_create(caller);
        let callee_idx = self.get_or_create(callee);
        if !self.nodes[caller_idx].callees.contains(&callee_idx) {
            self.nodes[caller_idx].callees.push(callee_idx);
        }
        if !self.nodes[callee_idx].callers.contains(&caller_idx) {
            self.nodes[callee_idx].callers.push(caller_idx);
        }
        self.nodes[caller_idx].call_sites.push(call_site);
    }

    fn dfs_has_cycle(&self, i: usize, visited: &mut [bool], in_stack: &mut [bool]) -> bool {
        visited[i] = true;
        in_stack[i] = true;
        for &callee in &self.nodes[i].callees {
            if !visited[callee] {
                if self.dfs_has_cycle(callee, visited, in_stack) {
                    return true;
                }
            } else if in_stack[callee] {
                return true;
            }
        }
        in_stack[i] = false;
        false
    }

    fn dfs_post_order(&self, i: usize, visited: &mut [bool], order: &mut Vec<NodeId>) {
        visited[i] = true;
        for &callee in &self.nodes[i].callees {
            if !visited[callee] {
                self.dfs_post_order(callee, visited, order);
            }
        }
        order.push(self.nodes[i].function);
    }
}

/// Per-module summary stored under the string key `call_graph.<module>`.
#[derive(Debug)]
pub struct ModuleCallSummary {
    pub module: ModuleId,
    pub functions: Vec<NodeId>,
    pub outgoing_edges: usize,
}

impl IpoAnalysisResult for ModuleCallSummary {
    fn invalidated_by(&self, _transform: PassId) -> bool {
        true
    }
}

/// IPO analysis result wrapping the call graph.
#[derive(Debug)]
pub struct CallGraphResult {
    graph: CallGraph,
    analyzed_modules: FxHashSet<ModuleId>,
}

impl CallGraphResult {
    pub fn graph(&self) -> &CallGraph {
        &self.graph
    }
}

impl IpoAnalysisResult for CallGraphResult {
    fn invalidated_by(&self, _transform: PassId) -> bool {
        // any IR mutation can add or remove call edges
        true
    }

    fn depends_on_modules(&self) -> Option<&FxHashSet<ModuleId>> {
        Some(&self.analyzed_modules)
    }
}

/// Analysis pass building the cross-module call graph.
#[derive(Debug, Default)]
pub struct CallGraphAnalysisPass;

impl IpoPass for CallGraphAnalysisPass {
    fn id(&self) -> PassId {
        CALL_GRAPH
    }

    fn name(&self) -> &'static str {
        "call-graph-analysis"
    }

    fn description(&self) -> &'static str {
        "builds the interprocedural call graph across all modules"
    }

    fn is_analysis(&self) -> bool {
        true
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut IpoPassContext) -> PassResult<bool> {
        let modules: Vec<ModuleId> = ctx.modules().to_vec();
        let result = build_call_graph(ir, &modules);

        let functions_analyzed = result.graph.nodes().len() as u64;
        let total_edges = result.graph.total_edges() as u64;
        let global_functions = collect_global_functions(ir, &modules).len() as u64;

        // per-module summaries under "call_graph.<module>" keys
        for &module in &modules {
            let functions: Vec<NodeId> = ir
                .module(module)
                .functions
                .iter()
                .copied()
                .filter(|&f| ir.node(f).op == NodeOp::Function)
                .collect();
            let outgoing_edges = functions
                .iter()
                .map(|&f| result.graph.callees(f).len())
                .sum();
            let key = format!("call_graph.{}", ir.module_name(module));
            ctx.store_keyed_result(
                &key,
                Box::new(ModuleCallSummary { module, functions, outgoing_edges }),
            );
        }

        ctx.store_result(CALL_GRAPH, Box::new(result));
        ctx.update_stat("callgraph.functions_analyzed", functions_analyzed);
        ctx.update_stat("callgraph.global_functions", global_functions);
        ctx.update_stat("callgraph.total_edges", total_edges);
        Ok(true)
    }
}

/// Build the call graph over the given modules.
pub fn build_call_graph(ir: &Context, modules: &[ModuleId]) -> CallGraphResult {
    let mut graph = CallGraph::default();
    let global_funcs = collect_global_functions(ir, modules);

    for &module in modules {
        for func in ir.module(module).functions.clone() {
            if ir.node(func).op != NodeOp::Function {
                continue;
            }
            graph.get_or_create(func);
            if let Some(body) = ir.function_body(module, func) {
                analyze_region(ir, body, func, &mut graph, &global_funcs);
            }
        }
    }

    CallGraphResult {
        graph,
        analyzed_modules: modules.iter().copied().collect(),
    }
}

fn collect_global_functions(ir: &Context, modules: &[ModuleId]) -> FxHashSet<NodeId> {
    let mut global = FxHashSet::default();
    for &module in modules {
        let root = ir.module(module).root;
        for &node in &ir.region(root).nodes {
            if ir.node(node).ty.is_function() || ir.node(node).op == NodeOp::Function {
                global.insert(node);
            }
        }
        for &func in &ir.module(module).functions {
            if ir.node(func).ty.is_function() {
                global.insert(func);
            }
        }
    }
    global
}

fn analyze_region(
    ir: &Context,
    region: RegionId,
    caller: NodeId,
    graph: &mut CallGraph,
    global_funcs: &FxHashSet<NodeId>,
) {
    for &node in &ir.region(region).nodes {
        if ir.node(node).op.is_call() {
            handle_call(ir, node, caller, graph, global_funcs);
        }
    }
    for &child in &ir.region(region).children {
        analyze_region(ir, child, caller, graph, global_funcs);
    }
}

fn handle_call(
    ir: &Context,
    call: NodeId,
    caller: NodeId,
    graph: &mut CallGraph,
    global_funcs: &FxHashSet<NodeId>,
) {
    let Some(&target) = ir.node(call).inputs.first() else {
        return;
    };

    if ir.node(target).op == NodeOp::Function {
        graph.add_edge(caller, target, call);
        return;
    }

    if global_funcs.contains(&target) {
        graph.add_edge(caller, target, call);
        return;
    }

    // an unknown indirect call could reach any address-taken function
    let mut exported: Vec<NodeId> = global_funcs
        .iter()
        .copied()
        .filter(|&f| ir.node(f).props.contains(NodeProps::EXPORT))
        .collect();
    exported.sort_unstable();
    for func in exported {
        graph.add_edge(caller, func, call);
    }
}
