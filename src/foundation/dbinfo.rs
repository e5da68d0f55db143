//! # Debug Info Side Table
//!
//! Per-region side table keyed by node id. The optimizer core reads it only
//! as opaque metadata and never branches on its content; transforms that
//! delete nodes simply leave stale records behind, which is harmless because
//! lookups go through live node ids.

use crate::foundation::context::NodeId;
use crate::foundation::strings::StrId;
use rustc_hash::FxHashMap;

/// Source position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: StrId,
    pub line: u32,
    pub column: u32,
}

/// Variable-level debug record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: StrId,
    pub type_name: StrId,
    pub is_param: bool,
    pub frame_offset: i32,
}

/// Function-level debug record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: StrId,
    pub parameters: Vec<StrId>,
    pub locals: Vec<StrId>,
}

/// Type-level debug record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: StrId,
    pub size: u32,
    pub alignment: u32,
}

/// Debug info attached to one region.
#[derive(Debug, Clone, Default)]
pub struct DebugTable {
    locations: FxHashMap<NodeId, SourceLocation>,
    variables: FxHashMap<NodeId, VariableInfo>,
    functions: FxHashMap<NodeId, FunctionInfo>,
    types: FxHashMap<NodeId, TypeInfo>,
}

impl DebugTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_location(&mut self, node: NodeId, loc: SourceLocation) {
        self.locations.insert(node, loc);
    }

    pub fn location(&self, node: NodeId) -> Option<&SourceLocation> {
        self.locations.get(&node)
    }

    pub fn set_variable(&mut self, node: NodeId, info: VariableInfo) {
        self.variables.insert(node, info);
    }

    pub fn variable(&self, node: NodeId) -> Option<&VariableInfo> {
        self.variables.get(&node)
    }

    pub fn set_function(&mut self, node: NodeId, info: FunctionInfo) {
        self.functions.insert(node, info);
    }

    pub fn function(&self, node: NodeId) -> Option<&FunctionInfo> {
        self.functions.get(&node)
    }

    pub fn set_type(&mut self, node: NodeId, info: TypeInfo) {
        self.types.insert(node, info);
    }

    pub fn type_info(&self, node: NodeId) -> Option<&TypeInfo> {
        self.types.get(&node)
    }
}
