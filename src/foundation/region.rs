//! # Regions
//!
//! A region is a lexical scope / basic-block group: it owns an ordered node
//! list (insertion order is semantic; the last node decides termination), an
//! ordered child list, and an optional control-dependency link. The region
//! tree is the structural backbone of a module; control-flow edges between
//! nodes may additionally cross it (unstructured jumps), which is why
//! dominance queries live on [`crate::foundation::Context`] where both the
//! tree and the node graph are visible.

use crate::foundation::context::{ModuleId, NodeId, RegionId};
use crate::foundation::dbinfo::DebugTable;
use crate::foundation::strings::StrId;

/// A lexical scope owning nodes and child regions.
#[derive(Debug)]
pub struct Region {
    /// Interned region name
    pub name: StrId,
    /// Owning module
    pub module: ModuleId,
    /// Parent region; `None` denotes a global scope
    pub parent: Option<RegionId>,
    /// Ordered child regions
    pub children: Vec<RegionId>,
    /// Ordered nodes; the last one decides termination
    pub nodes: Vec<NodeId>,
    /// Control-dependency link set by the builder for structured constructs
    pub control_dependency: Option<NodeId>,
    /// Attached debug info
    pub debug: DebugTable,
}

impl Region {
    pub fn new(name: StrId, module: ModuleId, parent: Option<RegionId>) -> Self {
        Region {
            name,
            module,
            parent,
            children: Vec::new(),
            nodes: Vec::new(),
            control_dependency: None,
            debug: DebugTable::new(),
        }
    }

    /// A region with no parent is a global scope (module root or rodata).
    pub fn is_global_scope(&self) -> bool {
        self.parent.is_none()
    }

    /// First node of the region, if any. For a jump target this is the
    /// `entry` node referenced by terminator operand slots.
    pub fn first_node(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }
}
