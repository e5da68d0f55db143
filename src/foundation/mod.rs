//! # IR Foundation
//!
//! Owns every IR entity: the [`Context`] arena, interned strings, the type
//! registry, nodes, regions and modules. All other layers (passes, analyses,
//! transforms, IPO) operate on the ids handed out here.
//!
//! ```text
//! Context
//!     ├── StringTable        (interned names, id 0 = "")
//!     ├── TypeRegistry       (structural dedup, 16-bit encoded ids)
//!     ├── Vec<Node>          (sea-of-nodes computation units)
//!     ├── Vec<Region>        (lexical scope / basic-block groups)
//!     └── Vec<Module>        (named compilation units)
//! ```
//!
//! Entities are created once and never freed individually; transforms unlink
//! them and the arena reclaims everything on context teardown.

pub mod context;
pub mod dbinfo;
pub mod error;
pub mod module;
pub mod node;
pub mod region;
pub mod strings;
pub mod typed_data;
pub mod types;

pub use context::{Context, ModuleId, NodeId, RegionId};
pub use dbinfo::{DebugTable, FunctionInfo, SourceLocation, TypeInfo, VariableInfo};
pub use error::{IrError, IrResult};
pub use module::Module;
pub use node::{AtomicOrdering, Node, NodeOp, NodeProps};
pub use region::Region;
pub use strings::{StrId, StringTable};
pub use typed_data::TypedData;
pub use types::{Type, TypeData, TypeRegistry};
