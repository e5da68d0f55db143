//! # Modules
//!
//! A named compilation unit. Owns its region list, a root region (the global
//! scope, created on construction), the distinguished read-only data region
//! `.__rodata`, and the list of function nodes. Creation goes through
//! [`crate::foundation::Context`], which owns the backing arenas.

use crate::foundation::context::{NodeId, RegionId};
use crate::foundation::strings::StrId;

/// The read-only data region name.
pub const RODATA_NAME: &str = ".__rodata";

/// A compilation module.
#[derive(Debug)]
pub struct Module {
    /// Interned module name
    pub name: StrId,
    /// Root region; also the global scope
    pub root: RegionId,
    /// Read-only data region
    pub rodata: RegionId,
    /// All regions created in this module, in creation order
    pub regions: Vec<RegionId>,
    /// Function nodes registered with this module
    pub functions: Vec<NodeId>,
}
