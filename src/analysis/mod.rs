//! # Analyses
//!
//! Analysis passes compute information about the IR without modifying it
//! and publish their results through the pass context.

pub mod alias;
pub mod loops;

pub use alias::{AliasVerdict, LocalAliasAnalysisPass, LocalAliasResult, MemoryLocation};
pub use loops::{Loop, LoopAnalysisPass, LoopAnalysisResult, LoopId, LoopTree};
