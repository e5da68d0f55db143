//! # Interprocedural Optimization
//!
//! A mirror of the scalar pass framework driven over a sequence of modules:
//! the [`IpoPassManager`] runs passes strictly in registration order, the
//! [`IpoPassContext`] caches results under pass tags and under string keys
//! (with prefix-wildcard invalidation and per-result module dependencies),
//! and the passes themselves build the call graph, prune dead functions,
//! run per-module GVN, specialize functions on constant arguments and
//! inline small callees.

pub mod callgraph;
pub mod context;
pub mod dce;
pub mod gvn;
pub mod inline;
pub mod manager;
pub mod pass;
pub mod specializer;

pub use callgraph::{CallGraph, CallGraphAnalysisPass, CallGraphResult};
pub use context::IpoPassContext;
pub use dce::IpoDcePass;
pub use gvn::IpoGvnPass;
pub use inline::IpoInliningPass;
pub use manager::IpoPassManager;
pub use pass::{IpoAnalysisResult, IpoPass};
pub use specializer::{FunctionSpecializer, LatticeValue, SpecializationRequest};
