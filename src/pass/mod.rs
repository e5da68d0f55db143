//! # Pass Framework
//!
//! Capability interfaces for optimization passes plus the context and
//! manager that execute them.
//!
//! ```text
//! PassManager
//!     ├── register(pass)         dependency + invalidation bookkeeping
//!     ├── run_pass(tag)          runs required passes first (memoized)
//!     └── run_all()              registration order
//!
//! PassContext
//!     ├── analysis results       keyed by PassId, self-invalidating
//!     └── statistics             string-keyed counters
//! ```
//!
//! A pass is identified by a [`PassId`]: a stable compile-time token rather
//! than a runtime type id, so dependency lists and cache keys stay
//! deterministic across builds and runs.

pub mod context;
pub mod manager;

pub use context::PassContext;
pub use manager::PassManager;

use crate::foundation::Context;
use downcast_rs::{impl_downcast, Downcast};
use thiserror::Error;

/// Stable identity token of a pass type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub &'static str);

impl std::fmt::Display for PassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Errors raised by the pass infrastructure.
#[derive(Error, Debug)]
pub enum PassError {
    /// Pass tag not registered with the manager
    #[error("Pass not found: {0}")]
    PassNotFound(PassId),

    /// The same pass tag was registered twice
    #[error("Pass already registered: {0}")]
    DuplicateRegistration(PassId),

    /// The required-passes relation contains a cycle
    #[error("Dependency cycle detected while resolving pass {0}")]
    DependencyCycle(PassId),

    /// An analysis this pass depends on produced no result
    #[error("Required analysis {required} failed; refusing to run {dependent}")]
    MissingAnalysis { required: PassId, dependent: PassId },

    /// A transform detected an IR invariant violation mid-pass
    #[error("IR invariant violated in pass {pass}: {op} node {node}")]
    InvariantViolation {
        pass: PassId,
        op: &'static str,
        node: u32,
    },
}

/// Result type for pass execution.
pub type PassResult<T> = Result<T, PassError>;

/// Result of an analysis pass, stored in the pass context and queried by
/// later passes. Results decide their own staleness via `invalidated_by`.
pub trait AnalysisResult: Downcast {
    /// Whether a successful run of `transform` makes this result stale.
    fn invalidated_by(&self, transform: PassId) -> bool;
}
impl_downcast!(AnalysisResult);

/// Base interface of all optimization passes, analysis and transform alike.
pub trait Pass {
    /// Stable identity token for this pass type.
    fn id(&self) -> PassId;

    /// Human-readable pass name.
    fn name(&self) -> &'static str;

    /// One-line description of what the pass does.
    fn description(&self) -> &'static str;

    /// Passes that must have run before this one.
    fn required(&self) -> Vec<PassId> {
        Vec::new()
    }

    /// Analysis results to drop after this pass succeeds.
    fn invalidates(&self) -> Vec<PassId> {
        Vec::new()
    }

    /// Minimum optimization level at which this pass runs. Below it the
    /// manager skips the pass (skipping is not failure).
    fn min_opt_level(&self) -> u8 {
        0
    }

    /// Whether this is an analysis pass. Transform runs trigger result
    /// invalidation; analysis runs do not.
    fn is_analysis(&self) -> bool {
        false
    }

    /// Execute the pass. `Ok(true)` means the pass succeeded (a no-op
    /// transform is still a success); `Ok(false)` means it failed in a way
    /// that aborts the pipeline without being a configuration error.
    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool>;
}

/// Passes that compute information about the IR without modifying it.
pub trait AnalysisPass: Pass {
    /// Perform the analysis. Returning `None` signals analysis failure.
    fn analyze(&mut self, ir: &Context, ctx: &PassContext) -> Option<Box<dyn AnalysisResult>>;
}

/// Generic run wrapper for analysis passes: analyze and store the result
/// keyed by the pass's tag.
pub fn run_analysis<P: AnalysisPass>(
    pass: &mut P,
    ir: &mut Context,
    ctx: &mut PassContext,
) -> PassResult<bool> {
    match pass.analyze(ir, ctx) {
        Some(result) => {
            ctx.store_result(pass.id(), result);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Marker trait for passes that mutate the IR. Transform passes implement
/// `run` directly.
pub trait TransformPass: Pass {}
