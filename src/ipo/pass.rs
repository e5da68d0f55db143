//! # IPO Pass Interface
//!
//! Capability traits for passes that operate over a sequence of modules.

use crate::foundation::{Context, ModuleId};
use crate::ipo::context::IpoPassContext;
use crate::pass::{PassId, PassResult};
use downcast_rs::{impl_downcast, Downcast};
use rustc_hash::FxHashSet;

/// Result of an IPO analysis, stored in the IPO pass context.
pub trait IpoAnalysisResult: Downcast {
    /// Whether a successful run of `transform` makes this result stale.
    fn invalidated_by(&self, transform: PassId) -> bool;

    /// Modules this result was computed from. `None` means the result
    /// depends on every module and any module change invalidates it.
    fn depends_on_modules(&self) -> Option<&FxHashSet<ModuleId>> {
        None
    }
}
impl_downcast!(IpoAnalysisResult);

/// Base interface of interprocedural passes.
pub trait IpoPass {
    /// Stable identity token for this pass type.
    fn id(&self) -> PassId;

    /// Human-readable pass name.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str;

    /// IPO analysis passes this pass wants fresh results from. The IPO
    /// manager does not resolve these automatically; passes recompute
    /// missing analyses themselves.
    fn required(&self) -> Vec<PassId> {
        Vec::new()
    }

    /// Whether this is an analysis pass; transform runs trigger result
    /// invalidation, analysis runs do not.
    fn is_analysis(&self) -> bool {
        false
    }

    /// Execute over every module held by the context.
    fn run(&mut self, ir: &mut Context, ctx: &mut IpoPassContext) -> PassResult<bool>;
}
