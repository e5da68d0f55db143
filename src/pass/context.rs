//! # Pass Context
//!
//! State shared between passes in one pipeline: the target module, the
//! optimization level, cached analysis results, and string-keyed statistic
//! counters.

use crate::foundation::ModuleId;
use crate::pass::{AnalysisResult, PassId};
use rustc_hash::FxHashMap;
use std::collections::HashMap;

/// Context for pass execution over a single module.
pub struct PassContext {
    module: ModuleId,
    opt_level: u8,
    debug_mode: bool,
    results: FxHashMap<PassId, Box<dyn AnalysisResult>>,
    stats: HashMap<String, u64>,
}

impl PassContext {
    pub fn new(module: ModuleId, opt_level: u8, debug_mode: bool) -> Self {
        PassContext {
            module,
            opt_level,
            debug_mode,
            results: FxHashMap::default(),
            stats: HashMap::new(),
        }
    }

    /// The module being processed.
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// The optimization level (0-3).
    pub fn opt_level(&self) -> u8 {
        self.opt_level
    }

    /// Whether extra validation is enabled.
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Store an analysis result under a pass tag.
    pub fn store_result(&mut self, pass: PassId, result: Box<dyn AnalysisResult>) {
        self.results.insert(pass, result);
    }

    /// Fetch a result by tag, downcast to its concrete type.
    pub fn get_result<T: AnalysisResult>(&self, pass: PassId) -> Option<&T> {
        self.results.get(&pass)?.downcast_ref::<T>()
    }

    /// Whether a fresh result exists for a pass.
    pub fn has_result(&self, pass: PassId) -> bool {
        self.results.contains_key(&pass)
    }

    /// Drop the result of a specific pass.
    pub fn invalidate(&mut self, pass: PassId) {
        self.results.remove(&pass);
    }

    /// Drop every cached result that reports itself invalidated by the
    /// given transform.
    pub fn invalidate_by(&mut self, transform: PassId) {
        self.results.retain(|_, result| !result.invalidated_by(transform));
    }

    /// Add `delta` to a named statistic.
    pub fn update_stat(&mut self, name: &str, delta: u64) {
        *self.stats.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Read a named statistic; unknown names read as 0.
    pub fn get_stat(&self, name: &str) -> u64 {
        self.stats.get(name).copied().unwrap_or(0)
    }

    /// All statistics collected so far.
    pub fn stats(&self) -> &HashMap<String, u64> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        sticky: bool,
    }

    impl AnalysisResult for Dummy {
        fn invalidated_by(&self, _transform: PassId) -> bool {
            !self.sticky
        }
    }

    const T1: PassId = PassId("test-transform");
    const A1: PassId = PassId("test-analysis");
    const A2: PassId = PassId("test-analysis-sticky");

    #[test]
    fn test_store_get_invalidate() {
        let mut ctx = PassContext::new(ModuleId(0), 2, false);
        ctx.store_result(A1, Box::new(Dummy { sticky: false }));
        assert!(ctx.has_result(A1));
        assert!(ctx.get_result::<Dummy>(A1).is_some());

        ctx.invalidate(A1);
        assert!(!ctx.has_result(A1));
    }

    #[test]
    fn test_invalidate_by_respects_self_invalidation() {
        let mut ctx = PassContext::new(ModuleId(0), 2, false);
        ctx.store_result(A1, Box::new(Dummy { sticky: false }));
        ctx.store_result(A2, Box::new(Dummy { sticky: true }));
        ctx.invalidate_by(T1);
        assert!(!ctx.has_result(A1));
        assert!(ctx.has_result(A2));
    }

    #[test]
    fn test_stats_accumulate() {
        let mut ctx = PassContext::new(ModuleId(0), 0, false);
        assert_eq!(ctx.get_stat("cse.eliminated_expressions"), 0);
        ctx.update_stat("cse.eliminated_expressions", 2);
        ctx.update_stat("cse.eliminated_expressions", 3);
        assert_eq!(ctx.get_stat("cse.eliminated_expressions"), 5);
    }
}
