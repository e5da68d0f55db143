//! # IPO Pass Context
//!
//! Cross-module state for an IPO pipeline: the module list, a tag-keyed
//! result map, a string-keyed result map (e.g. `"call_graph.main"`) with
//! prefix-wildcard invalidation, a set of preserved analysis tags exempt
//! from automatic invalidation, and per-result module-dependency metadata
//! so that changing one module only drops the results that named it.

use crate::foundation::ModuleId;
use crate::ipo::pass::IpoAnalysisResult;
use crate::pass::PassId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::HashMap;

/// Context for IPO pass execution.
pub struct IpoPassContext {
    modules: Vec<ModuleId>,
    opt_level: u8,
    debug_mode: bool,
    type_results: FxHashMap<PassId, Box<dyn IpoAnalysisResult>>,
    string_results: HashMap<String, Box<dyn IpoAnalysisResult>>,
    preserved: FxHashSet<PassId>,
    stats: HashMap<String, u64>,
}

impl IpoPassContext {
    pub fn new(modules: Vec<ModuleId>, opt_level: u8, debug_mode: bool) -> Self {
        IpoPassContext {
            modules,
            opt_level,
            debug_mode,
            type_results: FxHashMap::default(),
            string_results: HashMap::new(),
            preserved: FxHashSet::default(),
            stats: HashMap::new(),
        }
    }

    /// The modules being processed, in driver order.
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    pub fn opt_level(&self) -> u8 {
        self.opt_level
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Store a result under a pass tag.
    pub fn store_result(&mut self, pass: PassId, result: Box<dyn IpoAnalysisResult>) {
        self.type_results.insert(pass, result);
    }

    /// Store a result under a string key, e.g. `"call_graph.main"`.
    pub fn store_keyed_result(&mut self, key: &str, result: Box<dyn IpoAnalysisResult>) {
        self.string_results.insert(key.to_string(), result);
    }

    pub fn get_result<T: IpoAnalysisResult>(&self, pass: PassId) -> Option<&T> {
        self.type_results.get(&pass)?.downcast_ref::<T>()
    }

    pub fn get_keyed_result<T: IpoAnalysisResult>(&self, key: &str) -> Option<&T> {
        self.string_results.get(key)?.downcast_ref::<T>()
    }

    pub fn has_result(&self, pass: PassId) -> bool {
        self.type_results.contains_key(&pass)
    }

    pub fn has_keyed_result(&self, key: &str) -> bool {
        self.string_results.contains_key(key)
    }

    /// Exempt an analysis tag from automatic invalidation.
    pub fn mark_preserved(&mut self, pass: PassId) {
        self.preserved.insert(pass);
    }

    /// Drop every result that reports itself invalidated by the transform,
    /// except preserved tags.
    pub fn invalidate_by(&mut self, transform: PassId) {
        let preserved = &self.preserved;
        self.type_results
            .retain(|tag, result| preserved.contains(tag) || !result.invalidated_by(transform));
        self.string_results
            .retain(|_, result| !result.invalidated_by(transform));
    }

    /// Drop every result that depends on one of the changed modules.
    /// Results that name no modules are treated as depending on all.
    pub fn invalidate_by_modules(&mut self, changed: &FxHashSet<ModuleId>) {
        let preserved = &self.preserved;
        let stale = |result: &Box<dyn IpoAnalysisResult>| match result.depends_on_modules() {
            Some(deps) => deps.iter().any(|m| changed.contains(m)),
            None => true,
        };
        self.type_results
            .retain(|tag, result| preserved.contains(tag) || !stale(result));
        self.string_results.retain(|_, result| !stale(result));
    }

    /// Drop string-keyed results matching a pattern; a trailing `*` makes
    /// it a prefix wildcard, otherwise the match is exact.
    pub fn invalidate_matching(&mut self, pattern: &str) {
        self.string_results
            .retain(|key, _| !matches_pattern(key, pattern));
    }

    pub fn update_stat(&mut self, name: &str, delta: u64) {
        *self.stats.entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn get_stat(&self, name: &str) -> u64 {
        self.stats.get(name).copied().unwrap_or(0)
    }
}

fn matches_pattern(key: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        key.starts_with(prefix)
    } else {
        key == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        deps: Option<FxHashSet<ModuleId>>,
    }

    impl IpoAnalysisResult for Dummy {
        fn invalidated_by(&self, _t: PassId) -> bool {
            true
        }
        fn depends_on_modules(&self) -> Option<&FxHashSet<ModuleId>> {
            self.deps.as_ref()
        }
    }

    const TAG: PassId = PassId("ipo-test-analysis");
    const XFORM: PassId = PassId("ipo-test-transform");

    #[test]
    fn test_wildcard_invalidation() {
        let mut ctx = IpoPassContext::new(vec![], 0, false);
        ctx.store_keyed_result("call_graph.m1", Box::new(Dummy { deps: None }));
        ctx.store_keyed_result("call_graph.m2", Box::new(Dummy { deps: None }));
        ctx.store_keyed_result("escape.m1", Box::new(Dummy { deps: None }));

        ctx.invalidate_matching("call_graph.*");
        assert!(!ctx.has_keyed_result("call_graph.m1"));
        assert!(!ctx.has_keyed_result("call_graph.m2"));
        assert!(ctx.has_keyed_result("escape.m1"));

        ctx.invalidate_matching("escape.m1");
        assert!(!ctx.has_keyed_result("escape.m1"));
    }

    #[test]
    fn test_preserved_tags_survive_invalidation() {
        let mut ctx = IpoPassContext::new(vec![], 0, false);
        ctx.store_result(TAG, Box::new(Dummy { deps: None }));
        ctx.mark_preserved(TAG);
        ctx.invalidate_by(XFORM);
        assert!(ctx.has_result(TAG));
    }

    #[test]
    fn test_module_scoped_invalidation() {
        let m1 = ModuleId(0);
        let m2 = ModuleId(1);
        let mut ctx = IpoPassContext::new(vec![m1, m2], 0, false);

        let mut deps = FxHashSet::default();
        deps.insert(m1);
        ctx.store_result(TAG, Box::new(Dummy { deps: Some(deps) }));

        let mut changed = FxHashSet::default();
        changed.insert(m2);
        ctx.invalidate_by_modules(&changed);
        assert!(ctx.has_result(TAG), "result does not depend on m2");

        changed.insert(m1);
        ctx.invalidate_by_modules(&changed);
        assert!(!ctx.has_result(TAG));
    }
}
