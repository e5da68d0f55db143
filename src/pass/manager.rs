//! # Pass Manager
//!
//! Registers passes, derives the dependency relation, runs passes with
//! recursive dependency resolution (memoized by fresh results in the pass
//! context), detects dependency cycles, skips passes below the configured
//! optimization level, accumulates per-pass timings, and performs two-sided
//! invalidation after successful transform runs.

use crate::foundation::{Context, ModuleId};
use crate::pass::{Pass, PassContext, PassError, PassId, PassResult};
use rustc_hash::FxHashMap;
use std::io::Write;
use std::time::{Duration, Instant};

struct RegisteredPass {
    pass: Box<dyn Pass>,
    required: Vec<PassId>,
    invalidated: Vec<PassId>,
}

/// Executes passes over one module.
pub struct PassManager {
    verbosity: u8,
    ctx: PassContext,
    passes: Vec<RegisteredPass>,
    index: FxHashMap<PassId, usize>,
    times: FxHashMap<PassId, Duration>,
    order: Vec<PassId>,
}

impl PassManager {
    /// Create a manager for a module with the given options.
    pub fn new(module: ModuleId, opt_level: u8, debug_mode: bool, verbosity: u8) -> Self {
        PassManager {
            verbosity,
            ctx: PassContext::new(module, opt_level, debug_mode),
            passes: Vec::new(),
            index: FxHashMap::default(),
            times: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Register a pass. The registration order is also the `run_all` order.
    pub fn register(&mut self, pass: Box<dyn Pass>) -> PassResult<()> {
        let id = pass.id();
        if self.index.contains_key(&id) {
            return Err(PassError::DuplicateRegistration(id));
        }

        let required = pass.required();
        let invalidated = pass.invalidates();
        self.index.insert(id, self.passes.len());
        self.passes.push(RegisteredPass {
            pass,
            required,
            invalidated,
        });
        self.order.push(id);
        Ok(())
    }

    /// Run a single pass, running its required passes first.
    pub fn run_pass(&mut self, ir: &mut Context, id: PassId) -> PassResult<bool> {
        let mut running = Vec::new();
        self.run_pass_inner(ir, id, &mut running)
    }

    /// Run all registered passes in registration order. Stops at the first
    /// failing pass and reports `Ok(false)`.
    pub fn run_all(&mut self, ir: &mut Context) -> PassResult<bool> {
        for id in self.order.clone() {
            if !self.run_pass(ir, id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The pass context, exposing analysis results and statistics.
    pub fn context(&self) -> &PassContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut PassContext {
        &mut self.ctx
    }

    pub fn set_verbosity(&mut self, level: u8) {
        self.verbosity = level;
    }

    /// Render accumulated per-pass times, slowest first.
    pub fn print_statistics(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.times.is_empty() {
            writeln!(out, "no passes have been executed")?;
            return Ok(());
        }

        let mut sorted: Vec<(PassId, Duration)> =
            self.times.iter().map(|(&id, &d)| (id, d)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let total: Duration = sorted.iter().map(|(_, d)| *d).sum();
        writeln!(out, "pass execution statistics:")?;
        for (id, time) in &sorted {
            let percent = if total.is_zero() {
                0.0
            } else {
                time.as_secs_f64() / total.as_secs_f64() * 100.0
            };
            writeln!(
                out,
                "{:<30} {:>8.2}ms ({:>5.1}%)",
                id.0,
                time.as_secs_f64() * 1000.0,
                percent
            )?;
        }
        writeln!(out, "total: {:.2}ms", total.as_secs_f64() * 1000.0)
    }

    fn run_pass_inner(
        &mut self,
        ir: &mut Context,
        id: PassId,
        running: &mut Vec<PassId>,
    ) -> PassResult<bool> {
        if running.contains(&id) {
            return Err(PassError::DependencyCycle(id));
        }
        let idx = *self.index.get(&id).ok_or(PassError::PassNotFound(id))?;
        running.push(id);

        // run required passes first; a fresh result in the context memoizes
        let required = self.passes[idx].required.clone();
        for req in &required {
            if self.ctx.has_result(*req) {
                continue;
            }
            if !self.run_pass_inner(ir, *req, running)? {
                running.pop();
                return Ok(false);
            }
        }

        // a required analysis that ran but produced nothing blocks us
        for req in &required {
            let is_analysis = self
                .index
                .get(req)
                .is_some_and(|&i| self.passes[i].pass.is_analysis());
            if is_analysis && !self.ctx.has_result(*req) {
                running.pop();
                return Err(PassError::MissingAnalysis {
                    required: *req,
                    dependent: id,
                });
            }
        }

        // skipping below the pass's minimum opt level is not failure
        if self.passes[idx].pass.min_opt_level() > self.ctx.opt_level() {
            running.pop();
            return Ok(true);
        }

        let start = Instant::now();
        let outcome = self.passes[idx].pass.run(ir, &mut self.ctx);
        let elapsed = start.elapsed();
        *self.times.entry(id).or_default() += elapsed;
        running.pop();

        let success = outcome?;
        if self.verbosity >= 1 {
            tracing::info!(
                pass = self.passes[idx].pass.name(),
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                success,
                "pass completed"
            );
        }

        if success && !self.passes[idx].pass.is_analysis() {
            let invalidated = self.passes[idx].invalidated.clone();
            for inv in invalidated {
                self.ctx.invalidate(inv);
            }
            self.ctx.invalidate_by(id);
            if self.verbosity >= 2 {
                tracing::debug!(pass = id.0, "invalidated dependent analysis results");
            }
        }

        Ok(success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{AnalysisPass, AnalysisResult};
    use std::cell::Cell;
    use std::rc::Rc;

    const COUNTING: PassId = PassId("counting-analysis");
    const NEEDY: PassId = PassId("needy-transform");
    const CYCLE_A: PassId = PassId("cycle-a");
    const CYCLE_B: PassId = PassId("cycle-b");
    const HIGH_OPT: PassId = PassId("high-opt-only");

    struct CountingResult;
    impl AnalysisResult for CountingResult {
        fn invalidated_by(&self, _t: PassId) -> bool {
            true
        }
    }

    struct CountingAnalysis {
        runs: Rc<Cell<u32>>,
    }

    impl Pass for CountingAnalysis {
        fn id(&self) -> PassId {
            COUNTING
        }
        fn name(&self) -> &'static str {
            "counting-analysis"
        }
        fn description(&self) -> &'static str {
            "counts its own runs"
        }
        fn is_analysis(&self) -> bool {
            true
        }
        fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
            crate::pass::run_analysis(self, ir, ctx)
        }
    }

    impl AnalysisPass for CountingAnalysis {
        fn analyze(&mut self, _ir: &Context, _ctx: &PassContext) -> Option<Box<dyn AnalysisResult>> {
            self.runs.set(self.runs.get() + 1);
            Some(Box::new(CountingResult))
        }
    }

    struct NeedyTransform;
    impl Pass for NeedyTransform {
        fn id(&self) -> PassId {
            NEEDY
        }
        fn name(&self) -> &'static str {
            "needy-transform"
        }
        fn description(&self) -> &'static str {
            "requires the counting analysis"
        }
        fn required(&self) -> Vec<PassId> {
            vec![COUNTING]
        }
        fn run(&mut self, _ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
            assert!(ctx.has_result(COUNTING));
            Ok(true)
        }
    }

    struct CyclePass {
        id: PassId,
        needs: PassId,
    }
    impl Pass for CyclePass {
        fn id(&self) -> PassId {
            self.id
        }
        fn name(&self) -> &'static str {
            "cycle"
        }
        fn description(&self) -> &'static str {
            "part of a dependency cycle"
        }
        fn required(&self) -> Vec<PassId> {
            vec![self.needs]
        }
        fn run(&mut self, _ir: &mut Context, _ctx: &mut PassContext) -> PassResult<bool> {
            Ok(true)
        }
    }

    struct HighOptPass {
        ran: Rc<Cell<bool>>,
    }
    impl Pass for HighOptPass {
        fn id(&self) -> PassId {
            HIGH_OPT
        }
        fn name(&self) -> &'static str {
            "high-opt-only"
        }
        fn description(&self) -> &'static str {
            "requires opt level 2"
        }
        fn min_opt_level(&self) -> u8 {
            2
        }
        fn run(&mut self, _ir: &mut Context, _ctx: &mut PassContext) -> PassResult<bool> {
            self.ran.set(true);
            Ok(true)
        }
    }

    fn test_module(ir: &mut Context) -> ModuleId {
        ir.create_module("test").unwrap()
    }

    #[test]
    fn test_required_pass_runs_first_and_is_memoized() {
        let mut ir = Context::new();
        let m = test_module(&mut ir);
        let runs = Rc::new(Cell::new(0));
        let mut pm = PassManager::new(m, 2, false, 0);
        pm.register(Box::new(CountingAnalysis { runs: runs.clone() }))
            .unwrap();
        pm.register(Box::new(NeedyTransform)).unwrap();

        assert!(pm.run_pass(&mut ir, NEEDY).unwrap());
        assert_eq!(runs.get(), 1);

        // NeedyTransform invalidated everything (CountingResult is
        // invalidated by any transform), so a second run re-analyzes
        assert!(pm.run_pass(&mut ir, NEEDY).unwrap());
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_dependency_cycle_is_a_configuration_error() {
        let mut ir = Context::new();
        let m = test_module(&mut ir);
        let mut pm = PassManager::new(m, 0, false, 0);
        pm.register(Box::new(CyclePass { id: CYCLE_A, needs: CYCLE_B }))
            .unwrap();
        pm.register(Box::new(CyclePass { id: CYCLE_B, needs: CYCLE_A }))
            .unwrap();

        match pm.run_pass(&mut ir, CYCLE_A) {
            Err(PassError::DependencyCycle(_)) => {}
            other => panic!("expected dependency cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_pass_is_an_error() {
        let mut ir = Context::new();
        let m = test_module(&mut ir);
        let mut pm = PassManager::new(m, 0, false, 0);
        assert!(matches!(
            pm.run_pass(&mut ir, PassId("nope")),
            Err(PassError::PassNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut ir = Context::new();
        let m = test_module(&mut ir);
        let mut pm = PassManager::new(m, 0, false, 0);
        pm.register(Box::new(NeedyTransform)).unwrap();
        assert!(matches!(
            pm.register(Box::new(NeedyTransform)),
            Err(PassError::DuplicateRegistration(_))
        ));
    }

    #[test]
    fn test_opt_level_gating_skips_without_failing() {
        let mut ir = Context::new();
        let m = test_module(&mut ir);
        let ran = Rc::new(Cell::new(false));
        let mut pm = PassManager::new(m, 1, false, 0);
        pm.register(Box::new(HighOptPass { ran: ran.clone() })).unwrap();

        // skipped, not failed
        assert!(pm.run_pass(&mut ir, HIGH_OPT).unwrap());
        assert!(!ran.get());
    }
}
