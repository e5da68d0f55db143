//! # IPO Pass Manager
//!
//! Runs interprocedural passes strictly in registration order; there is no
//! dependency graph at this level, passes recompute the analyses they need.
//! After every successful transform run the context self-invalidates.

use crate::foundation::{Context, ModuleId};
use crate::ipo::context::IpoPassContext;
use crate::ipo::pass::IpoPass;
use crate::pass::{PassError, PassId, PassResult};
use rustc_hash::FxHashMap;
use std::io::Write;
use std::time::{Duration, Instant};

/// Executes IPO passes over a sequence of modules.
pub struct IpoPassManager {
    verbosity: u8,
    ctx: IpoPassContext,
    passes: FxHashMap<PassId, Box<dyn IpoPass>>,
    times: FxHashMap<PassId, Duration>,
    order: Vec<PassId>,
}

impl IpoPassManager {
    pub fn new(modules: Vec<ModuleId>, opt_level: u8, debug_mode: bool, verbosity: u8) -> Self {
        IpoPassManager {
            verbosity,
            ctx: IpoPassContext::new(modules, opt_level, debug_mode),
            passes: FxHashMap::default(),
            times: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Register a pass; registration order is execution order.
    pub fn register(&mut self, pass: Box<dyn IpoPass>) -> PassResult<()> {
        let id = pass.id();
        if self.passes.contains_key(&id) {
            return Err(PassError::DuplicateRegistration(id));
        }
        self.passes.insert(id, pass);
        self.order.push(id);
        Ok(())
    }

    /// Run one registered pass.
    pub fn run_pass(&mut self, ir: &mut Context, id: PassId) -> PassResult<bool> {
        if !self.passes.contains_key(&id) {
            return Err(PassError::PassNotFound(id));
        }

        let start = Instant::now();
        let (outcome, name, is_analysis) = {
            let pass = self
                .passes
                .get_mut(&id)
                .ok_or(PassError::PassNotFound(id))?;
            let outcome = pass.run(ir, &mut self.ctx);
            (outcome, pass.name(), pass.is_analysis())
        };
        let elapsed = start.elapsed();
        *self.times.entry(id).or_default() += elapsed;

        let success = outcome?;
        if self.verbosity >= 1 {
            tracing::info!(
                pass = name,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                success,
                "ipo pass completed"
            );
        }

        if success && !is_analysis {
            self.ctx.invalidate_by(id);
        }
        Ok(success)
    }

    /// Run every registered pass in registration order, stopping at the
    /// first failure.
    pub fn run_all(&mut self, ir: &mut Context) -> PassResult<bool> {
        for id in self.order.clone() {
            if !self.run_pass(ir, id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn context(&self) -> &IpoPassContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut IpoPassContext {
        &mut self.ctx
    }

    pub fn set_verbosity(&mut self, level: u8) {
        self.verbosity = level;
    }

    /// Render accumulated per-pass times, slowest first.
    pub fn print_statistics(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.times.is_empty() {
            writeln!(out, "no ipo passes have been executed")?;
            return Ok(());
        }

        let mut sorted: Vec<(PassId, Duration)> =
            self.times.iter().map(|(&id, &d)| (id, d)).collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let total: Duration = sorted.iter().map(|(_, d)| *d).sum();
        writeln!(out, "ipo pass execution statistics:")?;
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
}
