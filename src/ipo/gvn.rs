//! # IPO Global Value Numbering
//!
//! Drives the scalar value-numbering CSE over every module: each module
//! gets its own local pass manager with alias analysis + CSE, and the
//! per-module elimination counts are accumulated into
//! `ipo_gvn.total_eliminated`.

use crate::analysis::alias::LocalAliasAnalysisPass;
use crate::foundation::Context;
use crate::ipo::context::IpoPassContext;
use crate::ipo::pass::IpoPass;
use crate::pass::{PassId, PassManager, PassResult};
use crate::transform::cse::CsePass;

/// Tag of the IPO GVN pass.
pub const IPO_GVN: PassId = PassId("ipo-global-value-numbering");

/// IPO pass running local GVN over every module.
#[derive(Debug, Default)]
pub struct IpoGvnPass;

impl IpoPass for IpoGvnPass {
    fn id(&self) -> PassId {
        IPO_GVN
    }

    fn name(&self) -> &'static str {
        "ipo-global-value-numbering"
    }

    fn description(&self) -> &'static str {
        "performs global value numbering across all modules using local GVN"
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut IpoPassContext) -> PassResult<bool> {
        let mut total_eliminated = 0u64;

        for &module in &ctx.modules().to_vec() {
            let mut local = PassManager::new(module, ctx.opt_level(), ctx.debug_mode(), 0);
            local.register(Box::new(LocalAliasAnalysisPass))?;
            local.register(Box::new(CsePass::default()))?;

            if local.run_all(ir)? {
                total_eliminated += local.context().get_stat("cse.eliminated_expressions");
            }
        }

        ctx.update_stat("ipo_gvn.total_eliminated", total_eliminated);
        Ok(true)
    }
}
