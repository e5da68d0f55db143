//! # Scalar Transforms
//!
//! IR-to-IR rewrites inside a module. Each pass mutates through the
//! def-use-maintaining helpers on [`crate::foundation::Context`] and records
//! what it did in the pass context's statistics.

pub mod adce;
pub mod constfold;
pub mod cse;
pub mod dce;
pub mod dse;
pub mod pre;
pub mod reassociate;
pub mod sroa;

pub use adce::AdcePass;
pub use constfold::ConstantFoldingPass;
pub use cse::CsePass;
pub use dce::DcePass;
pub use dse::DsePass;
pub use pre::PrePass;
pub use reassociate::ReassociatePass;
pub use sroa::SroaPass;
