//! # Midlayer Compiler Middle-End
//!
//! An in-memory intermediate representation plus a library of analysis and
//! transformation passes. A front-end builds IR through the [`Builder`];
//! the middle-end optimizes it; a back-end consumes the result.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Front-end IR (via Builder)
//!     ↓
//! [PassManager]                  → per-module pipeline
//!     ├── local-alias-analysis   → memory locations + escapes
//!     ├── loop-analysis          → natural loops + loop forest
//!     ├── constant-folding       → literal evaluation + copy prop
//!     ├── reassociate            → balanced associative trees
//!     ├── cse                    → value-numbering elimination
//!     ├── dse                    → dead store removal
//!     ├── dce / adce             → dead node & region removal
//!     ├── pre                    → partial redundancy hoisting
//!     └── sroa                   → aggregate scalarization
//!     ↓
//! [IpoPassManager]               → cross-module pipeline
//!     ├── call-graph-analysis    → reachability + traversals
//!     ├── ipo-dce                → dead function pruning
//!     ├── ipo-gvn                → per-module value numbering
//!     └── ipo-inlining           → specialization + inlining
//!     ↓
//! Optimized IR (for a back-end)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use midlayer::foundation::{Context, NodeProps, Type};
//! use midlayer::builder::Builder;
//! use midlayer::pass::PassManager;
//! use midlayer::transform::{ConstantFoldingPass, CsePass, DcePass};
//! use midlayer::LocalAliasAnalysisPass;
//!
//! let mut ctx = Context::new();
//! let module = ctx.create_module("demo").unwrap();
//!
//! let mut b = Builder::new(&mut ctx, module);
//! let f = b.create_function("answer", Type::I32, &[], NodeProps::empty());
//! let a = b.lit_i32(40);
//! let b2 = b.lit_i32(2);
//! let sum = b.add(Type::I32, a, b2);
//! b.ret(Some(sum));
//! let _ = f;
//!
//! let mut pm = PassManager::new(module, 2, false, 0);
//! pm.register(Box::new(LocalAliasAnalysisPass)).unwrap();
//! pm.register(Box::new(ConstantFoldingPass)).unwrap();
//! pm.register(Box::new(CsePass::default())).unwrap();
//! pm.register(Box::new(DcePass::default())).unwrap();
//! assert!(pm.run_all(&mut ctx).unwrap());
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `foundation` | Context, strings, types, nodes, regions, modules |
//! | `builder` | IR construction surface |
//! | `pass` | Pass traits, pass context, pass manager |
//! | `analysis` | Local alias analysis, loop analysis |
//! | `transform` | Scalar transforms (constfold, CSE, DCE, ADCE, DSE, reassociate, PRE, SROA) |
//! | `ipo` | Interprocedural framework and passes |
//! | `config` | Hierarchical configuration + logging bootstrap |

pub mod analysis;
pub mod builder;
pub mod config;
pub mod foundation;
pub mod ipo;
pub mod pass;
pub mod transform;

// Re-export the types most callers touch
pub use builder::Builder;
pub use config::Config;
pub use foundation::{
    Context, Module, ModuleId, Node, NodeId, NodeOp, NodeProps, Region, RegionId, StrId, Type,
    TypedData,
};
pub use pass::{AnalysisPass, Pass, PassContext, PassId, PassManager, TransformPass};

pub use analysis::{LocalAliasAnalysisPass, LoopAnalysisPass};
pub use ipo::{
    CallGraphAnalysisPass, IpoDcePass, IpoGvnPass, IpoInliningPass, IpoPassContext, IpoPassManager,
};
pub use transform::{
    AdcePass, ConstantFoldingPass, CsePass, DcePass, DsePass, PrePass, ReassociatePass, SroaPass,
};
