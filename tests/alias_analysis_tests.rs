//! Local alias analysis: verdicts over offset ranges, copy chains, escape
//! propagation, and store/load relations.

mod common;

use midlayer::analysis::alias::{AliasVerdict, LocalAliasResult, LOCAL_ALIAS_ANALYSIS};
use midlayer::builder::Builder;
use midlayer::foundation::{Context, ModuleId, NodeProps, Type};
use midlayer::pass::PassManager;
use midlayer::LocalAliasAnalysisPass;

fn run_alias(ctx: &mut Context, m: ModuleId) -> PassManager {
    let mut pm = PassManager::new(m, 2, false, 0);
    pm.register(Box::new(LocalAliasAnalysisPass)).unwrap();
    assert!(pm.run_pass(ctx, LOCAL_ALIAS_ANALYSIS).unwrap());
    pm
}

fn alias_of(pm: &PassManager) -> &LocalAliasResult {
    pm.context()
        .get_result::<LocalAliasResult>(LOCAL_ALIAS_ANALYSIS)
        .expect("alias analysis stored a result")
}

#[test]
fn test_same_pointer_must_alias() {
    let mut ctx = Context::new();
    let m = ctx.create_module("alias_must").unwrap();
    let mut b = Builder::new(&mut ctx, m);
    let _f = b.create_function("f", Type::VOID, &[], NodeProps::empty());
    let p = b.stack_alloc(Type::I64);
    let v = b.lit_i64(1);
    b.store(v, p);
    b.ret(None);

    let pm = run_alias(&mut ctx, m);
    let alias = alias_of(&pm);
    assert_eq!(alias.alias(p, p), AliasVerdict::Must);
    assert!(alias.is_allocation_site(p));
    assert!(!alias.has_escaped(p));
}

#[test]
fn test_displaced_pointers_partition_the_allocation() {
    // q0 = base+0, q8 = base+8 -> disjoint; q4 = base+4 overlaps q0
    let mut ctx = Context::new();
    let m = ctx.create_module("alias_ranges").unwrap();
    let arr_ty = ctx.create_array_type(Type::I64, 4).unwrap();
    let elem_ptr_ty = ctx.create_pointer_type(Type::I64, 0).unwrap();

    let mut b = Builder::new(&mut ctx, m);
    let _f = b.create_function("f", Type::VOID, &[], NodeProps::empty());
    let p = b.stack_alloc(arr_ty);
    let whole = b.addr_of(p);
    let base = b.cast(elem_ptr_ty, whole);
    let z = b.lit_i64(0);
    let q0 = b.ptr_add(base, z);
    let eight = b.lit_i64(8);
    let q8 = b.ptr_add(base, eight);
    let four = b.lit_i64(4);
    let q4 = b.ptr_add(base, four);
    b.ret(None);

    let pm = run_alias(&mut ctx, m);
    let alias = alias_of(&pm);
    assert_eq!(alias.alias(q0, q8), AliasVerdict::No, "disjoint ranges");
    assert_eq!(alias.alias(q0, q4), AliasVerdict::Partial, "overlapping ranges");
    assert_eq!(alias.alias(q0, q0), AliasVerdict::Must);
}

#[test]
fn test_unknown_offset_downgrades_to_may() {
    let mut ctx = Context::new();
    let m = ctx.create_module("alias_unknown").unwrap();
    let mut b = Builder::new(&mut ctx, m);
    let f = b.create_function("f", Type::VOID, &[("n", Type::I64)], NodeProps::empty());
    let p = b.stack_alloc(Type::I64);
    let base = b.addr_of(p);
    let z = b.lit_i64(0);
    let q0 = b.ptr_add(base, z);
    let qn = b.ptr_add(base, f.params[0]);
    b.ret(None);

    let pm = run_alias(&mut ctx, m);
    let alias = alias_of(&pm);
    assert_eq!(alias.alias(q0, qn), AliasVerdict::May);
}

#[test]
fn test_cast_copy_chain_resolves_to_source() {
    let mut ctx = Context::new();
    let m = ctx.create_module("alias_copy").unwrap();
    let ptr_i32 = ctx.create_pointer_type(Type::I32, 0).unwrap();

    let mut b = Builder::new(&mut ctx, m);
    let _f = b.create_function("f", Type::VOID, &[], NodeProps::empty());
    let p = b.stack_alloc(Type::I32);
    let c1 = b.cast(ptr_i32, p);
    let c2 = b.cast(ptr_i32, c1);
    b.ret(None);

    let pm = run_alias(&mut ctx, m);
    let alias = alias_of(&pm);
    assert_eq!(alias.pointer_source(c2), p);
    assert_eq!(alias.alias(c2, p), AliasVerdict::Must);
}

#[test]
fn test_call_argument_escapes_and_infects_the_allocation() {
    let mut ctx = Context::new();
    let m = ctx.create_module("alias_escape").unwrap();
    let mut b = Builder::new(&mut ctx, m);
    let ext = b.create_function("sink", Type::VOID, &[], NodeProps::EXTERN);
    let _f = b.create_function("f", Type::VOID, &[], NodeProps::empty());
    let p = b.stack_alloc(Type::I32);
    let addr = b.addr_of(p);
    b.call(Type::VOID, ext.function, &[addr]);
    b.ret(None);

    let pm = run_alias(&mut ctx, m);
    let alias = alias_of(&pm);
    assert!(alias.has_escaped(addr));
    assert!(alias.has_escaped(p), "escape flows back to the allocation");
}

#[test]
fn test_store_load_relations() {
    let mut ctx = Context::new();
    let m = ctx.create_module("alias_rel").unwrap();
    let mut b = Builder::new(&mut ctx, m);
    let _f = b.create_function("f", Type::I32, &[], NodeProps::empty());
    let p = b.stack_alloc(Type::I32);
    let one = b.lit_i32(1);
    let store_p = b.store(one, p);
    let load_p = b.load(Type::I32, p);
    b.ret(Some(load_p));

    let pm = run_alias(&mut ctx, m);
    let alias = alias_of(&pm);
    assert_eq!(alias.affecting_stores(load_p), vec![store_p]);
    assert!(alias.maybe_modified_by(load_p, store_p));
    assert!(alias.affected_loads(store_p).contains(&load_p));
}
