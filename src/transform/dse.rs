//! # Dead Store Elimination
//!
//! Removes stores that are overwritten before any read can observe them.
//! Per region, a program-order scan tracks the last store to each address;
//! a MUST-aliasing newer store makes the older one potentially dead, a
//! PARTIAL-aliasing one only when its memory range completely covers the
//! older store. Loads resurrect aliasing stores; calls resurrect stores to
//! escaped addresses; NO_OPTIMIZE and global-scope stores are never touched.

use crate::analysis::alias::{
    memory_address, store_address, AliasVerdict, LocalAliasResult, LOCAL_ALIAS_ANALYSIS,
};
use crate::foundation::{Context, NodeId, RegionId, Type};
use crate::pass::{Pass, PassContext, PassError, PassId, PassResult, TransformPass};
use rustc_hash::FxHashSet;

/// Tag of the DSE pass.
pub const DSE: PassId = PassId("dead-store-elimination");

/// Dead store elimination pass.
#[derive(Debug, Default)]
pub struct DsePass;

impl Pass for DsePass {
    fn id(&self) -> PassId {
        DSE
    }

    fn name(&self) -> &'static str {
        "dead-store-elimination"
    }

    fn description(&self) -> &'static str {
        "removes stores that are never read before being overwritten"
    }

    fn required(&self) -> Vec<PassId> {
        vec![LOCAL_ALIAS_ANALYSIS]
    }

    fn min_opt_level(&self) -> u8 {
        1
    }

    fn run(&mut self, ir: &mut Context, ctx: &mut PassContext) -> PassResult<bool> {
        let module = ctx.module();
        let Some(alias) = ctx.get_result::<LocalAliasResult>(LOCAL_ALIAS_ANALYSIS) else {
            return Err(PassError::MissingAnalysis {
                required: LOCAL_ALIAS_ANALYSIS,
                dependent: DSE,
            });
        };

        let root = ir.module(module).root;
        let removed = process_region(ir, root, alias);
        ctx.update_stat("dse.removed_stores", removed);
        Ok(true)
    }
}

impl TransformPass for DsePass {}

fn process_region(ir: &mut Context, region: RegionId, alias: &LocalAliasResult) -> u64 {
    let mut removed = 0;

    // (address, store) in program order; linear scan keeps insertion order
    let mut last_store_to_location: Vec<(NodeId, NodeId)> = Vec::new();
    let mut potentially_dead: FxHashSet<NodeId> = FxHashSet::default();
    let mut definitely_live: FxHashSet<NodeId> = FxHashSet::default();

    let nodes = ir.region(region).nodes.clone();
    for node in nodes {
        let op = ir.node(node).op;
        if op.is_store() {
            let Some(store_addr) = store_address(ir, node) else {
                continue;
            };

            let addr_is_global = ir
                .node(store_addr)
                .parent_region
                .is_some_and(|r| ir.region(r).is_global_scope());
            if ir.region(region).is_global_scope() || addr_is_global {
                definitely_live.insert(node);
                continue;
            }
            if ir.node(node).is_volatile() {
                definitely_live.insert(node);
                continue;
            }

            let mut stale_addrs = Vec::new();
            for &(other_addr, other_store) in &last_store_to_location {
                if other_addr == store_addr {
                    continue;
                }
                match alias.alias(store_addr, other_addr) {
                    AliasVerdict::Must => {
                        // definitely the same location
                        potentially_dead.insert(other_store);
                        stale_addrs.push(other_addr);
                    }
                    AliasVerdict::Partial => {
                        if covers_completely(ir, alias, other_store, node, other_addr, store_addr)
                        {
                            potentially_dead.insert(other_store);
                            stale_addrs.push(other_addr);
                        }
                    }
                    _ => {}
                }
            }

            if let Some(&(_, prev)) = last_store_to_location
                .iter()
                .find(|&&(addr, _)| addr == store_addr)
            {
                potentially_dead.insert(prev);
            }

            last_store_to_location
                .retain(|(addr, _)| !stale_addrs.contains(addr) && *addr != store_addr);
            last_store_to_location.push((store_addr, node));
        } else if op.is_load() {
            let Some(load_addr) = memory_address(ir, node) else {
                continue;
            };
            // a read makes every aliasing store live
            for &(store_addr, store) in &last_store_to_location {
                if alias.alias(load_addr, store_addr) != AliasVerdict::No {
                    definitely_live.insert(store);
                    potentially_dead.remove(&store);
                }
            }
        } else if op.is_call() {
            // the callee can observe anything that escaped
            for &(store_addr, store) in &last_store_to_location {
                if alias.has_escaped(store_addr) {
                    definitely_live.insert(store);
                    potentially_dead.remove(&store);
                }
            }
        }
    }

    let mut dead: Vec<NodeId> = potentially_dead
        .iter()
        .copied()
        .filter(|store| {
            !definitely_live.contains(store)
                && store_address(ir, *store).is_some_and(|addr| !alias.has_escaped(addr))
        })
        .collect();
    dead.sort_unstable();

    for store in dead {
        ir.erase_node(store);
        removed += 1;
    }

    let children = ir.region(region).children.clone();
    for child in children {
        removed += process_region(ir, child, alias);
    }
    removed
}

/// A partially overlapping older store may be killed only when the newer
/// store's range completely covers it, or when both write the identical
/// (base, offset, size) with the same stored-value type.
fn covers_completely(
    ir: &Context,
    alias: &LocalAliasResult,
    old_store: NodeId,
    new_store: NodeId,
    old_addr: NodeId,
    new_addr: NodeId,
) -> bool {
    let (Some(old_loc), Some(new_loc)) = (alias.location(old_addr), alias.location(new_addr))
    else {
        return false;
    };

    if old_loc.base != new_loc.base
        || old_loc.offset < 0
        || new_loc.offset < 0
        || old_loc.size == 0
        || new_loc.size == 0
    {
        return false;
    }

    let old_start = old_loc.offset;
    let old_end = old_start + old_loc.size as i64;
    let new_start = new_loc.offset;
    let new_end = new_start + new_loc.size as i64;
    if new_start <= old_start && new_end >= old_end {
        return true;
    }

    old_loc.size == new_loc.size
        && old_start == new_start
        && stored_value_type(ir, old_store) == stored_value_type(ir, new_store)
}

fn stored_value_type(ir: &Context, store: NodeId) -> Type {
    ir.node(store)
        .inputs
        .first()
        .map_or(Type::VOID, |&v| ir.node(v).ty)
}
