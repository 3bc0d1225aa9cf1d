//! Dependency resolver: expands a demand for `(item, quantity)` into a
//! production tree, selecting a method per node.
//!
//! Expansion is depth-first with memoization keyed by `(item, quantity)`
//! within a single call, so identical subtrees that recur across branches
//! (a mid-tier component consumed by several top-level products) are
//! computed once. The memo table sits behind a mutex, which keeps a
//! resolver coherent when independent subtrees are evaluated from
//! multiple threads; the computation itself is deterministic regardless
//! of evaluation order.
//!
//! Termination needs no depth cap: the catalog rejects cyclic recipes at
//! load, so the item hierarchy is a finite DAG.

pub mod context;

pub use context::{BuyFallback, CostParams, Efficiency, ResolveContext};

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Blueprint, Catalog, Item, ReactionFormula};
use crate::cost::{self, Candidate, Selection};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The production method chosen for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Method {
    /// Purchase at the reference price.
    Buy,
    /// Run a blueprint `runs` times.
    Manufacture { blueprint: i64, runs: i64 },
    /// Run a reaction formula for `cycles` cycles.
    React { formula: i64, cycles: i64 },
}

/// One resolved item in the dependency tree.
///
/// `children` are the chosen method's resolved inputs in recipe order;
/// a buy node never has children. `cost` and `duration_seconds` cover the
/// whole subtree (duration is the critical path, with sibling inputs
/// produced in parallel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionNode {
    pub item: i64,
    pub quantity: i64,
    pub method: Method,
    pub children: Vec<ProductionNode>,
    pub cost: f64,
    pub duration_seconds: i64,
}

/// Request-level resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown item {0}")]
    UnknownItem(i64),
    #[error("requested quantity {0} must be positive")]
    InvalidQuantity(i64),
    /// No legal production path under the context and buy policy. Names
    /// the first unresolvable item encountered.
    #[error("no feasible production path for item {item} and buying is disallowed")]
    Infeasible { item: i64 },
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves demands against one catalog snapshot and one request context.
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    ctx: &'a ResolveContext,
    /// Memo of completed subtrees, keyed by `(item, quantity)`.
    memo: Mutex<HashMap<(i64, i64), ProductionNode>>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog, ctx: &'a ResolveContext) -> Self {
        Self {
            catalog,
            ctx,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a demand into a production tree.
    pub fn resolve(&self, item: i64, quantity: i64) -> Result<ProductionNode, ResolveError> {
        if quantity <= 0 {
            return Err(ResolveError::InvalidQuantity(quantity));
        }
        self.node(item, quantity)
    }

    fn node(&self, item_id: i64, quantity: i64) -> Result<ProductionNode, ResolveError> {
        let item = self
            .catalog
            .item(item_id)
            .ok_or(ResolveError::UnknownItem(item_id))?;

        if let Some(hit) = self.memo_get(item_id, quantity) {
            return Ok(hit);
        }

        let node = self.expand(item, quantity)?;
        self.memo_put(item_id, quantity, node.clone());
        Ok(node)
    }

    fn expand(&self, item: &Item, quantity: i64) -> Result<ProductionNode, ResolveError> {
        let ctx = self.ctx;

        // Raw materials have no producer; a context may also disallow
        // internal production entirely.
        if !ctx.allow_production || self.catalog.is_raw(item.id) {
            return Ok(self.buy_node(item, quantity));
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut subtrees: Vec<Vec<ProductionNode>> = Vec::new();
        let mut first_blocked: Option<ResolveError> = None;

        for bp in self.catalog.blueprints_producing(item.id) {
            let Some(eff) = ctx.blueprint_efficiency(bp.id) else {
                continue;
            };
            if !ctx.has_facility(bp.facility.as_deref()) {
                continue;
            }
            match self.manufacture_candidate(bp, eff, quantity) {
                Ok((candidate, children)) => {
                    candidates.push(candidate);
                    subtrees.push(children);
                }
                Err(err @ ResolveError::Infeasible { .. }) => {
                    first_blocked.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        for rf in self.catalog.reactions_producing(item.id) {
            if !ctx.can_reach_any(&rf.systems) {
                continue;
            }
            match self.reaction_candidate(rf, item.id, quantity) {
                Ok((candidate, children)) => {
                    candidates.push(candidate);
                    subtrees.push(children);
                }
                Err(err @ ResolveError::Infeasible { .. }) => {
                    first_blocked.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        let buy_cost = match ctx.buy_fallback {
            BuyFallback::Market => Some(quantity as f64 * ctx.unit_price(item)),
            BuyFallback::Fail => None,
        };

        match cost::select_best(&candidates, buy_cost, ctx.optimization) {
            Some(Selection::Production(index)) => {
                let chosen = &candidates[index];
                let children = subtrees.swap_remove(index);
                Ok(ProductionNode {
                    item: item.id,
                    quantity,
                    method: chosen.method,
                    children,
                    cost: chosen.cost,
                    duration_seconds: chosen.duration_seconds,
                })
            }
            Some(Selection::Buy) => Ok(self.buy_node(item, quantity)),
            None => Err(first_blocked.unwrap_or(ResolveError::Infeasible { item: item.id })),
        }
    }

    /// Build the candidate for covering `quantity` with a blueprint.
    ///
    /// Runs are the ceiling of demand over batch size: a partial batch
    /// still consumes a full batch's inputs, mirroring discrete production
    /// runs.
    fn manufacture_candidate(
        &self,
        bp: &Blueprint,
        eff: Efficiency,
        quantity: i64,
    ) -> Result<(Candidate, Vec<ProductionNode>), ResolveError> {
        let runs = (quantity + bp.output_quantity - 1) / bp.output_quantity;

        let mut children = Vec::with_capacity(bp.inputs.len());
        let mut input_cost = 0.0;
        for input in &bp.inputs {
            let needed = scaled_input_quantity(input.quantity, runs, eff);
            let child = self.node(input.item, needed)?;
            input_cost += child.cost;
            children.push(child);
        }

        let own_duration = production_duration(bp.base_time_seconds, runs, eff);
        let child_path = children
            .iter()
            .map(|c| c.duration_seconds)
            .max()
            .unwrap_or(0);
        let fee = self.ctx.cost.job_fee(runs, own_duration);

        Ok((
            Candidate {
                method: Method::Manufacture {
                    blueprint: bp.id,
                    runs,
                },
                cost: input_cost + fee,
                duration_seconds: own_duration + child_path,
                material_pct: eff.material_pct,
            },
            children,
        ))
    }

    /// Build the candidate for covering `quantity` with a reaction.
    ///
    /// Reactions scale by whole cycles only and carry no efficiency
    /// modifiers.
    fn reaction_candidate(
        &self,
        rf: &ReactionFormula,
        output_item: i64,
        quantity: i64,
    ) -> Result<(Candidate, Vec<ProductionNode>), ResolveError> {
        let per_cycle = rf
            .outputs
            .iter()
            .find(|s| s.item == output_item)
            .map(|s| s.quantity)
            // The producers index only lists formulas whose outputs contain
            // the item, so this lookup cannot miss on a validated catalog.
            .ok_or(ResolveError::Infeasible { item: output_item })?;
        let cycles = (quantity + per_cycle - 1) / per_cycle;

        let mut children = Vec::with_capacity(rf.inputs.len());
        let mut input_cost = 0.0;
        for input in &rf.inputs {
            let needed = input.quantity * cycles;
            let child = self.node(input.item, needed)?;
            input_cost += child.cost;
            children.push(child);
        }

        let own_duration = rf.batch_time_seconds * cycles;
        let child_path = children
            .iter()
            .map(|c| c.duration_seconds)
            .max()
            .unwrap_or(0);
        let fee = self.ctx.cost.job_fee(cycles, own_duration);

        Ok((
            Candidate {
                method: Method::React {
                    formula: rf.id,
                    cycles,
                },
                cost: input_cost + fee,
                duration_seconds: own_duration + child_path,
                material_pct: 0,
            },
            children,
        ))
    }

    fn buy_node(&self, item: &Item, quantity: i64) -> ProductionNode {
        ProductionNode {
            item: item.id,
            quantity,
            method: Method::Buy,
            children: Vec::new(),
            cost: quantity as f64 * self.ctx.unit_price(item),
            duration_seconds: 0,
        }
    }

    fn memo_get(&self, item: i64, quantity: i64) -> Option<ProductionNode> {
        // A poisoned lock only means another thread panicked mid-insert of
        // a complete value; the map itself stays valid.
        let memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.get(&(item, quantity)).cloned()
    }

    fn memo_put(&self, item: i64, quantity: i64, node: ProductionNode) {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.insert((item, quantity), node);
    }
}

/// Input units consumed by `runs` runs at a given efficiency: material
/// efficiency reduces the total, but never below one unit per run.
fn scaled_input_quantity(base_quantity: i64, runs: i64, eff: Efficiency) -> i64 {
    let reduced = (base_quantity * runs) as f64 * eff.material_factor();
    (reduced.ceil() as i64).max(runs)
}

/// Duration of `runs` runs at a given time efficiency.
fn production_duration(base_time_seconds: i64, runs: i64, eff: Efficiency) -> i64 {
    let reduced = (base_time_seconds * runs) as f64 * eff.time_factor();
    reduced.ceil() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
