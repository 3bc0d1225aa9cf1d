//! Per-request resolution context.
//!
//! Everything the engine needs from its collaborators -- blueprint
//! ownership and efficiency, reachable reaction systems, facility access,
//! current prices, policy flags -- arrives pre-resolved in a
//! [`ResolveContext`] value. The resolver never performs I/O mid-call.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use slipway_db::models::PlanOptimization;

use crate::catalog::Item;

/// Efficiency level of an owned blueprint.
///
/// Material efficiency reduces input quantities, time efficiency reduces
/// run duration. Values beyond the game caps are clamped on use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Efficiency {
    /// Percentage reduction of input quantities, capped at 10.
    #[serde(default)]
    pub material_pct: u8,
    /// Percentage reduction of run duration, capped at 20.
    #[serde(default)]
    pub time_pct: u8,
}

impl Efficiency {
    pub const MAX_MATERIAL_PCT: u8 = 10;
    pub const MAX_TIME_PCT: u8 = 20;

    pub fn new(material_pct: u8, time_pct: u8) -> Self {
        Self {
            material_pct: material_pct.min(Self::MAX_MATERIAL_PCT),
            time_pct: time_pct.min(Self::MAX_TIME_PCT),
        }
    }

    /// Multiplier applied to input quantities.
    pub fn material_factor(self) -> f64 {
        1.0 - f64::from(self.material_pct.min(Self::MAX_MATERIAL_PCT)) / 100.0
    }

    /// Multiplier applied to run duration.
    pub fn time_factor(self) -> f64 {
        1.0 - f64::from(self.time_pct.min(Self::MAX_TIME_PCT)) / 100.0
    }
}

/// What to do when an item has production recipes but none is usable under
/// the current context (no owned blueprint, missing facility, unreachable
/// systems).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyFallback {
    /// Fall back to buying the item at the reference price.
    #[default]
    Market,
    /// Fail the resolution, naming the blocking item.
    Fail,
}

/// Facility/job fee model: every production step costs a fee proportional
/// to its run count and duration, on top of its input costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    pub job_fee_per_run: f64,
    pub job_fee_per_second: f64,
}

impl CostParams {
    /// Fee for a production step of `runs` runs taking `duration_seconds`.
    pub fn job_fee(&self, runs: i64, duration_seconds: i64) -> f64 {
        runs as f64 * self.job_fee_per_run + duration_seconds as f64 * self.job_fee_per_second
    }
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            job_fee_per_run: 250.0,
            job_fee_per_second: 0.05,
        }
    }
}

/// External facts and policy for one resolution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveContext {
    /// Blueprints owned by the requesting character/corporation, with their
    /// efficiency levels.
    pub owned_blueprints: HashMap<i64, Efficiency>,
    /// Policy "any blueprint": unowned blueprints are usable at zero
    /// efficiency (market-bought copies).
    pub allow_unowned_blueprints: bool,
    /// Reaction-capable systems this character can reach.
    pub reachable_systems: HashSet<i64>,
    /// Facility classes available to the requester.
    pub facilities: HashSet<String>,
    /// Current reference prices by item id; the catalog base price is used
    /// for items absent here.
    pub prices: HashMap<i64, f64>,
    pub buy_fallback: BuyFallback,
    /// When false, internal production is disallowed entirely and every
    /// requirement becomes a buy.
    pub allow_production: bool,
    pub optimization: PlanOptimization,
    pub cost: CostParams,
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self {
            owned_blueprints: HashMap::new(),
            allow_unowned_blueprints: false,
            reachable_systems: HashSet::new(),
            facilities: HashSet::new(),
            prices: HashMap::new(),
            buy_fallback: BuyFallback::default(),
            allow_production: true,
            optimization: PlanOptimization::MinimizeCost,
            cost: CostParams::default(),
        }
    }
}

impl ResolveContext {
    /// Unit price for an item: the supplied current price, falling back to
    /// the catalog reference price.
    pub fn unit_price(&self, item: &Item) -> f64 {
        self.prices.get(&item.id).copied().unwrap_or(item.base_price)
    }

    /// Efficiency to use for a blueprint, or `None` when the blueprint is
    /// not usable under this context's ownership policy.
    pub fn blueprint_efficiency(&self, blueprint_id: i64) -> Option<Efficiency> {
        match self.owned_blueprints.get(&blueprint_id) {
            Some(eff) => Some(*eff),
            None if self.allow_unowned_blueprints => Some(Efficiency::default()),
            None => None,
        }
    }

    /// Whether any of the given systems is reachable.
    pub fn can_reach_any(&self, systems: &[i64]) -> bool {
        systems.iter().any(|s| self.reachable_systems.contains(s))
    }

    /// Whether the required facility class (if any) is available.
    pub fn has_facility(&self, facility: Option<&str>) -> bool {
        facility.is_none_or(|f| self.facilities.contains(f))
    }
}
