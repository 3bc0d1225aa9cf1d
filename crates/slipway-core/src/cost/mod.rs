//! Cost evaluator: arbitrates between competing production methods at a
//! node.
//!
//! Pure functions over candidate summaries -- no catalog access, no
//! mutation -- so the arbitration logic is testable independently of the
//! resolver.

use slipway_db::models::PlanOptimization;

use crate::resolve::Method;

/// Two candidates whose costs differ by less than this are considered
/// cost-equal and fall through to the preference tie-breaks.
pub const COST_EPSILON: f64 = 0.01;

/// A fully resolved production alternative for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub method: Method,
    /// Total cost of the subtree: input costs plus the job fee.
    pub cost: f64,
    /// Critical-path duration of the subtree.
    pub duration_seconds: i64,
    /// Material efficiency of the blueprint behind a manufacture candidate;
    /// zero for reactions.
    pub material_pct: u8,
}

/// Outcome of arbitration for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Adopt the production candidate at this index.
    Production(usize),
    /// Buy the item instead of producing it.
    Buy,
}

/// Pick the best option among production candidates and an optional buy
/// price.
///
/// Production candidates compete on the active mode's primary scalar
/// (cost for `minimize_cost`, duration for `minimize_time`), with the
/// other scalar as tie-break and then a method preference: manufacture
/// over reaction (reactions have fixed batch granularity and are less
/// flexible), higher material efficiency among blueprints, earlier
/// declaration order last.
///
/// The buy option replaces the winning production candidate only when it
/// is strictly cheaper beyond [`COST_EPSILON`]. Acquisition time is not
/// modeled, so buying never wins on duration alone.
///
/// Returns `None` when there are no candidates and buying is not offered.
pub fn select_best(
    candidates: &[Candidate],
    buy_cost: Option<f64>,
    mode: PlanOptimization,
) -> Option<Selection> {
    let best = best_production(candidates, mode);

    match (best, buy_cost) {
        (None, None) => None,
        (None, Some(_)) => Some(Selection::Buy),
        (Some(index), None) => Some(Selection::Production(index)),
        (Some(index), Some(buy)) => {
            if buy + COST_EPSILON < candidates[index].cost {
                Some(Selection::Buy)
            } else {
                Some(Selection::Production(index))
            }
        }
    }
}

/// Index of the preferred production candidate, if any.
fn best_production(candidates: &[Candidate], mode: PlanOptimization) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        match best {
            None => best = Some(index),
            Some(current) => {
                if is_better(candidate, &candidates[current], mode) {
                    best = Some(index);
                }
            }
        }
    }
    best
}

/// Whether `a` should be preferred over `b` under the given mode.
///
/// Deliberately returns `false` on a full tie so the earlier candidate
/// (declaration order) wins, keeping arbitration deterministic.
fn is_better(a: &Candidate, b: &Candidate, mode: PlanOptimization) -> bool {
    match mode {
        PlanOptimization::MinimizeCost => {
            if (a.cost - b.cost).abs() > COST_EPSILON {
                return a.cost < b.cost;
            }
            if a.duration_seconds != b.duration_seconds {
                return a.duration_seconds < b.duration_seconds;
            }
        }
        PlanOptimization::MinimizeTime => {
            if a.duration_seconds != b.duration_seconds {
                return a.duration_seconds < b.duration_seconds;
            }
            if (a.cost - b.cost).abs() > COST_EPSILON {
                return a.cost < b.cost;
            }
        }
    }

    let (rank_a, rank_b) = (method_rank(&a.method), method_rank(&b.method));
    if rank_a != rank_b {
        return rank_a < rank_b;
    }
    if a.material_pct != b.material_pct {
        return a.material_pct > b.material_pct;
    }
    false
}

fn method_rank(method: &Method) -> u8 {
    match method {
        Method::Manufacture { .. } => 0,
        Method::React { .. } => 1,
        Method::Buy => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manufacture(blueprint: i64, cost: f64, duration: i64, material_pct: u8) -> Candidate {
        Candidate {
            method: Method::Manufacture { blueprint, runs: 1 },
            cost,
            duration_seconds: duration,
            material_pct,
        }
    }

    fn react(formula: i64, cost: f64, duration: i64) -> Candidate {
        Candidate {
            method: Method::React { formula, cycles: 1 },
            cost,
            duration_seconds: duration,
            material_pct: 0,
        }
    }

    #[test]
    fn empty_and_no_buy_yields_none() {
        assert_eq!(select_best(&[], None, PlanOptimization::MinimizeCost), None);
    }

    #[test]
    fn buy_wins_when_nothing_else_exists() {
        assert_eq!(
            select_best(&[], Some(10.0), PlanOptimization::MinimizeCost),
            Some(Selection::Buy)
        );
    }

    #[test]
    fn cheapest_candidate_wins_in_cost_mode() {
        let candidates = [
            manufacture(10, 100.0, 60, 0),
            manufacture(11, 80.0, 600, 0),
        ];
        assert_eq!(
            select_best(&candidates, None, PlanOptimization::MinimizeCost),
            Some(Selection::Production(1))
        );
    }

    #[test]
    fn fastest_candidate_wins_in_time_mode() {
        let candidates = [
            manufacture(10, 100.0, 60, 0),
            manufacture(11, 80.0, 600, 0),
        ];
        assert_eq!(
            select_best(&candidates, None, PlanOptimization::MinimizeTime),
            Some(Selection::Production(0))
        );
    }

    #[test]
    fn duration_breaks_cost_ties() {
        let candidates = [
            manufacture(10, 100.0, 600, 0),
            manufacture(11, 100.005, 60, 0),
        ];
        assert_eq!(
            select_best(&candidates, None, PlanOptimization::MinimizeCost),
            Some(Selection::Production(1))
        );
    }

    #[test]
    fn cost_breaks_duration_ties_in_time_mode() {
        let candidates = [
            manufacture(10, 100.0, 60, 0),
            manufacture(11, 80.0, 60, 0),
        ];
        assert_eq!(
            select_best(&candidates, None, PlanOptimization::MinimizeTime),
            Some(Selection::Production(1))
        );
    }

    #[test]
    fn manufacture_preferred_over_reaction_within_epsilon() {
        let candidates = [react(20, 100.0, 60), manufacture(10, 100.005, 60, 0)];
        assert_eq!(
            select_best(&candidates, None, PlanOptimization::MinimizeCost),
            Some(Selection::Production(1))
        );
    }

    #[test]
    fn higher_material_efficiency_preferred_among_blueprints() {
        let candidates = [
            manufacture(10, 100.0, 60, 5),
            manufacture(11, 100.0, 60, 10),
        ];
        assert_eq!(
            select_best(&candidates, None, PlanOptimization::MinimizeCost),
            Some(Selection::Production(1))
        );
    }

    #[test]
    fn full_tie_keeps_declaration_order() {
        let candidates = [
            manufacture(10, 100.0, 60, 10),
            manufacture(11, 100.0, 60, 10),
        ];
        assert_eq!(
            select_best(&candidates, None, PlanOptimization::MinimizeCost),
            Some(Selection::Production(0))
        );
    }

    #[test]
    fn buy_adopted_only_on_strict_cost_domination() {
        let candidates = [manufacture(10, 100.0, 600, 0)];

        // Strictly cheaper: buy wins.
        assert_eq!(
            select_best(&candidates, Some(50.0), PlanOptimization::MinimizeCost),
            Some(Selection::Buy)
        );
        // Equal within epsilon: production preferred.
        assert_eq!(
            select_best(&candidates, Some(100.0), PlanOptimization::MinimizeCost),
            Some(Selection::Production(0))
        );
        // More expensive: production wins.
        assert_eq!(
            select_best(&candidates, Some(150.0), PlanOptimization::MinimizeCost),
            Some(Selection::Production(0))
        );
    }

    #[test]
    fn buy_never_wins_on_time_alone() {
        // Buying would be instant, but it costs more; in time mode the
        // production candidate must still win.
        let candidates = [manufacture(10, 100.0, 3600, 0)];
        assert_eq!(
            select_best(&candidates, Some(120.0), PlanOptimization::MinimizeTime),
            Some(Selection::Production(0))
        );
    }

    #[test]
    fn select_best_does_not_mutate_inputs() {
        let candidates = [manufacture(10, 100.0, 60, 0), react(20, 90.0, 30)];
        let snapshot = candidates.clone();
        let _ = select_best(&candidates, Some(10.0), PlanOptimization::MinimizeCost);
        assert_eq!(candidates, snapshot);
    }
}
