//! Plan materialization: flatten a resolved production tree into an
//! aggregated, topologically ordered step list.
//!
//! Production nodes for the same `(item, method, recipe)` are merged into
//! a single step (runs, quantities, and fees summed), buy leaves are
//! aggregated into raw-material line items, and every step records the
//! steps producing its inputs so no step can appear before its producers.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use slipway_db::models::{PlanOptimization, StepMethod};

use crate::catalog::Catalog;
use crate::resolve::{Method, ProductionNode};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The flattened, aggregated form of a resolved tree, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedPlan {
    pub target_item: i64,
    pub target_item_name: String,
    pub target_quantity: i64,
    pub optimization: PlanOptimization,
    /// Production steps in a valid topological order.
    pub steps: Vec<StepSpec>,
    /// Aggregated raw-material buy list.
    pub materials: Vec<MaterialLine>,
    /// Full cost of the plan: material costs plus all job fees.
    pub total_cost: f64,
    /// Number of concurrent job slots the plan can occupy.
    pub job_slots: i64,
    /// Wall-clock seconds assuming unlimited parallel slots (critical path).
    pub duration_parallel_seconds: i64,
    /// Wall-clock seconds assuming a single slot (sum of step durations).
    pub duration_serial_seconds: i64,
}

/// One production step of a materialized plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub item: i64,
    pub item_name: String,
    pub method: StepMethod,
    /// Blueprint id for `manufacture`, formula id for `react`.
    pub recipe_id: i64,
    pub runs: i64,
    pub quantity: i64,
    /// Facility/job fee for this step's runs. Input costs are carried by
    /// the producing steps and the material list, so step costs and
    /// material costs sum to the plan total without double counting.
    pub cost: f64,
    pub duration_seconds: i64,
    /// Indices (into the step list) of the steps producing this step's
    /// inputs. Always smaller than this step's own index.
    pub depends_on: Vec<usize>,
}

/// An aggregated raw-material line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialLine {
    pub item: i64,
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub cost: f64,
}

// ---------------------------------------------------------------------------
// Materialization
// ---------------------------------------------------------------------------

/// Flatten a resolved tree into a [`MaterializedPlan`].
///
/// Pure: persisting the result (and thereby giving it an identity) is the
/// plan service's job, and doing so twice yields two distinct plans.
pub fn materialize(
    catalog: &Catalog,
    root: &ProductionNode,
    optimization: PlanOptimization,
) -> MaterializedPlan {
    let mut collector = Collector::new(catalog);
    collector.walk(root);

    let order = collector.topological_order();
    let final_index: HashMap<usize, usize> = order
        .iter()
        .enumerate()
        .map(|(position, &dense)| (dense, position))
        .collect();

    let mut steps = Vec::with_capacity(order.len());
    for &dense in &order {
        let accum = &collector.steps[dense];
        let mut depends_on: Vec<usize> = accum
            .deps
            .iter()
            .map(|dep| final_index[dep])
            .collect();
        depends_on.sort_unstable();
        steps.push(StepSpec {
            item: accum.item,
            item_name: collector.item_name(accum.item),
            method: accum.method,
            recipe_id: accum.recipe_id,
            runs: accum.runs,
            quantity: accum.quantity,
            cost: accum.fee,
            duration_seconds: accum.own_duration,
            depends_on,
        });
    }

    let materials: Vec<MaterialLine> = collector
        .materials
        .iter()
        .map(|(&item, accum)| MaterialLine {
            item,
            item_name: collector.item_name(item),
            quantity: accum.quantity,
            unit_price: accum.unit_price,
            cost: accum.cost,
        })
        .collect();

    let duration_serial_seconds = steps.iter().map(|s| s.duration_seconds).sum();

    MaterializedPlan {
        target_item: root.item,
        target_item_name: collector.item_name(root.item),
        target_quantity: root.quantity,
        optimization,
        job_slots: steps.len() as i64,
        total_cost: root.cost,
        duration_parallel_seconds: root.duration_seconds,
        duration_serial_seconds,
        steps,
        materials,
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Accumulated state for one merged production step, in first-seen order.
struct StepAccum {
    item: i64,
    method: StepMethod,
    recipe_id: i64,
    runs: i64,
    quantity: i64,
    fee: f64,
    own_duration: i64,
    /// Dense indices of producer steps.
    deps: BTreeSet<usize>,
}

#[derive(Default)]
struct MaterialAccum {
    quantity: i64,
    unit_price: f64,
    cost: f64,
}

struct Collector<'a> {
    catalog: &'a Catalog,
    index_of: HashMap<(i64, StepMethod, i64), usize>,
    steps: Vec<StepAccum>,
    materials: BTreeMap<i64, MaterialAccum>,
}

impl<'a> Collector<'a> {
    fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            index_of: HashMap::new(),
            steps: Vec::new(),
            materials: BTreeMap::new(),
        }
    }

    fn item_name(&self, id: i64) -> String {
        self.catalog
            .item(id)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Post-order walk. Returns the dense step index for production nodes,
    /// `None` for buys.
    fn walk(&mut self, node: &ProductionNode) -> Option<usize> {
        let (method, recipe_id, runs) = match node.method {
            Method::Buy => {
                let entry = self.materials.entry(node.item).or_default();
                if entry.quantity == 0 && node.quantity > 0 {
                    entry.unit_price = node.cost / node.quantity as f64;
                }
                entry.quantity += node.quantity;
                entry.cost += node.cost;
                return None;
            }
            Method::Manufacture { blueprint, runs } => (StepMethod::Manufacture, blueprint, runs),
            Method::React { formula, cycles } => (StepMethod::React, formula, cycles),
        };

        let child_indices: Vec<usize> = node
            .children
            .iter()
            .filter_map(|child| self.walk(child))
            .collect();

        // A step's own share of the subtree aggregates: duration without
        // the child critical path, cost without the child subtree costs.
        let child_path = node
            .children
            .iter()
            .map(|c| c.duration_seconds)
            .max()
            .unwrap_or(0);
        let own_duration = node.duration_seconds - child_path;
        let fee = node.cost - node.children.iter().map(|c| c.cost).sum::<f64>();

        let key = (node.item, method, recipe_id);
        match self.index_of.get(&key).copied() {
            Some(index) => {
                let accum = &mut self.steps[index];
                accum.runs += runs;
                accum.quantity += node.quantity;
                accum.fee += fee;
                accum.own_duration += own_duration;
                accum.deps.extend(child_indices);
                Some(index)
            }
            None => {
                let index = self.steps.len();
                self.steps.push(StepAccum {
                    item: node.item,
                    method,
                    recipe_id,
                    runs,
                    quantity: node.quantity,
                    fee,
                    own_duration,
                    deps: child_indices.into_iter().collect(),
                });
                self.index_of.insert(key, index);
                Some(index)
            }
        }
    }

    /// Kahn's algorithm over the producer -> consumer edges, breaking ties
    /// by first-seen order so the result is deterministic.
    fn topological_order(&self) -> Vec<usize> {
        let count = self.steps.len();
        let mut in_degree = vec![0usize; count];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); count];

        for (index, step) in self.steps.iter().enumerate() {
            in_degree[index] = step.deps.len();
            for &dep in &step.deps {
                consumers[dep].push(index);
            }
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(current) = queue.pop_front() {
            order.push(current);
            let mut next_ready: Vec<usize> = Vec::new();
            for &consumer in &consumers[current] {
                in_degree[consumer] -= 1;
                if in_degree[consumer] == 0 {
                    next_ready.push(consumer);
                }
            }
            next_ready.sort_unstable();
            queue.extend(next_ready);
        }

        // The step graph is derived from an acyclic recipe catalog, so the
        // sweep always covers every step.
        debug_assert_eq!(order.len(), count);
        order
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{CostParams, ResolveContext, Resolver};

    const WIDGET: &str = r#"
[[items]]
id = 1
name = "Raw Ore"
category = "raw"
base_price = 2.0

[[items]]
id = 2
name = "Tritanium Widget"
category = "component"
base_price = 10.0

[[blueprints]]
id = 10
name = "Tritanium Widget Blueprint"
output_item = 2
output_quantity = 5
base_time_seconds = 600
inputs = [{ item = 1, quantity = 3 }]
"#;

    const CRUISER: &str = r#"
[[items]]
id = 1
name = "Ore"
category = "raw"
base_price = 1.0

[[items]]
id = 2
name = "Plate"
category = "component"
base_price = 100000.0

[[items]]
id = 3
name = "Frame"
category = "component"
base_price = 600000.0

[[items]]
id = 4
name = "Cruiser"
category = "final-product"
base_price = 5000000.0

[[blueprints]]
id = 10
name = "Plate Blueprint"
output_item = 2
output_quantity = 1
base_time_seconds = 60
inputs = [{ item = 1, quantity = 10 }]

[[blueprints]]
id = 11
name = "Frame Blueprint"
output_item = 3
output_quantity = 1
base_time_seconds = 120
inputs = [{ item = 2, quantity = 5 }]

[[blueprints]]
id = 12
name = "Cruiser Blueprint"
output_item = 4
output_quantity = 1
base_time_seconds = 600
inputs = [
    { item = 2, quantity = 5 },
    { item = 3, quantity = 1 },
]
"#;

    fn flat_fee_context() -> ResolveContext {
        ResolveContext {
            allow_unowned_blueprints: true,
            cost: CostParams {
                job_fee_per_run: 10.0,
                job_fee_per_second: 0.0,
            },
            ..ResolveContext::default()
        }
    }

    fn plan_for(catalog_toml: &str, item: i64, quantity: i64) -> MaterializedPlan {
        let catalog = Catalog::from_toml_str(catalog_toml).expect("catalog should load");
        let ctx = flat_fee_context();
        let resolver = Resolver::new(&catalog, &ctx);
        let root = resolver.resolve(item, quantity).expect("should resolve");
        materialize(&catalog, &root, ctx.optimization)
    }

    #[test]
    fn widget_plan_aggregates() {
        let plan = plan_for(WIDGET, 2, 10);

        assert_eq!(plan.target_item, 2);
        assert_eq!(plan.target_item_name, "Tritanium Widget");
        assert_eq!(plan.target_quantity, 10);

        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.method, StepMethod::Manufacture);
        assert_eq!(step.recipe_id, 10);
        assert_eq!(step.runs, 2);
        assert_eq!(step.cost, 20.0, "two job fees of ten");
        assert!(step.depends_on.is_empty());

        assert_eq!(plan.materials.len(), 1);
        let ore = &plan.materials[0];
        assert_eq!(ore.item_name, "Raw Ore");
        assert_eq!(ore.quantity, 6);
        assert_eq!(ore.unit_price, 2.0);
        assert_eq!(ore.cost, 12.0);

        assert_eq!(plan.total_cost, 32.0);
        assert_eq!(plan.job_slots, 1);
        assert_eq!(plan.duration_parallel_seconds, 1200);
        assert_eq!(plan.duration_serial_seconds, 1200);
    }

    #[test]
    fn step_costs_and_materials_sum_to_total() {
        let plan = plan_for(CRUISER, 4, 1);
        let fees: f64 = plan.steps.iter().map(|s| s.cost).sum();
        let materials: f64 = plan.materials.iter().map(|m| m.cost).sum();
        assert!((fees + materials - plan.total_cost).abs() < 1e-9);
    }

    #[test]
    fn step_order_is_topological() {
        let plan = plan_for(CRUISER, 4, 1);
        for (index, step) in plan.steps.iter().enumerate() {
            for &dep in &step.depends_on {
                assert!(
                    dep < index,
                    "step {index} ({}) depends on later step {dep}",
                    step.item_name
                );
            }
        }
    }

    #[test]
    fn shared_component_merged_into_one_step() {
        // Plates are consumed by both the frame and the cruiser; the plan
        // must carry a single plate step covering both demands.
        let plan = plan_for(CRUISER, 4, 1);

        let plate_steps: Vec<&StepSpec> =
            plan.steps.iter().filter(|s| s.item_name == "Plate").collect();
        assert_eq!(plate_steps.len(), 1);
        assert_eq!(plate_steps[0].quantity, 10);
        assert_eq!(plate_steps[0].runs, 10);

        // Ore for all ten plates lands in one material line.
        assert_eq!(plan.materials.len(), 1);
        assert_eq!(plan.materials[0].quantity, 100);
    }

    #[test]
    fn dependents_reference_their_producers() {
        let plan = plan_for(CRUISER, 4, 1);

        let index_by_name: HashMap<&str, usize> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.item_name.as_str(), i))
            .collect();

        let plate = index_by_name["Plate"];
        let frame = index_by_name["Frame"];
        let cruiser = index_by_name["Cruiser"];

        assert_eq!(plan.steps[frame].depends_on, vec![plate]);
        assert_eq!(plan.steps[cruiser].depends_on, vec![plate, frame]);
    }

    #[test]
    fn serial_duration_sums_merged_steps() {
        let plan = plan_for(CRUISER, 4, 1);
        // 10 plate runs at 60s, 1 frame run at 120s, 1 cruiser run at 600s.
        assert_eq!(plan.duration_serial_seconds, 600 + 120 + 600);
        // Critical path: plates for the frame (5 * ... merged) -- the tree
        // path is plate(300s for 5 runs) + frame(120s) vs plate(300s), then
        // cruiser(600s) on top.
        assert_eq!(plan.duration_parallel_seconds, 300 + 120 + 600);
    }

    #[test]
    fn buy_only_plan_has_no_steps() {
        // A raw target resolves to a single buy node, which materializes
        // as one line item and zero steps.
        let plan = plan_for(WIDGET, 1, 25);
        assert!(plan.steps.is_empty());
        assert_eq!(plan.job_slots, 0);
        assert_eq!(plan.materials.len(), 1);
        assert_eq!(plan.materials[0].quantity, 25);
        assert_eq!(plan.total_cost, 50.0);
        assert_eq!(plan.duration_parallel_seconds, 0);
        assert_eq!(plan.duration_serial_seconds, 0);
    }

    #[test]
    fn materializing_twice_is_deterministic() {
        let a = plan_for(CRUISER, 4, 3);
        let b = plan_for(CRUISER, 4, 3);
        assert_eq!(a, b);
    }
}
