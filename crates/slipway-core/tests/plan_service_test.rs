//! Integration tests for plan persistence.
//!
//! Backed by a shared PostgreSQL container from `slipway-test-utils`.
//! Each test gets a unique temporary database with migrations applied,
//! dropped on completion.

use sqlx::PgPool;

use slipway_core::catalog::Catalog;
use slipway_core::plan::{self, MaterializedPlan, compute_plan};
use slipway_core::resolve::{CostParams, ResolveContext};
use slipway_db::models::StepMethod;
use slipway_db::queries::plans as plan_queries;
use slipway_test_utils::{create_test_db, drop_test_db};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Three-tier chain: Ore -> Plate -> Frame -> Cruiser, with plates
/// consumed by both the frame and the cruiser.
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

fn cruiser_plan() -> MaterializedPlan {
    let catalog = Catalog::from_toml_str(CRUISER).expect("catalog should load");
    let ctx = ResolveContext {
        allow_unowned_blueprints: true,
        cost: CostParams {
            job_fee_per_run: 10.0,
            job_fee_per_second: 0.0,
        },
        ..ResolveContext::default()
    };
    compute_plan(&catalog, &ctx, 4, 1).expect("should resolve")
}

async fn count_rows(pool: &PgPool, table: &str) -> i64 {
    let query = format!("SELECT COUNT(*) FROM {table}");
    let row: (i64,) = sqlx::query_as(&query)
        .fetch_one(pool)
        .await
        .expect("count should work");
    row.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persist_and_fetch_roundtrip() {
    let (pool, db_name) = create_test_db().await;
    let materialized = cruiser_plan();

    let plan_row = plan::create_plan(&pool, "cruiser build", "aki", &materialized)
        .await
        .expect("create_plan should succeed");

    let detail = plan::get_plan_detail(&pool, plan_row.id)
        .await
        .expect("fetch should succeed")
        .expect("plan should exist");

    assert_eq!(detail.plan.name, "cruiser build");
    assert_eq!(detail.plan.owner, "aki");
    assert_eq!(detail.plan.target_item, 4);
    assert_eq!(detail.plan.target_quantity, 1);
    assert_eq!(detail.plan.total_cost, materialized.total_cost);
    assert_eq!(detail.plan.job_slots, 3);

    // Steps come back in topological order with contiguous indices.
    assert_eq!(detail.steps.len(), materialized.steps.len());
    for (index, step) in detail.steps.iter().enumerate() {
        assert_eq!(step.step_index, index as i32);
        assert_eq!(step.item_id, materialized.steps[index].item);
        assert_eq!(step.method, materialized.steps[index].method);
        assert_eq!(step.runs, materialized.steps[index].runs);
    }

    // Materials match the aggregated buy list.
    assert_eq!(detail.materials.len(), 1);
    assert_eq!(detail.materials[0].item_id, 1);
    assert_eq!(detail.materials[0].quantity, 100);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn persisted_edges_match_step_dependencies() {
    let (pool, db_name) = create_test_db().await;
    let materialized = cruiser_plan();

    let plan_row = plan::create_plan(&pool, "cruiser build", "aki", &materialized)
        .await
        .expect("create_plan should succeed");

    let steps = plan_queries::get_steps_for_plan(&pool, plan_row.id)
        .await
        .expect("steps should fetch");
    let edges = plan_queries::get_step_edges(&pool, plan_row.id)
        .await
        .expect("edges should fetch");

    let expected_edges: usize = materialized.steps.iter().map(|s| s.depends_on.len()).sum();
    assert_eq!(edges.len(), expected_edges);

    // Every edge points from a later step to an earlier one.
    for (step_id, depends_on) in &edges {
        let consumer = steps.iter().find(|s| s.id == *step_id).expect("consumer");
        let producer = steps
            .iter()
            .find(|s| s.id == *depends_on)
            .expect("producer");
        assert!(
            producer.step_index < consumer.step_index,
            "edge {} -> {} violates topological order",
            consumer.step_index,
            producer.step_index
        );
    }

    // The cruiser step depends on both the plate and frame steps.
    let cruiser = steps
        .iter()
        .find(|s| s.item_name == "Cruiser")
        .expect("cruiser step");
    let cruiser_deps = edges.iter().filter(|(s, _)| *s == cruiser.id).count();
    assert_eq!(cruiser_deps, 2);
    assert_eq!(cruiser.method, StepMethod::Manufacture);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn materializing_twice_produces_distinct_plan_identities() {
    let (pool, db_name) = create_test_db().await;
    let materialized = cruiser_plan();

    let first = plan::create_plan(&pool, "cruiser build", "aki", &materialized)
        .await
        .expect("first create should succeed");
    let second = plan::create_plan(&pool, "cruiser build", "aki", &materialized)
        .await
        .expect("second create should succeed");

    assert_ne!(first.id, second.id, "plans are point-in-time artifacts");

    let plans = plan_queries::list_plans(&pool).await.expect("list");
    assert_eq!(plans.len(), 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plan_write_is_all_or_nothing() {
    let (pool, db_name) = create_test_db().await;
    let mut materialized = cruiser_plan();

    // Corrupt one step so its insert violates a CHECK constraint; nothing
    // from the attempt may remain visible.
    materialized.steps[1].runs = 0;

    let result = plan::create_plan(&pool, "broken", "aki", &materialized).await;
    assert!(result.is_err(), "insert should fail on the corrupted step");

    assert_eq!(count_rows(&pool, "plans").await, 0);
    assert_eq!(count_rows(&pool, "plan_steps").await, 0);
    assert_eq!(count_rows(&pool, "plan_materials").await, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn fetching_a_missing_plan_returns_none() {
    let (pool, db_name) = create_test_db().await;

    let detail = plan::get_plan_detail(&pool, uuid::Uuid::new_v4())
        .await
        .expect("fetch should succeed");
    assert!(detail.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}
