//! Database query functions for the `plans`, `plan_steps`,
//! `plan_step_edges`, and `plan_materials` tables.
//!
//! Plans are immutable once created, so this module is read-only; the
//! transactional insert lives in the core plan service.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Plan, PlanMaterial, PlanStep};

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// List all plans, ordered by creation time (newest first).
pub async fn list_plans(pool: &PgPool) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>("SELECT * FROM plans ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list plans")?;

    Ok(plans)
}

/// List all steps of a plan in topological order.
pub async fn get_steps_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<PlanStep>> {
    let steps = sqlx::query_as::<_, PlanStep>(
        "SELECT * FROM plan_steps WHERE plan_id = $1 ORDER BY step_index ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list plan steps")?;

    Ok(steps)
}

/// Get all dependency edges between a plan's steps as `(step_id, depends_on)`
/// pairs.
pub async fn get_step_edges(pool: &PgPool, plan_id: Uuid) -> Result<Vec<(Uuid, Uuid)>> {
    let edges: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT e.step_id, e.depends_on \
         FROM plan_step_edges e \
         JOIN plan_steps s ON s.id = e.step_id \
         WHERE s.plan_id = $1",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to get plan step edges")?;

    Ok(edges)
}

/// List the aggregated raw-material line items for a plan, ordered by item.
pub async fn get_materials_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<PlanMaterial>> {
    let materials = sqlx::query_as::<_, PlanMaterial>(
        "SELECT * FROM plan_materials WHERE plan_id = $1 ORDER BY item_id ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list plan materials")?;

    Ok(materials)
}
