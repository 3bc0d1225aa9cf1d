//! Plan persistence service.
//!
//! A materialized plan is written as a plan row plus its step, edge, and
//! material rows inside a single database transaction, so a plan is never
//! observed half-written. Plans are immutable once created; persisting the
//! same materialized tree twice yields two distinct plan identities.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use slipway_db::models::{Plan, PlanMaterial, PlanStep};
use slipway_db::queries::plans as plan_queries;

use super::materialize::MaterializedPlan;

/// A plan with its steps and materials.
#[derive(Debug, Clone)]
pub struct PlanDetail {
    pub plan: Plan,
    pub steps: Vec<PlanStep>,
    pub materials: Vec<PlanMaterial>,
}

/// Persist a materialized plan atomically. Returns the inserted plan row.
pub async fn create_plan(
    pool: &PgPool,
    name: &str,
    owner: &str,
    plan: &MaterializedPlan,
) -> Result<Plan> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let row = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (name, owner, target_item, target_quantity, optimization, \
                            total_cost, job_slots, duration_parallel_seconds, duration_serial_seconds) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(name)
    .bind(owner)
    .bind(plan.target_item)
    .bind(plan.target_quantity)
    .bind(plan.optimization)
    .bind(plan.total_cost)
    .bind(plan.job_slots)
    .bind(plan.duration_parallel_seconds)
    .bind(plan.duration_serial_seconds)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert plan")?;

    // Insert steps in topological order, keeping index -> id for the edges.
    let mut step_ids: Vec<Uuid> = Vec::with_capacity(plan.steps.len());
    for (index, step) in plan.steps.iter().enumerate() {
        let step_id: (Uuid,) = sqlx::query_as(
            "INSERT INTO plan_steps (plan_id, step_index, item_id, item_name, method, \
                                     recipe_id, runs, quantity, cost, duration_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id",
        )
        .bind(row.id)
        .bind(index as i32)
        .bind(step.item)
        .bind(&step.item_name)
        .bind(step.method)
        .bind(step.recipe_id)
        .bind(step.runs)
        .bind(step.quantity)
        .bind(step.cost)
        .bind(step.duration_seconds)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert plan step {:?}", step.item_name))?;
        step_ids.push(step_id.0);
    }

    for (index, step) in plan.steps.iter().enumerate() {
        for &dep in &step.depends_on {
            sqlx::query("INSERT INTO plan_step_edges (step_id, depends_on) VALUES ($1, $2)")
                .bind(step_ids[index])
                .bind(step_ids[dep])
                .execute(&mut *tx)
                .await
                .context("failed to insert plan step edge")?;
        }
    }

    for material in &plan.materials {
        sqlx::query(
            "INSERT INTO plan_materials (plan_id, item_id, item_name, quantity, unit_price, cost) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(row.id)
        .bind(material.item)
        .bind(&material.item_name)
        .bind(material.quantity)
        .bind(material.unit_price)
        .bind(material.cost)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert plan material {:?}", material.item_name))?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(row)
}

/// Fetch a plan with its steps and materials. Returns `None` when the plan
/// does not exist.
pub async fn get_plan_detail(pool: &PgPool, plan_id: Uuid) -> Result<Option<PlanDetail>> {
    let Some(plan) = plan_queries::get_plan(pool, plan_id).await? else {
        return Ok(None);
    };

    let steps = plan_queries::get_steps_for_plan(pool, plan_id).await?;
    let materials = plan_queries::get_materials_for_plan(pool, plan_id).await?;

    Ok(Some(PlanDetail {
        plan,
        steps,
        materials,
    }))
}
