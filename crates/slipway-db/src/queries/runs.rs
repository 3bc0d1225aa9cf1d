//! Database query functions for the `runs`, `run_steps`, `run_step_edges`,
//! and `run_warnings` tables.
//!
//! Step transitions are serialized per run and therefore live in the core
//! run service, inside a transaction holding a run-row lock. The functions
//! here are pool-level reads used by status views and the HTTP API.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Run, RunStep, RunWarning};

/// Fetch a run by its ID.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<Run>> {
    let run = sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch run")?;

    Ok(run)
}

/// List all runs for a plan, newest first.
pub async fn list_runs_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<Run>> {
    let runs = sqlx::query_as::<_, Run>(
        "SELECT * FROM runs WHERE plan_id = $1 ORDER BY created_at DESC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list runs for plan")?;

    Ok(runs)
}

/// List all runs, newest first.
pub async fn list_runs(pool: &PgPool) -> Result<Vec<Run>> {
    let runs = sqlx::query_as::<_, Run>("SELECT * FROM runs ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list runs")?;

    Ok(runs)
}

/// List all steps of a run in step order.
pub async fn get_steps_for_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<RunStep>> {
    let steps = sqlx::query_as::<_, RunStep>(
        "SELECT * FROM run_steps WHERE run_id = $1 ORDER BY step_index ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("failed to list run steps")?;

    Ok(steps)
}

/// Fetch a single run step by ID.
pub async fn get_run_step(pool: &PgPool, id: Uuid) -> Result<Option<RunStep>> {
    let step = sqlx::query_as::<_, RunStep>("SELECT * FROM run_steps WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch run step")?;

    Ok(step)
}

/// Get the IDs of all steps that a given run step depends on.
pub async fn get_step_dependencies(pool: &PgPool, step_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT depends_on FROM run_step_edges WHERE step_id = $1")
            .bind(step_id)
            .fetch_all(pool)
            .await
            .context("failed to get run step dependencies")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// List all warnings recorded against a run, oldest first.
pub async fn get_warnings_for_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<RunWarning>> {
    let warnings = sqlx::query_as::<_, RunWarning>(
        "SELECT * FROM run_warnings WHERE run_id = $1 ORDER BY created_at ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("failed to list run warnings")?;

    Ok(warnings)
}

/// Status counts for a run's steps.
#[derive(Debug, Clone, Default)]
pub struct RunProgress {
    pub pending: i64,
    pub ready: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub total: i64,
}

/// Get a summary of step counts by status for a given run.
pub async fn get_run_progress(pool: &PgPool, run_id: Uuid) -> Result<RunProgress> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status::text, COUNT(*) as cnt \
         FROM run_steps \
         WHERE run_id = $1 \
         GROUP BY status",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("failed to get run progress")?;

    let mut progress = RunProgress::default();
    for (status, count) in &rows {
        match status.as_str() {
            "pending" => progress.pending = *count,
            "ready" => progress.ready = *count,
            "in_progress" => progress.in_progress = *count,
            "completed" => progress.completed = *count,
            "cancelled" => progress.cancelled = *count,
            _ => {}
        }
        progress.total += count;
    }
    Ok(progress)
}
