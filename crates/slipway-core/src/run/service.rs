//! Run lifecycle service.
//!
//! Every mutating operation runs in a transaction that first takes a row
//! lock on the run (`SELECT ... FOR UPDATE`), serializing concurrent
//! progress reports for one run while independent runs proceed fully
//! concurrently. Step updates additionally guard on the expected status in
//! the UPDATE's WHERE clause.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use slipway_db::models::{Run, RunStep, RunStepStatus, RunWarning};
use slipway_db::queries::runs as run_queries;

use super::TransitionError;

/// A run with its steps and warnings.
#[derive(Debug, Clone)]
pub struct RunDetail {
    pub run: Run,
    pub steps: Vec<RunStep>,
    pub warnings: Vec<RunWarning>,
}

/// Instantiate a run from a plan.
///
/// One run step is created per plan step (buy requirements never become
/// steps); dependency edges are copied across. Steps with no dependencies
/// start `ready`, the rest `pending`.
pub async fn create_run(pool: &PgPool, plan_id: Uuid) -> Result<Run> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let plan_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM plans WHERE id = $1)")
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to check plan existence")?;
    if !plan_exists {
        anyhow::bail!("plan {plan_id} not found");
    }

    let run = sqlx::query_as::<_, Run>(
        "INSERT INTO runs (plan_id) VALUES ($1) RETURNING *",
    )
    .bind(plan_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert run")?;

    let plan_steps: Vec<(Uuid, i32, i64, String, i64)> = sqlx::query_as(
        "SELECT id, step_index, item_id, item_name, quantity \
         FROM plan_steps WHERE plan_id = $1 ORDER BY step_index ASC",
    )
    .bind(plan_id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to fetch plan steps")?;

    let plan_edges: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT e.step_id, e.depends_on \
         FROM plan_step_edges e \
         JOIN plan_steps s ON s.id = e.step_id \
         WHERE s.plan_id = $1",
    )
    .bind(plan_id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to fetch plan step edges")?;

    let mut has_deps: HashSet<Uuid> = HashSet::new();
    for (step_id, _) in &plan_edges {
        has_deps.insert(*step_id);
    }

    let mut run_step_ids: HashMap<Uuid, Uuid> = HashMap::with_capacity(plan_steps.len());
    for (plan_step_id, step_index, item_id, item_name, quantity) in &plan_steps {
        let status = if has_deps.contains(plan_step_id) {
            RunStepStatus::Pending
        } else {
            RunStepStatus::Ready
        };
        let row: (Uuid,) = sqlx::query_as(
            "INSERT INTO run_steps (run_id, plan_step_id, step_index, item_id, item_name, \
                                    status, planned_quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id",
        )
        .bind(run.id)
        .bind(plan_step_id)
        .bind(step_index)
        .bind(item_id)
        .bind(item_name)
        .bind(status)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert run step {item_name:?}"))?;
        run_step_ids.insert(*plan_step_id, row.0);
    }

    for (step_id, depends_on) in &plan_edges {
        sqlx::query("INSERT INTO run_step_edges (step_id, depends_on) VALUES ($1, $2)")
            .bind(run_step_ids[step_id])
            .bind(run_step_ids[depends_on])
            .execute(&mut *tx)
            .await
            .context("failed to insert run step edge")?;
    }

    // A plan whose target is bought outright has no steps; such a run is
    // complete on arrival.
    let run = rollup_run_status(&mut tx, run.id).await?;

    tx.commit().await.context("failed to commit transaction")?;

    info!(run_id = %run.id, plan_id = %plan_id, steps = plan_steps.len(), "run created");
    Ok(run)
}

/// Fetch a run with its steps and warnings. Returns `None` when the run
/// does not exist.
pub async fn get_run_detail(pool: &PgPool, run_id: Uuid) -> Result<Option<RunDetail>> {
    let Some(run) = run_queries::get_run(pool, run_id).await? else {
        return Ok(None);
    };

    let steps = run_queries::get_steps_for_run(pool, run_id).await?;
    let warnings = run_queries::get_warnings_for_run(pool, run_id).await?;

    Ok(Some(RunDetail {
        run,
        steps,
        warnings,
    }))
}

/// Report that production started for a step: `ready -> in_progress`.
pub async fn start_step(pool: &PgPool, run_id: Uuid, step_id: Uuid) -> Result<RunStep> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    lock_run(&mut tx, run_id).await?;
    let step = fetch_step(&mut tx, run_id, step_id).await?;

    if step.status != RunStepStatus::Ready {
        return Err(TransitionError::InvalidTransition {
            from: step.status,
            to: RunStepStatus::InProgress,
        }
        .into());
    }

    let updated = sqlx::query_as::<_, RunStep>(
        "UPDATE run_steps \
         SET status = 'in_progress', started_at = now() \
         WHERE id = $1 AND status = 'ready' \
         RETURNING *",
    )
    .bind(step_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to start run step")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(updated)
}

/// Report that production finished for a step: `in_progress -> completed`.
///
/// An `actual_quantity` below the planned quantity records a shortfall
/// warning on the run; dependent steps are not re-planned. Dependents whose
/// inputs are now all completed are promoted to `ready`.
pub async fn complete_step(
    pool: &PgPool,
    run_id: Uuid,
    step_id: Uuid,
    actual_quantity: Option<i64>,
) -> Result<RunStep> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    lock_run(&mut tx, run_id).await?;
    let step = fetch_step(&mut tx, run_id, step_id).await?;

    if step.status != RunStepStatus::InProgress {
        return Err(TransitionError::InvalidTransition {
            from: step.status,
            to: RunStepStatus::Completed,
        }
        .into());
    }

    let updated = sqlx::query_as::<_, RunStep>(
        "UPDATE run_steps \
         SET status = 'completed', completed_at = now(), actual_quantity = $2 \
         WHERE id = $1 AND status = 'in_progress' \
         RETURNING *",
    )
    .bind(step_id)
    .bind(actual_quantity)
    .fetch_one(&mut *tx)
    .await
    .context("failed to complete run step")?;

    if let Some(actual) = actual_quantity {
        if actual < updated.planned_quantity {
            let message = format!(
                "step {:?} completed {} of {} planned units; dependent steps may run short",
                updated.item_name, actual, updated.planned_quantity
            );
            insert_warning(&mut tx, run_id, Some(step_id), &message).await?;
        }
    }

    promote_ready_steps(&mut tx, run_id).await?;
    rollup_run_status(&mut tx, run_id).await?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(updated)
}

/// Cancel a step and, transitively, every not-yet-completed step that
/// depends on it. A cancelled input can never satisfy a ready gate.
///
/// Returns all steps cancelled by the request, the target first.
pub async fn cancel_step(pool: &PgPool, run_id: Uuid, step_id: Uuid) -> Result<Vec<RunStep>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    lock_run(&mut tx, run_id).await?;
    let step = fetch_step(&mut tx, run_id, step_id).await?;

    if step.status.is_terminal() {
        return Err(TransitionError::InvalidTransition {
            from: step.status,
            to: RunStepStatus::Cancelled,
        }
        .into());
    }

    let statuses: Vec<(Uuid, RunStepStatus)> =
        sqlx::query_as("SELECT id, status FROM run_steps WHERE run_id = $1")
            .bind(run_id)
            .fetch_all(&mut *tx)
            .await
            .context("failed to fetch run step statuses")?;
    let status_of: HashMap<Uuid, RunStepStatus> = statuses.into_iter().collect();

    let edges: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT e.step_id, e.depends_on \
         FROM run_step_edges e \
         JOIN run_steps s ON s.id = e.step_id \
         WHERE s.run_id = $1",
    )
    .bind(run_id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to fetch run step edges")?;

    let mut dependents_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (consumer, producer) in &edges {
        dependents_of.entry(*producer).or_default().push(*consumer);
    }

    // Breadth-first sweep over dependents; completed steps keep their
    // output, everything else downstream of the cancellation falls.
    let mut to_cancel: Vec<Uuid> = Vec::new();
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut queue: VecDeque<Uuid> = VecDeque::from([step_id]);
    seen.insert(step_id);
    while let Some(current) = queue.pop_front() {
        let status = status_of.get(&current).copied();
        if current != step_id && !matches!(status, Some(s) if !s.is_terminal()) {
            continue;
        }
        to_cancel.push(current);
        for dependent in dependents_of.get(&current).into_iter().flatten() {
            if seen.insert(*dependent) {
                queue.push_back(*dependent);
            }
        }
    }

    let cancelled = sqlx::query_as::<_, RunStep>(
        "UPDATE run_steps \
         SET status = 'cancelled', completed_at = now() \
         WHERE id = ANY($1) AND status NOT IN ('completed', 'cancelled') \
         RETURNING *",
    )
    .bind(&to_cancel)
    .fetch_all(&mut *tx)
    .await
    .context("failed to cancel run steps")?;

    if cancelled.len() > 1 {
        let message = format!(
            "step {:?} cancelled; {} dependent steps cancelled transitively",
            step.item_name,
            cancelled.len() - 1
        );
        insert_warning(&mut tx, run_id, Some(step_id), &message).await?;
    }

    rollup_run_status(&mut tx, run_id).await?;

    tx.commit().await.context("failed to commit transaction")?;

    info!(
        run_id = %run_id,
        step_id = %step_id,
        cancelled = cancelled.len(),
        "run step cancelled"
    );

    // The target first, dependents in sweep order.
    let mut ordered = cancelled;
    ordered.sort_by_key(|s| to_cancel.iter().position(|id| *id == s.id));
    Ok(ordered)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// Take the per-run row lock, serializing mutations for this run.
async fn lock_run(tx: &mut Transaction<'_, Postgres>, run_id: Uuid) -> Result<Run> {
    let run = sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = $1 FOR UPDATE")
        .bind(run_id)
        .fetch_optional(&mut **tx)
        .await
        .context("failed to lock run")?;

    run.ok_or_else(|| TransitionError::RunNotFound(run_id).into())
}

async fn fetch_step(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    step_id: Uuid,
) -> Result<RunStep> {
    let step = sqlx::query_as::<_, RunStep>(
        "SELECT * FROM run_steps WHERE id = $1 AND run_id = $2",
    )
    .bind(step_id)
    .bind(run_id)
    .fetch_optional(&mut **tx)
    .await
    .context("failed to fetch run step")?;

    step.ok_or_else(|| TransitionError::StepNotFound(step_id).into())
}

/// Promote `pending` steps whose dependencies are all `completed` to
/// `ready`.
async fn promote_ready_steps(tx: &mut Transaction<'_, Postgres>, run_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE run_steps rs \
         SET status = 'ready' \
         WHERE rs.run_id = $1 \
           AND rs.status = 'pending' \
           AND NOT EXISTS ( \
               SELECT 1 FROM run_step_edges e \
               JOIN run_steps dep ON dep.id = e.depends_on \
               WHERE e.step_id = rs.id AND dep.status != 'completed' \
           )",
    )
    .bind(run_id)
    .execute(&mut **tx)
    .await
    .context("failed to promote ready steps")?;

    Ok(result.rows_affected())
}

/// Recompute the run's status from its step statuses: `complete` when
/// every step is completed, `failed` when any step is cancelled (a
/// materialized plan has no substitute paths), `active` otherwise.
async fn rollup_run_status(tx: &mut Transaction<'_, Postgres>, run_id: Uuid) -> Result<Run> {
    let counts: Vec<(RunStepStatus, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM run_steps WHERE run_id = $1 GROUP BY status",
    )
    .bind(run_id)
    .fetch_all(&mut **tx)
    .await
    .context("failed to count run step statuses")?;

    let mut open = 0i64;
    let mut cancelled = 0i64;
    for (status, count) in counts {
        match status {
            RunStepStatus::Cancelled => cancelled += count,
            RunStepStatus::Completed => {}
            _ => open += count,
        }
    }

    let new_status = if cancelled > 0 {
        "failed"
    } else if open == 0 {
        "complete"
    } else {
        "active"
    };

    let run = sqlx::query_as::<_, Run>(
        "UPDATE runs \
         SET status = $1, \
             completed_at = CASE WHEN $1 = 'active' THEN NULL ELSE COALESCE(completed_at, now()) END \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(new_status)
    .bind(run_id)
    .fetch_one(&mut **tx)
    .await
    .context("failed to update run status")?;

    Ok(run)
}

async fn insert_warning(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    run_step_id: Option<Uuid>,
    message: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO run_warnings (run_id, run_step_id, message) VALUES ($1, $2, $3)")
        .bind(run_id)
        .bind(run_step_id)
        .bind(message)
        .execute(&mut **tx)
        .await
        .context("failed to insert run warning")?;

    Ok(())
}
