//! CLI handlers for `slipway run` subcommands.
//!
//! Implements the operator side of the run lifecycle: instantiate a run
//! from a plan, inspect progress, and report step transitions.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use slipway_core::run::service as run_service;
use slipway_db::queries::runs as run_queries;

use crate::RunCommands;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `RunCommands` variant to the appropriate handler.
pub async fn run_run_command(command: RunCommands, pool: &PgPool) -> Result<()> {
    match command {
        RunCommands::Start { plan_id } => cmd_start(pool, &plan_id).await,
        RunCommands::Status { run_id } => match run_id {
            Some(id) => cmd_status_one(pool, &id).await,
            None => cmd_status_all(pool).await,
        },
        RunCommands::StepStart { run_id, step_id } => {
            let (run_id, step_id) = parse_ids(&run_id, &step_id)?;
            let step = run_service::start_step(pool, run_id, step_id).await?;
            println!("Step {} ({}) is now {}.", step.id, step.item_name, step.status);
            Ok(())
        }
        RunCommands::StepComplete {
            run_id,
            step_id,
            actual_quantity,
        } => {
            let (run_id, step_id) = parse_ids(&run_id, &step_id)?;
            let step = run_service::complete_step(pool, run_id, step_id, actual_quantity).await?;
            match step.actual_quantity {
                Some(actual) if actual < step.planned_quantity => println!(
                    "Step {} ({}) completed short: {} of {} units.",
                    step.id, step.item_name, actual, step.planned_quantity
                ),
                _ => println!("Step {} ({}) completed.", step.id, step.item_name),
            }
            Ok(())
        }
        RunCommands::StepCancel { run_id, step_id } => {
            let (run_id, step_id) = parse_ids(&run_id, &step_id)?;
            let cancelled = run_service::cancel_step(pool, run_id, step_id).await?;
            println!("Cancelled {} step(s):", cancelled.len());
            for step in &cancelled {
                println!("  {}  {}", step.id, step.item_name);
            }
            Ok(())
        }
    }
}

fn parse_ids(run_id: &str, step_id: &str) -> Result<(Uuid, Uuid)> {
    let run = Uuid::parse_str(run_id).with_context(|| format!("invalid run id: {run_id}"))?;
    let step = Uuid::parse_str(step_id).with_context(|| format!("invalid step id: {step_id}"))?;
    Ok((run, step))
}

// -----------------------------------------------------------------------
// slipway run start <plan-id>
// -----------------------------------------------------------------------

async fn cmd_start(pool: &PgPool, plan_id: &str) -> Result<()> {
    let id = Uuid::parse_str(plan_id).with_context(|| format!("invalid plan id: {plan_id}"))?;
    let run = run_service::create_run(pool, id).await?;

    let progress = run_queries::get_run_progress(pool, run.id).await?;
    println!("Run created.");
    println!();
    println!("  Run ID:  {}", run.id);
    println!("  Plan:    {}", run.plan_id);
    println!("  Status:  {}", run.status);
    println!("  Steps:   {} ({} ready)", progress.total, progress.ready);
    println!();
    println!("Use `slipway run status {}` to track progress.", run.id);

    Ok(())
}

// -----------------------------------------------------------------------
// slipway run status
// -----------------------------------------------------------------------

/// List all runs with summary info.
async fn cmd_status_all(pool: &PgPool) -> Result<()> {
    let runs = run_queries::list_runs(pool).await?;

    if runs.is_empty() {
        println!("No runs found. Use `slipway run start <plan-id>` to create one.");
        return Ok(());
    }

    let id_w = 36;
    println!(
        "{:<id_w$}  {:<id_w$}  {:<8}  {:<20}",
        "ID", "PLAN", "STATUS", "CREATED"
    );
    for run in &runs {
        println!(
            "{:<id_w$}  {:<id_w$}  {:<8}  {:<20}",
            run.id,
            run.plan_id,
            run.status.to_string(),
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

/// Show one run: step table, progress counts, warnings.
async fn cmd_status_one(pool: &PgPool, run_id: &str) -> Result<()> {
    let id = Uuid::parse_str(run_id).with_context(|| format!("invalid run id: {run_id}"))?;
    let detail = run_service::get_run_detail(pool, id)
        .await?
        .with_context(|| format!("run {id} not found"))?;

    let run = &detail.run;
    println!("Run {}", run.id);
    println!("  Plan:    {}", run.plan_id);
    println!("  Status:  {}", run.status);
    println!("  Created: {}", run.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed_at) = run.completed_at {
        println!("  Ended:   {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
    }

    if detail.steps.is_empty() {
        println!();
        println!("No trackable steps; the plan is buy-only.");
    } else {
        println!();
        println!("Steps:");
        for step in &detail.steps {
            let quantity = match step.actual_quantity {
                Some(actual) => format!("{actual}/{}", step.planned_quantity),
                None => step.planned_quantity.to_string(),
            };
            println!(
                "  {:>3}. {:<12} {:<24} qty {:>12}  [{}]",
                step.step_index,
                step.status.to_string(),
                step.item_name,
                quantity,
                step.id,
            );
        }

        let progress = run_queries::get_run_progress(pool, id).await?;
        println!();
        println!(
            "Progress: {} completed / {} in progress / {} ready / {} pending / {} cancelled",
            progress.completed,
            progress.in_progress,
            progress.ready,
            progress.pending,
            progress.cancelled
        );
    }

    if !detail.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &detail.warnings {
            println!(
                "  [{}] {}",
                warning.created_at.format("%Y-%m-%d %H:%M:%S"),
                warning.message
            );
        }
    }

    Ok(())
}
