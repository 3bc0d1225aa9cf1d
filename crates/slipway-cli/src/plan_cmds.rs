//! CLI handlers for `slipway plan` subcommands.
//!
//! Implements:
//! - `slipway plan create <item> <quantity>` -- compute and persist a plan
//! - `slipway plan show [plan-id]`           -- show plan details or list all plans
//! - `slipway plan materials <plan-id>`      -- show the aggregated buy list

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use slipway_core::plan::{self, compute_plan};
use slipway_core::resolve::ResolveContext;
use slipway_db::queries::{plans as plan_queries, runs as run_queries};

use crate::PlanCommands;
use crate::config::SlipwayConfig;

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(
    command: PlanCommands,
    pool: &PgPool,
    resolved: &SlipwayConfig,
) -> Result<()> {
    match command {
        PlanCommands::Create {
            item,
            quantity,
            optimization,
            context,
            name,
            owner,
        } => {
            cmd_create(
                pool,
                resolved,
                item,
                quantity,
                optimization.as_deref(),
                context.as_deref(),
                name.as_deref(),
                &owner,
            )
            .await
        }
        PlanCommands::Show { plan_id } => match plan_id {
            Some(id) => cmd_show_one(pool, &id).await,
            None => cmd_show_all(pool).await,
        },
        PlanCommands::Materials { plan_id } => cmd_materials(pool, &plan_id).await,
    }
}

fn parse_plan_id(plan_id: &str) -> Result<Uuid> {
    Uuid::parse_str(plan_id).with_context(|| format!("invalid plan id: {plan_id}"))
}

// -----------------------------------------------------------------------
// slipway plan create
// -----------------------------------------------------------------------

/// Load the context, resolve the demand, materialize, persist, and print
/// a summary.
#[allow(clippy::too_many_arguments)]
async fn cmd_create(
    pool: &PgPool,
    resolved: &SlipwayConfig,
    item: i64,
    quantity: i64,
    optimization: Option<&str>,
    context_file: Option<&str>,
    name: Option<&str>,
    owner: &str,
) -> Result<()> {
    let catalog = crate::load_catalog(resolved)?;

    // 1. Resolution context: from file when given, defaults otherwise.
    let mut ctx: ResolveContext = match context_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read context file: {path}"))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse context file: {path}"))?
        }
        None => ResolveContext::default(),
    };
    if let Some(mode) = optimization {
        ctx.optimization = mode
            .parse()
            .with_context(|| format!("invalid optimization mode: {mode}"))?;
    }

    // 2. Compute.
    let materialized = compute_plan(&catalog, &ctx, item, quantity)?;

    // 3. Persist.
    let plan_name = match name {
        Some(n) => n.to_owned(),
        None => format!("{} x{}", materialized.target_item_name, quantity),
    };
    let plan_row = plan::create_plan(pool, &plan_name, owner, &materialized).await?;

    // 4. Print summary.
    println!("Plan created successfully.");
    println!();
    println!("  Plan ID:        {}", plan_row.id);
    println!("  Name:           {}", plan_row.name);
    println!(
        "  Target:         {} x{}",
        materialized.target_item_name, plan_row.target_quantity
    );
    println!("  Optimization:   {}", plan_row.optimization);
    println!("  Total cost:     {:.2}", plan_row.total_cost);
    println!("  Job slots:      {}", plan_row.job_slots);
    println!(
        "  Duration:       {}s parallel / {}s serial",
        plan_row.duration_parallel_seconds, plan_row.duration_serial_seconds
    );
    println!("  Steps:          {}", materialized.steps.len());
    println!("  Material lines: {}", materialized.materials.len());

    Ok(())
}

// -----------------------------------------------------------------------
// slipway plan show (list all)
// -----------------------------------------------------------------------

/// List all plans with summary info.
async fn cmd_show_all(pool: &PgPool) -> Result<()> {
    let plans = plan_queries::list_plans(pool).await?;

    if plans.is_empty() {
        println!("No plans found. Use `slipway plan create <item> <quantity>` to create one.");
        return Ok(());
    }

    // Compute column widths for a clean table. ID is always 36 chars (UUID).
    let id_w = 36;
    let name_w = plans.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);

    println!(
        "{:<id_w$}  {:<name_w$}  {:>12}  {:>9}  {:<20}",
        "ID", "NAME", "TOTAL COST", "SLOTS", "CREATED"
    );
    for plan in &plans {
        println!(
            "{:<id_w$}  {:<name_w$}  {:>12.2}  {:>9}  {:<20}",
            plan.id,
            plan.name,
            plan.total_cost,
            plan.job_slots,
            plan.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// slipway plan show <plan-id>
// -----------------------------------------------------------------------

/// Show one plan with its step list and runs.
async fn cmd_show_one(pool: &PgPool, plan_id: &str) -> Result<()> {
    let id = parse_plan_id(plan_id)?;
    let detail = plan::get_plan_detail(pool, id)
        .await?
        .with_context(|| format!("plan {id} not found"))?;

    let plan = &detail.plan;
    println!("Plan {}", plan.id);
    println!("  Name:         {}", plan.name);
    println!("  Owner:        {}", plan.owner);
    println!(
        "  Target:       item {} x{}",
        plan.target_item, plan.target_quantity
    );
    println!("  Optimization: {}", plan.optimization);
    println!("  Total cost:   {:.2}", plan.total_cost);
    println!(
        "  Duration:     {}s parallel / {}s serial",
        plan.duration_parallel_seconds, plan.duration_serial_seconds
    );
    println!("  Created:      {}", plan.created_at.format("%Y-%m-%d %H:%M:%S"));

    if detail.steps.is_empty() {
        println!();
        println!("No production steps; everything is bought.");
    } else {
        println!();
        println!("Steps (topological order):");
        for step in &detail.steps {
            println!(
                "  {:>3}. {:<12} {:<24} runs {:>6}  qty {:>8}  fee {:>10.2}  {:>7}s  [{}]",
                step.step_index,
                step.method.to_string(),
                step.item_name,
                step.runs,
                step.quantity,
                step.cost,
                step.duration_seconds,
                step.id,
            );
        }
    }

    let runs = run_queries::list_runs_for_plan(pool, id).await?;
    if !runs.is_empty() {
        println!();
        println!("Runs:");
        for run in &runs {
            println!(
                "  {}  {:<8}  created {}",
                run.id,
                run.status.to_string(),
                run.created_at.format("%Y-%m-%d %H:%M:%S"),
            );
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------
// slipway plan materials <plan-id>
// -----------------------------------------------------------------------

/// Show the aggregated raw-material buy list for a plan.
async fn cmd_materials(pool: &PgPool, plan_id: &str) -> Result<()> {
    let id = parse_plan_id(plan_id)?;
    let plan = plan_queries::get_plan(pool, id)
        .await?
        .with_context(|| format!("plan {id} not found"))?;
    let materials = plan_queries::get_materials_for_plan(pool, id).await?;

    println!("Materials for plan {} ({}):", plan.id, plan.name);
    if materials.is_empty() {
        println!("  none");
        return Ok(());
    }

    let name_w = materials
        .iter()
        .map(|m| m.item_name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!(
        "  {:>10}  {:<name_w$}  {:>10}  {:>12}  {:>12}",
        "ITEM", "NAME", "QUANTITY", "UNIT PRICE", "COST"
    );
    let mut total = 0.0;
    for m in &materials {
        println!(
            "  {:>10}  {:<name_w$}  {:>10}  {:>12.2}  {:>12.2}",
            m.item_id, m.item_name, m.quantity, m.unit_price, m.cost
        );
        total += m.cost;
    }
    println!("  {:>10}  {:<name_w$}  {:>10}  {:>12}  {:>12.2}", "", "", "", "TOTAL", total);

    Ok(())
}
