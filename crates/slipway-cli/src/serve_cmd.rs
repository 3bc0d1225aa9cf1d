//! HTTP planning API (`slipway serve`).
//!
//! Thin JSON layer over the engine for browser-facing frontends: plan
//! computation, blueprint/reaction lookups, plan retrieval, and run step
//! reporting. Both engine entry points ("compute a plan", "advance a run
//! step") are synchronous request/response operations.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use slipway_core::catalog::{Blueprint, Catalog};
use slipway_core::plan::{self, compute_plan};
use slipway_core::resolve::{ResolveContext, ResolveError};
use slipway_core::run::{TransitionError, service as run_service};
use slipway_db::models::{Plan, PlanMaterial, PlanStep, Run, RunStep, RunWarning};
use slipway_db::queries::{plans as plan_queries, runs as run_queries};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Immutable catalog snapshot shared across requests; reload means
    /// restart.
    pub catalog: Arc<Catalog>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

/// Map resolver failures onto HTTP statuses.
fn resolve_failure(err: ResolveError) -> AppError {
    match err {
        ResolveError::UnknownItem(_) => AppError::not_found(err.to_string()),
        ResolveError::InvalidQuantity(_) => AppError::bad_request(err.to_string()),
        ResolveError::Infeasible { .. } => AppError::unprocessable(err.to_string()),
    }
}

/// Map run service failures onto HTTP statuses, recognizing the typed
/// transition errors inside the anyhow chain.
fn run_failure(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<TransitionError>() {
        Some(TransitionError::InvalidTransition { .. }) => AppError::conflict(format!("{err:#}")),
        Some(TransitionError::RunNotFound(_)) | Some(TransitionError::StepNotFound(_)) => {
            AppError::not_found(format!("{err:#}"))
        }
        None => AppError::internal(err),
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub item_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    /// External facts for this request: ownership, reachability, prices,
    /// policy flags, optimization mode.
    #[serde(default)]
    pub context: ResolveContext,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    #[serde(flatten)]
    pub plan: Plan,
    pub steps: Vec<PlanStep>,
    pub materials: Vec<PlanMaterial>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    #[serde(flatten)]
    pub run: Run,
    pub steps: Vec<RunStep>,
    pub warnings: Vec<RunWarning>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteStepRequest {
    #[serde(default)]
    pub actual_quantity: Option<i64>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/industry/calculate", post(calculate))
        .route("/industry/blueprints/{item_id}", get(blueprints_for_item))
        .route("/reactions/plan", post(reactions_plan))
        .route("/reactions/systems", get(reaction_systems))
        .route("/plans", get(list_plans))
        .route("/plans/{id}", get(plan_detail))
        .route("/plans/{id}/runs", post(create_run))
        .route("/runs", get(list_runs))
        .route("/runs/{id}", get(run_detail))
        .route("/runs/{id}/steps/{step_id}/start", post(start_step))
        .route("/runs/{id}/steps/{step_id}/complete", post(complete_step))
        .route("/runs/{id}/steps/{step_id}/cancel", post(cancel_step))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(pool: PgPool, catalog: Arc<Catalog>, listen: &str) -> Result<()> {
    let app = build_router(AppState { pool, catalog });
    let addr: SocketAddr = listen.parse()?;
    tracing::info!("slipway serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("slipway serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Planning handlers
// ---------------------------------------------------------------------------

/// Compute, persist, and return a plan for `(item, quantity, context)`.
async fn calculate(
    State(state): State<AppState>,
    Json(req): Json<CalculateRequest>,
) -> Result<axum::response::Response, AppError> {
    calculate_and_persist(&state, req).await
}

/// As [`calculate`], but the target must be an item some reaction formula
/// outputs.
async fn reactions_plan(
    State(state): State<AppState>,
    Json(req): Json<CalculateRequest>,
) -> Result<axum::response::Response, AppError> {
    if state.catalog.reactions_producing(req.item_id).is_empty() {
        return Err(AppError::bad_request(format!(
            "item {} is not produced by any reaction formula",
            req.item_id
        )));
    }
    calculate_and_persist(&state, req).await
}

async fn calculate_and_persist(
    state: &AppState,
    req: CalculateRequest,
) -> Result<axum::response::Response, AppError> {
    let item = state
        .catalog
        .item(req.item_id)
        .ok_or_else(|| AppError::not_found(format!("unknown item {}", req.item_id)))?;

    let name = req
        .name
        .unwrap_or_else(|| format!("{} x{}", item.name, req.quantity));
    let owner = req.owner.unwrap_or_else(|| "anonymous".to_owned());

    // Resolution is pure CPU work over the immutable catalog; keep it off
    // the async workers.
    let catalog = state.catalog.clone();
    let ctx = req.context;
    let (item_id, quantity) = (req.item_id, req.quantity);
    let materialized =
        tokio::task::spawn_blocking(move || compute_plan(&catalog, &ctx, item_id, quantity))
            .await
            .map_err(|e| AppError::internal(anyhow::anyhow!("resolver task failed: {e}")))?
            .map_err(resolve_failure)?;

    let plan_row = plan::create_plan(&state.pool, &name, &owner, &materialized)
        .await
        .map_err(AppError::internal)?;

    let detail = plan::get_plan_detail(&state.pool, plan_row.id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("plan {} not found", plan_row.id)))?;

    Ok(Json(PlanResponse {
        plan: detail.plan,
        steps: detail.steps,
        materials: detail.materials,
    })
    .into_response())
}

/// Blueprint candidates producing an item.
async fn blueprints_for_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<axum::response::Response, AppError> {
    if state.catalog.item(item_id).is_none() {
        return Err(AppError::not_found(format!("unknown item {item_id}")));
    }
    let blueprints: Vec<Blueprint> = state
        .catalog
        .blueprints_producing(item_id)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(blueprints).into_response())
}

/// All reaction-capable system ids the catalog declares.
async fn reaction_systems(
    State(state): State<AppState>,
) -> Result<axum::response::Response, AppError> {
    let systems: Vec<i64> = state.catalog.reaction_systems().iter().copied().collect();
    Ok(Json(systems).into_response())
}

// ---------------------------------------------------------------------------
// Plan retrieval handlers
// ---------------------------------------------------------------------------

async fn list_plans(State(state): State<AppState>) -> Result<axum::response::Response, AppError> {
    let plans = plan_queries::list_plans(&state.pool)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(plans).into_response())
}

async fn plan_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let detail = plan::get_plan_detail(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("plan {id} not found")))?;

    Ok(Json(PlanResponse {
        plan: detail.plan,
        steps: detail.steps,
        materials: detail.materials,
    })
    .into_response())
}

// ---------------------------------------------------------------------------
// Run handlers
// ---------------------------------------------------------------------------

async fn create_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    if plan_queries::get_plan(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .is_none()
    {
        return Err(AppError::not_found(format!("plan {id} not found")));
    }

    let run = run_service::create_run(&state.pool, id)
        .await
        .map_err(AppError::internal)?;
    run_response(&state, run.id).await
}

async fn list_runs(State(state): State<AppState>) -> Result<axum::response::Response, AppError> {
    let runs = run_queries::list_runs(&state.pool)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(runs).into_response())
}

async fn run_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    run_response(&state, id).await
}

async fn start_step(
    State(state): State<AppState>,
    Path((run_id, step_id)): Path<(Uuid, Uuid)>,
) -> Result<axum::response::Response, AppError> {
    let step = run_service::start_step(&state.pool, run_id, step_id)
        .await
        .map_err(run_failure)?;
    Ok(Json(step).into_response())
}

async fn complete_step(
    State(state): State<AppState>,
    Path((run_id, step_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CompleteStepRequest>,
) -> Result<axum::response::Response, AppError> {
    let step = run_service::complete_step(&state.pool, run_id, step_id, req.actual_quantity)
        .await
        .map_err(run_failure)?;
    Ok(Json(step).into_response())
}

async fn cancel_step(
    State(state): State<AppState>,
    Path((run_id, step_id)): Path<(Uuid, Uuid)>,
) -> Result<axum::response::Response, AppError> {
    let cancelled = run_service::cancel_step(&state.pool, run_id, step_id)
        .await
        .map_err(run_failure)?;
    Ok(Json(cancelled).into_response())
}

async fn run_response(state: &AppState, run_id: Uuid) -> Result<axum::response::Response, AppError> {
    let detail = run_service::get_run_detail(&state.pool, run_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("run {run_id} not found")))?;

    Ok(Json(RunResponse {
        run: detail.run,
        steps: detail.steps,
        warnings: detail.warnings,
    })
    .into_response())
}
