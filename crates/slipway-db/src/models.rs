use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Optimization mode a plan was computed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanOptimization {
    MinimizeCost,
    MinimizeTime,
}

impl fmt::Display for PlanOptimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MinimizeCost => "minimize_cost",
            Self::MinimizeTime => "minimize_time",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanOptimization {
    type Err = PlanOptimizationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both the stored form and the hyphenated form used by
        // request payloads and CLI flags.
        match s {
            "minimize_cost" | "minimize-cost" => Ok(Self::MinimizeCost),
            "minimize_time" | "minimize-time" => Ok(Self::MinimizeTime),
            other => Err(PlanOptimizationParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanOptimization`] string.
#[derive(Debug, Clone)]
pub struct PlanOptimizationParseError(pub String);

impl fmt::Display for PlanOptimizationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid optimization mode: {:?}", self.0)
    }
}

impl std::error::Error for PlanOptimizationParseError {}

// ---------------------------------------------------------------------------

/// Production method of a plan step.
///
/// Buy requirements never become steps; they are aggregated into the plan's
/// material list instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StepMethod {
    Manufacture,
    React,
}

impl fmt::Display for StepMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manufacture => "manufacture",
            Self::React => "react",
        };
        f.write_str(s)
    }
}

impl FromStr for StepMethod {
    type Err = StepMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manufacture" => Ok(Self::Manufacture),
            "react" => Ok(Self::React),
            other => Err(StepMethodParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`StepMethod`] string.
#[derive(Debug, Clone)]
pub struct StepMethodParseError(pub String);

impl fmt::Display for StepMethodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid step method: {:?}", self.0)
    }
}

impl std::error::Error for StepMethodParseError {}

// ---------------------------------------------------------------------------

/// Status of a plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Complete,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for RunStatus {
    type Err = RunStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(RunStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RunStatus`] string.
#[derive(Debug, Clone)]
pub struct RunStatusParseError(pub String);

impl fmt::Display for RunStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid run status: {:?}", self.0)
    }
}

impl std::error::Error for RunStatusParseError {}

// ---------------------------------------------------------------------------

/// Lifecycle status of a single run step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStepStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
    Cancelled,
}

impl RunStepStatus {
    /// Whether the step can never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for RunStepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for RunStepStatus {
    type Err = RunStepStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RunStepStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RunStepStatus`] string.
#[derive(Debug, Clone)]
pub struct RunStepStatusParseError(pub String);

impl fmt::Display for RunStepStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid run step status: {:?}", self.0)
    }
}

impl std::error::Error for RunStepStatusParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A production plan -- an immutable, point-in-time planning artifact.
///
/// Plans are insert-only: re-planning creates a new row, never mutates an
/// existing one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    pub target_item: i64,
    pub target_quantity: i64,
    pub optimization: PlanOptimization,
    pub total_cost: f64,
    pub job_slots: i64,
    /// Wall-clock seconds assuming unlimited parallel job slots.
    pub duration_parallel_seconds: i64,
    /// Wall-clock seconds assuming a single job slot.
    pub duration_serial_seconds: i64,
    pub created_at: DateTime<Utc>,
}

/// A single production step within a plan, in topological order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanStep {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub step_index: i32,
    pub item_id: i64,
    pub item_name: String,
    pub method: StepMethod,
    /// Blueprint id for `manufacture`, formula id for `react`.
    pub recipe_id: i64,
    pub runs: i64,
    pub quantity: i64,
    pub cost: f64,
    pub duration_seconds: i64,
}

/// An aggregated raw-material line item for a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanMaterial {
    pub plan_id: Uuid,
    pub item_id: i64,
    pub item_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub cost: f64,
}

/// A plan run -- a stateful execution of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Run {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A trackable step within a run, instantiated from a plan step.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunStep {
    pub id: Uuid,
    pub run_id: Uuid,
    pub plan_step_id: Uuid,
    pub step_index: i32,
    pub item_id: i64,
    pub item_name: String,
    pub status: RunStepStatus,
    pub planned_quantity: i64,
    /// Reported on completion; may fall short of `planned_quantity`.
    pub actual_quantity: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A warning recorded against a run (e.g. a completed step fell short of
/// its planned quantity).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunWarning {
    pub id: Uuid,
    pub run_id: Uuid,
    pub run_step_id: Option<Uuid>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
