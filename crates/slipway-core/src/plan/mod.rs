//! Plan computation, materialization, and persistence.

pub mod materialize;
pub mod service;

pub use materialize::{MaterialLine, MaterializedPlan, StepSpec, materialize};
pub use service::{PlanDetail, create_plan, get_plan_detail};

use crate::catalog::Catalog;
use crate::resolve::{ResolveContext, ResolveError, Resolver};

/// Resolve a demand and flatten the result in one call.
///
/// Pure computation end to end; run it on a blocking thread from async
/// contexts.
pub fn compute_plan(
    catalog: &Catalog,
    ctx: &ResolveContext,
    item: i64,
    quantity: i64,
) -> Result<MaterializedPlan, ResolveError> {
    let resolver = Resolver::new(catalog, ctx);
    let root = resolver.resolve(item, quantity)?;
    Ok(materialize::materialize(catalog, &root, ctx.optimization))
}
