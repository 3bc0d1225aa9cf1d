//! PostgreSQL persistence for slipway: connection pooling, embedded
//! migrations, row models, and query functions for production plans and
//! plan runs.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
