//! # worktrack
//!
//! Tracks the lifecycle of asynchronous works handed to connector
//! processes (imports, exports, enrichments): creation, concurrent
//! progress reporting, exactly-once completion and retention.
//!
//! Records live in Postgres, progress counters in Redis; both sit behind
//! the traits in [`store`] so the engine also runs on in-memory stores.

pub mod config;
pub mod connector;
pub mod db;
pub mod engine;
pub mod error;
pub mod ids;
pub mod model;
pub mod store;
pub mod telemetry;
