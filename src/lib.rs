//! Ordered integration-test suites against an ephemeral PostgreSQL
//! instance, with declarative data-set fixtures.
//!
//! The pieces, leaf first:
//!
//! - [`container`] provisions a disposable PostgreSQL container and hands
//!   out its connection coordinates.
//! - [`config`] publishes those coordinates process-wide, so clients can be
//!   constructed from the environment.
//! - [`query`] is the thin table-access layer ([`TableStore`], [`PgStore`]).
//! - [`dataset`] loads, applies, cleans and exports YAML data sets.
//! - [`runner`] executes test cases strictly in declared sequence order,
//!   where the order is part of the contract: bare cases leak their writes
//!   to successors, fixtured cases are seeded and cleaned after.
//!
//! Container-backed suites are meant to be custom-harness test binaries
//! (`test = false, harness = false` in the manifest), so that plain
//! `cargo test` skips them and the run's pass/fail aggregation becomes the
//! process exit code. See `tests/pet_suite.rs` for the demo suite.

pub mod config;
pub mod container;
pub mod dataset;
pub mod error;
pub mod logger;
pub mod mem;
pub mod query;
pub mod runner;

pub use config::DbConfig;
pub use container::{EphemeralPostgres, PostgresImage};
pub use dataset::DataSet;
pub use error::{Error, Result};
pub use logger::LogLevel;
pub use mem::MemStore;
pub use query::{PgStore, Row, SqlValue, TableSnapshot, TableStore};
pub use runner::{Outcome, RunReport, Runner, TestCase, TestCtx};
