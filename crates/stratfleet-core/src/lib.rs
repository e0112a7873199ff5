//! Core orchestration library for stratfleet.
//!
//! The pieces compose in two pipelines:
//!
//! - **Backtest**: [`status::StatusStore`] tracks per-strategy outcomes,
//!   [`batch::BatchRunner`] drives the external backtest tool over bounded
//!   batches of pending strategies, and [`harvest::Harvester`] attributes the
//!   result artifacts the tool leaves behind.
//! - **Live**: [`allocate`] picks the top strategies and assigns each an
//!   exclusive port, config, and database, [`supervise::Supervisor`] launches
//!   the worker processes, and [`health`] polls their API endpoints until they
//!   come up or the relaunch budget runs out.

pub mod allocate;
pub mod batch;
pub mod harvest;
pub mod health;
pub mod invoke;
pub mod status;
pub mod supervise;
