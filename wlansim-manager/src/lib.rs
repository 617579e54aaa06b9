//! # wlansim-manager
//!
//! Top-level orchestration: builds device populations, allocates their
//! identities from base-value pools, registers them with the traffic
//! layer, and drives bounded-concurrency batch joins through per-worker
//! schedulers.

pub mod controller;
pub mod error;
pub mod manager;
pub mod worker;

pub use controller::SimController;
pub use error::ManagerError;
pub use manager::{ApParams, ClientParams, JoinReport, Manager};
pub use worker::{WorkerCall, WorkerHandle, WorkerResponse, WorkerSettings};
