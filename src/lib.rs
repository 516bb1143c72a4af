//! Payment integration core for the EduSuite school platform.
//!
//! Collects invoice payments through Paystack and keeps invoice and
//! transaction state correct under the gateway's delivery semantics:
//! webhooks arrive at least once, in any order, and must be answered fast.
//!
//! The flow is split into small pieces with one owner each:
//!
//! - [`payments`] talks to the gateway (initialize, verify) with classified
//!   retries
//! - [`webhooks`] authenticates and parses deliveries, suppresses duplicates
//!   and drives the pipeline
//! - [`billing`] decides settlements in a pure state machine and applies
//!   them atomically
//! - [`database`] and [`cache`] carry the Postgres and Redis plumbing
//! - [`api`] is the HTTP surface

pub mod api;
pub mod billing;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;
pub mod webhooks;

pub use config::Config;
pub use error::{AppError, AppErrorKind, AppResult, GatewayError};
