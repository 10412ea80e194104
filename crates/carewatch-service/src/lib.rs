//! Composition root for the clinical alerting core.
//!
//! [`AlertService`] wires the condition evaluator, the deduplicating alert
//! store, and the task linkage boundary together behind the operations the
//! rest of the platform calls: `evaluate`, `claim`, `acknowledge`,
//! `resolve`, `unclaim`, and `cancel`.

pub mod config;
pub mod error;
pub mod logging;
pub mod rule_builder;
pub mod service;

pub use error::{Result, ServiceError};
pub use service::AlertService;
