//! Alert persistence and lifecycle transitions.
//!
//! The [`store::AlertStore`] owns the one mutable record in the system:
//! alerts move PENDING → ACKNOWLEDGED → RESOLVED (or → CANCELLED) through
//! conditional updates that re-check status and claimant server-side, and
//! deduplication is enforced by a partial unique index over
//! `(patient_id, rule_id)` for open statuses.

pub mod entities;
pub mod error;
pub mod store;


pub use error::{Result, StorageError};
pub use store::alert::{CreateOutcome, NewAlert};
pub use store::AlertStore;
