//! Orchestration layer for the retention/disposition engine.
//!
//! Every state-mutating operation runs as one transaction: load the row
//! `FOR UPDATE`, guard-check, mutate, recompute the snapshot hash, persist,
//! append exactly one audit entry. Both sides commit or both roll back --
//! never state-without-audit, never audit-without-state.

pub mod alerts;
pub mod audit_trail;
pub mod boundary;
pub mod context;
pub mod error;
pub mod process;
pub mod sweep;
