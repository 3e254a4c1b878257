//! Credit-limit automation: application intake, eligibility gate, insurer rules, decision
//! finalization and renewals.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
