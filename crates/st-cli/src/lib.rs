//! sshtie: command-line front end
//!
//! Profile management, `connect`, `status` and `doctor`, built on the
//! st-core profile store and the st-orchestrator session orchestrator.

pub mod commands;
pub mod exit;
pub mod output;
