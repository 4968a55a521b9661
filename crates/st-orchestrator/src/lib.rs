//! st-orchestrator: Transport resolution and session orchestration for sshtie
//!
//! Given a validated profile, the resolver builds an ordered transport plan
//! and the orchestrator walks it: each candidate is opened, established
//! within its timeout, and handed to the remote multiplexer. Failures are
//! classified and run through a single policy table that decides whether
//! the next candidate is tried.

pub mod backend;
pub mod orchestrator;
pub mod outcome;
pub mod policy;
pub mod resolver;
pub mod tmux;

pub use backend::BackendRegistry;
pub use orchestrator::SessionOrchestrator;
pub use outcome::{AbortReason, AttemptOutcome, SessionOutcome, SessionStatus, TransportAttempt};
pub use policy::{disposition, Disposition};
pub use resolver::{plan, TransportPlan};
pub use tmux::TmuxMultiplexer;
