//! Bulk direct-message dispatch.
//!
//! Validates a batch request, establishes the session, and sends one
//! personalized message per target with retry, pacing and session re-checks.

pub mod clock;
pub mod collector;
pub mod engine;
pub mod request;
pub mod retry;
pub mod selector;
pub mod session;
pub mod simulated;
pub mod state_machine;
pub mod throttle;

pub use clock::{InstantSleeper, Sleeper, TokioSleeper};
pub use engine::DispatchEngine;
pub use request::{DispatchInput, DispatchRequest};
pub use simulated::SimulatedAccountService;
