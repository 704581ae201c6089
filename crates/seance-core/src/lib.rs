//! Seance Core - Call-session domain types
//!
//! This crate provides the domain model shared by the protocol and client
//! crates: call status and its precedence order, money, the call session
//! entity and the single reducer (`CallSession::apply_signal`) that every
//! status and timer signal flows through.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod money;
pub mod session;
pub mod signal;
pub mod status;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use money::Money;
pub use session::{
    format_elapsed, CallSession, CallSessionView, CallSnapshot, Counterpart, CountdownTick,
    EarningsSource, RequestId, SessionId,
};
pub use signal::{Signal, SignalOutcome, SignalSource, StatusChange};
pub use status::{CallStatus, ConnectionState};
