//! # handoff-oracle
//!
//! The automated responder consulted while a channel is in AI mode, and the
//! gate that decides whether a query may be sent at all.
//!
//! - [`AiResponder`] / [`HttpAiResponder`]: question in, answer out
//! - [`QueryGate`] / [`AllowAll`] / [`RequireParticipant`]: pre-query policy
//! - [`OracleError`]: failures surfaced to the user as notices

#![deny(unsafe_code)]

pub mod errors;
pub mod gate;
pub mod responder;

pub use errors::OracleError;
pub use gate::{AllowAll, GateDecision, QueryGate, RequireParticipant};
pub use responder::{AiQuery, AiResponder, HttpAiResponder};
