//! Policy check run before every automated query.
//!
//! A [`QueryGate`] decides whether a question may be sent to the responder,
//! e.g. when answers are metered against an account balance. Denied queries
//! never reach the responder.

use async_trait::async_trait;
use handoff_core::Participant;

/// Outcome of a gate check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// The query may proceed.
    Allow,
    /// The query is refused.
    Deny {
        /// Reason shown to the user.
        reason: String,
    },
}

impl GateDecision {
    /// Whether the query may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decides whether a query may reach the responder.
#[async_trait]
pub trait QueryGate: Send + Sync {
    /// Check a query from `participant` (absent for guests).
    async fn check(&self, participant: Option<&Participant>, question: &str) -> GateDecision;
}

/// Gate that allows everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl QueryGate for AllowAll {
    async fn check(&self, _participant: Option<&Participant>, _question: &str) -> GateDecision {
        GateDecision::Allow
    }
}

/// Gate that only lets signed-in participants query.
#[derive(Clone, Debug)]
pub struct RequireParticipant {
    reason: String,
}

impl RequireParticipant {
    /// Deny guests with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for RequireParticipant {
    fn default() -> Self {
        Self::new("please sign in to ask the assistant")
    }
}

#[async_trait]
impl QueryGate for RequireParticipant {
    async fn check(&self, participant: Option<&Participant>, _question: &str) -> GateDecision {
        match participant {
            Some(_) => GateDecision::Allow,
            None => GateDecision::Deny {
                reason: self.reason.clone(),
            },
        }
    }
}
