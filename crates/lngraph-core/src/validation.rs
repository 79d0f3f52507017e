use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::OutPoint;

/// Lifecycle of a channel announcement awaiting chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationState {
    /// Announcement arrived; signatures not yet checked.
    Received,
    /// Signatures verified; waiting for the chain watcher.
    AwaitingChainLookup,
    /// Funding output confirmed; channel is in the graph.
    Valid,
    /// Rejected. Final state.
    Invalid,
    /// Chain watcher could not answer; eligible for retry.
    Unknown,
    /// Retries exhausted. Final state.
    Abandoned,
    /// Funding output spent after admission. Final state.
    Closed,
}

impl ValidationState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Invalid | Self::Abandoned | Self::Closed)
    }

    /// Whether the announcement still occupies a pending slot.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Received | Self::AwaitingChainLookup | Self::Unknown
        )
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "Received",
            Self::AwaitingChainLookup => "AwaitingChainLookup",
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
            Self::Unknown => "Unknown",
            Self::Abandoned => "Abandoned",
            Self::Closed => "Closed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationEvent {
    /// Signatures verified, lookup requested.
    SignaturesVerified,
    /// Signatures or structure rejected before any lookup.
    Rejected,
    /// Chain confirmed an unspent, matching funding output.
    LookupValid,
    /// Chain answered and the answer disqualifies the channel.
    LookupInvalid,
    /// Chain watcher failed transiently.
    LookupFailed,
    /// Backoff elapsed, lookup re-issued.
    Retry,
    /// Attempts exhausted.
    GiveUp,
    /// Funding output spent.
    Spent,
}

/// Validation transitions:
/// - Received → AwaitingChainLookup (SignaturesVerified)
/// - Received → Invalid (Rejected)
/// - AwaitingChainLookup → Valid (LookupValid)
/// - AwaitingChainLookup → Invalid (LookupInvalid)
/// - AwaitingChainLookup → Unknown (LookupFailed)
/// - Unknown → AwaitingChainLookup (Retry)
/// - Unknown → Abandoned (GiveUp)
/// - Valid → Closed (Spent)
pub struct ValidationStateMachine;

impl ValidationStateMachine {
    pub fn transition(
        current: ValidationState,
        event: ValidationEvent,
    ) -> Result<ValidationState, CoreError> {
        use ValidationEvent as E;
        use ValidationState as S;

        let new_state = match (current, event) {
            (S::Received, E::SignaturesVerified) => S::AwaitingChainLookup,
            (S::Received, E::Rejected) => S::Invalid,

            (S::AwaitingChainLookup, E::LookupValid) => S::Valid,
            (S::AwaitingChainLookup, E::LookupInvalid) => S::Invalid,
            (S::AwaitingChainLookup, E::LookupFailed) => S::Unknown,

            (S::Unknown, E::Retry) => S::AwaitingChainLookup,
            (S::Unknown, E::GiveUp) => S::Abandoned,

            (S::Valid, E::Spent) => S::Closed,

            _ => {
                let target = match event {
                    E::SignaturesVerified | E::Retry => S::AwaitingChainLookup,
                    E::Rejected | E::LookupInvalid => S::Invalid,
                    E::LookupValid => S::Valid,
                    E::LookupFailed => S::Unknown,
                    E::GiveUp => S::Abandoned,
                    E::Spent => S::Closed,
                };
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "validation state transition"
        );

        Ok(new_state)
    }

    pub fn can_transition(current: ValidationState, event: ValidationEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

/// Why an announcement was judged invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    #[error("funding transaction not found")]
    FundingNotFound,
    #[error("funding transaction is on another chain")]
    WrongChain,
    #[error("funding output index out of range")]
    OutputIndexOutOfRange,
    #[error("funding output already spent")]
    FundingSpent,
    #[error("funding output script does not match the announced keys")]
    ScriptMismatch,
}

/// The verdict for one announcement after its chain lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid {
        funding_outpoint: OutPoint,
        capacity_sat: u64,
    },
    Invalid {
        reason: InvalidReason,
    },
    Unknown,
}

impl ValidationOutcome {
    pub fn event(&self) -> ValidationEvent {
        match self {
            Self::Valid { .. } => ValidationEvent::LookupValid,
            Self::Invalid { .. } => ValidationEvent::LookupInvalid,
            Self::Unknown => ValidationEvent::LookupFailed,
        }
    }
}
