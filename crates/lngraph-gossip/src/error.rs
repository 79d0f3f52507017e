//! Error taxonomy for gossip handling.

use lngraph_core::{ChainHash, CoreError, ShortChannelId};
use lngraph_crypto::CryptoError;
use serde::{Deserialize, Serialize};

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad structure, signature or chain proof. Never retried.
    Malformed,
    /// Chain watcher trouble. Retried with backoff, then dropped.
    Transient,
    /// Contradicts an accepted announcement; the original is kept.
    Conflicting,
    /// Old, duplicate or no longer relevant. Silently discarded.
    Stale,
    /// Queue limits reached.
    Overloaded,
}

/// Errors that can occur while ingesting gossip.
#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("message is for chain {0}")]
    WrongChain(ChainHash),

    #[error("signature check failed: {0}")]
    BadSignature(#[from] CryptoError),

    #[error("announcement for {0} conflicts with the accepted one")]
    Conflicting(ShortChannelId),

    #[error("announcement for {0} was already rejected")]
    Quarantined(ShortChannelId),

    #[error("channel {0} has been closed")]
    ChannelClosed(ShortChannelId),

    #[error("channel {0} is not known")]
    UnknownChannel(ShortChannelId),

    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("{0} is not newer than the stored one")]
    Stale(&'static str),

    #[error("validation queue is full")]
    Backpressure,

    #[error("chain watcher error: {0}")]
    Chain(#[from] ChainError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl GossipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed { .. }
            | Self::WrongChain(_)
            | Self::BadSignature(_)
            | Self::Quarantined(_)
            | Self::Core(_) => ErrorKind::Malformed,
            Self::Conflicting(_) => ErrorKind::Conflicting,
            Self::ChannelClosed(_)
            | Self::UnknownChannel(_)
            | Self::Duplicate(_)
            | Self::Stale(_) => ErrorKind::Stale,
            Self::Backpressure => ErrorKind::Overloaded,
            Self::Chain(_) => ErrorKind::Transient,
        }
    }

    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }
}

/// Failures reported by a chain watcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("chain backend unavailable: {0}")]
    Unavailable(String),

    #[error("chain watcher closed")]
    Closed,
}
