use lngraph_core::ShortChannelId;
use serde::{Deserialize, Serialize};

/// Errors raised by graph mutations.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("channel {scid} is not in the graph")]
    UnknownChannel { scid: ShortChannelId },

    #[error("channel {scid} is already known with different content")]
    ChannelConflict { scid: ShortChannelId },
}

/// Why no route could be produced. Returned as a value, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum NoRouteReason {
    #[error("target is unreachable from source")]
    Unreachable,

    #[error("a path exists but the amount or constraints eliminate it")]
    ConstraintsViolated,

    #[error("source and target are the same node")]
    RouteToSelf,

    #[error("amount must be greater than zero")]
    ZeroAmount,
}
