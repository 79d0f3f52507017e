//! Graph events for audit and rebroadcast collaborators.
//!
//! Events are published on a broadcast channel; publishing never waits for
//! receivers and lagging receivers lose the oldest events.

use lngraph_core::{Direction, NodeId, PeerId, ShortChannelId};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Why a channel left the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneReason {
    /// Funding output spent on chain.
    Spent,
    /// No policy refresh within the staleness window.
    Stale,
}

/// Observable changes to the graph and gossip outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    ChannelAdmitted {
        short_channel_id: ShortChannelId,
        node_1: NodeId,
        node_2: NodeId,
        capacity_sat: u64,
    },
    ChannelPruned {
        short_channel_id: ShortChannelId,
        reason: PruneReason,
    },
    AnnouncementRejected {
        short_channel_id: ShortChannelId,
        origin: PeerId,
        kind: ErrorKind,
        reason: String,
    },
    NodeUpdated {
        node_id: NodeId,
        timestamp: u32,
    },
    PolicyUpdated {
        short_channel_id: ShortChannelId,
        direction: Direction,
        timestamp: u32,
    },
    GossipAccepted {
        origin: PeerId,
        message_type: String,
    },
    RouteComputed {
        source: NodeId,
        target: NodeId,
        amount_msat: u64,
        hops: usize,
        fee_msat: u64,
    },
}

impl GraphEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelAdmitted { .. } => "channel_admitted",
            Self::ChannelPruned { .. } => "channel_pruned",
            Self::AnnouncementRejected { .. } => "announcement_rejected",
            Self::NodeUpdated { .. } => "node_updated",
            Self::PolicyUpdated { .. } => "policy_updated",
            Self::GossipAccepted { .. } => "gossip_accepted",
            Self::RouteComputed { .. } => "route_computed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = GraphEvent::ChannelPruned {
            short_channel_id: ShortChannelId::new(5, 6, 7).unwrap(),
            reason: PruneReason::Spent,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "channel_pruned");
        assert_eq!(json["short_channel_id"], "5x6x7");
        assert_eq!(json["reason"], "spent");
        assert_eq!(event.name(), "channel_pruned");
    }
}
