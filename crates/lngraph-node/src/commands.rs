//! Commands dispatched from a [`RouterHandle`](crate::RouterHandle) to the router task.

use std::sync::Arc;

use lngraph_core::{ChannelPolicy, GossipMessage, NodeInfo, PeerId, ShortChannelId};
use lngraph_gossip::GossipError;
use lngraph_routing::{ChannelInfo, GraphStore, NoRouteReason, Route, RouteRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// A command sent to the router's mailbox.
pub enum RouterCommand {
    /// Ingest one gossip message. `reply` receives the ingest verdict when set.
    Submit {
        origin: PeerId,
        message: GossipMessage,
        reply: Option<oneshot::Sender<Result<(), GossipError>>>,
    },
    ListNodes {
        reply: oneshot::Sender<Vec<NodeInfo>>,
    },
    ListChannels {
        reply: oneshot::Sender<Vec<ChannelInfo>>,
    },
    ListPolicies {
        reply: oneshot::Sender<Vec<ChannelPolicy>>,
    },
    FindRoute {
        request: RouteRequest,
        reply: oneshot::Sender<Result<Route, NoRouteReason>>,
    },
    Snapshot {
        reply: oneshot::Sender<Arc<GraphStore>>,
    },
    Stats {
        reply: oneshot::Sender<RouterStats>,
    },
    /// Answered once every earlier command is processed and no channel
    /// announcement is still waiting on the chain.
    Sync {
        reply: oneshot::Sender<()>,
    },
    Prune {
        reply: oneshot::Sender<PruneReport>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Counters reported by the router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Nodes with at least one channel.
    pub nodes: usize,
    pub channels: usize,
    pub policies: usize,
    pub pending_validations: usize,
    /// Admitted channels with a live spend watch.
    pub spend_watches: usize,
    pub quarantined: usize,
    pub orphan_policies: usize,
    pub gossip_accepted: u64,
    pub gossip_rejected: u64,
    pub channels_closed: u64,
}

/// What a prune sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub stale_channels: Vec<ShortChannelId>,
    pub orphan_nodes: usize,
    pub expired_policies: usize,
}

/// A gossip message together with the peer that relayed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipEnvelope {
    pub origin: PeerId,
    pub message: GossipMessage,
}
