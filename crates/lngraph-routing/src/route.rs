use lngraph_core::{NodeId, ShortChannelId};
use serde::{Deserialize, Serialize};

/// One channel traversal of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHop {
    pub short_channel_id: ShortChannelId,
    pub from: NodeId,
    pub to: NodeId,
    /// Amount carried over this channel.
    pub amount_msat: u64,
    /// Fee `from` charges under its policy for forwarding `amount_msat`.
    pub fee_msat: u64,
    pub cltv_expiry_delta: u16,
}

/// A route from source to target, ordered from the source outward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    hops: Vec<RouteHop>,
    /// Amount delivered to the target.
    pub amount_msat: u64,
    /// Amount the source sends over its first channel.
    pub total_amount_msat: u64,
    pub total_fee_msat: u64,
    /// Final cltv delta plus every forwarding node's delta.
    pub total_cltv_delta: u32,
    /// Search weight (fees plus locked-capital risk).
    pub cost: u64,
}

impl Route {
    pub(crate) fn new(
        hops: Vec<RouteHop>,
        amount_msat: u64,
        total_cltv_delta: u32,
        cost: u64,
    ) -> Self {
        let total_amount_msat = hops.first().map_or(amount_msat, |h| h.amount_msat);
        Self {
            hops,
            amount_msat,
            total_amount_msat,
            total_fee_msat: total_amount_msat.saturating_sub(amount_msat),
            total_cltv_delta,
            cost,
        }
    }

    pub fn hops(&self) -> &[RouteHop] {
        &self.hops
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn source(&self) -> Option<NodeId> {
        self.hops.first().map(|h| h.from)
    }

    pub fn target(&self) -> Option<NodeId> {
        self.hops.last().map(|h| h.to)
    }

    pub fn channels(&self) -> Vec<ShortChannelId> {
        self.hops.iter().map(|h| h.short_channel_id).collect()
    }

    /// Every node visited, source first.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.hops.iter().map(|h| h.from).collect();
        if let Some(last) = self.hops.last() {
            nodes.push(last.to);
        }
        nodes
    }
}
