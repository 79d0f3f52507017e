use std::collections::{BTreeMap, BTreeSet};

use lngraph_core::{
    resolve_desc, ChannelAnnouncement, ChannelDesc, ChannelPolicy, Direction, NodeId, NodeInfo,
    OutPoint, ShortChannelId,
};
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;

/// A channel admitted into the graph after its funding output was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub announcement: ChannelAnnouncement,
    pub funding_outpoint: OutPoint,
    /// Value of the funding output.
    pub capacity_sat: u64,
    /// Unix seconds.
    pub admitted_at: u64,
}

impl ChannelInfo {
    pub fn short_channel_id(&self) -> ShortChannelId {
        self.announcement.short_channel_id
    }

    pub fn capacity_msat(&self) -> u64 {
        self.capacity_sat.saturating_mul(1_000)
    }
}

/// Result of offering a record to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Inserted,
    Replaced,
    /// Byte-identical to what is stored.
    Duplicate,
    /// Not newer than what is stored.
    Stale,
}

impl UpdateOutcome {
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

/// A usable direction of a channel together with its current policy.
#[derive(Debug, Clone, Copy)]
pub struct Edge<'a> {
    pub desc: ChannelDesc,
    pub policy: &'a ChannelPolicy,
    pub capacity_sat: u64,
}

/// In-memory view of the public channel graph.
///
/// Four indices are kept in step: node records, admitted channels, one policy
/// per channel direction, and the set of channels each node is an endpoint of.
/// Ordered maps keep enumeration deterministic.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: BTreeMap<NodeId, NodeInfo>,
    channels: BTreeMap<ShortChannelId, ChannelInfo>,
    policies: BTreeMap<(ShortChannelId, Direction), ChannelPolicy>,
    adjacency: BTreeMap<NodeId, BTreeSet<ShortChannelId>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── point queries ──────────────────────────────────────────────

    pub fn node(&self, id: &NodeId) -> Option<&NodeInfo> {
        self.nodes.get(id)
    }

    pub fn channel(&self, scid: &ShortChannelId) -> Option<&ChannelInfo> {
        self.channels.get(scid)
    }

    pub fn contains_channel(&self, scid: &ShortChannelId) -> bool {
        self.channels.contains_key(scid)
    }

    pub fn policy(&self, scid: &ShortChannelId, direction: Direction) -> Option<&ChannelPolicy> {
        self.policies.get(&(*scid, direction))
    }

    pub fn has_channels(&self, node: &NodeId) -> bool {
        self.adjacency.get(node).is_some_and(|set| !set.is_empty())
    }

    pub fn channels_of(&self, node: &NodeId) -> impl Iterator<Item = &ChannelInfo> + '_ {
        self.adjacency
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(move |scid| self.channels.get(scid))
    }

    // ── enumeration ────────────────────────────────────────────────

    /// Announced nodes that are an endpoint of at least one channel.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> + '_ {
        self.nodes
            .values()
            .filter(move |info| self.has_channels(&info.node_id))
    }

    /// Every node record, including those awaiting the orphan sweep.
    pub fn all_nodes(&self) -> impl Iterator<Item = &NodeInfo> + '_ {
        self.nodes.values()
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelInfo> + '_ {
        self.channels.values()
    }

    pub fn policies(&self) -> impl Iterator<Item = &ChannelPolicy> + '_ {
        self.policies.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.nodes.is_empty()
    }

    // ── edges ──────────────────────────────────────────────────────

    fn edge(&self, scid: &ShortChannelId, direction: Direction) -> Option<Edge<'_>> {
        let info = self.channels.get(scid)?;
        let policy = self.policies.get(&(*scid, direction))?;
        Some(Edge {
            desc: resolve_desc(policy, &info.announcement),
            policy,
            capacity_sat: info.capacity_sat,
        })
    }

    /// Directions leaving `node` that carry a policy.
    pub fn outgoing_edges(&self, node: &NodeId) -> Vec<Edge<'_>> {
        self.adjacency
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|scid| {
                let ann = &self.channels.get(scid)?.announcement;
                let direction = if ann.node_id_1 == *node {
                    Direction::Forward
                } else {
                    Direction::Backward
                };
                self.edge(scid, direction)
            })
            .collect()
    }

    /// Directions entering `node` that carry a policy.
    pub fn incoming_edges(&self, node: &NodeId) -> Vec<Edge<'_>> {
        self.adjacency
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|scid| {
                let ann = &self.channels.get(scid)?.announcement;
                let direction = if ann.node_id_2 == *node {
                    Direction::Forward
                } else {
                    Direction::Backward
                };
                self.edge(scid, direction)
            })
            .collect()
    }

    // ── mutation ───────────────────────────────────────────────────

    /// Add a validated channel. A second admission of identical content is a
    /// no-op; different content under a known scid is a conflict.
    pub fn admit_channel(&mut self, info: ChannelInfo) -> Result<UpdateOutcome, RoutingError> {
        let scid = info.short_channel_id();
        if let Some(existing) = self.channels.get(&scid) {
            if existing.announcement == info.announcement {
                return Ok(UpdateOutcome::Duplicate);
            }
            return Err(RoutingError::ChannelConflict { scid });
        }

        let (n1, n2) = (info.announcement.node_id_1, info.announcement.node_id_2);
        self.adjacency.entry(n1).or_default().insert(scid);
        self.adjacency.entry(n2).or_default().insert(scid);
        self.channels.insert(scid, info);

        tracing::debug!(scid = %scid, node_1 = %n1, node_2 = %n2, "channel admitted");
        Ok(UpdateOutcome::Inserted)
    }

    /// Record an endpoint with a placeholder unless some record exists.
    /// Returns whether a placeholder was inserted.
    pub fn ensure_node_placeholder(&mut self, node_id: NodeId) -> bool {
        if self.nodes.contains_key(&node_id) {
            return false;
        }
        self.nodes.insert(node_id, NodeInfo::placeholder(node_id));
        true
    }

    /// Store a node record if its timestamp is strictly newer. Any real
    /// record replaces a placeholder.
    pub fn upsert_node(&mut self, info: NodeInfo) -> UpdateOutcome {
        match self.nodes.get(&info.node_id) {
            Some(existing) if *existing == info => UpdateOutcome::Duplicate,
            Some(existing) if existing.is_placeholder() => {
                self.nodes.insert(info.node_id, info);
                UpdateOutcome::Replaced
            }
            Some(existing) if existing.timestamp >= info.timestamp => UpdateOutcome::Stale,
            Some(_) => {
                self.nodes.insert(info.node_id, info);
                UpdateOutcome::Replaced
            }
            None => {
                self.nodes.insert(info.node_id, info);
                UpdateOutcome::Inserted
            }
        }
    }

    /// Store a policy for an admitted channel if its timestamp is strictly
    /// newer than the current one for the same direction.
    pub fn replace_policy(&mut self, policy: ChannelPolicy) -> Result<UpdateOutcome, RoutingError> {
        let scid = policy.short_channel_id;
        if !self.channels.contains_key(&scid) {
            return Err(RoutingError::UnknownChannel { scid });
        }
        let key = (scid, policy.direction());
        let outcome = match self.policies.get(&key) {
            Some(existing) if *existing == policy => return Ok(UpdateOutcome::Duplicate),
            Some(existing) if existing.timestamp >= policy.timestamp => {
                return Ok(UpdateOutcome::Stale)
            }
            Some(_) => UpdateOutcome::Replaced,
            None => UpdateOutcome::Inserted,
        };
        self.policies.insert(key, policy);
        Ok(outcome)
    }

    /// Remove a channel together with both of its policies.
    pub fn prune_channel(&mut self, scid: &ShortChannelId) -> Option<ChannelInfo> {
        let info = self.channels.remove(scid)?;
        self.policies.remove(&(*scid, Direction::Forward));
        self.policies.remove(&(*scid, Direction::Backward));
        for node in [info.announcement.node_id_1, info.announcement.node_id_2] {
            if let Some(set) = self.adjacency.get_mut(&node) {
                set.remove(scid);
                if set.is_empty() {
                    self.adjacency.remove(&node);
                }
            }
        }
        tracing::debug!(scid = %scid, "channel pruned");
        Some(info)
    }

    /// Drop node records that are no longer an endpoint of any channel.
    pub fn prune_orphan_nodes(&mut self) -> Vec<NodeId> {
        let orphans: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !self.has_channels(id))
            .copied()
            .collect();
        for id in &orphans {
            self.nodes.remove(id);
        }
        if !orphans.is_empty() {
            tracing::debug!(count = orphans.len(), "orphan nodes pruned");
        }
        orphans
    }

    /// Remove channels with no policy refresh within `max_age` seconds.
    /// A channel that never received a policy ages from its admission time.
    pub fn prune_stale(&mut self, now: u64, max_age: u64) -> Vec<ShortChannelId> {
        let stale: Vec<ShortChannelId> = self
            .channels
            .iter()
            .filter(|(scid, info)| {
                let newest_policy = [Direction::Forward, Direction::Backward]
                    .iter()
                    .filter_map(|dir| self.policies.get(&(**scid, *dir)))
                    .map(|p| p.timestamp as u64)
                    .max();
                let last_seen = newest_policy.unwrap_or(info.admitted_at);
                now.saturating_sub(last_seen) > max_age
            })
            .map(|(scid, _)| *scid)
            .collect();
        for scid in &stale {
            self.prune_channel(scid);
        }
        stale
    }
}
