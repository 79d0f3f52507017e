//! Entry point for gossip received from peers.
//!
//! `GossipIngest` deduplicates and verifies node announcements and channel
//! updates itself, hands new channel announcements to the
//! [`AnnouncementValidator`], and buffers channel updates that arrive while
//! their channel is still being checked against the chain.

use std::collections::VecDeque;

use lngraph_core::{
    ChainHash, ChainLookup, ChannelPolicy, GossipConfig, GossipMessage, NodeInfo, PeerId,
    ShortChannelId,
};
use lngraph_crypto::{verify_channel_update, verify_node_announcement};
use lngraph_routing::{GraphStore, RoutingError};

use crate::error::{ChainError, GossipError};
use crate::events::GraphEvent;
use crate::validator::{Action, AnnouncementValidator};

#[derive(Debug, Clone)]
struct OrphanPolicy {
    origin: PeerId,
    policy: ChannelPolicy,
    received_at: u64,
}

pub struct GossipIngest {
    config: GossipConfig,
    chain_hash: ChainHash,
    orphans: VecDeque<OrphanPolicy>,
}

impl GossipIngest {
    pub fn new(config: GossipConfig, chain_hash: ChainHash) -> Self {
        Self {
            config,
            chain_hash,
            orphans: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Channel updates waiting for their channel to be validated.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Process one gossip message. Never waits on the chain: lookups are
    /// returned as [`Action::RequestLookup`] for the caller to run.
    pub fn handle(
        &mut self,
        origin: PeerId,
        message: GossipMessage,
        store: &mut GraphStore,
        validator: &mut AnnouncementValidator,
        now: u64,
    ) -> Result<Vec<Action>, GossipError> {
        tracing::trace!(origin = %origin, kind = message.kind(), "gossip received");
        match message {
            GossipMessage::ChannelAnnouncement(ann) => {
                let mut actions = validator.submit(origin, ann, store)?;
                if !actions.is_empty() {
                    actions.insert(
                        0,
                        Action::Notify(GraphEvent::GossipAccepted {
                            origin,
                            message_type: "channel_announcement".to_string(),
                        }),
                    );
                }
                Ok(actions)
            }
            GossipMessage::ChannelUpdate(policy) => {
                self.handle_policy(origin, policy, store, validator, now)
            }
            GossipMessage::NodeAnnouncement(info) => self.handle_node(origin, info, store),
        }
    }

    fn handle_node(
        &mut self,
        origin: PeerId,
        info: NodeInfo,
        store: &mut GraphStore,
    ) -> Result<Vec<Action>, GossipError> {
        info.validate()?;
        if let Some(existing) = store.node(&info.node_id).filter(|n| !n.is_placeholder()) {
            if *existing == info {
                return Err(GossipError::Duplicate("node_announcement"));
            }
            if existing.timestamp >= info.timestamp {
                return Err(GossipError::Stale("node_announcement"));
            }
        }
        verify_node_announcement(&info)?;

        let (node_id, timestamp) = (info.node_id, info.timestamp);
        store.upsert_node(info.clone());
        tracing::debug!(node = %node_id, timestamp, "node announcement accepted");

        Ok(vec![
            Action::Notify(GraphEvent::NodeUpdated { node_id, timestamp }),
            Action::Rebroadcast {
                origin,
                message: GossipMessage::NodeAnnouncement(info),
            },
        ])
    }

    fn handle_policy(
        &mut self,
        origin: PeerId,
        policy: ChannelPolicy,
        store: &mut GraphStore,
        validator: &AnnouncementValidator,
        now: u64,
    ) -> Result<Vec<Action>, GossipError> {
        if policy.chain_hash != self.chain_hash {
            return Err(GossipError::WrongChain(policy.chain_hash));
        }
        policy.validate()?;

        let scid = policy.short_channel_id;
        if store.contains_channel(&scid) {
            return apply_policy(origin, policy, store);
        }

        if let Some(ann) = validator.pending_announcement(&scid) {
            verify_channel_update(&policy, &ann.source_of(policy.direction()))?;
            self.buffer(origin, policy, now)?;
            return Ok(Vec::new());
        }

        if validator.is_closed(&scid) {
            return Err(GossipError::ChannelClosed(scid));
        }
        Err(GossipError::UnknownChannel(scid))
    }

    fn buffer(&mut self, origin: PeerId, policy: ChannelPolicy, now: u64) -> Result<(), GossipError> {
        if self.orphans.iter().any(|o| o.policy == policy) {
            return Err(GossipError::Duplicate("channel_update"));
        }
        if self.config.max_orphan_policies == 0 {
            return Err(GossipError::Backpressure);
        }
        while self.orphans.len() >= self.config.max_orphan_policies {
            if let Some(evicted) = self.orphans.pop_front() {
                tracing::debug!(scid = %evicted.policy.short_channel_id, "orphan policy evicted");
            }
        }
        tracing::debug!(scid = %policy.short_channel_id, "policy buffered until channel validates");
        self.orphans.push_back(OrphanPolicy {
            origin,
            policy,
            received_at: now,
        });
        Ok(())
    }

    /// Forward a chain answer to the validator, then replay or drop any
    /// channel updates buffered for that scid.
    pub fn on_lookup_result(
        &mut self,
        validator: &mut AnnouncementValidator,
        scid: ShortChannelId,
        result: Result<ChainLookup, ChainError>,
        store: &mut GraphStore,
        now: u64,
    ) -> Vec<Action> {
        let mut actions = validator.on_lookup_result(scid, result, store, now);
        if validator.is_pending(&scid) {
            return actions;
        }
        if store.contains_channel(&scid) {
            actions.extend(self.on_admitted(scid, store));
        } else {
            self.on_rejected(scid);
        }
        actions
    }

    /// Apply buffered updates for a channel that just entered the graph, in
    /// arrival order.
    pub fn on_admitted(&mut self, scid: ShortChannelId, store: &mut GraphStore) -> Vec<Action> {
        let (ready, rest): (Vec<_>, Vec<_>) = self
            .orphans
            .drain(..)
            .partition(|o| o.policy.short_channel_id == scid);
        self.orphans = rest.into();

        let mut actions = Vec::new();
        for orphan in ready {
            match apply_policy(orphan.origin, orphan.policy, store) {
                Ok(applied) => actions.extend(applied),
                Err(e) => {
                    tracing::debug!(scid = %scid, error = %e, "buffered policy not applied");
                }
            }
        }
        actions
    }

    /// Drop updates buffered for a channel that failed validation.
    pub fn on_rejected(&mut self, scid: ShortChannelId) -> usize {
        let before = self.orphans.len();
        self.orphans.retain(|o| o.policy.short_channel_id != scid);
        let dropped = before - self.orphans.len();
        if dropped > 0 {
            tracing::debug!(scid = %scid, dropped, "buffered policies dropped");
        }
        dropped
    }

    /// Drop buffered updates older than `orphan_policy_ttl_secs`.
    pub fn expire_orphans(&mut self, now: u64) -> usize {
        let ttl = self.config.orphan_policy_ttl_secs;
        let before = self.orphans.len();
        self.orphans
            .retain(|o| now.saturating_sub(o.received_at) <= ttl);
        before - self.orphans.len()
    }
}

/// Store a policy for an admitted channel after the freshness and signature
/// checks.
fn apply_policy(
    origin: PeerId,
    policy: ChannelPolicy,
    store: &mut GraphStore,
) -> Result<Vec<Action>, GossipError> {
    let scid = policy.short_channel_id;
    let direction = policy.direction();
    let Some(info) = store.channel(&scid) else {
        return Err(GossipError::UnknownChannel(scid));
    };

    if policy.htlc_maximum_msat > info.capacity_msat() {
        return Err(GossipError::malformed(
            "channel_update",
            format!(
                "htlc_maximum_msat {} exceeds capacity {} msat",
                policy.htlc_maximum_msat,
                info.capacity_msat()
            ),
        ));
    }
    if let Some(existing) = store.policy(&scid, direction) {
        if *existing == policy {
            return Err(GossipError::Duplicate("channel_update"));
        }
        if existing.timestamp >= policy.timestamp {
            return Err(GossipError::Stale("channel_update"));
        }
    }
    verify_channel_update(&policy, &info.announcement.source_of(direction))?;

    let timestamp = policy.timestamp;
    store
        .replace_policy(policy.clone())
        .map_err(|e| match e {
            RoutingError::UnknownChannel { scid } | RoutingError::ChannelConflict { scid } => {
                GossipError::UnknownChannel(scid)
            }
        })?;
    tracing::debug!(scid = %scid, direction = ?direction, timestamp, "policy accepted");

    Ok(vec![
        Action::Notify(GraphEvent::PolicyUpdated {
            short_channel_id: scid,
            direction,
            timestamp,
        }),
        Action::Rebroadcast {
            origin,
            message: GossipMessage::ChannelUpdate(policy),
        },
    ])
}
