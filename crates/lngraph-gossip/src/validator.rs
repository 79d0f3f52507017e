use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;

use lngraph_core::{
    ChainLookup, ChannelAnnouncement, GossipMessage, InvalidReason, OutPoint, PeerId,
    ShortChannelId, SpendStatus, ValidationConfig, ValidationEvent, ValidationOutcome,
    ValidationState, ValidationStateMachine,
};
use lngraph_crypto::{announcement_digest, matches_funding_output, verify_channel_announcement, Hash};
use lngraph_routing::{ChannelInfo, GraphStore};

use crate::chain::ValidateRequest;
use crate::error::{ChainError, ErrorKind, GossipError};
use crate::events::{GraphEvent, PruneReason};

/// Work the caller must carry out on behalf of the validator or ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the chain watcher about a funding output.
    RequestLookup(ValidateRequest),
    /// Call `retry` for this scid after `delay`.
    ScheduleRetry {
        short_channel_id: ShortChannelId,
        delay: Duration,
    },
    /// Start watching an admitted channel's funding output.
    WatchSpend {
        short_channel_id: ShortChannelId,
        outpoint: OutPoint,
    },
    /// Relay accepted gossip to peers other than `origin`.
    Rebroadcast {
        origin: PeerId,
        message: GossipMessage,
    },
    Notify(GraphEvent),
}

#[derive(Debug)]
struct PendingEntry {
    origin: PeerId,
    announcement: ChannelAnnouncement,
    digest: Hash,
    state: ValidationState,
    attempts: u32,
}

/// Bounded FIFO set of rejected announcement digests.
#[derive(Debug)]
struct Quarantine {
    capacity: usize,
    order: VecDeque<Hash>,
    members: HashSet<Hash>,
}

impl Quarantine {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    fn contains(&self, digest: &Hash) -> bool {
        self.members.contains(digest)
    }

    fn insert(&mut self, digest: Hash) {
        if self.capacity == 0 || !self.members.insert(digest) {
            return;
        }
        self.order.push_back(digest);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

fn advance(scid: ShortChannelId, state: &mut ValidationState, event: ValidationEvent) -> bool {
    match ValidationStateMachine::transition(*state, event) {
        Ok(next) => {
            *state = next;
            true
        }
        Err(e) => {
            tracing::warn!(scid = %scid, error = %e, "ignoring out-of-order validation event");
            false
        }
    }
}

/// Judge a chain answer against the announcement it was requested for.
pub fn evaluate_funding(ann: &ChannelAnnouncement, lookup: &ChainLookup) -> ValidationOutcome {
    let invalid = |reason| ValidationOutcome::Invalid { reason };
    match lookup {
        ChainLookup::NotFound => invalid(InvalidReason::FundingNotFound),
        ChainLookup::WrongChain => invalid(InvalidReason::WrongChain),
        ChainLookup::Found { funding_tx, status } => {
            let vout = ann.short_channel_id.output_index();
            let Some(output) = funding_tx.outputs.get(vout as usize) else {
                return invalid(InvalidReason::OutputIndexOutOfRange);
            };
            if *status == SpendStatus::Spent {
                return invalid(InvalidReason::FundingSpent);
            }
            if !matches_funding_output(ann, output) {
                return invalid(InvalidReason::ScriptMismatch);
            }
            ValidationOutcome::Valid {
                funding_outpoint: OutPoint {
                    txid: funding_tx.txid,
                    vout: vout as u32,
                },
                capacity_sat: output.value_sat,
            }
        }
    }
}

/// Tracks each channel announcement from receipt until it is admitted,
/// rejected or abandoned, and remembers channels whose funding was spent.
///
/// The validator never talks to the chain itself. It returns [`Action`]s and
/// expects lookup results back through [`on_lookup_result`], keyed by scid
/// and in any order.
///
/// [`on_lookup_result`]: AnnouncementValidator::on_lookup_result
pub struct AnnouncementValidator {
    config: ValidationConfig,
    pending: BTreeMap<ShortChannelId, PendingEntry>,
    closed: HashSet<ShortChannelId>,
    quarantine: Quarantine,
}

impl AnnouncementValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let quarantine = Quarantine::new(config.quarantine_capacity);
        Self {
            config,
            pending: BTreeMap::new(),
            closed: HashSet::new(),
            quarantine,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, scid: &ShortChannelId) -> bool {
        self.pending.contains_key(scid)
    }

    pub fn is_closed(&self, scid: &ShortChannelId) -> bool {
        self.closed.contains(scid)
    }

    pub fn quarantined_count(&self) -> usize {
        self.quarantine.len()
    }

    pub fn pending_announcement(&self, scid: &ShortChannelId) -> Option<&ChannelAnnouncement> {
        self.pending.get(scid).map(|e| &e.announcement)
    }

    /// Where an scid stands. `None` means nothing is known about it.
    pub fn state(&self, scid: &ShortChannelId, store: &GraphStore) -> Option<ValidationState> {
        if let Some(entry) = self.pending.get(scid) {
            return Some(entry.state);
        }
        if self.closed.contains(scid) {
            return Some(ValidationState::Closed);
        }
        store.contains_channel(scid).then_some(ValidationState::Valid)
    }

    /// Accept a channel announcement for validation.
    pub fn submit(
        &mut self,
        origin: PeerId,
        ann: ChannelAnnouncement,
        store: &GraphStore,
    ) -> Result<Vec<Action>, GossipError> {
        let scid = ann.short_channel_id;

        if ann.chain_hash != self.config.chain_hash {
            return Err(GossipError::WrongChain(ann.chain_hash));
        }
        if !ann.is_canonical() {
            return Err(GossipError::malformed(
                "channel_announcement",
                "node ids are not in ascending order",
            ));
        }
        ann.validate()?;
        if self.closed.contains(&scid) {
            return Err(GossipError::ChannelClosed(scid));
        }

        let digest = announcement_digest(&ann);
        if self.quarantine.contains(&digest) {
            return Err(GossipError::Quarantined(scid));
        }

        if let Some(info) = store.channel(&scid) {
            if info.announcement == ann {
                return Err(GossipError::Duplicate("channel_announcement"));
            }
            return Err(GossipError::Conflicting(scid));
        }
        if let Some(entry) = self.pending.get(&scid) {
            if entry.digest == digest {
                tracing::trace!(scid = %scid, "announcement already awaiting validation");
                return Ok(Vec::new());
            }
            return Err(GossipError::Conflicting(scid));
        }

        if self.pending.len() >= self.config.max_pending {
            return Err(GossipError::Backpressure);
        }

        let mut state = ValidationState::Received;
        if let Err(e) = verify_channel_announcement(&ann) {
            advance(scid, &mut state, ValidationEvent::Rejected);
            return Err(GossipError::BadSignature(e));
        }
        advance(scid, &mut state, ValidationEvent::SignaturesVerified);

        self.pending.insert(
            scid,
            PendingEntry {
                origin,
                announcement: ann,
                digest,
                state,
                attempts: 1,
            },
        );
        tracing::debug!(scid = %scid, origin = %origin, "announcement queued for chain lookup");

        Ok(vec![Action::RequestLookup(ValidateRequest {
            short_channel_id: scid,
            chain_hash: self.config.chain_hash,
        })])
    }

    /// Apply a chain watcher answer.
    pub fn on_lookup_result(
        &mut self,
        scid: ShortChannelId,
        result: Result<ChainLookup, ChainError>,
        store: &mut GraphStore,
        now: u64,
    ) -> Vec<Action> {
        let Some(entry) = self.pending.get_mut(&scid) else {
            tracing::debug!(scid = %scid, "discarding lookup result for unknown scid");
            return Vec::new();
        };
        if entry.state != ValidationState::AwaitingChainLookup {
            tracing::debug!(scid = %scid, state = %entry.state, "discarding unexpected lookup result");
            return Vec::new();
        }

        let outcome = match &result {
            Ok(lookup) => evaluate_funding(&entry.announcement, lookup),
            Err(_) => ValidationOutcome::Unknown,
        };
        advance(scid, &mut entry.state, outcome.event());

        match outcome {
            ValidationOutcome::Valid {
                funding_outpoint,
                capacity_sat,
            } => {
                let Some(entry) = self.pending.remove(&scid) else {
                    return Vec::new();
                };
                self.admit(entry, funding_outpoint, capacity_sat, store, now)
            }
            ValidationOutcome::Invalid { reason } => {
                let Some(entry) = self.pending.remove(&scid) else {
                    return Vec::new();
                };
                self.quarantine.insert(entry.digest);
                tracing::info!(scid = %scid, reason = %reason, "channel announcement rejected");
                vec![Action::Notify(GraphEvent::AnnouncementRejected {
                    short_channel_id: scid,
                    origin: entry.origin,
                    kind: ErrorKind::Malformed,
                    reason: reason.to_string(),
                })]
            }
            ValidationOutcome::Unknown => {
                let error = result.err().map(|e| e.to_string()).unwrap_or_default();
                if entry.attempts < self.config.retry.max_attempts {
                    let delay = self.config.retry.delay_for(entry.attempts);
                    tracing::debug!(
                        scid = %scid,
                        attempt = entry.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "chain lookup failed, retrying"
                    );
                    return vec![Action::ScheduleRetry {
                        short_channel_id: scid,
                        delay,
                    }];
                }

                advance(scid, &mut entry.state, ValidationEvent::GiveUp);
                let origin = entry.origin;
                let attempts = entry.attempts;
                self.pending.remove(&scid);
                tracing::warn!(scid = %scid, attempts, error = %error, "chain lookup abandoned");
                vec![Action::Notify(GraphEvent::AnnouncementRejected {
                    short_channel_id: scid,
                    origin,
                    kind: ErrorKind::Transient,
                    reason: format!("chain lookup failed after {} attempts: {}", attempts, error),
                })]
            }
        }
    }

    fn admit(
        &mut self,
        entry: PendingEntry,
        funding_outpoint: OutPoint,
        capacity_sat: u64,
        store: &mut GraphStore,
        now: u64,
    ) -> Vec<Action> {
        let scid = entry.announcement.short_channel_id;
        let (node_1, node_2) = (entry.announcement.node_id_1, entry.announcement.node_id_2);
        let info = ChannelInfo {
            announcement: entry.announcement.clone(),
            funding_outpoint,
            capacity_sat,
            admitted_at: now,
        };

        if let Err(e) = store.admit_channel(info) {
            tracing::warn!(scid = %scid, error = %e, "validated channel could not be admitted");
            return vec![Action::Notify(GraphEvent::AnnouncementRejected {
                short_channel_id: scid,
                origin: entry.origin,
                kind: ErrorKind::Conflicting,
                reason: e.to_string(),
            })];
        }

        for node in [node_1, node_2] {
            if store.ensure_node_placeholder(node) {
                tracing::trace!(node = %node, scid = %scid, "endpoint recorded ahead of its announcement");
            }
        }

        tracing::info!(scid = %scid, capacity_sat, "channel validated");
        vec![
            Action::WatchSpend {
                short_channel_id: scid,
                outpoint: funding_outpoint,
            },
            Action::Notify(GraphEvent::ChannelAdmitted {
                short_channel_id: scid,
                node_1,
                node_2,
                capacity_sat,
            }),
            Action::Rebroadcast {
                origin: entry.origin,
                message: GossipMessage::ChannelAnnouncement(entry.announcement),
            },
        ]
    }

    /// Re-issue the lookup for an scid whose previous attempt failed.
    pub fn retry(&mut self, scid: ShortChannelId) -> Vec<Action> {
        let Some(entry) = self.pending.get_mut(&scid) else {
            return Vec::new();
        };
        if entry.state != ValidationState::Unknown {
            return Vec::new();
        }
        advance(scid, &mut entry.state, ValidationEvent::Retry);
        entry.attempts += 1;
        vec![Action::RequestLookup(ValidateRequest {
            short_channel_id: scid,
            chain_hash: self.config.chain_hash,
        })]
    }

    /// The funding output of an admitted channel was spent: remove the
    /// channel and both policies, and refuse the scid from now on.
    pub fn on_spent(&mut self, scid: ShortChannelId, store: &mut GraphStore) -> Vec<Action> {
        if store.prune_channel(&scid).is_none() {
            tracing::debug!(scid = %scid, "discarding spend for unknown channel");
            return Vec::new();
        }
        let mut state = ValidationState::Valid;
        advance(scid, &mut state, ValidationEvent::Spent);
        self.closed.insert(scid);
        tracing::info!(scid = %scid, "channel closed on chain");
        vec![Action::Notify(GraphEvent::ChannelPruned {
            short_channel_id: scid,
            reason: PruneReason::Spent,
        })]
    }
}
