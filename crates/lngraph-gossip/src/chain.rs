//! Chain watcher contract and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use lngraph_core::{ChainHash, ChainLookup, FundingTx, OutPoint, ShortChannelId, SpendStatus, Txid};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};

use crate::error::ChainError;

/// A request to resolve a short channel id to its funding transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub short_channel_id: ShortChannelId,
    pub chain_hash: ChainHash,
}

/// Delivered once the watched funding output is spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendNotification {
    pub short_channel_id: ShortChannelId,
    pub outpoint: OutPoint,
    #[serde(default)]
    pub spending_txid: Option<Txid>,
}

/// Blockchain access needed to validate channels.
///
/// Implementations may be slow or fail transiently; callers run each call in
/// its own task and never hold graph state across the await.
#[async_trait]
pub trait ChainWatcher: Send + Sync {
    /// Look up the transaction a short channel id points at and report
    /// whether the referenced output is still unspent.
    async fn validate(&self, request: ValidateRequest) -> Result<ChainLookup, ChainError>;

    /// Resolve when `outpoint` is spent. Resolves immediately if it already is.
    async fn watch_spend(
        &self,
        short_channel_id: ShortChannelId,
        outpoint: OutPoint,
    ) -> Result<SpendNotification, ChainError>;

    /// Drop any spend watch held for `short_channel_id`. Pending
    /// `watch_spend` calls for it may resolve with an error.
    async fn cancel_watch(&self, _short_channel_id: ShortChannelId) {}
}

/// One funding transaction known to an [`InMemoryChain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRecord {
    pub short_channel_id: ShortChannelId,
    pub funding_tx: FundingTx,
    #[serde(default)]
    pub spent: bool,
}

#[derive(Default)]
struct ChainState {
    records: HashMap<ShortChannelId, ChainRecord>,
    /// Remaining injected failures per scid.
    failures: HashMap<ShortChannelId, u32>,
    watchers: HashMap<ShortChannelId, Vec<(OutPoint, oneshot::Sender<SpendNotification>)>>,
    lookups: HashMap<ShortChannelId, u32>,
}

/// A chain watcher backed by fixture records, for tests and replays.
pub struct InMemoryChain {
    chain_hash: ChainHash,
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    pub fn new(chain_hash: ChainHash) -> Self {
        Self {
            chain_hash,
            state: Mutex::new(ChainState::default()),
        }
    }

    pub fn from_records(chain_hash: ChainHash, records: Vec<ChainRecord>) -> Self {
        let state = ChainState {
            records: records
                .into_iter()
                .map(|r| (r.short_channel_id, r))
                .collect(),
            ..ChainState::default()
        };
        Self {
            chain_hash,
            state: Mutex::new(state),
        }
    }

    pub fn chain_hash(&self) -> ChainHash {
        self.chain_hash
    }

    pub async fn insert(&self, short_channel_id: ShortChannelId, funding_tx: FundingTx) {
        let mut state = self.state.lock().await;
        state.records.insert(
            short_channel_id,
            ChainRecord {
                short_channel_id,
                funding_tx,
                spent: false,
            },
        );
    }

    /// Make the next `count` lookups for `short_channel_id` fail transiently.
    pub async fn fail_next(&self, short_channel_id: ShortChannelId, count: u32) {
        let mut state = self.state.lock().await;
        state.failures.insert(short_channel_id, count);
    }

    /// Mark the funding output spent and wake any spend watchers.
    /// Returns false if the scid is unknown.
    pub async fn spend(&self, short_channel_id: ShortChannelId) -> bool {
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get_mut(&short_channel_id) else {
            return false;
        };
        record.spent = true;
        let watchers = state.watchers.remove(&short_channel_id).unwrap_or_default();
        drop(state);

        for (outpoint, tx) in watchers {
            let _ = tx.send(SpendNotification {
                short_channel_id,
                outpoint,
                spending_txid: None,
            });
        }
        tracing::debug!(scid = %short_channel_id, "funding output spent");
        true
    }

    /// Fail every pending spend watch for `short_channel_id` without a
    /// spend. Returns how many were dropped.
    pub async fn drop_watchers(&self, short_channel_id: ShortChannelId) -> usize {
        let mut state = self.state.lock().await;
        state
            .watchers
            .remove(&short_channel_id)
            .map_or(0, |watchers| watchers.len())
    }

    /// Number of `validate` calls seen for `short_channel_id`.
    pub async fn lookup_count(&self, short_channel_id: ShortChannelId) -> u32 {
        let state = self.state.lock().await;
        state.lookups.get(&short_channel_id).copied().unwrap_or(0)
    }

    pub async fn watcher_count(&self, short_channel_id: ShortChannelId) -> usize {
        let state = self.state.lock().await;
        state.watchers.get(&short_channel_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ChainWatcher for InMemoryChain {
    async fn validate(&self, request: ValidateRequest) -> Result<ChainLookup, ChainError> {
        let scid = request.short_channel_id;
        let mut state = self.state.lock().await;
        *state.lookups.entry(scid).or_insert(0) += 1;

        if let Some(remaining) = state.failures.get_mut(&scid) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ChainError::Unavailable(format!(
                    "injected failure for {}",
                    scid
                )));
            }
        }

        if request.chain_hash != self.chain_hash {
            return Ok(ChainLookup::WrongChain);
        }

        Ok(match state.records.get(&scid) {
            Some(record) => ChainLookup::Found {
                funding_tx: record.funding_tx.clone(),
                status: if record.spent {
                    SpendStatus::Spent
                } else {
                    SpendStatus::Unspent
                },
            },
            None => ChainLookup::NotFound,
        })
    }

    async fn watch_spend(
        &self,
        short_channel_id: ShortChannelId,
        outpoint: OutPoint,
    ) -> Result<SpendNotification, ChainError> {
        let rx = {
            let mut state = self.state.lock().await;
            let already_spent = state
                .records
                .get(&short_channel_id)
                .is_some_and(|r| r.spent);
            if already_spent {
                return Ok(SpendNotification {
                    short_channel_id,
                    outpoint,
                    spending_txid: None,
                });
            }
            let (tx, rx) = oneshot::channel();
            state
                .watchers
                .entry(short_channel_id)
                .or_default()
                .push((outpoint, tx));
            rx
        };
        rx.await.map_err(|_| ChainError::Closed)
    }

    async fn cancel_watch(&self, short_channel_id: ShortChannelId) {
        let mut state = self.state.lock().await;
        if state.watchers.remove(&short_channel_id).is_some() {
            tracing::debug!(scid = %short_channel_id, "spend watch cancelled");
        }
    }
}
