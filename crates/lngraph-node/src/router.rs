//! The router task.
//!
//! A single tokio task owns the [`GraphStore`], the announcement validator
//! and gossip ingest. Everything else talks to it through a
//! [`RouterHandle`]. Chain lookups, spend watches and retry timers run as
//! spawned tasks that post their results back over an internal channel, and
//! route searches run on an immutable snapshot inside `spawn_blocking`, so
//! neither ever stalls gossip processing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lngraph_core::{
    ChainLookup, ChannelPolicy, GossipMessage, NodeInfo, OutPoint, PeerId, RoutingConfig,
    ShortChannelId,
};
use lngraph_gossip::{
    Action, AnnouncementValidator, ChainError, ChainWatcher, ErrorKind, GossipError, GossipIngest,
    GraphEvent, PruneReason, SpendNotification,
};
use lngraph_routing::{ChannelInfo, GraphStore, NoRouteReason, Route, RouteRequest};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::commands::{GossipEnvelope, PruneReport, RouterCommand, RouterStats};
use crate::config::LnGraphConfig;

/// Source of the current unix time in seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp().max(0) as u64)
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no route: {0}")]
    Unroutable(#[from] NoRouteReason),

    #[error("gossip rejected: {0}")]
    Gossip(#[from] GossipError),

    #[error("router has stopped")]
    Stopped,

    #[error("router mailbox is full")]
    Backpressure,
}

/// Results posted back by spawned chain tasks, keyed by scid.
#[derive(Debug)]
enum ChainEvent {
    LookupResult {
        short_channel_id: ShortChannelId,
        result: Result<ChainLookup, ChainError>,
    },
    RetryLookup(ShortChannelId),
    Spent(SpendNotification),
    WatchFailed {
        short_channel_id: ShortChannelId,
        error: ChainError,
    },
}

/// The spawned task watching one admitted channel's funding output.
struct SpendWatch {
    task: AbortHandle,
    /// Consecutive watch failures, for re-arm backoff.
    failures: u32,
}

#[derive(Debug, Default)]
struct Counters {
    gossip_accepted: u64,
    gossip_rejected: u64,
    channels_closed: u64,
}

pub struct Router {
    store: GraphStore,
    /// Shared read-only copy of `store`; cleared on every mutation.
    snapshot: Option<Arc<GraphStore>>,
    validator: AnnouncementValidator,
    ingest: GossipIngest,
    routing: RoutingConfig,
    stale_channel_secs: u64,
    chain: Arc<dyn ChainWatcher>,
    chain_tx: mpsc::UnboundedSender<ChainEvent>,
    watches: HashMap<ShortChannelId, SpendWatch>,
    events: broadcast::Sender<GraphEvent>,
    relay: broadcast::Sender<GossipEnvelope>,
    clock: Clock,
    sync_waiters: Vec<oneshot::Sender<()>>,
    counters: Counters,
}

impl Router {
    /// Start the router task on the current runtime.
    pub fn spawn(config: LnGraphConfig, chain: Arc<dyn ChainWatcher>) -> RouterHandle {
        Self::spawn_with_clock(config, chain, system_clock())
    }

    pub fn spawn_with_clock(
        config: LnGraphConfig,
        chain: Arc<dyn ChainWatcher>,
        clock: Clock,
    ) -> RouterHandle {
        let (command_tx, command_rx) = mpsc::channel(config.router.mailbox_capacity.max(1));
        let (chain_tx, chain_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.router.event_capacity.max(1));
        let (relay, _) = broadcast::channel(config.router.event_capacity.max(1));

        let router = Router {
            store: GraphStore::new(),
            snapshot: None,
            validator: AnnouncementValidator::new(config.validation.clone()),
            ingest: GossipIngest::new(config.gossip.clone(), config.validation.chain_hash),
            routing: config.routing.clone(),
            stale_channel_secs: config.gossip.stale_channel_secs,
            chain,
            chain_tx,
            watches: HashMap::new(),
            events: events.clone(),
            relay: relay.clone(),
            clock,
            sync_waiters: Vec::new(),
            counters: Counters::default(),
        };
        tokio::spawn(router.run(command_rx, chain_rx, config.router.prune_interval()));

        RouterHandle {
            commands: command_tx,
            events,
            relay,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<RouterCommand>,
        mut chain_rx: mpsc::UnboundedReceiver<ChainEvent>,
        prune_interval: Option<Duration>,
    ) {
        let period = prune_interval.unwrap_or(Duration::from_secs(3600));
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(chain = %self.validator.config().chain_hash, "router started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(RouterCommand::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::info!("all router handles dropped");
                        break;
                    }
                },
                Some(event) = chain_rx.recv() => self.handle_chain_event(event),
                _ = tick.tick(), if prune_interval.is_some() => {
                    self.prune();
                }
            }
            self.release_waiters();
        }

        tracing::info!("router stopped");
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    fn invalidate(&mut self) {
        self.snapshot = None;
    }

    fn snapshot(&mut self) -> Arc<GraphStore> {
        if let Some(snapshot) = &self.snapshot {
            return snapshot.clone();
        }
        let snapshot = Arc::new(self.store.clone());
        self.snapshot = Some(snapshot.clone());
        snapshot
    }

    fn publish(&self, event: GraphEvent) {
        tracing::debug!(event = event.name(), "graph event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Submit {
                origin,
                message,
                reply,
            } => {
                let result = self.ingest_message(origin, message);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            RouterCommand::ListNodes { reply } => {
                let _ = reply.send(self.store.nodes().cloned().collect::<Vec<NodeInfo>>());
            }
            RouterCommand::ListChannels { reply } => {
                let _ = reply.send(self.store.channels().cloned().collect::<Vec<ChannelInfo>>());
            }
            RouterCommand::ListPolicies { reply } => {
                let _ = reply.send(self.store.policies().cloned().collect::<Vec<ChannelPolicy>>());
            }
            RouterCommand::FindRoute { request, reply } => self.find_route(request, reply),
            RouterCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RouterCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            RouterCommand::Sync { reply } => self.sync_waiters.push(reply),
            RouterCommand::Prune { reply } => {
                let _ = reply.send(self.prune());
            }
            // Handled by the run loop.
            RouterCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn ingest_message(&mut self, origin: PeerId, message: GossipMessage) -> Result<(), GossipError> {
        let now = self.now();
        let message_type = message.kind();
        let announced = match &message {
            GossipMessage::ChannelAnnouncement(ann) => Some(ann.short_channel_id),
            _ => None,
        };

        match self
            .ingest
            .handle(origin, message, &mut self.store, &mut self.validator, now)
        {
            Ok(actions) => {
                if !actions.is_empty() {
                    self.counters.gossip_accepted += 1;
                    self.invalidate();
                }
                self.execute(actions);
                Ok(())
            }
            Err(e) => {
                self.counters.gossip_rejected += 1;
                let kind = e.kind();
                if kind == ErrorKind::Stale {
                    tracing::trace!(origin = %origin, message = message_type, error = %e, "gossip discarded");
                } else {
                    tracing::debug!(origin = %origin, message = message_type, error = %e, "gossip rejected");
                    if let Some(scid) = announced {
                        self.publish(GraphEvent::AnnouncementRejected {
                            short_channel_id: scid,
                            origin,
                            kind,
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::RequestLookup(request) => {
                    let chain = self.chain.clone();
                    let tx = self.chain_tx.clone();
                    tokio::spawn(async move {
                        let result = chain.validate(request).await;
                        let _ = tx.send(ChainEvent::LookupResult {
                            short_channel_id: request.short_channel_id,
                            result,
                        });
                    });
                }
                Action::ScheduleRetry {
                    short_channel_id,
                    delay,
                } => {
                    let tx = self.chain_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(ChainEvent::RetryLookup(short_channel_id));
                    });
                }
                Action::WatchSpend {
                    short_channel_id,
                    outpoint,
                } => self.arm_watch(short_channel_id, outpoint, Duration::ZERO, 0),
                Action::Rebroadcast { origin, message } => {
                    let _ = self.relay.send(GossipEnvelope { origin, message });
                }
                Action::Notify(event) => self.publish(event),
            }
        }
    }

    /// Spawn a spend watch after `delay`, replacing any earlier one.
    fn arm_watch(
        &mut self,
        short_channel_id: ShortChannelId,
        outpoint: OutPoint,
        delay: Duration,
        failures: u32,
    ) {
        let chain = self.chain.clone();
        let tx = self.chain_tx.clone();
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let event = match chain.watch_spend(short_channel_id, outpoint).await {
                Ok(note) => ChainEvent::Spent(note),
                Err(error) => ChainEvent::WatchFailed {
                    short_channel_id,
                    error,
                },
            };
            let _ = tx.send(event);
        });
        let watch = SpendWatch {
            task: task.abort_handle(),
            failures,
        };
        if let Some(previous) = self.watches.insert(short_channel_id, watch) {
            previous.task.abort();
        }
    }

    /// Stop watching a channel that left the graph for a reason other
    /// than a spend.
    fn cancel_watch(&mut self, short_channel_id: ShortChannelId) {
        if let Some(watch) = self.watches.remove(&short_channel_id) {
            watch.task.abort();
        }
        let chain = self.chain.clone();
        tokio::spawn(async move { chain.cancel_watch(short_channel_id).await });
    }

    fn handle_chain_event(&mut self, event: ChainEvent) {
        match event {
            ChainEvent::LookupResult {
                short_channel_id,
                result,
            } => {
                let now = self.now();
                let actions = self.ingest.on_lookup_result(
                    &mut self.validator,
                    short_channel_id,
                    result,
                    &mut self.store,
                    now,
                );
                self.invalidate();
                self.execute(actions);
            }
            ChainEvent::RetryLookup(scid) => {
                let actions = self.validator.retry(scid);
                self.execute(actions);
            }
            ChainEvent::Spent(note) => {
                self.watches.remove(&note.short_channel_id);
                let actions = self.validator.on_spent(note.short_channel_id, &mut self.store);
                if !actions.is_empty() {
                    self.counters.channels_closed += 1;
                    self.invalidate();
                }
                self.execute(actions);
            }
            ChainEvent::WatchFailed {
                short_channel_id,
                error,
            } => {
                let Some(outpoint) = self
                    .store
                    .channel(&short_channel_id)
                    .map(|info| info.funding_outpoint)
                else {
                    self.watches.remove(&short_channel_id);
                    tracing::debug!(scid = %short_channel_id, error = %error, "spend watch ended for a channel no longer held");
                    return;
                };
                let failures = self
                    .watches
                    .get(&short_channel_id)
                    .map_or(0, |watch| watch.failures)
                    .saturating_add(1);
                let delay = self.validator.config().retry.delay_for(failures);
                tracing::warn!(
                    scid = %short_channel_id,
                    error = %error,
                    failures,
                    delay_ms = delay.as_millis() as u64,
                    "spend watch failed, re-arming"
                );
                self.arm_watch(short_channel_id, outpoint, delay, failures);
            }
        }
    }

    fn find_route(
        &mut self,
        request: RouteRequest,
        reply: oneshot::Sender<Result<Route, NoRouteReason>>,
    ) {
        let graph = self.snapshot();
        let config = self.routing.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let search = tokio::task::spawn_blocking(move || {
                let result = lngraph_routing::find_route(&graph, &request, &config);
                (request, result)
            });
            let (request, result) = match search.await {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "route search task failed");
                    return;
                }
            };
            if let Ok(route) = &result {
                let _ = events.send(GraphEvent::RouteComputed {
                    source: request.source,
                    target: request.target,
                    amount_msat: request.amount_msat,
                    hops: route.hop_count(),
                    fee_msat: route.total_fee_msat,
                });
            }
            let _ = reply.send(result);
        });
    }

    fn prune(&mut self) -> PruneReport {
        let now = self.now();
        let stale_channels = self.store.prune_stale(now, self.stale_channel_secs);
        for scid in &stale_channels {
            self.cancel_watch(*scid);
            self.publish(GraphEvent::ChannelPruned {
                short_channel_id: *scid,
                reason: PruneReason::Stale,
            });
        }
        let orphan_nodes = self.store.prune_orphan_nodes().len();
        let expired_policies = self.ingest.expire_orphans(now);

        if !stale_channels.is_empty() || orphan_nodes > 0 {
            self.invalidate();
        }
        tracing::info!(
            stale_channels = stale_channels.len(),
            orphan_nodes,
            expired_policies,
            "prune sweep finished"
        );

        PruneReport {
            stale_channels,
            orphan_nodes,
            expired_policies,
        }
    }

    fn stats(&self) -> RouterStats {
        RouterStats {
            nodes: self.store.nodes().count(),
            channels: self.store.channel_count(),
            policies: self.store.policy_count(),
            pending_validations: self.validator.pending_count(),
            spend_watches: self.watches.len(),
            quarantined: self.validator.quarantined_count(),
            orphan_policies: self.ingest.orphan_count(),
            gossip_accepted: self.counters.gossip_accepted,
            gossip_rejected: self.counters.gossip_rejected,
            channels_closed: self.counters.channels_closed,
        }
    }

    fn release_waiters(&mut self) {
        if self.sync_waiters.is_empty() || self.validator.pending_count() > 0 {
            return;
        }
        for waiter in self.sync_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

/// Cloneable front end to a running [`Router`].
#[derive(Clone)]
pub struct RouterHandle {
    commands: mpsc::Sender<RouterCommand>,
    events: broadcast::Sender<GraphEvent>,
    relay: broadcast::Sender<GossipEnvelope>,
}

impl RouterHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RouterCommand,
    ) -> Result<T, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| RouterError::Stopped)?;
        rx.await.map_err(|_| RouterError::Stopped)
    }

    /// Queue a gossip message, waiting for mailbox space.
    pub async fn submit(&self, origin: PeerId, message: GossipMessage) -> Result<(), RouterError> {
        self.commands
            .send(RouterCommand::Submit {
                origin,
                message,
                reply: None,
            })
            .await
            .map_err(|_| RouterError::Stopped)
    }

    /// Queue a gossip message without waiting.
    pub fn try_submit(&self, origin: PeerId, message: GossipMessage) -> Result<(), RouterError> {
        self.commands
            .try_send(RouterCommand::Submit {
                origin,
                message,
                reply: None,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => RouterError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => RouterError::Stopped,
            })
    }

    /// Ingest a gossip message and return the ingest verdict. Chain
    /// validation of a channel announcement completes later.
    pub async fn process(&self, origin: PeerId, message: GossipMessage) -> Result<(), RouterError> {
        self.request(|reply| RouterCommand::Submit {
            origin,
            message,
            reply: Some(reply),
        })
        .await??;
        Ok(())
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeInfo>, RouterError> {
        self.request(|reply| RouterCommand::ListNodes { reply }).await
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelInfo>, RouterError> {
        self.request(|reply| RouterCommand::ListChannels { reply }).await
    }

    pub async fn list_policies(&self) -> Result<Vec<ChannelPolicy>, RouterError> {
        self.request(|reply| RouterCommand::ListPolicies { reply }).await
    }

    pub async fn find_route(&self, request: RouteRequest) -> Result<Route, RouterError> {
        Ok(self
            .request(|reply| RouterCommand::FindRoute { request, reply })
            .await??)
    }

    pub async fn snapshot(&self) -> Result<Arc<GraphStore>, RouterError> {
        self.request(|reply| RouterCommand::Snapshot { reply }).await
    }

    pub async fn stats(&self) -> Result<RouterStats, RouterError> {
        self.request(|reply| RouterCommand::Stats { reply }).await
    }

    /// Wait until everything submitted so far is processed and no channel
    /// is still awaiting chain validation.
    pub async fn sync(&self) -> Result<(), RouterError> {
        self.request(|reply| RouterCommand::Sync { reply }).await
    }

    /// Run a prune sweep now.
    pub async fn prune(&self) -> Result<PruneReport, RouterError> {
        self.request(|reply| RouterCommand::Prune { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.events.subscribe()
    }

    /// Accepted gossip to relay onward.
    pub fn subscribe_relay(&self) -> broadcast::Receiver<GossipEnvelope> {
        self.relay.subscribe()
    }

    pub async fn shutdown(&self) -> Result<(), RouterError> {
        self.request(|reply| RouterCommand::Shutdown { reply }).await
    }
}
