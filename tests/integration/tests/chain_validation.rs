//! Integration test: channel admission gated on the chain watcher.
//!
//! Covers funding checks, spends, conflicting announcements and transient
//! chain failures as seen through the router.

use std::sync::Arc;

use lngraph_core::{ChainHash, GossipMessage, ShortChannelId};
use lngraph_gossip::fixtures::ChannelFixture;
use lngraph_gossip::{ErrorKind, GossipError, GraphEvent, InMemoryChain, PruneReason};
use lngraph_integration_tests::{
    load, spawn_router, test_config, Scenario, CAPACITY_SAT,
};
use lngraph_node::{Router, RouterError, RouterHandle};
use lngraph_routing::{NoRouteReason, RouteRequest};

fn router_over(records: Vec<lngraph_gossip::ChainRecord>) -> (RouterHandle, Arc<InMemoryChain>) {
    let chain = Arc::new(InMemoryChain::from_records(ChainHash::REGTEST, records));
    let router = Router::spawn_with_clock(test_config(), chain.clone(), Arc::new(|| 2_000));
    (router, chain)
}

async fn announce(router: &RouterHandle, s: &Scenario, channel: &ChannelFixture) {
    router
        .process(
            s.a.id(),
            GossipMessage::ChannelAnnouncement(channel.announcement.clone()),
        )
        .await
        .unwrap();
    router.sync().await.unwrap();
}

async fn spend_and_wait(router: &RouterHandle, chain: &InMemoryChain, scid: ShortChannelId) {
    let mut events = router.subscribe();
    while chain.watcher_count(scid).await == 0 {
        tokio::task::yield_now().await;
    }
    assert!(chain.spend(scid).await);
    loop {
        if let GraphEvent::ChannelPruned {
            short_channel_id,
            reason,
        } = events.recv().await.unwrap()
        {
            if short_channel_id == scid {
                assert_eq!(reason, PruneReason::Spent);
                return;
            }
        }
    }
}

// =========================================================================
// Funding checks
// =========================================================================

#[tokio::test]
async fn test_spent_funding_never_listed() {
    let s = Scenario::new();
    let mut record = s.ab.chain_record();
    record.spent = true;
    let (router, _chain) = router_over(vec![record]);

    announce(&router, &s, &s.ab).await;
    assert!(router.list_channels().await.unwrap().is_empty());
    assert_eq!(router.stats().await.unwrap().quarantined, 1);

    let err = router
        .process(
            s.a.id(),
            GossipMessage::ChannelAnnouncement(s.ab.announcement.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Gossip(GossipError::Quarantined(_))
    ));
}

#[tokio::test]
async fn test_missing_funding_never_listed() {
    let s = Scenario::new();
    let (router, _chain) = router_over(Vec::new());
    let mut events = router.subscribe();

    announce(&router, &s, &s.ab).await;
    assert!(router.list_channels().await.unwrap().is_empty());

    loop {
        if let GraphEvent::AnnouncementRejected { kind, reason, .. } = events.recv().await.unwrap() {
            assert_eq!(kind, ErrorKind::Malformed);
            assert!(reason.contains("not found"), "{}", reason);
            break;
        }
    }
}

#[tokio::test]
async fn test_script_mismatch_never_listed() {
    let s = Scenario::new();
    let mut record = s.ab.chain_record();
    // A valid P2WSH shape, but for a different script.
    record.funding_tx.outputs[0].script_pubkey = s.bc.chain_record().funding_tx.outputs[0]
        .script_pubkey
        .clone();
    let (router, _chain) = router_over(vec![record]);

    announce(&router, &s, &s.ab).await;
    assert!(router.list_channels().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_capacity_from_funding_output() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    announce(&router, &s, &s.ab).await;
    let channels = router.list_channels().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].capacity_sat, CAPACITY_SAT);
    assert_eq!(channels[0].funding_outpoint, s.ab.outpoint());
}

// =========================================================================
// Spends
// =========================================================================

#[tokio::test]
async fn test_spend_prunes_channel_and_policies() {
    let s = Scenario::new();
    let (router, chain) = spawn_router(&s);
    load(&router, &s).await;

    spend_and_wait(&router, &chain, s.bc.short_channel_id()).await;

    assert_eq!(router.list_channels().await.unwrap().len(), 3);
    let policies = router.list_policies().await.unwrap();
    assert_eq!(policies.len(), 6);
    assert!(policies
        .iter()
        .all(|p| p.short_channel_id != s.bc.short_channel_id()));

    let err = router
        .find_route(RouteRequest::new(s.a.id(), s.d.id(), 1_000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Unroutable(NoRouteReason::Unreachable)
    ));

    // Closed for good.
    let err = router
        .process(
            s.b.id(),
            GossipMessage::ChannelAnnouncement(s.bc.announcement.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Gossip(GossipError::ChannelClosed(_))
    ));
    let late_policy = s.policy(&s.bc, &s.b, 5_000);
    assert!(router
        .process(s.b.id(), GossipMessage::ChannelUpdate(late_policy))
        .await
        .is_err());
}

#[tokio::test]
async fn test_node_without_channels_disappears() {
    let s = Scenario::new();
    let (router, chain) = spawn_router(&s);
    load(&router, &s).await;

    spend_and_wait(&router, &chain, s.ef.short_channel_id()).await;

    let nodes = router.list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 4);
    assert!(nodes.iter().all(|n| n.node_id != s.e.id() && n.node_id != s.f.id()));

    let report = router.prune().await.unwrap();
    assert_eq!(report.orphan_nodes, 2);
    assert!(report.stale_channels.is_empty());
    assert_eq!(router.snapshot().await.unwrap().node_count(), 4);
}

// =========================================================================
// Conflicts
// =========================================================================

#[tokio::test]
async fn test_first_valid_announcement_wins() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    announce(&router, &s, &s.ab).await;

    let rival = ChannelFixture::new(
        &s.a,
        &s.c,
        s.ab.short_channel_id(),
        CAPACITY_SAT,
        ChainHash::REGTEST,
    );
    let err = router
        .process(
            s.a.id(),
            GossipMessage::ChannelAnnouncement(rival.announcement.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Gossip(GossipError::Conflicting(_))
    ));

    let channels = router.list_channels().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].announcement, s.ab.announcement);
}

#[tokio::test]
async fn test_wrong_chain_announcement_rejected() {
    let s = Scenario::new();
    let (router, chain) = spawn_router(&s);
    let mainnet = ChannelFixture::new(
        &s.a,
        &s.b,
        s.ab.short_channel_id(),
        CAPACITY_SAT,
        ChainHash::BITCOIN,
    );
    let err = router
        .process(
            s.a.id(),
            GossipMessage::ChannelAnnouncement(mainnet.announcement),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Gossip(GossipError::WrongChain(_))
    ));
    assert_eq!(chain.lookup_count(s.ab.short_channel_id()).await, 0);
}

// =========================================================================
// Transient chain failures
// =========================================================================

#[tokio::test]
async fn test_transient_failure_retried_until_success() {
    let s = Scenario::new();
    let (router, chain) = spawn_router(&s);
    chain.fail_next(s.ab.short_channel_id(), 2).await;

    announce(&router, &s, &s.ab).await;
    assert_eq!(router.list_channels().await.unwrap().len(), 1);
    assert_eq!(chain.lookup_count(s.ab.short_channel_id()).await, 3);
}

#[tokio::test]
async fn test_abandoned_after_max_attempts_then_resubmittable() {
    let s = Scenario::new();
    let (router, chain) = spawn_router(&s);
    let mut events = router.subscribe();
    chain.fail_next(s.ab.short_channel_id(), 3).await;

    announce(&router, &s, &s.ab).await;
    assert!(router.list_channels().await.unwrap().is_empty());
    assert_eq!(chain.lookup_count(s.ab.short_channel_id()).await, 3);

    loop {
        if let GraphEvent::AnnouncementRejected { kind, .. } = events.recv().await.unwrap() {
            assert_eq!(kind, ErrorKind::Transient);
            break;
        }
    }

    // Not quarantined: the chain has recovered and a fresh submission passes.
    let stats = router.stats().await.unwrap();
    assert_eq!(stats.quarantined, 0);
    announce(&router, &s, &s.ab).await;
    assert_eq!(router.list_channels().await.unwrap().len(), 1);
}
