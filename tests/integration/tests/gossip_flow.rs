//! Integration test: gossip replay through the router into route queries.
//!
//! Exercises lngraph-gossip, lngraph-routing and lngraph-node together over
//! the six-node reference graph.

use lngraph_core::{Direction, GossipMessage};
use lngraph_gossip::GraphEvent;
use lngraph_integration_tests::{
    load, sorted, spawn_router, submit_all, Scenario, CLTV_DELTA, POLICY_TIMESTAMP,
};
use lngraph_node::RouterError;
use lngraph_routing::{NoRouteReason, RouteConstraints, RouteRequest};

// =========================================================================
// End-to-end graph
// =========================================================================

#[tokio::test]
async fn test_reference_graph_is_fully_loaded() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    load(&router, &s).await;

    let nodes = router.list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 6);
    assert_eq!(
        sorted(nodes.iter().map(|n| n.node_id).collect()),
        sorted(s.nodes().iter().map(|n| n.id()).collect())
    );
    assert_eq!(router.list_channels().await.unwrap().len(), 4);
    assert_eq!(router.list_policies().await.unwrap().len(), 8);

    let stats = router.stats().await.unwrap();
    assert_eq!(stats.pending_validations, 0);
    assert_eq!(stats.orphan_policies, 0);
}

#[tokio::test]
async fn test_three_hop_route() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    load(&router, &s).await;

    let route = router
        .find_route(RouteRequest::new(s.a.id(), s.d.id(), 1_000_000))
        .await
        .unwrap();

    assert_eq!(route.hop_count(), 3);
    assert_eq!(
        route.nodes(),
        vec![s.a.id(), s.b.id(), s.c.id(), s.d.id()]
    );
    assert_eq!(
        route.channels(),
        vec![
            s.ab.short_channel_id(),
            s.bc.short_channel_id(),
            s.cd.short_channel_id()
        ]
    );

    // c charges 1000 + 10ppm of 1_000_000, b charges 1000 + 10ppm of 1_001_010.
    let hops = route.hops();
    assert_eq!(hops[2].amount_msat, 1_000_000);
    assert_eq!(hops[2].fee_msat, 1_010);
    assert_eq!(hops[1].amount_msat, 1_001_010);
    assert_eq!(hops[1].fee_msat, 1_010);
    assert_eq!(hops[0].amount_msat, 1_002_020);
    assert_eq!(hops[0].fee_msat, 0);
    assert_eq!(route.total_amount_msat, 1_002_020);
    assert_eq!(route.total_fee_msat, 2_020);
    assert_eq!(route.total_cltv_delta, 18 + 2 * CLTV_DELTA as u32);
}

#[tokio::test]
async fn test_three_hop_route_at_largest_payment() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    load(&router, &s).await;

    let route = router
        .find_route(RouteRequest::new(s.a.id(), s.d.id(), 500_000_000))
        .await
        .unwrap();

    // Each forwarder charges 1000 + 5000; b's 10ppm of 500_006_000 floors to 5000.
    let hops = route.hops();
    assert_eq!(route.channels().len(), 3);
    assert_eq!(hops[2].amount_msat, 500_000_000);
    assert_eq!(hops[2].fee_msat, 6_000);
    assert_eq!(hops[1].amount_msat, 500_006_000);
    assert_eq!(hops[1].fee_msat, 6_000);
    assert_eq!(route.total_amount_msat, 500_012_000);
    assert_eq!(route.total_fee_msat, 12_000);
    assert_eq!(route.total_cltv_delta, 18 + 2 * CLTV_DELTA as u32);
}

#[tokio::test]
async fn test_placeholders_listed_until_announced() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    submit_all(&router, s.channel_announcements()).await;
    router.sync().await.unwrap();

    let nodes = router.list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 6);
    assert!(nodes.iter().all(|n| n.is_placeholder()));

    submit_all(&router, s.node_announcements(POLICY_TIMESTAMP)).await;
    router.sync().await.unwrap();
    let nodes = router.list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 6);
    assert!(nodes
        .iter()
        .all(|n| !n.is_placeholder() && n.timestamp == POLICY_TIMESTAMP));
}

#[tokio::test]
async fn test_route_between_components_is_unreachable() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    load(&router, &s).await;

    let err = router
        .find_route(RouteRequest::new(s.a.id(), s.f.id(), 1_000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RouterError::Unroutable(NoRouteReason::Unreachable)
    ));
}

#[tokio::test]
async fn test_constraints_violated_differs_from_unreachable() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    load(&router, &s).await;

    let request = RouteRequest::new(s.a.id(), s.d.id(), 1_000_000).with_constraints(
        RouteConstraints {
            max_hops: Some(2),
            ..RouteConstraints::default()
        },
    );
    let err = router.find_route(request).await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::Unroutable(NoRouteReason::ConstraintsViolated)
    ));

    let mut constraints = RouteConstraints::default();
    constraints.excluded_nodes.insert(s.c.id());
    let request = RouteRequest::new(s.a.id(), s.d.id(), 1_000_000).with_constraints(constraints);
    assert!(matches!(
        router.find_route(request).await,
        Err(RouterError::Unroutable(NoRouteReason::ConstraintsViolated))
    ));
}

#[tokio::test]
async fn test_route_computed_event_published() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    load(&router, &s).await;
    let mut events = router.subscribe();

    router
        .find_route(RouteRequest::new(s.d.id(), s.a.id(), 5_000))
        .await
        .unwrap();

    loop {
        if let GraphEvent::RouteComputed { source, target, hops, .. } = events.recv().await.unwrap() {
            assert_eq!(source, s.d.id());
            assert_eq!(target, s.a.id());
            assert_eq!(hops, 3);
            break;
        }
    }
}

// =========================================================================
// Idempotence and ordering
// =========================================================================

#[tokio::test]
async fn test_replaying_everything_twice_is_a_no_op() {
    let s = Scenario::new();
    let (router, chain) = spawn_router(&s);
    load(&router, &s).await;
    let before = router.snapshot().await.unwrap();

    let mut relay = router.subscribe_relay();
    submit_all(&router, s.all_gossip()).await;
    router.sync().await.unwrap();

    let after = router.snapshot().await.unwrap();
    assert_eq!(after.channel_count(), before.channel_count());
    assert_eq!(after.policy_count(), before.policy_count());
    assert_eq!(
        after.policies().cloned().collect::<Vec<_>>(),
        before.policies().cloned().collect::<Vec<_>>()
    );
    for (channel, _, _) in s.channels() {
        assert_eq!(chain.lookup_count(channel.short_channel_id()).await, 1);
    }
    // Nothing novel, so nothing to relay.
    assert!(relay.try_recv().is_err());
}

#[tokio::test]
async fn test_policy_monotonic_in_either_order() {
    let s = Scenario::new();
    let older = s.policy(&s.ab, &s.a, POLICY_TIMESTAMP + 1);
    let newer = s.policy(&s.ab, &s.a, POLICY_TIMESTAMP + 2);

    let mut finals = Vec::new();
    for order in [[&older, &newer], [&newer, &older]] {
        let (router, _chain) = spawn_router(&s);
        load(&router, &s).await;
        for policy in order {
            router
                .submit(s.a.id(), GossipMessage::ChannelUpdate(policy.clone()))
                .await
                .unwrap();
        }
        let snapshot = router.snapshot().await.unwrap();
        let direction = newer.direction();
        finals.push(snapshot.policy(&s.ab.short_channel_id(), direction).cloned());
    }

    assert_eq!(finals[0], Some(newer.clone()));
    assert_eq!(finals[1], Some(newer));
}

#[tokio::test]
async fn test_direction_resolution() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    load(&router, &s).await;
    let snapshot = router.snapshot().await.unwrap();

    let ann = &s.ab.announcement;
    for direction in [Direction::Forward, Direction::Backward] {
        let policy = snapshot
            .policy(&s.ab.short_channel_id(), direction)
            .unwrap();
        let desc = lngraph_core::message::resolve_desc(policy, ann);
        assert_eq!(desc, ann.desc(direction));
        match direction {
            Direction::Forward => assert_eq!((desc.from, desc.to), (ann.node_id_1, ann.node_id_2)),
            Direction::Backward => assert_eq!((desc.from, desc.to), (ann.node_id_2, ann.node_id_1)),
        }
    }
}

// =========================================================================
// Policies arriving before their channel validates
// =========================================================================

#[tokio::test]
async fn test_policies_buffered_until_admission() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);

    // Policies right behind the announcements, before any lookup returns.
    submit_all(&router, s.all_gossip()).await;
    router.sync().await.unwrap();

    assert_eq!(router.list_channels().await.unwrap().len(), 4);
    assert_eq!(router.list_policies().await.unwrap().len(), 8);
    let route = router
        .find_route(RouteRequest::new(s.a.id(), s.d.id(), 1_000_000))
        .await
        .unwrap();
    assert_eq!(route.total_fee_msat, 2_020);
}

#[tokio::test]
async fn test_policy_without_announcement_rejected() {
    let s = Scenario::new();
    let (router, _chain) = spawn_router(&s);
    let policy = s.policy(&s.ab, &s.a, POLICY_TIMESTAMP);
    let err = router
        .process(s.a.id(), GossipMessage::ChannelUpdate(policy))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Gossip(_)));
    assert!(router.list_policies().await.unwrap().is_empty());
}
