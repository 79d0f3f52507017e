//! Scenario builders shared by the integration tests.
//!
//! The reference graph has six nodes and two components:
//!
//! ```text
//! a --100-- b --200-- c --300-- d        e --400-- f
//! ```
//!
//! Every channel carries a policy in both directions with a 1000 msat base
//! fee, 10 ppm and a cltv delta of 40.

use std::sync::Arc;

use lngraph_core::{ChainHash, ChannelPolicy, GossipMessage, NodeId, PeerId};
use lngraph_gossip::fixtures::{scid, ChannelFixture, TestNode};
use lngraph_gossip::InMemoryChain;
use lngraph_node::{LnGraphConfig, Router, RouterHandle};

pub use lngraph_gossip::fixtures;

pub const CAPACITY_SAT: u64 = 5_000_000;
pub const FEE_BASE_MSAT: u32 = 1_000;
pub const FEE_PPM: u32 = 10;
pub const CLTV_DELTA: u16 = 40;
pub const POLICY_TIMESTAMP: u32 = 1_000;

/// Config for tests: regtest, millisecond retries, no periodic prune.
pub fn test_config() -> LnGraphConfig {
    let mut config = LnGraphConfig::default();
    config.validation.chain_hash = ChainHash::REGTEST;
    config.validation.retry.max_attempts = 3;
    config.validation.retry.initial_delay_ms = 1;
    config.validation.retry.max_delay_ms = 4;
    config.router.prune_interval_secs = 0;
    config
}

pub struct Scenario {
    pub a: TestNode,
    pub b: TestNode,
    pub c: TestNode,
    pub d: TestNode,
    pub e: TestNode,
    pub f: TestNode,
    pub ab: ChannelFixture,
    pub bc: ChannelFixture,
    pub cd: ChannelFixture,
    pub ef: ChannelFixture,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    pub fn new() -> Self {
        let a = TestNode::new(10);
        let b = TestNode::new(11);
        let c = TestNode::new(12);
        let d = TestNode::new(13);
        let e = TestNode::new(14);
        let f = TestNode::new(15);
        let channel = |x: &TestNode, y: &TestNode, height: u32| {
            ChannelFixture::new(x, y, scid(height), CAPACITY_SAT, ChainHash::REGTEST)
        };
        let ab = channel(&a, &b, 100);
        let bc = channel(&b, &c, 200);
        let cd = channel(&c, &d, 300);
        let ef = channel(&e, &f, 400);
        Self {
            a,
            b,
            c,
            d,
            e,
            f,
            ab,
            bc,
            cd,
            ef,
        }
    }

    pub fn nodes(&self) -> [&TestNode; 6] {
        [&self.a, &self.b, &self.c, &self.d, &self.e, &self.f]
    }

    /// Channels with both endpoints.
    pub fn channels(&self) -> [(&ChannelFixture, &TestNode, &TestNode); 4] {
        [
            (&self.ab, &self.a, &self.b),
            (&self.bc, &self.b, &self.c),
            (&self.cd, &self.c, &self.d),
            (&self.ef, &self.e, &self.f),
        ]
    }

    pub fn chain(&self) -> Arc<InMemoryChain> {
        Arc::new(InMemoryChain::from_records(
            ChainHash::REGTEST,
            self.channels()
                .iter()
                .map(|(ch, _, _)| ch.chain_record())
                .collect(),
        ))
    }

    pub fn channel_announcements(&self) -> Vec<(PeerId, GossipMessage)> {
        self.channels()
            .iter()
            .map(|(ch, x, _)| {
                (
                    x.id(),
                    GossipMessage::ChannelAnnouncement(ch.announcement.clone()),
                )
            })
            .collect()
    }

    pub fn node_announcements(&self, timestamp: u32) -> Vec<(PeerId, GossipMessage)> {
        self.nodes()
            .iter()
            .map(|n| {
                (
                    n.id(),
                    GossipMessage::NodeAnnouncement(n.node_announcement(timestamp)),
                )
            })
            .collect()
    }

    pub fn policy(&self, channel: &ChannelFixture, from: &TestNode, timestamp: u32) -> ChannelPolicy {
        channel
            .policy(from, timestamp)
            .fee(FEE_BASE_MSAT, FEE_PPM)
            .cltv(CLTV_DELTA)
            .sign()
    }

    /// Both directions of every channel.
    pub fn policies(&self, timestamp: u32) -> Vec<(PeerId, GossipMessage)> {
        self.channels()
            .iter()
            .flat_map(|(ch, x, y)| {
                [*x, *y].map(|from| {
                    (
                        from.id(),
                        GossipMessage::ChannelUpdate(self.policy(ch, from, timestamp)),
                    )
                })
            })
            .collect()
    }

    /// Announcements, node records and policies in that order.
    pub fn all_gossip(&self) -> Vec<(PeerId, GossipMessage)> {
        let mut gossip = self.channel_announcements();
        gossip.extend(self.node_announcements(POLICY_TIMESTAMP));
        gossip.extend(self.policies(POLICY_TIMESTAMP));
        gossip
    }
}

/// Router over the scenario's chain with a fixed clock.
pub fn spawn_router(scenario: &Scenario) -> (RouterHandle, Arc<InMemoryChain>) {
    let chain = scenario.chain();
    let router = Router::spawn_with_clock(test_config(), chain.clone(), Arc::new(|| 2_000));
    (router, chain)
}

/// Submit channel announcements and wait for them to validate, then submit
/// node announcements and policies.
pub async fn load(router: &RouterHandle, scenario: &Scenario) {
    submit_all(router, scenario.channel_announcements()).await;
    router.sync().await.expect("router running");
    submit_all(router, scenario.node_announcements(POLICY_TIMESTAMP)).await;
    submit_all(router, scenario.policies(POLICY_TIMESTAMP)).await;
    router.sync().await.expect("router running");
}

pub async fn submit_all(router: &RouterHandle, gossip: Vec<(PeerId, GossipMessage)>) {
    for (origin, message) in gossip {
        router.submit(origin, message).await.expect("router running");
    }
}

pub fn sorted(mut ids: Vec<NodeId>) -> Vec<NodeId> {
    ids.sort();
    ids
}
