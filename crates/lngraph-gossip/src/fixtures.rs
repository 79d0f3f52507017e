//! Deterministic, correctly signed gossip for tests.

use lngraph_core::message::CHANNEL_FLAG_DISABLED;
use lngraph_core::{
    ChainHash, ChannelAnnouncement, ChannelPolicy, Color, Features, FundingTx, NodeId, NodeInfo,
    OutPoint, ShortChannelId, Signature, TxOut, Txid,
};
use lngraph_crypto::{
    funding_script_pubkey, sha256, sign_channel_announcement, sign_channel_update,
    sign_node_announcement, AnnouncementSigners, KeyPair,
};

use crate::chain::ChainRecord;

/// A node with a node key and a funding key derived from one seed byte.
pub struct TestNode {
    pub node_key: KeyPair,
    pub funding_key: KeyPair,
    pub alias: String,
}

impl TestNode {
    pub fn new(seed: u8) -> Self {
        let mut node_seed = [seed; 32];
        node_seed[0] = 0x01;
        let mut funding_seed = [seed; 32];
        funding_seed[0] = 0x02;
        Self {
            node_key: KeyPair::from_seed(&node_seed).expect("small scalar is valid"),
            funding_key: KeyPair::from_seed(&funding_seed).expect("small scalar is valid"),
            alias: format!("node-{}", seed),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node_key.public_key()
    }

    pub fn node_announcement(&self, timestamp: u32) -> NodeInfo {
        let mut info = NodeInfo {
            node_id: self.id(),
            alias: self.alias.clone(),
            color: Color([0x33, 0x99, 0xff]),
            addresses: Vec::new(),
            features: Features::empty(),
            timestamp,
            signature: Signature([0; 64]),
        };
        info.signature = sign_node_announcement(&info, &self.node_key);
        info
    }
}

/// A signed channel announcement and the funding transaction it points at.
pub struct ChannelFixture {
    pub announcement: ChannelAnnouncement,
    pub funding_tx: FundingTx,
    pub capacity_sat: u64,
}

impl ChannelFixture {
    /// Channel between `a` and `b`, in canonical order whichever is passed first.
    pub fn new(
        a: &TestNode,
        b: &TestNode,
        short_channel_id: ShortChannelId,
        capacity_sat: u64,
        chain_hash: ChainHash,
    ) -> Self {
        let (first, second) = if a.id() < b.id() { (a, b) } else { (b, a) };
        let mut announcement = ChannelAnnouncement {
            node_signature_1: Signature([0; 64]),
            node_signature_2: Signature([0; 64]),
            bitcoin_signature_1: Signature([0; 64]),
            bitcoin_signature_2: Signature([0; 64]),
            features: Features::empty(),
            chain_hash,
            short_channel_id,
            node_id_1: first.id(),
            node_id_2: second.id(),
            bitcoin_key_1: first.funding_key.public_key(),
            bitcoin_key_2: second.funding_key.public_key(),
        };
        sign_channel_announcement(
            &mut announcement,
            &AnnouncementSigners {
                node_1: &first.node_key,
                node_2: &second.node_key,
                bitcoin_1: &first.funding_key,
                bitcoin_2: &second.funding_key,
            },
        );

        let vout = short_channel_id.output_index() as usize;
        let mut outputs: Vec<TxOut> = (0..vout)
            .map(|_| TxOut {
                value_sat: 1_000,
                script_pubkey: vec![0x51],
            })
            .collect();
        outputs.push(TxOut {
            value_sat: capacity_sat,
            script_pubkey: funding_script_pubkey(
                &announcement.bitcoin_key_1,
                &announcement.bitcoin_key_2,
            ),
        });
        let funding_tx = FundingTx {
            txid: Txid(sha256(&short_channel_id.to_u64().to_be_bytes())),
            outputs,
        };

        Self {
            announcement,
            funding_tx,
            capacity_sat,
        }
    }

    pub fn short_channel_id(&self) -> ShortChannelId {
        self.announcement.short_channel_id
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.funding_tx.txid,
            vout: self.short_channel_id().output_index() as u32,
        }
    }

    pub fn chain_record(&self) -> ChainRecord {
        ChainRecord {
            short_channel_id: self.short_channel_id(),
            funding_tx: self.funding_tx.clone(),
            spent: false,
        }
    }

    /// Start a policy for the direction leaving `from`.
    pub fn policy<'a>(&self, from: &'a TestNode, timestamp: u32) -> PolicyBuilder<'a> {
        let channel_flags = if from.id() == self.announcement.node_id_1 {
            0
        } else {
            1
        };
        PolicyBuilder {
            signer: from,
            policy: ChannelPolicy {
                signature: Signature([0; 64]),
                chain_hash: self.announcement.chain_hash,
                short_channel_id: self.short_channel_id(),
                timestamp,
                message_flags: 1,
                channel_flags,
                cltv_expiry_delta: 40,
                htlc_minimum_msat: 1,
                htlc_maximum_msat: self.capacity_sat * 1_000,
                fee_base_msat: 1_000,
                fee_proportional_millionths: 1,
            },
        }
    }
}

pub struct PolicyBuilder<'a> {
    signer: &'a TestNode,
    policy: ChannelPolicy,
}

impl PolicyBuilder<'_> {
    pub fn fee(mut self, base_msat: u32, proportional_millionths: u32) -> Self {
        self.policy.fee_base_msat = base_msat;
        self.policy.fee_proportional_millionths = proportional_millionths;
        self
    }

    pub fn cltv(mut self, delta: u16) -> Self {
        self.policy.cltv_expiry_delta = delta;
        self
    }

    pub fn htlc(mut self, minimum_msat: u64, maximum_msat: u64) -> Self {
        self.policy.htlc_minimum_msat = minimum_msat;
        self.policy.htlc_maximum_msat = maximum_msat;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.policy.channel_flags |= CHANNEL_FLAG_DISABLED;
        self
    }

    pub fn sign(mut self) -> ChannelPolicy {
        self.policy.signature = sign_channel_update(&self.policy, &self.signer.node_key);
        self.policy
    }
}

pub fn scid(block_height: u32) -> ShortChannelId {
    ShortChannelId::from_u64((block_height as u64) << 40)
}
