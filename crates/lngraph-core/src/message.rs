use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{
    ChainHash, Color, Direction, Features, NodeAddress, NodeId, PublicKey, ShortChannelId,
    Signature,
};

/// Maximum alias length in bytes.
pub const MAX_ALIAS_LEN: usize = 32;

/// Largest variable-length field a signed payload can carry behind its
/// two-byte length prefix.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

fn check_field_len(what: &str, len: usize) -> Result<(), CoreError> {
    if len > MAX_FIELD_LEN {
        return Err(CoreError::ValidationError(format!(
            "{} is {} bytes, limit is {}",
            what, len, MAX_FIELD_LEN
        )));
    }
    Ok(())
}

/// A node announcement: who a node is and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: NodeId,
    /// UTF-8, at most 32 bytes.
    pub alias: String,
    pub color: Color,
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    #[serde(default)]
    pub features: Features,
    /// Unix seconds.
    pub timestamp: u32,
    pub signature: Signature,
}

impl NodeInfo {
    /// Stand-in record for a channel endpoint that has not announced itself.
    /// Any signed announcement for the node supersedes it.
    pub fn placeholder(node_id: NodeId) -> Self {
        Self {
            node_id,
            alias: String::new(),
            color: Color::default(),
            addresses: Vec::new(),
            features: Features::empty(),
            timestamp: 0,
            signature: Signature([0; 64]),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.timestamp == 0 && self.signature == Signature([0; 64])
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.alias.len() > MAX_ALIAS_LEN {
            return Err(CoreError::ValidationError(format!(
                "alias is {} bytes, limit is {}",
                self.alias.len(),
                MAX_ALIAS_LEN
            )));
        }
        for addr in &self.addresses {
            if let NodeAddress::Hostname { host, .. } = addr {
                if host.is_empty() || host.len() > 255 {
                    return Err(CoreError::ValidationError(format!(
                        "hostname length {} out of range",
                        host.len()
                    )));
                }
            }
        }
        check_field_len("features", self.features.0.len())?;
        check_field_len("address list", self.encoded_addresses().len())?;
        Ok(())
    }

    fn encoded_addresses(&self) -> Vec<u8> {
        let mut addrs = Vec::new();
        for addr in &self.addresses {
            addr.encode(&mut addrs);
        }
        addrs
    }

    /// Alias zero-padded to 32 bytes.
    pub fn alias_bytes(&self) -> [u8; MAX_ALIAS_LEN] {
        let mut out = [0u8; MAX_ALIAS_LEN];
        let raw = self.alias.as_bytes();
        let n = raw.len().min(MAX_ALIAS_LEN);
        out[..n].copy_from_slice(&raw[..n]);
        out
    }

    /// Canonical bytes covered by the node signature.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(128);
        self.features.encode(&mut payload);
        payload.extend_from_slice(&self.timestamp.to_be_bytes());
        payload.extend_from_slice(self.node_id.as_bytes());
        payload.extend_from_slice(&self.color.0);
        payload.extend_from_slice(&self.alias_bytes());

        let addrs = self.encoded_addresses();
        payload.extend_from_slice(&(addrs.len() as u16).to_be_bytes());
        payload.extend_from_slice(&addrs);
        payload
    }
}

/// A channel announcement proving joint ownership of a funding output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAnnouncement {
    pub node_signature_1: Signature,
    pub node_signature_2: Signature,
    pub bitcoin_signature_1: Signature,
    pub bitcoin_signature_2: Signature,
    #[serde(default)]
    pub features: Features,
    pub chain_hash: ChainHash,
    pub short_channel_id: ShortChannelId,
    pub node_id_1: NodeId,
    pub node_id_2: NodeId,
    pub bitcoin_key_1: PublicKey,
    pub bitcoin_key_2: PublicKey,
}

impl ChannelAnnouncement {
    /// Node ids must be strictly ascending.
    pub fn is_canonical(&self) -> bool {
        self.node_id_1 < self.node_id_2
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        check_field_len("features", self.features.0.len())
    }

    pub fn involves(&self, node: &NodeId) -> bool {
        self.node_id_1 == *node || self.node_id_2 == *node
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    pub fn counterparty(&self, node: &NodeId) -> Option<NodeId> {
        if self.node_id_1 == *node {
            Some(self.node_id_2)
        } else if self.node_id_2 == *node {
            Some(self.node_id_1)
        } else {
            None
        }
    }

    /// The node that signs policies for `direction`.
    pub fn source_of(&self, direction: Direction) -> NodeId {
        match direction {
            Direction::Forward => self.node_id_1,
            Direction::Backward => self.node_id_2,
        }
    }

    pub fn desc(&self, direction: Direction) -> ChannelDesc {
        let (from, to) = match direction {
            Direction::Forward => (self.node_id_1, self.node_id_2),
            Direction::Backward => (self.node_id_2, self.node_id_1),
        };
        ChannelDesc {
            short_channel_id: self.short_channel_id,
            from,
            to,
        }
    }

    /// Canonical bytes covered by all four signatures.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + 32 + 8 + 4 * 33 + self.features.0.len());
        self.features.encode(&mut payload);
        payload.extend_from_slice(self.chain_hash.as_bytes());
        payload.extend_from_slice(&self.short_channel_id.to_u64().to_be_bytes());
        payload.extend_from_slice(self.node_id_1.as_bytes());
        payload.extend_from_slice(self.node_id_2.as_bytes());
        payload.extend_from_slice(self.bitcoin_key_1.as_bytes());
        payload.extend_from_slice(self.bitcoin_key_2.as_bytes());
        payload
    }

    /// Full message bytes: signatures followed by the signed payload.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.signing_payload();
        let mut out = Vec::with_capacity(4 * 64 + payload.len());
        out.extend_from_slice(self.node_signature_1.as_bytes());
        out.extend_from_slice(self.node_signature_2.as_bytes());
        out.extend_from_slice(self.bitcoin_signature_1.as_bytes());
        out.extend_from_slice(self.bitcoin_signature_2.as_bytes());
        out.extend_from_slice(&payload);
        out
    }
}

/// Channel flag bit marking a direction as disabled.
pub const CHANNEL_FLAG_DISABLED: u8 = 0b10;

/// A channel update: one endpoint's forwarding policy for one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPolicy {
    pub signature: Signature,
    pub chain_hash: ChainHash,
    pub short_channel_id: ShortChannelId,
    pub timestamp: u32,
    #[serde(default)]
    pub message_flags: u8,
    pub channel_flags: u8,
    pub cltv_expiry_delta: u16,
    pub htlc_minimum_msat: u64,
    pub htlc_maximum_msat: u64,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
}

impl ChannelPolicy {
    pub fn direction(&self) -> Direction {
        Direction::from_channel_flags(self.channel_flags)
    }

    pub fn is_disabled(&self) -> bool {
        self.channel_flags & CHANNEL_FLAG_DISABLED != 0
    }

    /// `base + floor(amount * ppm / 1_000_000)`, saturating.
    pub fn fee_for(&self, amount_msat: u64) -> u64 {
        let proportional =
            (amount_msat as u128 * self.fee_proportional_millionths as u128) / 1_000_000;
        let proportional = u64::try_from(proportional).unwrap_or(u64::MAX);
        (self.fee_base_msat as u64).saturating_add(proportional)
    }

    /// Whether an HTLC of `amount_msat` fits the advertised bounds.
    pub fn admits(&self, amount_msat: u64) -> bool {
        self.htlc_minimum_msat <= amount_msat && amount_msat <= self.htlc_maximum_msat
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.htlc_minimum_msat > self.htlc_maximum_msat {
            return Err(CoreError::ValidationError(format!(
                "htlc_minimum_msat {} exceeds htlc_maximum_msat {}",
                self.htlc_minimum_msat, self.htlc_maximum_msat
            )));
        }
        Ok(())
    }

    /// Canonical bytes covered by the endpoint's signature.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(32 + 8 + 4 + 2 + 2 + 8 + 4 + 4 + 8);
        payload.extend_from_slice(self.chain_hash.as_bytes());
        payload.extend_from_slice(&self.short_channel_id.to_u64().to_be_bytes());
        payload.extend_from_slice(&self.timestamp.to_be_bytes());
        payload.push(self.message_flags);
        payload.push(self.channel_flags);
        payload.extend_from_slice(&self.cltv_expiry_delta.to_be_bytes());
        payload.extend_from_slice(&self.htlc_minimum_msat.to_be_bytes());
        payload.extend_from_slice(&self.fee_base_msat.to_be_bytes());
        payload.extend_from_slice(&self.fee_proportional_millionths.to_be_bytes());
        payload.extend_from_slice(&self.htlc_maximum_msat.to_be_bytes());
        payload
    }
}

/// A directed edge: the channel and the endpoints a policy applies between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelDesc {
    pub short_channel_id: ShortChannelId,
    pub from: NodeId,
    pub to: NodeId,
}

/// Resolve which way a policy points. Direction 0 is node 1 to node 2,
/// direction 1 is node 2 to node 1.
pub fn resolve_desc(policy: &ChannelPolicy, announcement: &ChannelAnnouncement) -> ChannelDesc {
    announcement.desc(policy.direction())
}

/// Gossip as relayed between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GossipMessage {
    NodeAnnouncement(NodeInfo),
    ChannelAnnouncement(ChannelAnnouncement),
    ChannelUpdate(ChannelPolicy),
}

impl GossipMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeAnnouncement(_) => "node_announcement",
            Self::ChannelAnnouncement(_) => "channel_announcement",
            Self::ChannelUpdate(_) => "channel_update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tag: u8) -> NodeId {
        let mut bytes = [tag; 33];
        bytes[0] = 0x02;
        PublicKey(bytes)
    }

    fn announcement() -> ChannelAnnouncement {
        ChannelAnnouncement {
            node_signature_1: Signature([1; 64]),
            node_signature_2: Signature([2; 64]),
            bitcoin_signature_1: Signature([3; 64]),
            bitcoin_signature_2: Signature([4; 64]),
            features: Features::empty(),
            chain_hash: ChainHash::REGTEST,
            short_channel_id: ShortChannelId::new(100, 1, 0).unwrap(),
            node_id_1: node(0x11),
            node_id_2: node(0x22),
            bitcoin_key_1: node(0x33),
            bitcoin_key_2: node(0x44),
        }
    }

    fn policy(channel_flags: u8) -> ChannelPolicy {
        ChannelPolicy {
            signature: Signature([0; 64]),
            chain_hash: ChainHash::REGTEST,
            short_channel_id: ShortChannelId::new(100, 1, 0).unwrap(),
            timestamp: 1_700_000_000,
            message_flags: 1,
            channel_flags,
            cltv_expiry_delta: 40,
            htlc_minimum_msat: 1_000,
            htlc_maximum_msat: 500_000_000,
            fee_base_msat: 1_000,
            fee_proportional_millionths: 10,
        }
    }

    #[test]
    fn test_resolve_desc_direction_zero() {
        let ann = announcement();
        let desc = resolve_desc(&policy(0), &ann);
        assert_eq!(desc.from, ann.node_id_1);
        assert_eq!(desc.to, ann.node_id_2);
        assert_eq!(desc.short_channel_id, ann.short_channel_id);
    }

    #[test]
    fn test_resolve_desc_direction_one() {
        let ann = announcement();
        let desc = resolve_desc(&policy(1), &ann);
        assert_eq!(desc.from, ann.node_id_2);
        assert_eq!(desc.to, ann.node_id_1);
    }

    #[test]
    fn test_disabled_bit_does_not_change_direction() {
        let p = policy(0b11);
        assert!(p.is_disabled());
        assert_eq!(p.direction(), Direction::Backward);
        assert!(!policy(0).is_disabled());
    }

    #[test]
    fn test_fee_formula() {
        let p = policy(0);
        assert_eq!(p.fee_for(1_000_000), 1_010);
        assert_eq!(p.fee_for(0), 1_000);
        assert_eq!(p.fee_for(99_999), 1_000);

        let mut steep = policy(0);
        steep.fee_proportional_millionths = 10_000;
        assert_eq!(steep.fee_for(100_000_000), 1_001_000);
    }

    #[test]
    fn test_admits_bounds_inclusive() {
        let p = policy(0);
        assert!(p.admits(1_000));
        assert!(p.admits(500_000_000));
        assert!(!p.admits(999));
        assert!(!p.admits(500_000_001));
    }

    #[test]
    fn test_policy_validate() {
        let mut p = policy(0);
        assert!(p.validate().is_ok());
        p.htlc_minimum_msat = p.htlc_maximum_msat + 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_canonical_order() {
        let mut ann = announcement();
        assert!(ann.is_canonical());
        std::mem::swap(&mut ann.node_id_1, &mut ann.node_id_2);
        assert!(!ann.is_canonical());
    }

    #[test]
    fn test_counterparty_and_source() {
        let ann = announcement();
        assert_eq!(ann.counterparty(&ann.node_id_1), Some(ann.node_id_2));
        assert_eq!(ann.counterparty(&node(0x99)), None);
        assert_eq!(ann.source_of(Direction::Backward), ann.node_id_2);
    }

    #[test]
    fn test_signing_payload_excludes_signatures() {
        let ann = announcement();
        let mut resigned = ann.clone();
        resigned.node_signature_1 = Signature([9; 64]);
        assert_eq!(ann.signing_payload(), resigned.signing_payload());
        assert_ne!(ann.encode(), resigned.encode());
    }

    #[test]
    fn test_policy_payload_covers_timestamp() {
        let a = policy(0);
        let mut b = a.clone();
        b.timestamp += 1;
        assert_ne!(a.signing_payload(), b.signing_payload());
    }

    #[test]
    fn test_node_alias_limit() {
        let mut info = NodeInfo {
            node_id: node(0x11),
            alias: "alice".into(),
            color: Color([0xff, 0, 0]),
            addresses: Vec::new(),
            features: Features::empty(),
            timestamp: 1,
            signature: Signature([0; 64]),
        };
        assert!(info.validate().is_ok());
        assert_eq!(&info.alias_bytes()[..5], b"alice");
        info.alias = "x".repeat(33);
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_length_prefixed_fields_bounded() {
        let mut ann = announcement();
        ann.features = Features(vec![0; MAX_FIELD_LEN]);
        assert!(ann.validate().is_ok());
        ann.features = Features(vec![0; MAX_FIELD_LEN + 1]);
        assert!(ann.validate().is_err());

        let mut info = NodeInfo::placeholder(node(0x11));
        info.features = Features(vec![1; MAX_FIELD_LEN + 1]);
        assert!(info.validate().is_err());

        // Seven encoded bytes each: 9_363 of them overflow the u16 prefix.
        let mut info = NodeInfo::placeholder(node(0x11));
        info.addresses = vec![
            NodeAddress::Ipv4 {
                addr: std::net::Ipv4Addr::LOCALHOST,
                port: 9735,
            };
            9_363
        ];
        assert!(info.validate().is_err());
        info.addresses.truncate(9_362);
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_placeholder() {
        let info = NodeInfo::placeholder(node(0x11));
        assert!(info.is_placeholder());
        assert_eq!(info.timestamp, 0);
        assert!(info.validate().is_ok());

        let mut signed = info.clone();
        signed.signature = Signature([7; 64]);
        assert!(!signed.is_placeholder());
    }

    #[test]
    fn test_gossip_message_json_tag() {
        let msg = GossipMessage::ChannelUpdate(policy(1));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "channel_update");
        let back: GossipMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.kind(), "channel_update");
    }
}
