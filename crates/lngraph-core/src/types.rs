use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::CoreError;

/// Fixed-width byte strings that travel as lowercase hex.
macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
                    what: stringify!($name),
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, CoreError> {
                let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(de::Error::custom)
            }
        }
    };
}

hex_newtype!(
    /// A 33-byte compressed secp256k1 public key.
    PublicKey,
    33
);

hex_newtype!(
    /// A 64-byte compact ECDSA signature.
    Signature,
    64
);

hex_newtype!(
    /// Genesis block hash identifying the chain a message belongs to.
    ChainHash,
    32
);

hex_newtype!(
    /// Transaction id in internal byte order.
    Txid,
    32
);

/// Nodes are identified by their node key.
pub type NodeId = PublicKey;

/// Peers are identified by their node key as well.
pub type PeerId = NodeId;

impl ChainHash {
    /// Bitcoin mainnet genesis hash.
    pub const BITCOIN: ChainHash = ChainHash([
        0x6f, 0xe2, 0x8c, 0x0a, 0xb6, 0xf1, 0xb3, 0x72, 0xc1, 0xa6, 0xa2, 0x46, 0xae, 0x63, 0xf7,
        0x4f, 0x93, 0x1e, 0x83, 0x65, 0xe1, 0x5a, 0x08, 0x9c, 0x68, 0xd6, 0x19, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ]);

    /// Bitcoin regtest genesis hash.
    pub const REGTEST: ChainHash = ChainHash([
        0x06, 0x22, 0x6e, 0x46, 0x11, 0x1a, 0x0b, 0x59, 0xca, 0xaf, 0x12, 0x60, 0x43, 0xeb, 0x5b,
        0xbf, 0x28, 0xc3, 0x4f, 0x3a, 0x5e, 0x33, 0x2a, 0x1f, 0xc7, 0xb2, 0xb7, 0x3c, 0xf1, 0x88,
        0x91, 0x0f,
    ]);
}

/// Block height, transaction index and output index of a funding output,
/// packed as 24/24/16 bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortChannelId {
    block_height: u32,
    tx_index: u32,
    output_index: u16,
}

impl ShortChannelId {
    const MAX_24: u32 = (1 << 24) - 1;

    pub fn new(block_height: u32, tx_index: u32, output_index: u16) -> Result<Self, CoreError> {
        if block_height > Self::MAX_24 || tx_index > Self::MAX_24 {
            return Err(CoreError::InvalidShortChannelId(format!(
                "{}x{}x{}: height and tx index must fit in 24 bits",
                block_height, tx_index, output_index
            )));
        }
        Ok(Self {
            block_height,
            tx_index,
            output_index,
        })
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            block_height: ((value >> 40) & 0xff_ffff) as u32,
            tx_index: ((value >> 16) & 0xff_ffff) as u32,
            output_index: (value & 0xffff) as u16,
        }
    }

    pub fn to_u64(&self) -> u64 {
        ((self.block_height as u64) << 40)
            | ((self.tx_index as u64) << 16)
            | self.output_index as u64
    }

    pub fn block_height(&self) -> u32 {
        self.block_height
    }

    pub fn tx_index(&self) -> u32 {
        self.tx_index
    }

    pub fn output_index(&self) -> u16 {
        self.output_index
    }
}

impl fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}",
            self.block_height, self.tx_index, self.output_index
        )
    }
}

impl fmt::Debug for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortChannelId({})", self)
    }
}

impl FromStr for ShortChannelId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidShortChannelId(s.to_string());
        let mut parts = s.split('x');
        let height = parts.next().ok_or_else(invalid)?;
        let tx = parts.next().ok_or_else(invalid)?;
        let out = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Self::new(
            height.parse().map_err(|_| invalid())?,
            tx.parse().map_err(|_| invalid())?,
            out.parse().map_err(|_| invalid())?,
        )
    }
}

impl Serialize for ShortChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShortChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Which endpoint a channel policy belongs to.
///
/// `Forward` is the policy node 1 applies when forwarding to node 2
/// (channel_flags bit 0 clear); `Backward` is node 2 towards node 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn from_channel_flags(flags: u8) -> Self {
        if flags & 1 == 0 {
            Self::Forward
        } else {
            Self::Backward
        }
    }

    pub fn to_flag(self) -> u8 {
        match self {
            Self::Forward => 0,
            Self::Backward => 1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_flag())
    }
}

/// RGB node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color(pub [u8; 3]);

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", hex::encode(self.0))
    }
}

/// A network address advertised in a node announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeAddress {
    Ipv4 { addr: Ipv4Addr, port: u16 },
    Ipv6 { addr: Ipv6Addr, port: u16 },
    Hostname { host: String, port: u16 },
}

impl NodeAddress {
    /// Append the address descriptor (type byte, address, port) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Ipv4 { addr, port } => {
                out.push(1);
                out.extend_from_slice(&addr.octets());
                out.extend_from_slice(&port.to_be_bytes());
            }
            Self::Ipv6 { addr, port } => {
                out.push(2);
                out.extend_from_slice(&addr.octets());
                out.extend_from_slice(&port.to_be_bytes());
            }
            Self::Hostname { host, port } => {
                out.push(5);
                // Hostnames longer than 255 bytes are rejected by NodeInfo::validate.
                out.push(host.len() as u8);
                out.extend_from_slice(host.as_bytes());
                out.extend_from_slice(&port.to_be_bytes());
            }
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Ipv4 { port, .. } | Self::Ipv6 { port, .. } | Self::Hostname { port, .. } => {
                *port
            }
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 { addr, port } => write!(f, "{}:{}", addr, port),
            Self::Ipv6 { addr, port } => write!(f, "[{}]:{}", addr, port),
            Self::Hostname { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Feature bit vector, big-endian as on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Features(#[serde(with = "hex_bytes")] pub Vec<u8>);

impl Features {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether bit `bit` (counted from the least significant end) is set.
    pub fn has_bit(&self, bit: usize) -> bool {
        let byte = bit / 8;
        if byte >= self.0.len() {
            return false;
        }
        let idx = self.0.len() - 1 - byte;
        self.0[idx] & (1 << (bit % 8)) != 0
    }

    pub fn set_bit(&mut self, bit: usize) {
        let needed = bit / 8 + 1;
        if self.0.len() < needed {
            let mut grown = vec![0u8; needed - self.0.len()];
            grown.extend_from_slice(&self.0);
            self.0 = grown;
        }
        let idx = self.0.len() - 1 - bit / 8;
        self.0[idx] |= 1 << (bit % 8);
    }

    /// Length-prefixed encoding used inside signed payloads.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.0.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.0);
    }
}

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value_sat: u64,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

/// The transaction a short channel id points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingTx {
    pub txid: Txid,
    pub outputs: Vec<TxOut>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendStatus {
    Unspent,
    Spent,
}

/// Result of resolving a short channel id on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ChainLookup {
    Found {
        funding_tx: FundingTx,
        status: SpendStatus,
    },
    NotFound,
    WrongChain,
}

/// Serde adapter for byte vectors carried as hex strings.
pub mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}
