pub mod config;
pub mod error;
pub mod message;
pub mod types;
pub mod validation;

pub use config::{GossipConfig, RetryConfig, RoutingConfig, ValidationConfig};
pub use error::CoreError;
pub use message::{
    resolve_desc, ChannelAnnouncement, ChannelDesc, ChannelPolicy, GossipMessage, NodeInfo,
};
pub use types::{
    ChainHash, ChainLookup, Color, Direction, Features, FundingTx, NodeAddress, NodeId, OutPoint,
    PeerId, PublicKey, ShortChannelId, Signature, SpendStatus, TxOut, Txid,
};
pub use validation::{
    InvalidReason, ValidationEvent, ValidationOutcome, ValidationState, ValidationStateMachine,
};
