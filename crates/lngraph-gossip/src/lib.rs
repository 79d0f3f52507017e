//! lngraph gossip crate
//!
//! Turns peer-relayed gossip into graph mutations:
//!
//! - **ingest** deduplicates node announcements and channel updates, checks
//!   their signatures and buffers updates for channels still being validated
//! - **validator** runs each channel announcement through its validation
//!   lifecycle and decides admission from the chain watcher's answer
//! - **chain** defines the chain watcher contract plus an in-memory watcher
//! - **events** are the notifications published to audit and relay
//!   collaborators
//!
//! Nothing here awaits the chain. Work that needs it comes back as
//! [`Action`]s for the owning task to execute.

pub mod chain;
pub mod error;
pub mod events;
pub mod ingest;
pub mod validator;

#[cfg(any(test, feature = "testing"))]
pub mod fixtures;

pub use chain::{ChainRecord, ChainWatcher, InMemoryChain, SpendNotification, ValidateRequest};
pub use error::{ChainError, ErrorKind, GossipError};
pub use events::{GraphEvent, PruneReason};
pub use ingest::GossipIngest;
pub use validator::{evaluate_funding, Action, AnnouncementValidator};
