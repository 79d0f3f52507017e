//! lngraph node
//!
//! Hosts the router task that owns the channel graph and executes the work
//! gossip handling hands back: chain lookups, spend watches, retry timers,
//! event publication and route searches.

pub mod commands;
pub mod config;
pub mod router;

pub use commands::{GossipEnvelope, PruneReport, RouterCommand, RouterStats};
pub use config::{LnGraphConfig, LoggingConfig, RouterConfig};
pub use router::{system_clock, Clock, Router, RouterError, RouterHandle};
