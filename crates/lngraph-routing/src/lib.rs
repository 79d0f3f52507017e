//! lngraph routing: the channel graph and the route finder over it.
//!
//! This crate provides:
//! - [`GraphStore`]: nodes, admitted channels, per-direction policies and
//!   adjacency, with deterministic enumeration and pruning primitives.
//! - [`PathFinder`]: a backward Dijkstra search pricing fees and
//!   locked-capital risk, honouring exclusions and fee/cltv/hop limits.
//! - [`Route`]: the ordered hops with per-hop amounts and totals.
//! - [`NoRouteReason`]: why a request could not be satisfied.

pub mod error;
pub mod graph;
pub mod pathfinder;
pub mod route;
pub mod scoring;

// Re-exports for convenience.
pub use error::{NoRouteReason, RoutingError};
pub use graph::{ChannelInfo, Edge, GraphStore, UpdateOutcome};
pub use pathfinder::{find_route, PathFinder, RouteConstraints, RouteRequest};
pub use route::{Route, RouteHop};
pub use scoring::{risk, EdgeCost, PathCost};
