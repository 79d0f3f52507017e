use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};

use lngraph_core::{NodeId, RoutingConfig, ShortChannelId};
use serde::{Deserialize, Serialize};

use crate::error::NoRouteReason;
use crate::graph::GraphStore;
use crate::route::{Route, RouteHop};
use crate::scoring::{EdgeCost, PathCost};

/// Limits a route must respect. Exclusions support retry-after-failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConstraints {
    #[serde(default)]
    pub excluded_nodes: BTreeSet<NodeId>,
    #[serde(default)]
    pub excluded_channels: BTreeSet<ShortChannelId>,
    /// Falls back to the configured `max_hops` when unset.
    #[serde(default)]
    pub max_hops: Option<usize>,
    #[serde(default)]
    pub max_fee_msat: Option<u64>,
    /// Upper bound on the total cltv delta, final delta included.
    #[serde(default)]
    pub max_cltv: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub source: NodeId,
    pub target: NodeId,
    pub amount_msat: u64,
    #[serde(default)]
    pub constraints: RouteConstraints,
    #[serde(default)]
    pub final_cltv_delta: Option<u16>,
}

impl RouteRequest {
    pub fn new(source: NodeId, target: NodeId, amount_msat: u64) -> Self {
        Self {
            source,
            target,
            amount_msat,
            constraints: RouteConstraints::default(),
            final_cltv_delta: None,
        }
    }

    pub fn with_constraints(mut self, constraints: RouteConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// A partial path from `node` to the target.
#[derive(Debug, Clone)]
struct Label {
    node: NodeId,
    /// What `node` has to put on its outgoing channel, fees ahead included.
    amount_msat: u64,
    cost: PathCost,
    cltv: u32,
    /// Hops nearest the target first.
    hops: Vec<RouteHop>,
}

impl Label {
    fn priority_cmp(&self, other: &Self) -> Ordering {
        self.cost
            .weight
            .cmp(&other.cost.weight)
            .then(self.cost.risk.cmp(&other.cost.risk))
            .then(self.hops.len().cmp(&other.hops.len()))
            .then_with(|| {
                let ours = self.hops.iter().rev().map(|h| h.short_channel_id);
                let theirs = other.hops.iter().rev().map(|h| h.short_channel_id);
                ours.cmp(theirs)
            })
    }

    fn visits(&self, node: &NodeId) -> bool {
        self.node == *node || self.hops.iter().any(|h| h.to == *node)
    }
}

/// What a settled label at a node still guarantees for paths through it.
#[derive(Debug, Clone, Copy)]
struct Settled {
    hops: usize,
    fee_msat: u64,
    cltv: u32,
}

impl Settled {
    /// Whether `label` can reach nothing this one cannot reach as cheaply.
    /// Fee and cltv only count when the request bounds them.
    fn dominates(&self, label: &Label, bound_fee: bool, bound_cltv: bool) -> bool {
        self.hops <= label.hops.len()
            && (!bound_fee || self.fee_msat <= label.cost.fee_msat)
            && (!bound_cltv || self.cltv <= label.cltv)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.priority_cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the cheapest label pops first.
        other.priority_cmp(self)
    }
}

/// Computes least-cost payment routes over a graph snapshot.
///
/// The search runs from the target back to the source, because each hop's
/// fee depends on the amount it forwards, which is only known once every hop
/// after it has been priced. A node is re-expanded only when reached by a
/// label no settled label dominates: fewer hops, or, when the request caps
/// them, less fee or cltv. That keeps `max_hops`, `max_fee_msat` and
/// `max_cltv` honest without enumerating every path.
#[derive(Debug, Clone)]
pub struct PathFinder {
    config: RoutingConfig,
}

impl PathFinder {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self {
            config: RoutingConfig::default(),
        }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn find_route(
        &self,
        graph: &GraphStore,
        request: &RouteRequest,
    ) -> Result<Route, NoRouteReason> {
        if request.amount_msat == 0 {
            return Err(NoRouteReason::ZeroAmount);
        }
        if request.source == request.target {
            return Err(NoRouteReason::RouteToSelf);
        }

        if let Some(route) = self.search(graph, request) {
            tracing::debug!(
                source = %request.source,
                target = %request.target,
                amount_msat = request.amount_msat,
                hops = route.hop_count(),
                fee_msat = route.total_fee_msat,
                "route found"
            );
            return Ok(route);
        }

        let reason = if reachable(graph, &request.source, &request.target) {
            NoRouteReason::ConstraintsViolated
        } else {
            NoRouteReason::Unreachable
        };
        tracing::debug!(
            source = %request.source,
            target = %request.target,
            amount_msat = request.amount_msat,
            reason = %reason,
            "no route"
        );
        Err(reason)
    }

    fn search(&self, graph: &GraphStore, request: &RouteRequest) -> Option<Route> {
        let constraints = &request.constraints;
        if constraints.excluded_nodes.contains(&request.source)
            || constraints.excluded_nodes.contains(&request.target)
        {
            return None;
        }

        let max_hops = constraints.max_hops.unwrap_or(self.config.max_hops);
        let final_cltv = request
            .final_cltv_delta
            .unwrap_or(self.config.final_cltv_delta) as u32;

        let mut heap: BinaryHeap<Label> = BinaryHeap::new();
        let mut settled: HashMap<NodeId, Vec<Settled>> = HashMap::new();
        let bound_fee = constraints.max_fee_msat.is_some();
        let bound_cltv = constraints.max_cltv.is_some();

        heap.push(Label {
            node: request.target,
            amount_msat: request.amount_msat,
            cost: PathCost::default(),
            cltv: final_cltv,
            hops: Vec::new(),
        });

        while let Some(label) = heap.pop() {
            if label.node == request.source {
                let mut hops = label.hops;
                hops.reverse();
                return Some(Route::new(
                    hops,
                    request.amount_msat,
                    label.cltv,
                    label.cost.weight,
                ));
            }

            let seen = settled.entry(label.node).or_default();
            if seen
                .iter()
                .any(|s| s.dominates(&label, bound_fee, bound_cltv))
            {
                continue;
            }
            seen.push(Settled {
                hops: label.hops.len(),
                fee_msat: label.cost.fee_msat,
                cltv: label.cltv,
            });

            if label.hops.len() >= max_hops {
                continue;
            }

            for edge in graph.incoming_edges(&label.node) {
                let from = edge.desc.from;
                let scid = edge.desc.short_channel_id;
                let policy = edge.policy;

                if policy.is_disabled()
                    || constraints.excluded_channels.contains(&scid)
                    || constraints.excluded_nodes.contains(&from)
                    || label.visits(&from)
                {
                    continue;
                }

                let carried = label.amount_msat;
                if !policy.admits(carried) || carried > edge.capacity_sat.saturating_mul(1_000) {
                    continue;
                }

                let first_hop = from == request.source;
                let edge_cost = if first_hop {
                    EdgeCost::first_hop()
                } else {
                    EdgeCost::forwarding(policy, carried, self.config.risk_factor_billionths)
                };
                let cost = label.cost.add(&edge_cost);
                let cltv = if first_hop {
                    label.cltv
                } else {
                    label.cltv.saturating_add(policy.cltv_expiry_delta as u32)
                };

                if constraints.max_fee_msat.is_some_and(|max| cost.fee_msat > max)
                    || constraints.max_cltv.is_some_and(|max| cltv > max)
                {
                    continue;
                }
                let Some(amount_msat) = carried.checked_add(edge_cost.fee_msat) else {
                    continue;
                };

                let mut hops = label.hops.clone();
                hops.push(RouteHop {
                    short_channel_id: scid,
                    from,
                    to: label.node,
                    amount_msat: carried,
                    fee_msat: edge_cost.fee_msat,
                    cltv_expiry_delta: policy.cltv_expiry_delta,
                });
                heap.push(Label {
                    node: from,
                    amount_msat,
                    cost,
                    cltv,
                    hops,
                });
            }
        }

        None
    }
}

/// Find a route with a one-off `PathFinder`.
pub fn find_route(
    graph: &GraphStore,
    request: &RouteRequest,
    config: &RoutingConfig,
) -> Result<Route, NoRouteReason> {
    PathFinder::new(config.clone()).find_route(graph, request)
}

/// Whether `target` can be reached over enabled edges, ignoring amounts and
/// request constraints.
fn reachable(graph: &GraphStore, source: &NodeId, target: &NodeId) -> bool {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    seen.insert(*source);
    queue.push_back(*source);

    while let Some(node) = queue.pop_front() {
        if node == *target {
            return true;
        }
        for edge in graph.outgoing_edges(&node) {
            if edge.policy.is_disabled() {
                continue;
            }
            if seen.insert(edge.desc.to) {
                queue.push_back(edge.desc.to);
            }
        }
    }
    false
}
