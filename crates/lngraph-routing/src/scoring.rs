use lngraph_core::ChannelPolicy;
use serde::{Deserialize, Serialize};

/// Cost of pushing an amount across one edge.
///
/// `weight = fee + risk`, where risk prices the capital locked for the
/// edge's cltv delta: `floor(amount * cltv_delta * risk_factor / 1e9)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeCost {
    pub fee_msat: u64,
    pub risk: u64,
}

impl EdgeCost {
    /// Cost of forwarding `amount_msat` under `policy`.
    pub fn forwarding(policy: &ChannelPolicy, amount_msat: u64, risk_factor_billionths: u64) -> Self {
        Self {
            fee_msat: policy.fee_for(amount_msat),
            risk: risk(amount_msat, policy.cltv_expiry_delta, risk_factor_billionths),
        }
    }

    /// The sender's own channel: no fee is paid to itself and nothing is
    /// locked on its behalf.
    pub fn first_hop() -> Self {
        Self::default()
    }

    pub fn weight(&self) -> u64 {
        self.fee_msat.saturating_add(self.risk)
    }
}

/// `floor(amount * cltv_delta * factor / 1_000_000_000)`, saturating.
pub fn risk(amount_msat: u64, cltv_delta: u16, risk_factor_billionths: u64) -> u64 {
    let scaled = amount_msat as u128 * cltv_delta as u128 * risk_factor_billionths as u128;
    u64::try_from(scaled / 1_000_000_000).unwrap_or(u64::MAX)
}

/// Accumulated cost of a partial path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathCost {
    pub weight: u64,
    pub risk: u64,
    pub fee_msat: u64,
}

impl PathCost {
    pub fn add(&self, edge: &EdgeCost) -> Self {
        Self {
            weight: self.weight.saturating_add(edge.weight()),
            risk: self.risk.saturating_add(edge.risk),
            fee_msat: self.fee_msat.saturating_add(edge.fee_msat),
        }
    }
}
