//! Funding trace model
//!
//! A trace is the ordered list of wallets walked backwards from a deployer,
//! one hop per funding transfer, plus the reason the walk stopped.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::address::WalletAddress;
use crate::provider::{TransferEdge, WalletProfile};

pub mod tracer;

pub use tracer::FundingTracer;

/// Why a funding walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalReason {
    /// Reached `max_hops` without resolving the source
    HopLimit,
    /// Funding resolved to a labeled institution (included as the final hop)
    ResolvedKnownEntity,
    /// No inbound funding transfer found
    DeadEnd,
    /// Funder was already visited in this walk
    Cycle,
}

impl TerminalReason {
    /// Funding source could not be resolved at all
    pub fn is_opaque(&self) -> bool {
        matches!(self, TerminalReason::DeadEnd | TerminalReason::Cycle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::HopLimit => "HOP_LIMIT",
            TerminalReason::ResolvedKnownEntity => "RESOLVED_KNOWN_ENTITY",
            TerminalReason::DeadEnd => "DEAD_END",
            TerminalReason::Cycle => "CYCLE",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wallet in the funding walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHop {
    /// 0 for the deployer, N for the Nth upstream funder
    pub hop_index: u32,
    pub profile: WalletProfile,
    /// Inbound transfer that led the walk here (`None` for the deployer)
    pub funding_edge: Option<TransferEdge>,
}

impl TraceHop {
    pub fn address(&self) -> &WalletAddress {
        &self.profile.address
    }
}

/// Ordered funding walk from the deployer upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingTrace {
    pub hops: Vec<TraceHop>,
    pub terminal_reason: TerminalReason,
}

impl FundingTrace {
    /// Hop 0
    pub fn deployer(&self) -> Option<&TraceHop> {
        self.hops.first()
    }

    /// Hop 1, the deployer's direct funder
    pub fn funder(&self) -> Option<&TraceHop> {
        self.hops.get(1)
    }

    /// Last wallet reached
    pub fn last_hop(&self) -> Option<&TraceHop> {
        self.hops.last()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Label of the entity the walk resolved to, if it resolved to one
    pub fn resolved_entity_label(&self) -> Option<&str> {
        if self.terminal_reason != TerminalReason::ResolvedKnownEntity {
            return None;
        }
        self.last_hop()
            .and_then(|hop| hop.profile.entity_label.as_deref())
    }

    /// No address appears twice
    pub fn is_cycle_free(&self) -> bool {
        let mut seen = HashSet::new();
        self.hops.iter().all(|hop| seen.insert(hop.address()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(index: u32, address: &str) -> TraceHop {
        TraceHop {
            hop_index: index,
            profile: WalletProfile::unknown(WalletAddress::parse(address).unwrap()),
            funding_edge: None,
        }
    }

    #[test]
    fn test_terminal_reason_serializes_screaming_case() {
        let json = serde_json::to_string(&TerminalReason::ResolvedKnownEntity).unwrap();
        assert_eq!(json, "\"RESOLVED_KNOWN_ENTITY\"");
        assert_eq!(TerminalReason::DeadEnd.to_string(), "DEAD_END");
        assert!(TerminalReason::Cycle.is_opaque());
        assert!(!TerminalReason::HopLimit.is_opaque());
    }

    #[test]
    fn test_cycle_free_check() {
        let trace = FundingTrace {
            hops: vec![hop(0, "a"), hop(1, "b")],
            terminal_reason: TerminalReason::DeadEnd,
        };
        assert!(trace.is_cycle_free());
        assert_eq!(trace.funder().map(|h| h.address().as_str()), Some("b"));

        let looped = FundingTrace {
            hops: vec![hop(0, "a"), hop(1, "b"), hop(2, "a")],
            terminal_reason: TerminalReason::HopLimit,
        };
        assert!(!looped.is_cycle_free());
    }

    #[test]
    fn test_resolved_entity_label_only_when_resolved() {
        let mut exchange = hop(1, "hot-wallet");
        exchange.profile = exchange.profile.known_entity("Binance");

        let resolved = FundingTrace {
            hops: vec![hop(0, "a"), exchange.clone()],
            terminal_reason: TerminalReason::ResolvedKnownEntity,
        };
        assert_eq!(resolved.resolved_entity_label(), Some("Binance"));

        let limited = FundingTrace {
            hops: vec![hop(0, "a"), exchange],
            terminal_reason: TerminalReason::HopLimit,
        };
        assert_eq!(limited.resolved_entity_label(), None);
    }
}
