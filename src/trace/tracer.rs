//! Backward funding walk
//!
//! Starting at the deployer, repeatedly resolve the most significant inbound
//! transfer of the current wallet and step to its sender. The walk is an
//! explicit loop with a visited set, so it always terminates and never lists
//! an address twice.

use std::cmp::Ordering;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::address::WalletAddress;
use crate::error::{Error, Result};
use crate::provider::{EntityDataProvider, TransferEdge, WalletProfile};
use crate::trace::{FundingTrace, TerminalReason, TraceHop};

/// Walks funding edges upstream from a deployer
pub struct FundingTracer<'a, P: ?Sized> {
    provider: &'a P,
    cancel: CancellationToken,
}

impl<'a, P: EntityDataProvider + ?Sized> FundingTracer<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self {
            provider,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the walk when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Trace the funding of `deployer` up to `max_hops` upstream wallets
    pub async fn trace(&self, deployer: &WalletAddress, max_hops: u32) -> Result<FundingTrace> {
        let mut visited: HashSet<WalletAddress> = HashSet::new();
        let mut hops: Vec<TraceHop> = Vec::new();

        let profile = self.fetch_profile(deployer).await?;
        visited.insert(deployer.clone());

        if profile.is_known_entity {
            debug!(
                "Deployer {} is known entity {:?}",
                deployer.short(),
                profile.entity_label
            );
            hops.push(TraceHop {
                hop_index: 0,
                profile,
                funding_edge: None,
            });
            return Ok(finish(hops, TerminalReason::ResolvedKnownEntity));
        }

        let profile = self.with_dispersion(profile).await?;
        hops.push(TraceHop {
            hop_index: 0,
            profile,
            funding_edge: None,
        });

        loop {
            let (hop_index, current) = match hops.last() {
                Some(last) => (last.hop_index, last.address().clone()),
                None => return Ok(finish(hops, TerminalReason::DeadEnd)),
            };

            if hop_index >= max_hops {
                return Ok(finish(hops, TerminalReason::HopLimit));
            }

            self.check_cancelled()?;
            let incoming = self
                .provider
                .get_incoming_transfers(&current)
                .await
                .map_err(|e| e.into_unavailable(current.as_str()))?;

            let Some(edge) = select_funding_edge(&current, &incoming) else {
                debug!("Hop {}: {} has no inbound funding", hop_index, current.short());
                return Ok(finish(hops, TerminalReason::DeadEnd));
            };
            let edge = edge.clone();
            let funder = edge.from_address.clone();

            if visited.contains(&funder) {
                debug!(
                    "Hop {}: funder {} of {} already visited",
                    hop_index,
                    funder.short(),
                    current.short()
                );
                return Ok(finish(hops, TerminalReason::Cycle));
            }
            visited.insert(funder.clone());

            let profile = self.fetch_profile(&funder).await?;
            let next_index = hop_index + 1;
            debug!(
                "Hop {}: {} funded by {} ({} units)",
                next_index,
                current.short(),
                funder.short(),
                edge.amount
            );

            if profile.is_known_entity {
                hops.push(TraceHop {
                    hop_index: next_index,
                    profile,
                    funding_edge: Some(edge),
                });
                return Ok(finish(hops, TerminalReason::ResolvedKnownEntity));
            }

            let profile = self.with_dispersion(profile).await?;
            hops.push(TraceHop {
                hop_index: next_index,
                profile,
                funding_edge: Some(edge),
            });
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn fetch_profile(&self, address: &WalletAddress) -> Result<WalletProfile> {
        self.check_cancelled()?;
        self.provider
            .get_profile(address)
            .await
            .map_err(|e| e.into_unavailable(address.as_str()))
    }

    /// Fill the outgoing counters from the wallet's outgoing transfers
    async fn with_dispersion(&self, profile: WalletProfile) -> Result<WalletProfile> {
        self.check_cancelled()?;
        let outgoing = self
            .provider
            .get_outgoing_transfers(&profile.address)
            .await
            .map_err(|e| e.into_unavailable(profile.address.as_str()))?;
        Ok(profile.with_outgoing(&outgoing))
    }
}

fn finish(hops: Vec<TraceHop>, terminal_reason: TerminalReason) -> FundingTrace {
    debug!("Trace finished after {} hop(s): {}", hops.len(), terminal_reason);
    FundingTrace {
        hops,
        terminal_reason,
    }
}

/// Most significant inbound transfer of `wallet`
///
/// Largest amount wins; ties go to the earliest transfer, then to the
/// lexicographically smallest sender. Transfers with a non-finite amount
/// are ignored.
pub fn select_funding_edge<'e>(
    wallet: &WalletAddress,
    edges: &'e [TransferEdge],
) -> Option<&'e TransferEdge> {
    edges
        .iter()
        .filter(|e| &e.to_address == wallet && !e.is_self_transfer() && e.amount.is_finite())
        .min_by(|a, b| compare_significance(a, b))
}

fn compare_significance(a: &TransferEdge, b: &TransferEdge) -> Ordering {
    b.amount
        .total_cmp(&a.amount)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.from_address.cmp(&b.from_address))
}
