//! Entity data providers
//!
//! The tracing and scoring core only sees the [`EntityDataProvider`] trait.
//! Concrete providers:
//! - [`ArkhamClient`] - Arkham Intelligence REST API
//! - [`RetryingProvider`] - timeout + bounded retry wrapper around any provider
//! - [`InMemoryProvider`] - substitutable fake for tests and demos

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::address::WalletAddress;
use crate::error::Result;

pub mod arkham;
pub mod memory;
pub mod retry;

pub use arkham::ArkhamClient;
pub use memory::InMemoryProvider;
pub use retry::{RetryPolicy, RetryingProvider};

/// Wallet metadata as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletProfile {
    pub address: WalletAddress,
    /// First time the wallet was seen on-chain (unknown for some providers)
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Labeled by the provider as a recognized institution
    pub is_known_entity: bool,
    /// Entity or label name (e.g. "Binance")
    pub entity_label: Option<String>,
    /// Number of outgoing transfers observed
    pub outgoing_transfer_count: u32,
    /// Number of distinct recipients of those transfers
    pub unique_recipient_count: u32,
}

impl WalletProfile {
    /// Profile with no metadata beyond the address
    pub fn unknown(address: WalletAddress) -> Self {
        Self {
            address,
            creation_timestamp: None,
            is_known_entity: false,
            entity_label: None,
            outgoing_transfer_count: 0,
            unique_recipient_count: 0,
        }
    }

    /// Set creation time
    pub fn created_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = Some(timestamp);
        self
    }

    /// Mark as a known entity with the given label
    pub fn known_entity(mut self, label: impl Into<String>) -> Self {
        self.is_known_entity = true;
        self.entity_label = Some(label.into());
        self
    }

    /// Replace the outgoing counters with stats computed from `edges`
    pub fn with_outgoing(mut self, edges: &[TransferEdge]) -> Self {
        let stats = DispersionStats::from_edges(&self.address, edges);
        self.outgoing_transfer_count = stats.transfer_count;
        self.unique_recipient_count = stats.unique_recipients;
        self
    }

    /// Average number of transfers per distinct recipient
    pub fn avg_transfers_per_recipient(&self) -> Option<f64> {
        if self.unique_recipient_count == 0 {
            None
        } else {
            Some(self.outgoing_transfer_count as f64 / self.unique_recipient_count as f64)
        }
    }
}

/// One directed funding transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEdge {
    pub from_address: WalletAddress,
    pub to_address: WalletAddress,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl TransferEdge {
    pub fn new(
        from_address: WalletAddress,
        to_address: WalletAddress,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            from_address,
            to_address,
            amount,
            timestamp,
        }
    }

    /// Transfer from a wallet to itself
    pub fn is_self_transfer(&self) -> bool {
        self.from_address == self.to_address
    }
}

/// Outgoing fan-out summary for a wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispersionStats {
    pub transfer_count: u32,
    pub unique_recipients: u32,
}

impl DispersionStats {
    /// Count outgoing edges of `sender` and their distinct recipients
    pub fn from_edges(sender: &WalletAddress, edges: &[TransferEdge]) -> Self {
        let mut recipients = HashSet::new();
        let mut transfer_count = 0u32;
        for edge in edges
            .iter()
            .filter(|e| &e.from_address == sender && !e.is_self_transfer())
        {
            transfer_count = transfer_count.saturating_add(1);
            recipients.insert(&edge.to_address);
        }
        Self {
            transfer_count,
            unique_recipients: recipients.len() as u32,
        }
    }
}

/// Source of wallet metadata and transfer history
///
/// Every method fails with `Error::DataUnavailable` (possibly after retries)
/// when the provider cannot answer for an address.
#[async_trait]
pub trait EntityDataProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Wallet metadata (creation time, entity labels)
    async fn get_profile(&self, address: &WalletAddress) -> Result<WalletProfile>;

    /// Transfers sent by `address`
    async fn get_outgoing_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>>;

    /// Transfers received by `address`
    async fn get_incoming_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>>;

    /// Smart-filtering pre-check: is this token or address a known/verified asset?
    async fn check_known_asset(&self, token_or_address: &WalletAddress) -> Result<bool>;

    /// Is this token or address flagged (scam, phishing, exploit...)?
    ///
    /// Returns the flag label when flagged.
    async fn check_flagged_asset(&self, _token_or_address: &WalletAddress) -> Result<Option<String>> {
        Ok(None)
    }

    /// Resolve the deployer of a token from its earliest transfer
    async fn find_deployer(&self, _token: &WalletAddress) -> Result<Option<WalletAddress>> {
        Ok(None)
    }
}

#[async_trait]
impl<P: EntityDataProvider + ?Sized> EntityDataProvider for std::sync::Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn get_profile(&self, address: &WalletAddress) -> Result<WalletProfile> {
        (**self).get_profile(address).await
    }

    async fn get_outgoing_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        (**self).get_outgoing_transfers(address).await
    }

    async fn get_incoming_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        (**self).get_incoming_transfers(address).await
    }

    async fn check_known_asset(&self, token_or_address: &WalletAddress) -> Result<bool> {
        (**self).check_known_asset(token_or_address).await
    }

    async fn check_flagged_asset(&self, token_or_address: &WalletAddress) -> Result<Option<String>> {
        (**self).check_flagged_asset(token_or_address).await
    }

    async fn find_deployer(&self, token: &WalletAddress) -> Result<Option<WalletAddress>> {
        (**self).find_deployer(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn addr(s: &str) -> WalletAddress {
        WalletAddress::parse(s).unwrap()
    }

    fn edge(from: &str, to: &str) -> TransferEdge {
        TransferEdge::new(
            addr(from),
            addr(to),
            1.0,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_dispersion_stats_counts_unique_recipients() {
        let sender = addr("sender");
        let edges = vec![
            edge("sender", "a"),
            edge("sender", "a"),
            edge("sender", "b"),
            edge("sender", "sender"),
            edge("other", "c"),
        ];
        let stats = DispersionStats::from_edges(&sender, &edges);
        assert_eq!(stats.transfer_count, 3);
        assert_eq!(stats.unique_recipients, 2);
    }

    #[test]
    fn test_profile_with_outgoing() {
        let profile = WalletProfile::unknown(addr("sender"))
            .with_outgoing(&[edge("sender", "a"), edge("sender", "b")]);
        assert_eq!(profile.outgoing_transfer_count, 2);
        assert_eq!(profile.unique_recipient_count, 2);
        assert_eq!(profile.avg_transfers_per_recipient(), Some(1.0));
    }

    #[test]
    fn test_avg_without_recipients() {
        let profile = WalletProfile::unknown(addr("idle"));
        assert_eq!(profile.avg_transfers_per_recipient(), None);
    }
}
