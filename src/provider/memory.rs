//! In-memory entity data provider
//!
//! Holds a fixed set of profiles and transfers. Used to exercise the tracer and
//! scorer without network access, and supports injected failures to test the
//! retry and inconclusive paths.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::address::WalletAddress;
use crate::error::{Error, Result};
use crate::provider::{EntityDataProvider, TransferEdge, WalletProfile};

/// Kind of failure to inject for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Retryable provider error
    Transient,
    /// Provider timeout
    Timeout,
    /// Non-retryable API error
    Permanent,
}

#[derive(Debug, Clone)]
struct FailurePlan {
    kind: InjectedFailure,
    /// Remaining failing calls; `None` fails forever
    remaining: Option<u32>,
}

/// Fixed-data provider
#[derive(Default)]
pub struct InMemoryProvider {
    profiles: HashMap<WalletAddress, WalletProfile>,
    transfers: Vec<TransferEdge>,
    known_assets: HashSet<WalletAddress>,
    flagged_assets: HashMap<WalletAddress, String>,
    deployers: HashMap<WalletAddress, WalletAddress>,
    failures: Mutex<HashMap<WalletAddress, FailurePlan>>,
    calls: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wallet profile
    pub fn with_profile(mut self, profile: WalletProfile) -> Self {
        self.profiles.insert(profile.address.clone(), profile);
        self
    }

    /// Register a transfer
    pub fn with_transfer(mut self, edge: TransferEdge) -> Self {
        self.transfers.push(edge);
        self
    }

    /// Mark a token or address as a known/verified asset
    pub fn with_known_asset(mut self, address: WalletAddress) -> Self {
        self.known_assets.insert(address);
        self
    }

    /// Mark a token or address as flagged with a label
    pub fn with_flagged_asset(mut self, address: WalletAddress, label: impl Into<String>) -> Self {
        self.flagged_assets.insert(address, label.into());
        self
    }

    /// Record the deployer of a token
    pub fn with_deployer(mut self, token: WalletAddress, deployer: WalletAddress) -> Self {
        self.deployers.insert(token, deployer);
        self
    }

    /// Fail every call touching `address` the next `times` calls (`None` = always)
    pub fn with_failure(mut self, address: WalletAddress, kind: InjectedFailure, times: Option<u32>) -> Self {
        if let Ok(failures) = self.failures.get_mut() {
            failures.insert(address, FailurePlan { kind, remaining: times });
        }
        self
    }

    /// Total number of provider calls served (including failed ones)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self, address: &WalletAddress) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut failures = self
            .failures
            .lock()
            .map_err(|_| Error::Provider("failure table poisoned".to_string()))?;

        let Some(plan) = failures.get_mut(address) else {
            return Ok(());
        };

        match plan.remaining {
            Some(0) => return Ok(()),
            Some(ref mut n) => *n -= 1,
            None => {}
        }

        Err(match plan.kind {
            InjectedFailure::Transient => Error::Provider(format!("injected failure for {}", address)),
            InjectedFailure::Timeout => Error::ProviderTimeout(0),
            InjectedFailure::Permanent => Error::Api {
                status: 400,
                body: format!("injected failure for {}", address),
            },
        })
    }
}

#[async_trait]
impl EntityDataProvider for InMemoryProvider {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn get_profile(&self, address: &WalletAddress) -> Result<WalletProfile> {
        self.record_call(address)?;
        self.profiles.get(address).cloned().ok_or_else(|| Error::Api {
            status: 404,
            body: format!("unknown address {}", address),
        })
    }

    async fn get_outgoing_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        self.record_call(address)?;
        Ok(self
            .transfers
            .iter()
            .filter(|e| &e.from_address == address)
            .cloned()
            .collect())
    }

    async fn get_incoming_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        self.record_call(address)?;
        Ok(self
            .transfers
            .iter()
            .filter(|e| &e.to_address == address)
            .cloned()
            .collect())
    }

    async fn check_known_asset(&self, token_or_address: &WalletAddress) -> Result<bool> {
        self.record_call(token_or_address)?;
        Ok(self.known_assets.contains(token_or_address))
    }

    async fn check_flagged_asset(&self, token_or_address: &WalletAddress) -> Result<Option<String>> {
        self.record_call(token_or_address)?;
        Ok(self.flagged_assets.get(token_or_address).cloned())
    }

    async fn find_deployer(&self, token: &WalletAddress) -> Result<Option<WalletAddress>> {
        self.record_call(token)?;
        Ok(self.deployers.get(token).cloned())
    }
}
