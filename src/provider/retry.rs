//! Timeout and bounded retry around a provider
//!
//! Every call is wrapped in `tokio::time::timeout`. Transient failures
//! (`Error::is_retryable`) are retried with exponential backoff up to
//! `max_retries` extra attempts; anything left over surfaces as
//! `Error::DataUnavailable`. Input, config and cancellation errors pass
//! through unchanged.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::address::WalletAddress;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::provider::{EntityDataProvider, TransferEdge, WalletProfile};

/// Timeout and retry settings
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// First backoff interval
    pub base_delay: Duration,
    /// Backoff interval ceiling
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    /// Build from provider configuration
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_base_delay_ms.saturating_mul(4)),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.base_delay,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Provider wrapper adding timeout and bounded retry
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: EntityDataProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrapped provider
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Run one provider operation under the policy
    async fn call<T, F, Fut>(&self, op: &'static str, address: &WalletAddress, f: F) -> Result<T>
    where
        T: Send,
        F: Fn() -> Fut + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let attempts = AtomicU32::new(0);
        let timeout = self.policy.timeout;
        let max_retries = self.policy.max_retries;
        let provider = self.inner.name();

        let attempts_ref = &attempts;
        let f_ref = &f;

        let outcome = retry(self.policy.backoff(), move || async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst);
            let result = match tokio::time::timeout(timeout, f_ref()).await {
                Ok(result) => result,
                Err(_) => Err(Error::ProviderTimeout(timeout.as_millis() as u64)),
            };

            match result {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!(
                        "{} {} failed for {} (attempt {}/{}): {}",
                        provider,
                        op,
                        address,
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await;

        outcome.map_err(|e| {
            debug!(
                "{} {} gave up on {} after {} attempt(s): {}",
                provider,
                op,
                address,
                attempts.load(Ordering::SeqCst),
                e
            );
            e.into_unavailable(address.as_str())
        })
    }
}

#[async_trait]
impl<P: EntityDataProvider> EntityDataProvider for RetryingProvider<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_profile(&self, address: &WalletAddress) -> Result<WalletProfile> {
        self.call("get_profile", address, || self.inner.get_profile(address))
            .await
    }

    async fn get_outgoing_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        self.call("get_outgoing_transfers", address, || {
            self.inner.get_outgoing_transfers(address)
        })
        .await
    }

    async fn get_incoming_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        self.call("get_incoming_transfers", address, || {
            self.inner.get_incoming_transfers(address)
        })
        .await
    }

    async fn check_known_asset(&self, token_or_address: &WalletAddress) -> Result<bool> {
        self.call("check_known_asset", token_or_address, || {
            self.inner.check_known_asset(token_or_address)
        })
        .await
    }

    async fn check_flagged_asset(&self, token_or_address: &WalletAddress) -> Result<Option<String>> {
        self.call("check_flagged_asset", token_or_address, || {
            self.inner.check_flagged_asset(token_or_address)
        })
        .await
    }

    async fn find_deployer(&self, token: &WalletAddress) -> Result<Option<WalletAddress>> {
        self.call("find_deployer", token, || self.inner.find_deployer(token))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{InMemoryProvider, InjectedFailure};
    use std::sync::Arc;
    use tokio_test::assert_ok;

    fn addr(s: &str) -> WalletAddress {
        WalletAddress::parse(s).unwrap()
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_budget() {
        let inner = Arc::new(
            InMemoryProvider::new()
                .with_profile(WalletProfile::unknown(addr("flaky")))
                .with_failure(addr("flaky"), InjectedFailure::Transient, Some(2)),
        );
        let provider = RetryingProvider::new(inner.clone(), fast_policy(2));

        let profile = provider.get_profile(&addr("flaky")).await;
        assert_ok!(profile);
        assert_eq!(inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_data_unavailable() {
        let inner = Arc::new(
            InMemoryProvider::new()
                .with_profile(WalletProfile::unknown(addr("down")))
                .with_failure(addr("down"), InjectedFailure::Timeout, None),
        );
        let provider = RetryingProvider::new(inner.clone(), fast_policy(2));

        let err = provider.get_profile(&addr("down")).await.unwrap_err();
        assert!(matches!(err, Error::DataUnavailable { ref address, .. } if address == "down"));
        // 1 attempt + 2 retries
        assert_eq!(inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let inner = Arc::new(
            InMemoryProvider::new()
                .with_profile(WalletProfile::unknown(addr("bad")))
                .with_failure(addr("bad"), InjectedFailure::Permanent, None),
        );
        let provider = RetryingProvider::new(inner.clone(), fast_policy(2));

        let err = provider.get_profile(&addr("bad")).await.unwrap_err();
        assert!(err.is_inconclusive());
        assert_eq!(inner.call_count(), 1);
    }

    /// Rejects every address as malformed
    #[derive(Default)]
    struct RejectingProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EntityDataProvider for RejectingProvider {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        async fn get_profile(&self, _address: &WalletAddress) -> Result<WalletProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidInput("malformed".to_string()))
        }

        async fn get_outgoing_transfers(&self, _address: &WalletAddress) -> Result<Vec<TransferEdge>> {
            Ok(Vec::new())
        }

        async fn get_incoming_transfers(&self, _address: &WalletAddress) -> Result<Vec<TransferEdge>> {
            Ok(Vec::new())
        }

        async fn check_known_asset(&self, _token_or_address: &WalletAddress) -> Result<bool> {
            Err(Error::Config("no chain configured".to_string()))
        }
    }

    #[tokio::test]
    async fn test_input_and_config_errors_pass_through() {
        let inner = Arc::new(RejectingProvider::default());
        let provider = RetryingProvider::new(inner.clone(), fast_policy(2));

        let err = provider.get_profile(&addr("wallet")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg == "malformed"));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let err = provider.check_known_asset(&addr("wallet")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    struct SlowProvider;

    #[async_trait]
    impl EntityDataProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn get_profile(&self, address: &WalletAddress) -> Result<WalletProfile> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(WalletProfile::unknown(address.clone()))
        }

        async fn get_outgoing_transfers(&self, _address: &WalletAddress) -> Result<Vec<TransferEdge>> {
            Ok(Vec::new())
        }

        async fn get_incoming_transfers(&self, _address: &WalletAddress) -> Result<Vec<TransferEdge>> {
            Ok(Vec::new())
        }

        async fn check_known_asset(&self, _token_or_address: &WalletAddress) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_timeout_enforced() {
        let provider = RetryingProvider::new(
            SlowProvider,
            RetryPolicy {
                timeout: Duration::from_millis(20),
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
        );

        let err = provider.get_profile(&addr("slow")).await.unwrap_err();
        match err {
            Error::DataUnavailable { reason, .. } => assert!(reason.contains("timeout")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_policy_from_config() {
        let config = ProviderConfig {
            timeout_ms: 1500,
            max_retries: 3,
            retry_base_delay_ms: 250,
            ..ProviderConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.timeout, Duration::from_millis(1500));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_delay, Duration::from_millis(1000));
    }
}
