//! Scan orchestration
//!
//! One scan: pre-check, funding trace, signal extraction, scoring. Missing
//! provider data never turns into a score; it yields
//! [`ScanOutcome::Inconclusive`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::WalletAddress;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::EntityDataProvider;
use crate::scoring::{RiskAssessment, RiskScorer};
use crate::signals::SignalExtractor;
use crate::trace::{FundingTrace, FundingTracer};

/// Result of one scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanOutcome {
    /// Scored assessment
    Assessed(RiskAssessment),
    /// Provider could not supply the data needed for a trustworthy score
    Inconclusive {
        deployer: WalletAddress,
        reason: String,
    },
}

impl ScanOutcome {
    pub fn assessment(&self) -> Option<&RiskAssessment> {
        match self {
            ScanOutcome::Assessed(assessment) => Some(assessment),
            ScanOutcome::Inconclusive { .. } => None,
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, ScanOutcome::Inconclusive { .. })
    }
}

/// Scan of one target, ready for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    /// Address given by the user (token or deployer)
    pub target: WalletAddress,
    /// Deployer wallet, when it could be resolved
    pub deployer: Option<WalletAddress>,
    pub scanned_at: DateTime<Utc>,
    pub outcome: ScanOutcome,
}

/// Runs scans against one provider
pub struct Scanner<P> {
    provider: P,
    config: Config,
    extractor: SignalExtractor,
    scorer: RiskScorer,
    cancel: CancellationToken,
}

impl<P: EntityDataProvider> Scanner<P> {
    pub fn new(provider: P, config: &Config) -> Self {
        Self {
            provider,
            config: config.clone(),
            extractor: SignalExtractor::new(&config.scan),
            scorer: RiskScorer::new(config.scoring.clone(), config.entities.clone()),
            cancel: CancellationToken::new(),
        }
    }

    /// Share a cancellation token with the caller
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Scan a deployer wallet at the current time
    pub async fn scan(&self, deployer: &WalletAddress) -> Result<ScanOutcome> {
        self.scan_at(deployer, Utc::now()).await
    }

    /// Scan a deployer wallet with a fixed scan time
    ///
    /// Runs the flagged/known pre-check on the deployer address itself, then
    /// the full trace.
    pub async fn scan_at(&self, deployer: &WalletAddress, scan_time: DateTime<Utc>) -> Result<ScanOutcome> {
        self.validate_config()?;
        info!("Scanning deployer {}", deployer);

        let outcome = match self.pre_check(deployer).await {
            Ok(Some(assessment)) => ScanOutcome::Assessed(assessment),
            Ok(None) => self.assess_deployer(deployer, scan_time).await?,
            Err(e) => inconclusive(deployer, e)?,
        };

        log_outcome(deployer, &outcome);
        Ok(outcome)
    }

    /// Scan a token: pre-check the token, resolve its deployer, scan that
    pub async fn scan_token(&self, token: &WalletAddress) -> Result<ScanReport> {
        self.scan_token_at(token, Utc::now()).await
    }

    pub async fn scan_token_at(&self, token: &WalletAddress, scan_time: DateTime<Utc>) -> Result<ScanReport> {
        self.validate_config()?;
        info!("Scanning token {}", token);

        let report = |deployer: Option<WalletAddress>, outcome: ScanOutcome| ScanReport {
            target: token.clone(),
            deployer,
            scanned_at: scan_time,
            outcome,
        };

        match self.pre_check(token).await {
            Ok(Some(assessment)) => {
                return Ok(report(None, ScanOutcome::Assessed(assessment)));
            }
            Ok(None) => {}
            Err(e) => return Ok(report(None, inconclusive(token, e)?)),
        }

        self.check_cancelled()?;
        let deployer = match self.provider.find_deployer(token).await {
            Ok(Some(deployer)) => deployer,
            Ok(None) => {
                warn!("No transfer history found for token {}", token);
                let outcome = ScanOutcome::Inconclusive {
                    deployer: token.clone(),
                    reason: "no transfer history found for token".to_string(),
                };
                return Ok(report(None, outcome));
            }
            Err(e) => {
                let outcome = inconclusive(token, e.into_unavailable(token.as_str()))?;
                return Ok(report(None, outcome));
            }
        };
        info!("Identified deployer {} for token {}", deployer, token);

        let outcome = self.assess_deployer(&deployer, scan_time).await?;
        log_outcome(&deployer, &outcome);
        Ok(report(Some(deployer), outcome))
    }

    /// Walk the funding trace only, without scoring
    pub async fn trace(&self, deployer: &WalletAddress) -> Result<FundingTrace> {
        self.validate_config()?;
        FundingTracer::new(&self.provider)
            .with_cancellation(self.cancel.clone())
            .trace(deployer, self.config.scan.max_hops)
            .await
    }

    /// Flagged takes precedence over known
    async fn pre_check(&self, address: &WalletAddress) -> Result<Option<RiskAssessment>> {
        self.check_cancelled()?;
        let flagged = self
            .provider
            .check_flagged_asset(address)
            .await
            .map_err(|e| e.into_unavailable(address.as_str()))?;
        if let Some(label) = flagged {
            info!("{} is flagged by {}: {}", address, self.provider.name(), label);
            return Ok(Some(self.scorer.flagged_asset(address, &label)));
        }

        self.check_cancelled()?;
        let known = self
            .provider
            .check_known_asset(address)
            .await
            .map_err(|e| e.into_unavailable(address.as_str()))?;
        if known {
            info!("{} is a known asset, skipping deep scan", address);
            return Ok(Some(self.scorer.known_asset(address)));
        }

        debug!("{} unknown to pre-check, tracing funding", address);
        Ok(None)
    }

    async fn assess_deployer(&self, deployer: &WalletAddress, scan_time: DateTime<Utc>) -> Result<ScanOutcome> {
        let trace = match self.trace(deployer).await {
            Ok(trace) => trace,
            Err(e) => return inconclusive(deployer, e),
        };

        let signals = self.extractor.extract_all(&trace, scan_time);
        Ok(ScanOutcome::Assessed(self.scorer.score(trace, signals)))
    }

    /// Parts of the config a scan reads
    fn validate_config(&self) -> Result<()> {
        self.config.scan.validate()?;
        self.config.scoring.validate()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// `DataUnavailable` becomes an inconclusive outcome; anything else propagates
fn inconclusive(deployer: &WalletAddress, e: Error) -> Result<ScanOutcome> {
    match e {
        Error::DataUnavailable { address, reason } => {
            warn!("Scan of {} inconclusive: no data for {}: {}", deployer, address, reason);
            Ok(ScanOutcome::Inconclusive {
                deployer: deployer.clone(),
                reason: format!("data unavailable for {}: {}", address, reason),
            })
        }
        other => Err(other),
    }
}

fn log_outcome(deployer: &WalletAddress, outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Assessed(a) => info!(
            "Deployer {} scored {} ({}) from {} factor(s)",
            deployer,
            a.score,
            a.tier,
            a.contributing_factors.len()
        ),
        ScanOutcome::Inconclusive { reason, .. } => {
            info!("Deployer {} INCONCLUSIVE: {}", deployer, reason)
        }
    }
}

/// Scan one deployer with a fresh [`Scanner`]
pub async fn scan<P: EntityDataProvider>(
    provider: P,
    deployer: &WalletAddress,
    config: &Config,
) -> Result<ScanOutcome> {
    Scanner::new(provider, config).scan(deployer).await
}
