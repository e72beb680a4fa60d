//! Per-wallet risk signals
//!
//! Pure functions of a profile and the scan time:
//! - Wallet age and freshness
//! - Dispersion (many recipients, few transfers each)
//! - Known-entity labels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::WalletAddress;
use crate::config::ScanConfig;
use crate::provider::WalletProfile;
use crate::trace::FundingTrace;

/// Signals derived from one wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSignals {
    pub address: WalletAddress,
    /// Whole days since creation; `None` when the provider has no creation time
    pub age_days: Option<i64>,
    /// Younger than the freshness threshold (unknown age is never fresh)
    pub is_fresh: bool,
    /// Fans out to many recipients with little activity each
    pub is_distributor: bool,
    pub is_known_entity: bool,
    pub entity_label: Option<String>,
}

impl WalletSignals {
    /// Age could not be determined
    pub fn age_unknown(&self) -> bool {
        self.age_days.is_none()
    }
}

/// Turns wallet profiles into signals using the scan thresholds
#[derive(Debug, Clone)]
pub struct SignalExtractor {
    freshness_threshold_days: i64,
    fan_out_threshold: u32,
    low_activity_threshold: f64,
    distributor_exempt_age_days: Option<i64>,
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl SignalExtractor {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            freshness_threshold_days: config.freshness_threshold_days,
            fan_out_threshold: config.fan_out_threshold,
            low_activity_threshold: config.low_activity_threshold,
            distributor_exempt_age_days: config.distributor_exempt_age_days,
        }
    }

    pub fn extract(&self, profile: &WalletProfile, scan_time: DateTime<Utc>) -> WalletSignals {
        // A creation time after the scan time counts as age 0
        let age_days = profile
            .creation_timestamp
            .map(|created| (scan_time - created).num_days().max(0));

        let is_fresh = age_days.is_some_and(|age| age < self.freshness_threshold_days);

        WalletSignals {
            address: profile.address.clone(),
            age_days,
            is_fresh,
            is_distributor: self.is_distributor(profile, age_days),
            is_known_entity: profile.is_known_entity,
            entity_label: profile.entity_label.clone(),
        }
    }

    /// Signals for every hop, in hop order
    pub fn extract_all(&self, trace: &FundingTrace, scan_time: DateTime<Utc>) -> Vec<WalletSignals> {
        trace
            .hops
            .iter()
            .map(|hop| self.extract(&hop.profile, scan_time))
            .collect()
    }

    fn is_distributor(&self, profile: &WalletProfile, age_days: Option<i64>) -> bool {
        // Exchange hot wallets fan out by nature
        if profile.is_known_entity {
            return false;
        }

        if let (Some(exempt), Some(age)) = (self.distributor_exempt_age_days, age_days) {
            if age > exempt {
                return false;
            }
        }

        if profile.unique_recipient_count <= self.fan_out_threshold {
            return false;
        }

        profile
            .avg_transfers_per_recipient()
            .is_some_and(|avg| avg < self.low_activity_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn scan_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn profile(address: &str) -> WalletProfile {
        WalletProfile::unknown(WalletAddress::parse(address).unwrap())
    }

    fn fan_out(mut profile: WalletProfile, transfers: u32, recipients: u32) -> WalletProfile {
        profile.outgoing_transfer_count = transfers;
        profile.unique_recipient_count = recipients;
        profile
    }

    #[test]
    fn test_age_and_freshness() {
        let extractor = SignalExtractor::default();

        let young = profile("young").created_at(scan_time() - Duration::days(29));
        let signals = extractor.extract(&young, scan_time());
        assert_eq!(signals.age_days, Some(29));
        assert!(signals.is_fresh);

        let boundary = profile("boundary").created_at(scan_time() - Duration::days(30));
        assert!(!extractor.extract(&boundary, scan_time()).is_fresh);
    }

    #[test]
    fn test_partial_days_round_down() {
        let extractor = SignalExtractor::default();
        let p = profile("p").created_at(scan_time() - Duration::hours(47));
        assert_eq!(extractor.extract(&p, scan_time()).age_days, Some(1));
    }

    #[test]
    fn test_unknown_age_is_not_fresh() {
        let signals = SignalExtractor::default().extract(&profile("unknown"), scan_time());
        assert_eq!(signals.age_days, None);
        assert!(signals.age_unknown());
        assert!(!signals.is_fresh);
    }

    #[test]
    fn test_future_creation_clamped_to_zero() {
        let p = profile("future").created_at(scan_time() + Duration::days(3));
        let signals = SignalExtractor::default().extract(&p, scan_time());
        assert_eq!(signals.age_days, Some(0));
        assert!(signals.is_fresh);
    }

    #[test]
    fn test_distributor_thresholds() {
        let extractor = SignalExtractor::default();

        // 60 recipients, 1.5 transfers each
        let burner_funder = fan_out(profile("funder"), 90, 60);
        assert!(extractor.extract(&burner_funder, scan_time()).is_distributor);

        // exactly at the fan-out threshold is not enough
        let at_threshold = fan_out(profile("edge"), 50, 50);
        assert!(!extractor.extract(&at_threshold, scan_time()).is_distributor);

        // busy relationships: 3 transfers per recipient
        let active = fan_out(profile("active"), 180, 60);
        assert!(!extractor.extract(&active, scan_time()).is_distributor);
    }

    #[test]
    fn test_known_entity_never_distributor() {
        let hot_wallet = fan_out(profile("hot").known_entity("Kraken"), 1000, 900);
        let signals = SignalExtractor::default().extract(&hot_wallet, scan_time());
        assert!(!signals.is_distributor);
        assert!(signals.is_known_entity);
        assert_eq!(signals.entity_label.as_deref(), Some("Kraken"));
    }

    #[test]
    fn test_old_wallets_exempt_when_configured() {
        let config = ScanConfig {
            distributor_exempt_age_days: Some(365),
            ..ScanConfig::default()
        };
        let extractor = SignalExtractor::new(&config);

        let old = fan_out(
            profile("old").created_at(scan_time() - Duration::days(800)),
            90,
            60,
        );
        assert!(!extractor.extract(&old, scan_time()).is_distributor);

        let unknown_age = fan_out(profile("unknown"), 90, 60);
        assert!(extractor.extract(&unknown_age, scan_time()).is_distributor);
    }
}
