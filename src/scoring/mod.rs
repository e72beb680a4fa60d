//! Risk scoring
//!
//! Aggregates per-hop signals into a 0-100 score and a tier. The normal path
//! runs the rule cascade in [`rules`]; the pre-check paths (known or flagged
//! assets) short-circuit with a fixed score and a single factor.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::WalletAddress;
use crate::config::EntityConfig;
use crate::error::{Error, Result};
use crate::signals::WalletSignals;
use crate::trace::FundingTrace;

pub mod rules;

pub use rules::{FiredRule, RuleKind};

/// Risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "LOW"),
            RiskTier::Medium => write!(f, "MEDIUM"),
            RiskTier::High => write!(f, "HIGH"),
        }
    }
}

/// Which path produced an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentBasis {
    /// Full trace and rule cascade
    RuleCascade,
    /// Pre-check matched a known/verified asset
    KnownAssetOverride,
    /// Pre-check matched a flagged asset
    FlaggedAssetOverride,
}

/// Final risk assessment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    /// 0 (safe) to 100 (high risk)
    pub score: u8,
    pub tier: RiskTier,
    /// Funding walk; `None` on the pre-check paths
    pub trace: Option<FundingTrace>,
    /// One entry per hop, deployer first
    pub signals: Vec<WalletSignals>,
    /// One line per fired rule, in rule order
    pub contributing_factors: Vec<String>,
    pub basis: AssessmentBasis,
}

/// Rule weights (all non-negative; the discount is subtracted)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_fresh_deployer")]
    pub fresh_deployer: u32,
    #[serde(default = "default_fresh_funder")]
    pub fresh_funder: u32,
    #[serde(default = "default_opaque_funding")]
    pub opaque_funding: u32,
    #[serde(default = "default_distributor")]
    pub distributor: u32,
    #[serde(default = "default_trusted_exchange_discount")]
    pub trusted_exchange_discount: u32,
    #[serde(default = "default_unknown_age_per_hop")]
    pub unknown_age_per_hop: u32,
    #[serde(default = "default_unknown_age_cap")]
    pub unknown_age_cap: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            fresh_deployer: default_fresh_deployer(),
            fresh_funder: default_fresh_funder(),
            opaque_funding: default_opaque_funding(),
            distributor: default_distributor(),
            trusted_exchange_discount: default_trusted_exchange_discount(),
            unknown_age_per_hop: default_unknown_age_per_hop(),
            unknown_age_cap: default_unknown_age_cap(),
        }
    }
}

impl ScoringWeights {
    fn validate(&self) -> Result<()> {
        let weights = [
            ("fresh_deployer", self.fresh_deployer),
            ("fresh_funder", self.fresh_funder),
            ("opaque_funding", self.opaque_funding),
            ("distributor", self.distributor),
            ("trusted_exchange_discount", self.trusted_exchange_discount),
            ("unknown_age_per_hop", self.unknown_age_per_hop),
            ("unknown_age_cap", self.unknown_age_cap),
        ];
        for (name, value) in weights {
            if value > 100 {
                return Err(Error::Config(format!(
                    "scoring.weights.{} must be at most 100, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Lower bounds (inclusive) of the MEDIUM and HIGH tiers
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_high_threshold")]
    pub high: u8,
    #[serde(default = "default_medium_threshold")]
    pub medium: u8,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high: default_high_threshold(),
            medium: default_medium_threshold(),
        }
    }
}

impl TierThresholds {
    pub fn tier_for(&self, score: u8) -> RiskTier {
        if score >= self.high {
            RiskTier::High
        } else if score >= self.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub tiers: TierThresholds,
    /// Score for assets the pre-check recognizes as known/verified
    #[serde(default)]
    pub known_asset_score: u8,
    /// Score for assets the provider flags (scam, phishing...)
    #[serde(default = "default_flagged_asset_score")]
    pub flagged_asset_score: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            tiers: TierThresholds::default(),
            known_asset_score: 0,
            flagged_asset_score: default_flagged_asset_score(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;

        if self.tiers.high > 100 {
            return Err(Error::Config(format!(
                "scoring.tiers.high must be at most 100, got {}",
                self.tiers.high
            )));
        }
        if self.tiers.medium > self.tiers.high {
            return Err(Error::Config(format!(
                "scoring.tiers.medium ({}) must not exceed scoring.tiers.high ({})",
                self.tiers.medium, self.tiers.high
            )));
        }
        if self.known_asset_score > 100 || self.flagged_asset_score > 100 {
            return Err(Error::Config(
                "pre-check scores must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_fresh_deployer() -> u32 {
    50
}

fn default_fresh_funder() -> u32 {
    30
}

fn default_opaque_funding() -> u32 {
    20
}

fn default_distributor() -> u32 {
    15
}

fn default_trusted_exchange_discount() -> u32 {
    40
}

fn default_unknown_age_per_hop() -> u32 {
    10
}

fn default_unknown_age_cap() -> u32 {
    20
}

fn default_high_threshold() -> u8 {
    70
}

fn default_medium_threshold() -> u8 {
    30
}

fn default_flagged_asset_score() -> u8 {
    100
}

/// Turns traces and signals into assessments
#[derive(Debug, Clone)]
pub struct RiskScorer {
    config: ScoringConfig,
    entities: EntityConfig,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), EntityConfig::default())
    }
}

impl RiskScorer {
    pub fn new(config: ScoringConfig, entities: EntityConfig) -> Self {
        Self { config, entities }
    }

    /// Run the rule cascade over a completed trace
    ///
    /// `signals[i]` must describe `trace.hops[i]`.
    pub fn score(&self, trace: FundingTrace, signals: Vec<WalletSignals>) -> RiskAssessment {
        let ctx = rules::RuleContext {
            trace: &trace,
            signals: &signals,
            weights: &self.config.weights,
            entities: &self.entities,
        };
        let (score, fired) = rules::evaluate(&ctx);

        let contributing_factors = fired
            .into_iter()
            .map(|rule| format!("{} ({:+})", rule.factor, rule.weight))
            .collect();

        RiskAssessment {
            score,
            tier: self.config.tiers.tier_for(score),
            trace: Some(trace),
            signals,
            contributing_factors,
            basis: AssessmentBasis::RuleCascade,
        }
    }

    /// Short-circuit for a known/verified asset
    pub fn known_asset(&self, address: &WalletAddress) -> RiskAssessment {
        self.override_assessment(
            self.config.known_asset_score,
            format!("Pre-check: {} is a known/verified asset", address),
            AssessmentBasis::KnownAssetOverride,
        )
    }

    /// Short-circuit for an asset the provider flags
    pub fn flagged_asset(&self, address: &WalletAddress, label: &str) -> RiskAssessment {
        self.override_assessment(
            self.config.flagged_asset_score,
            format!("Pre-check: {} is flagged by the provider ({})", address, label),
            AssessmentBasis::FlaggedAssetOverride,
        )
    }

    fn override_assessment(&self, score: u8, factor: String, basis: AssessmentBasis) -> RiskAssessment {
        let score = score.min(100);
        RiskAssessment {
            score,
            tier: self.config.tiers.tier_for(score),
            trace: None,
            signals: Vec::new(),
            contributing_factors: vec![factor],
            basis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WalletProfile;
    use crate::trace::{TerminalReason, TraceHop};

    fn addr(s: &str) -> WalletAddress {
        WalletAddress::parse(s).unwrap()
    }

    fn single_hop(reason: TerminalReason) -> FundingTrace {
        FundingTrace {
            hops: vec![TraceHop {
                hop_index: 0,
                profile: WalletProfile::unknown(addr("deployer")),
                funding_edge: None,
            }],
            terminal_reason: reason,
        }
    }

    fn aged(address: &str, age: i64, fresh: bool) -> WalletSignals {
        WalletSignals {
            address: addr(address),
            age_days: Some(age),
            is_fresh: fresh,
            is_distributor: false,
            is_known_entity: false,
            entity_label: None,
        }
    }

    #[test]
    fn test_tier_bands_inclusive_lower_edges() {
        let tiers = TierThresholds::default();
        assert_eq!(tiers.tier_for(0), RiskTier::Low);
        assert_eq!(tiers.tier_for(29), RiskTier::Low);
        assert_eq!(tiers.tier_for(30), RiskTier::Medium);
        assert_eq!(tiers.tier_for(69), RiskTier::Medium);
        assert_eq!(tiers.tier_for(70), RiskTier::High);
        assert_eq!(tiers.tier_for(100), RiskTier::High);
    }

    #[test]
    fn test_dead_end_alone_scores_twenty() {
        let scorer = RiskScorer::default();
        let assessment = scorer.score(
            single_hop(TerminalReason::DeadEnd),
            vec![aged("deployer", 400, false)],
        );
        assert_eq!(assessment.score, 20);
        assert_eq!(assessment.tier, RiskTier::Low);
        assert_eq!(assessment.contributing_factors.len(), 1);
        assert!(assessment.contributing_factors[0].contains("DEAD_END"));
        assert!(assessment.contributing_factors[0].ends_with("(+20)"));
        assert_eq!(assessment.basis, AssessmentBasis::RuleCascade);
    }

    #[test]
    fn test_score_clamped_to_hundred() {
        let weights = ScoringWeights {
            fresh_deployer: 100,
            opaque_funding: 100,
            ..ScoringWeights::default()
        };
        let scorer = RiskScorer::new(
            ScoringConfig {
                weights,
                ..ScoringConfig::default()
            },
            EntityConfig::default(),
        );
        let mut deployer = aged("deployer", 1, true);
        deployer.is_distributor = true;
        let assessment = scorer.score(single_hop(TerminalReason::Cycle), vec![deployer]);
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.tier, RiskTier::High);
        assert_eq!(assessment.contributing_factors.len(), 3);
    }

    #[test]
    fn test_known_asset_override() {
        let assessment = RiskScorer::default().known_asset(&addr("token"));
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.tier, RiskTier::Low);
        assert!(assessment.trace.is_none());
        assert_eq!(assessment.contributing_factors.len(), 1);
        assert_eq!(assessment.basis, AssessmentBasis::KnownAssetOverride);
    }

    #[test]
    fn test_flagged_asset_override() {
        let assessment = RiskScorer::default().flagged_asset(&addr("token"), "Phishing Drainer");
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.tier, RiskTier::High);
        assert!(assessment.contributing_factors[0].contains("Phishing Drainer"));
        assert_eq!(assessment.basis, AssessmentBasis::FlaggedAssetOverride);
    }

    #[test]
    fn test_config_validation() {
        assert!(ScoringConfig::default().validate().is_ok());

        let inverted = ScoringConfig {
            tiers: TierThresholds { high: 30, medium: 70 },
            ..ScoringConfig::default()
        };
        assert!(matches!(inverted.validate(), Err(Error::Config(_))));

        let heavy = ScoringConfig {
            weights: ScoringWeights {
                distributor: 150,
                ..ScoringWeights::default()
            },
            ..ScoringConfig::default()
        };
        assert!(heavy.validate().is_err());
    }

    #[test]
    fn test_tier_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&RiskTier::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(RiskTier::High.to_string(), "HIGH");
    }
}
