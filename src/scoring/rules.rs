//! Rule table for the risk cascade
//!
//! Each rule is a predicate, a weight and a factor label over the same
//! [`RuleContext`]. Rules run in table order; the order is also the order of
//! the contributing factors in the assessment.

use serde::Serialize;

use crate::config::EntityConfig;
use crate::scoring::ScoringWeights;
use crate::signals::WalletSignals;
use crate::trace::{FundingTrace, TerminalReason};

/// Identifies a rule in the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    FreshDeployer,
    FreshFunder,
    OpaqueFunding,
    Distributor,
    TrustedExchangeDiscount,
    UnknownAge,
}

/// Everything a rule may look at
pub struct RuleContext<'a> {
    pub trace: &'a FundingTrace,
    /// One entry per hop, deployer first
    pub signals: &'a [WalletSignals],
    pub weights: &'a ScoringWeights,
    pub entities: &'a EntityConfig,
}

impl<'a> RuleContext<'a> {
    fn deployer(&self) -> Option<&'a WalletSignals> {
        self.signals.first()
    }

    fn funder(&self) -> Option<&'a WalletSignals> {
        self.signals.get(1)
    }

    /// Hop indexes flagged as distributors
    fn distributor_hops(&self) -> Vec<usize> {
        self.signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_distributor)
            .map(|(i, _)| i)
            .collect()
    }

    /// Non-entity hops whose age could not be determined
    fn unknown_age_hops(&self) -> u32 {
        self.signals
            .iter()
            .filter(|s| s.age_unknown() && !s.is_known_entity)
            .count() as u32
    }

    fn trusted_exchange(&self) -> Option<&'a str> {
        self.trace
            .resolved_entity_label()
            .filter(|label| self.entities.is_trusted_exchange(label))
    }
}

/// One entry of the cascade
pub struct Rule {
    pub kind: RuleKind,
    pub applies: fn(&RuleContext) -> bool,
    /// Signed contribution when the rule fires
    pub weight: fn(&RuleContext) -> i64,
    pub factor: fn(&RuleContext) -> String,
}

/// The cascade, in evaluation order
pub static RULES: &[Rule] = &[
    Rule {
        kind: RuleKind::FreshDeployer,
        applies: |ctx| ctx.deployer().is_some_and(|s| s.is_fresh),
        weight: |ctx| i64::from(ctx.weights.fresh_deployer),
        factor: |ctx| {
            format!(
                "Deployer is a fresh wallet ({} days old)",
                ctx.deployer().and_then(|s| s.age_days).unwrap_or(0)
            )
        },
    },
    Rule {
        kind: RuleKind::FreshFunder,
        applies: |ctx| ctx.funder().is_some_and(|s| s.is_fresh && !s.is_known_entity),
        weight: |ctx| i64::from(ctx.weights.fresh_funder),
        factor: |ctx| match ctx.funder() {
            Some(s) => format!(
                "Direct funder {} is a fresh wallet ({} days old)",
                s.address.short(),
                s.age_days.unwrap_or(0)
            ),
            None => "Direct funder is a fresh wallet".to_string(),
        },
    },
    Rule {
        kind: RuleKind::OpaqueFunding,
        applies: |ctx| ctx.trace.terminal_reason.is_opaque(),
        weight: |ctx| i64::from(ctx.weights.opaque_funding),
        factor: |ctx| match ctx.trace.terminal_reason {
            TerminalReason::Cycle => "Funding loops back on itself (CYCLE)".to_string(),
            reason => format!("Funding source untraceable ({})", reason),
        },
    },
    Rule {
        kind: RuleKind::Distributor,
        applies: |ctx| ctx.signals.iter().any(|s| s.is_distributor),
        weight: |ctx| i64::from(ctx.weights.distributor),
        factor: |ctx| {
            let hops: Vec<String> = ctx
                .distributor_hops()
                .iter()
                .map(|i| i.to_string())
                .collect();
            format!("Distributor pattern at hop {}", hops.join(", "))
        },
    },
    Rule {
        kind: RuleKind::TrustedExchangeDiscount,
        applies: |ctx| ctx.trusted_exchange().is_some(),
        weight: |ctx| -(i64::from(ctx.weights.trusted_exchange_discount)),
        factor: |ctx| {
            format!(
                "Funding resolved to trusted exchange: {}",
                ctx.trusted_exchange().unwrap_or("unknown")
            )
        },
    },
    Rule {
        kind: RuleKind::UnknownAge,
        applies: |ctx| ctx.unknown_age_hops() > 0,
        weight: |ctx| {
            let raw = ctx
                .unknown_age_hops()
                .saturating_mul(ctx.weights.unknown_age_per_hop);
            i64::from(raw.min(ctx.weights.unknown_age_cap))
        },
        factor: |ctx| format!("Wallet age unknown at {} hop(s)", ctx.unknown_age_hops()),
    },
];

/// A rule that fired with its contribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredRule {
    pub kind: RuleKind,
    pub weight: i64,
    pub factor: String,
}

/// Run the cascade
///
/// Returns the total, floored at 0 after every negative contribution and
/// clamped to 100, plus the fired rules in table order.
pub fn evaluate(ctx: &RuleContext) -> (u8, Vec<FiredRule>) {
    let mut total: i64 = 0;
    let mut fired = Vec::new();

    for rule in RULES {
        if !(rule.applies)(ctx) {
            continue;
        }
        let weight = (rule.weight)(ctx);
        total += weight;
        if weight < 0 {
            total = total.max(0);
        }
        fired.push(FiredRule {
            kind: rule.kind,
            weight,
            factor: (rule.factor)(ctx),
        });
    }

    (total.clamp(0, 100) as u8, fired)
}
