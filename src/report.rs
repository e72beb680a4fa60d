//! Human-readable scan output

use std::fmt::Write;

use crate::scanner::{ScanOutcome, ScanReport};
use crate::signals::WalletSignals;
use crate::trace::FundingTrace;

/// Role name of a hop (`Deployer`, `Source-1`, ...)
pub fn role(hop_index: u32) -> String {
    if hop_index == 0 {
        "Deployer".to_string()
    } else {
        format!("Source-{}", hop_index)
    }
}

/// One line per hop: role, address, age and markers
pub fn trace_log(trace: &FundingTrace, signals: &[WalletSignals]) -> Vec<String> {
    trace
        .hops
        .iter()
        .zip(signals)
        .map(|(hop, s)| {
            let mut line = format!("[{}] {}", role(hop.hop_index), hop.address());
            match s.age_days {
                Some(age) => {
                    let _ = write!(line, " Age:{}d", age);
                }
                None => line.push_str(" Age:?"),
            }
            if s.is_fresh {
                line.push_str(" [FRESH]");
            }
            if s.is_known_entity {
                let label = s.entity_label.as_deref().unwrap_or("known entity");
                let _ = write!(line, " [ENTITY: {}]", label);
            } else if s.is_distributor {
                line.push_str(" [DISTRIBUTOR]");
            }
            if let Some(edge) = &hop.funding_edge {
                let _ = write!(line, " <- {} units", edge.amount);
            }
            line
        })
        .collect()
}

/// Multi-line text rendering of a report
pub fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Target:   {}", report.target);
    if let Some(deployer) = &report.deployer {
        if deployer != &report.target {
            let _ = writeln!(out, "Deployer: {}", deployer);
        }
    }
    let _ = writeln!(out, "Scanned:  {}", report.scanned_at.format("%Y-%m-%d %H:%M:%S UTC"));

    match &report.outcome {
        ScanOutcome::Inconclusive { deployer, reason } => {
            let _ = writeln!(out, "Result:   INCONCLUSIVE (no score)");
            let _ = writeln!(out, "Wallet:   {}", deployer);
            let _ = writeln!(out, "Reason:   {}", reason);
        }
        ScanOutcome::Assessed(a) => {
            let _ = writeln!(out, "Result:   {} risk, score {}/100", a.tier, a.score);
            if let Some(trace) = &a.trace {
                let _ = writeln!(out, "Funding trace (stop: {}):", trace.terminal_reason);
                for line in trace_log(trace, &a.signals) {
                    let _ = writeln!(out, "  {}", line);
                }
            }
            if a.contributing_factors.is_empty() {
                let _ = writeln!(out, "Flags:    none");
            } else {
                let _ = writeln!(out, "Flags:");
                for factor in &a.contributing_factors {
                    let _ = writeln!(out, "  - {}", factor);
                }
            }
        }
    }
    out
}

/// One-line summary for batch output
pub fn summary_line(report: &ScanReport) -> String {
    match &report.outcome {
        ScanOutcome::Assessed(a) => format!("{}  {:>3}  {}", report.target, a.score, a.tier),
        ScanOutcome::Inconclusive { .. } => format!("{}  ---  INCONCLUSIVE", report.target),
    }
}
