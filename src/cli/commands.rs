//! CLI command implementations

use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::address::WalletAddress;
use crate::config::Config;
use crate::provider::{ArkhamClient, EntityDataProvider, RetryPolicy, RetryingProvider};
use crate::report;
use crate::scanner::{ScanReport, Scanner};
use crate::signals::SignalExtractor;

/// How scan targets are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Token address; the deployer is resolved first
    Token,
    /// Deployer wallet address
    Deployer,
}

/// Output format for scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Build the production provider stack (Arkham behind timeout + retry)
fn build_provider(config: &Config) -> Result<RetryingProvider<ArkhamClient>> {
    let client = ArkhamClient::new(&config.provider, config.entities.clone())
        .context("Failed to create Arkham client (set ARKHAM_API_KEY or provider.api_key)")?;
    Ok(RetryingProvider::new(
        client,
        RetryPolicy::from_config(&config.provider),
    ))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling scans");
            token.cancel();
        }
    });
}

fn parse_targets(targets: &[String]) -> Result<Vec<WalletAddress>> {
    targets
        .iter()
        .map(|t| WalletAddress::parse(t).with_context(|| format!("Invalid address: {:?}", t)))
        .collect()
}

/// Scan one or more tokens or deployers
pub async fn scan(
    config: &Config,
    targets: &[String],
    kind: TargetKind,
    format: OutputFormat,
) -> Result<()> {
    let targets = parse_targets(targets)?;
    let provider = build_provider(config)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let scanner = Scanner::new(provider, config).with_cancellation(cancel);

    info!(
        "Starting scan of {} target(s) (concurrency {})",
        targets.len(),
        config.batch.concurrency
    );

    let results = run_batch(
        &scanner,
        targets,
        kind,
        config.batch.concurrency,
        Duration::from_millis(config.batch.delay_ms),
    )
    .await;

    let mut reports = Vec::new();
    let mut failures = 0usize;
    for (target, result) in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("Error processing {}: {}", target, e);
                failures += 1;
            }
        }
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        OutputFormat::Text => {
            println!("\n=== SCAN RESULTS ===\n");
            for report in &reports {
                println!("{}", report::render_text(report));
            }
            if reports.len() > 1 {
                println!("=== SUMMARY ===\n");
                for report in &reports {
                    println!("{}", report::summary_line(report));
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} scan(s) failed", failures, failures + reports.len());
    }
    Ok(())
}

/// Scan targets with bounded concurrency, preserving input order
///
/// Every scan after the first waits `delay` before starting, to stay under
/// provider rate limits.
pub async fn run_batch<P: EntityDataProvider>(
    scanner: &Scanner<P>,
    targets: Vec<WalletAddress>,
    kind: TargetKind,
    concurrency: usize,
    delay: Duration,
) -> Vec<(WalletAddress, crate::Result<ScanReport>)> {
    stream::iter(targets.into_iter().enumerate())
        .map(|(i, target)| async move {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = scan_one(scanner, &target, kind).await;
            (target, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

async fn scan_one<P: EntityDataProvider>(
    scanner: &Scanner<P>,
    target: &WalletAddress,
    kind: TargetKind,
) -> crate::Result<ScanReport> {
    match kind {
        TargetKind::Token => scanner.scan_token(target).await,
        TargetKind::Deployer => {
            let scanned_at = Utc::now();
            let outcome = scanner.scan_at(target, scanned_at).await?;
            Ok(ScanReport {
                target: target.clone(),
                deployer: Some(target.clone()),
                scanned_at,
                outcome,
            })
        }
    }
}

/// Walk and print the funding trace of a wallet without scoring it
pub async fn trace(config: &Config, address: &str, max_hops: Option<u32>) -> Result<()> {
    let address = WalletAddress::parse(address)
        .with_context(|| format!("Invalid address: {:?}", address))?;

    let mut config = config.clone();
    if let Some(max_hops) = max_hops {
        config.scan.max_hops = max_hops;
    }

    let provider = build_provider(&config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let scanner = Scanner::new(provider, &config).with_cancellation(cancel);

    let trace = scanner.trace(&address).await?;
    let signals = SignalExtractor::new(&config.scan).extract_all(&trace, Utc::now());

    println!("\n=== FUNDING TRACE ===\n");
    for line in report::trace_log(&trace, &signals) {
        println!("{}", line);
    }
    println!("\nStop reason: {}", trace.terminal_reason);

    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
