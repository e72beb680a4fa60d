//! Rug Scanner Library
//!
//! Estimates rug-pull risk for a token by tracing the funding history of its
//! deployer wallet through a chain-intelligence provider and scoring the
//! result with a fixed rule cascade.

pub mod address;
pub mod cli;
pub mod config;
pub mod error;
pub mod provider;
pub mod report;
pub mod scanner;
pub mod scoring;
pub mod signals;
pub mod trace;

// Re-export commonly used types
pub use address::WalletAddress;
pub use config::Config;
pub use error::{Error, Result};
pub use provider::{EntityDataProvider, TransferEdge, WalletProfile};
pub use scanner::{scan, ScanOutcome, ScanReport, Scanner};
pub use scoring::{RiskAssessment, RiskScorer, RiskTier};
pub use signals::{SignalExtractor, WalletSignals};
pub use trace::{FundingTrace, FundingTracer, TerminalReason};
