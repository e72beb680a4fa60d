//! Arkham Intelligence API client
//!
//! Provides:
//! - Entity and label lookup (`/intelligence/address/{address}`)
//! - Transfer history by direction (`/transfers`)
//! - First-activity fallback (`/history/address/{address}`)

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::address::WalletAddress;
use crate::config::{EntityConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::provider::{EntityDataProvider, TransferEdge, WalletProfile};

/// Arkham REST client
pub struct ArkhamClient {
    /// HTTP client
    client: Client,
    /// API key sent in the `API-Key` header
    api_key: String,
    base_url: String,
    chain: String,
    page_limit: u32,
    /// Request timeout
    timeout: Duration,
    entities: EntityConfig,
    cache: ResponseCache,
}

/// Successful lookups kept for the lifetime of the client
///
/// The pre-check asks for flagged and known status of the same address, and
/// the tracer asks for the incoming page that `get_profile` already fetched.
#[derive(Default)]
struct ResponseCache {
    intelligence: DashMap<WalletAddress, ArkhamIntelligence>,
    incoming: DashMap<WalletAddress, Vec<ArkhamTransfer>>,
}

/// Return the cached value for `address`, or fetch and remember it
///
/// Failures are not cached.
async fn cached<T, F, Fut>(map: &DashMap<WalletAddress, T>, address: &WalletAddress, fetch: F) -> Result<T>
where
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let hit = map.get(address).map(|entry| entry.value().clone());
    if let Some(value) = hit {
        debug!("Arkham cache hit for {}", address);
        return Ok(value);
    }
    let value = fetch().await?;
    map.insert(address.clone(), value.clone());
    Ok(value)
}

/// Which side of a transfer the queried address is on
#[derive(Debug, Clone, Copy)]
enum TransferQuery {
    Incoming,
    Outgoing,
    /// Either side, used for token transfer history
    Any,
}

impl TransferQuery {
    fn param(self) -> &'static str {
        match self {
            TransferQuery::Incoming => "to",
            TransferQuery::Outgoing => "from",
            TransferQuery::Any => "base",
        }
    }
}

impl ArkhamClient {
    /// Create a new Arkham client
    pub fn new(config: &ProviderConfig, entities: EntityConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::MissingEnvVar("ARKHAM_API_KEY".to_string()));
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chain: config.chain.clone(),
            page_limit: config.page_limit,
            timeout,
            entities,
            cache: ResponseCache::default(),
        })
    }

    /// GET an endpoint and decode the JSON body
    ///
    /// Returns `Ok(None)` on 404 so lookups of unlabeled addresses are not errors.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Arkham GET {} {:?}", path, query);

        let response = self
            .client
            .get(&url)
            .header("API-Key", &self.api_key)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("Failed to read Arkham response: {}", e)))?;
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| Error::Deserialization(format!("Failed to parse Arkham response: {}", e)))
    }

    async fn intelligence(&self, address: &WalletAddress) -> Result<ArkhamIntelligence> {
        cached(&self.cache.intelligence, address, move || async move {
            let path = format!("/intelligence/address/{}", address);
            Ok(self.get(&path, &[]).await?.unwrap_or_default())
        })
        .await
    }

    async fn incoming(&self, address: &WalletAddress) -> Result<Vec<ArkhamTransfer>> {
        cached(&self.cache.incoming, address, move || {
            self.transfers(address, TransferQuery::Incoming)
        })
        .await
    }

    async fn transfers(&self, address: &WalletAddress, query: TransferQuery) -> Result<Vec<ArkhamTransfer>> {
        let params = [
            (query.param(), address.to_string()),
            ("chain", self.chain.clone()),
            ("limit", self.page_limit.to_string()),
            ("sortKey", "time".to_string()),
            ("sortDir", "asc".to_string()),
        ];
        let response: Option<TransfersResponse> = self.get("/transfers", &params).await?;
        Ok(response.map(TransfersResponse::into_transfers).unwrap_or_default())
    }

    /// Earliest activity timestamp from the address history endpoint
    async fn first_seen_via_history(&self, address: &WalletAddress) -> Result<Option<DateTime<Utc>>> {
        let path = format!("/history/address/{}", address);
        let history: Option<ArkhamHistory> = self.get(&path, &[("chain", self.chain.clone())]).await?;
        Ok(history.and_then(|h| h.earliest()))
    }

    /// First on-chain activity of a wallet
    ///
    /// Uses the earliest incoming transfer, then the earliest transfer of any
    /// direction. The history endpoint gets a say when the page may not reach
    /// back to the first transfer (see [`page_may_be_truncated`]).
    async fn creation_time(&self, address: &WalletAddress) -> Result<Option<DateTime<Utc>>> {
        let mut transfers = self.incoming(address).await?;
        if transfers.is_empty() {
            transfers = self.transfers(address, TransferQuery::Any).await?;
        }

        let earliest = transfers.iter().filter_map(|t| t.block_timestamp).min();

        match earliest {
            Some(ts) if page_may_be_truncated(&transfers, self.page_limit) => {
                let history = self.first_seen_via_history(address).await?;
                Ok(Some(history.map_or(ts, |h| h.min(ts))))
            }
            Some(ts) => Ok(Some(ts)),
            None => self.first_seen_via_history(address).await,
        }
    }
}

/// A full page packed into less than a day usually belongs to a busy wallet
/// whose real history is older than the page shows
fn page_may_be_truncated(transfers: &[ArkhamTransfer], page_limit: u32) -> bool {
    if transfers.len() < page_limit as usize {
        return false;
    }
    let mut times = transfers.iter().filter_map(|t| t.block_timestamp);
    let Some(first) = times.next() else {
        return false;
    };
    let (earliest, latest) = times.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
    latest - earliest < ChronoDuration::days(1)
}

fn classify_status(status: StatusCode, body: String) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited(body)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Error::Provider(format!("Arkham API error {}: {}", status, body))
    } else {
        Error::Api {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl EntityDataProvider for ArkhamClient {
    fn name(&self) -> &'static str {
        "arkham"
    }

    async fn get_profile(&self, address: &WalletAddress) -> Result<WalletProfile> {
        let intel = self.intelligence(address).await?;
        let creation = self.creation_time(address).await?;

        let mut profile = WalletProfile::unknown(address.clone());
        profile.creation_timestamp = creation;
        profile.entity_label = intel.display_name();

        // Flagged entities stay traceable; only clean entities end the walk
        if let Some(name) = intel.entity_name() {
            if self.entities.flagged_keyword(&intel.full_name()).is_none() {
                profile = profile.known_entity(name);
            }
        }

        Ok(profile)
    }

    async fn get_outgoing_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        let transfers = self.transfers(address, TransferQuery::Outgoing).await?;
        Ok(to_edges(transfers))
    }

    async fn get_incoming_transfers(&self, address: &WalletAddress) -> Result<Vec<TransferEdge>> {
        let transfers = self.incoming(address).await?;
        Ok(to_edges(transfers))
    }

    async fn check_known_asset(&self, token_or_address: &WalletAddress) -> Result<bool> {
        let intel = self.intelligence(token_or_address).await?;
        if intel.is_empty() {
            return Ok(false);
        }
        let full_name = intel.full_name();
        if self.entities.flagged_keyword(&full_name).is_some() {
            return Ok(false);
        }
        Ok(self.entities.is_trusted_exchange(&full_name) || intel.entity_name().is_some())
    }

    async fn check_flagged_asset(&self, token_or_address: &WalletAddress) -> Result<Option<String>> {
        let intel = self.intelligence(token_or_address).await?;
        if intel.is_empty() {
            return Ok(None);
        }
        Ok(self
            .entities
            .flagged_keyword(&intel.full_name())
            .map(|_| intel.display_name().unwrap_or_else(|| "Unknown".to_string())))
    }

    async fn find_deployer(&self, token: &WalletAddress) -> Result<Option<WalletAddress>> {
        let transfers = self.transfers(token, TransferQuery::Any).await?;
        let first = transfers
            .into_iter()
            .filter(|t| t.block_timestamp.is_some())
            .min_by_key(|t| t.block_timestamp);

        let Some(first) = first else {
            return Ok(None);
        };

        let raw = first
            .from_address
            .and_then(|a| a.address)
            .or_else(|| first.to_address.and_then(|a| a.address));

        match raw {
            Some(raw) => WalletAddress::parse(&raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Convert API transfers into edges, dropping entries without both ends or a timestamp
fn to_edges(transfers: Vec<ArkhamTransfer>) -> Vec<TransferEdge> {
    transfers
        .into_iter()
        .filter_map(|t| {
            let from = WalletAddress::parse(t.from_address?.address.as_deref()?).ok()?;
            let to = WalletAddress::parse(t.to_address?.address.as_deref()?).ok()?;
            let timestamp = t.block_timestamp?;
            Some(TransferEdge::new(from, to, t.unit_value.unwrap_or(0.0), timestamp))
        })
        .collect()
}

// Arkham API response types

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct ArkhamIntelligence {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    arkham_entity: Option<ArkhamEntity>,
    #[serde(default)]
    arkham_label: Option<ArkhamLabel>,
}

impl ArkhamIntelligence {
    fn is_empty(&self) -> bool {
        self.arkham_entity.is_none() && self.arkham_label.is_none()
    }

    fn entity_name(&self) -> Option<String> {
        self.arkham_entity.as_ref().and_then(|e| e.name.clone())
    }

    fn label_name(&self) -> Option<String> {
        self.arkham_label.as_ref().and_then(|l| l.name.clone())
    }

    /// Entity name, falling back to the label name
    fn display_name(&self) -> Option<String> {
        self.entity_name().or_else(|| self.label_name())
    }

    /// Entity and label names joined, lower-cased, for keyword matching
    fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.entity_name().unwrap_or_default(),
            self.label_name().unwrap_or_default()
        )
        .trim()
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct ArkhamEntity {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    entity_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ArkhamLabel {
    #[serde(default)]
    name: Option<String>,
}

/// `/transfers` answers with either a bare array or `{ "transfers": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TransfersResponse {
    List(Vec<ArkhamTransfer>),
    Wrapped {
        #[serde(default)]
        transfers: Vec<ArkhamTransfer>,
    },
}

impl TransfersResponse {
    fn into_transfers(self) -> Vec<ArkhamTransfer> {
        match self {
            TransfersResponse::List(transfers) => transfers,
            TransfersResponse::Wrapped { transfers } => transfers,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArkhamTransfer {
    #[serde(default)]
    from_address: Option<ArkhamAddressRef>,
    #[serde(default)]
    to_address: Option<ArkhamAddressRef>,
    #[serde(default)]
    unit_value: Option<f64>,
    #[serde(default)]
    block_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ArkhamAddressRef {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArkhamHistory {
    #[serde(default)]
    solana: Vec<ArkhamHistoryPoint>,
}

impl ArkhamHistory {
    fn earliest(&self) -> Option<DateTime<Utc>> {
        self.solana.iter().filter_map(|p| p.time).min()
    }
}

#[derive(Debug, Deserialize)]
struct ArkhamHistoryPoint {
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TRANSFERS: &str = r#"[
        {
            "fromAddress": {"address": "Funder111"},
            "toAddress": {"address": "Deployer111"},
            "unitValue": 12.5,
            "blockTimestamp": "2025-03-01T10:00:00Z"
        },
        {
            "fromAddress": {"address": "Funder222"},
            "toAddress": {"address": "Deployer111"},
            "unitValue": 0.2,
            "blockTimestamp": "2025-02-01T10:00:00Z"
        },
        {
            "fromAddress": null,
            "toAddress": {"address": "Deployer111"},
            "unitValue": 1.0,
            "blockTimestamp": "2025-01-01T10:00:00Z"
        }
    ]"#;

    #[test]
    fn test_parse_transfer_list_and_wrapped() {
        let list: TransfersResponse = serde_json::from_str(TRANSFERS).unwrap();
        assert_eq!(list.into_transfers().len(), 3);

        let wrapped: TransfersResponse =
            serde_json::from_str(&format!(r#"{{"transfers": {}, "count": 3}}"#, TRANSFERS)).unwrap();
        assert_eq!(wrapped.into_transfers().len(), 3);

        let empty: TransfersResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.into_transfers().is_empty());
    }

    #[test]
    fn test_to_edges_drops_incomplete_entries() {
        let list: TransfersResponse = serde_json::from_str(TRANSFERS).unwrap();
        let edges = to_edges(list.into_transfers());
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].from_address.as_str(), "Funder111");
        assert_eq!(edges[0].amount, 12.5);
        assert_eq!(
            edges[1].timestamp,
            Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_intelligence_names() {
        let intel: ArkhamIntelligence = serde_json::from_str(
            r#"{
                "address": "abc",
                "arkhamEntity": {"id": "binance", "name": "Binance", "type": "cex"},
                "arkhamLabel": {"name": "Hot Wallet 3"}
            }"#,
        )
        .unwrap();
        assert!(!intel.is_empty());
        assert_eq!(intel.display_name().as_deref(), Some("Binance"));
        assert_eq!(intel.full_name(), "binance hot wallet 3");

        let label_only: ArkhamIntelligence =
            serde_json::from_str(r#"{"arkhamLabel": {"name": "Phishing Drainer"}}"#).unwrap();
        assert_eq!(label_only.entity_name(), None);
        assert_eq!(label_only.display_name().as_deref(), Some("Phishing Drainer"));

        let bare: ArkhamIntelligence = serde_json::from_str(r#"{"address": "abc"}"#).unwrap();
        assert!(bare.is_empty());
    }

    #[test]
    fn test_history_earliest() {
        let history: ArkhamHistory = serde_json::from_str(
            r#"{"solana": [
                {"time": "2024-06-01T00:00:00Z", "usd": 10.0},
                {"time": "2023-01-15T00:00:00Z", "usd": 5.0}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            history.earliest(),
            Some(Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, String::new()).is_retryable());
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = ArkhamClient::new(&ProviderConfig::default(), EntityConfig::default());
        assert!(matches!(err, Err(Error::MissingEnvVar(_))));

        let config = ProviderConfig {
            api_key: "key".to_string(),
            base_url: "https://api.example.com/".to_string(),
            ..ProviderConfig::default()
        };
        let client = ArkhamClient::new(&config, EntityConfig::default()).unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
        assert_eq!(client.name(), "arkham");
    }

    fn transfer_at(ts: DateTime<Utc>) -> ArkhamTransfer {
        ArkhamTransfer {
            from_address: None,
            to_address: None,
            unit_value: Some(1.0),
            block_timestamp: Some(ts),
        }
    }

    #[test]
    fn test_page_truncation_depends_only_on_page() {
        let start = Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap();
        let burst: Vec<ArkhamTransfer> = (0..3)
            .map(|i| transfer_at(start + ChronoDuration::hours(i)))
            .collect();
        assert!(page_may_be_truncated(&burst, 3));
        // Not a full page
        assert!(!page_may_be_truncated(&burst, 4));

        let spread: Vec<ArkhamTransfer> = (0..3)
            .map(|i| transfer_at(start + ChronoDuration::days(i)))
            .collect();
        assert!(!page_may_be_truncated(&spread, 3));
        assert!(!page_may_be_truncated(&[], 0));
    }

    #[tokio::test]
    async fn test_cache_fetches_each_address_once() {
        let map: DashMap<WalletAddress, u32> = DashMap::new();
        let fetches = AtomicU32::new(0);
        let counter = &fetches;
        let address = WalletAddress::parse("Deployer111").unwrap();
        let fetch = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        };

        assert_eq!(cached(&map, &address, fetch).await.unwrap(), 7);
        assert_eq!(cached(&map, &address, fetch).await.unwrap(), 7);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_skips_failures() {
        let map: DashMap<WalletAddress, u32> = DashMap::new();
        let address = WalletAddress::parse("Deployer111").unwrap();

        let failed = cached(&map, &address, || async { Err(Error::Provider("503".to_string())) }).await;
        assert!(failed.is_err());
        assert!(map.is_empty());

        let value = cached(&map, &address, || async { Ok(3) }).await;
        assert_eq!(value.unwrap(), 3);
    }
}
