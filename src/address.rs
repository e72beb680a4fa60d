//! Wallet address value type
//!
//! Addresses are opaque network-specific strings. Two addresses are equal when
//! their normalized forms match exactly: surrounding whitespace is trimmed and
//! `0x` hex (EVM) addresses are lower-cased. Base58 (Solana) addresses keep
//! their case since base58 is case-sensitive.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

lazy_static! {
    static ref EVM_ADDRESS: Regex = Regex::new(r"^0[xX][0-9a-fA-F]{40}$").unwrap();
    static ref BASE58_ADDRESS: Regex = Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").unwrap();
}

/// Address family, inferred from the address shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// 20-byte hex address with `0x` prefix
    Evm,
    /// Base58 encoded 32-byte public key
    Solana,
    /// Anything else the provider accepts
    Other,
}

/// Normalized wallet address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse and normalize an address
    ///
    /// Rejects empty input and input containing whitespace or control
    /// characters. Unknown shapes are accepted as `AddressKind::Other`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("address is empty".to_string()));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidInput(format!(
                "address contains whitespace or control characters: {:?}",
                trimmed
            )));
        }

        if EVM_ADDRESS.is_match(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Normalized string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Detected address family
    pub fn kind(&self) -> AddressKind {
        if EVM_ADDRESS.is_match(&self.0) {
            AddressKind::Evm
        } else if BASE58_ADDRESS.is_match(&self.0) {
            AddressKind::Solana
        } else {
            AddressKind::Other
        }
    }

    /// Shortened form for log lines (`AbCd…WxYz`)
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return self.0.clone();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for WalletAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for WalletAddress {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WalletAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        WalletAddress::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_address_rejected() {
        assert!(matches!(WalletAddress::parse(""), Err(Error::InvalidInput(_))));
        assert!(matches!(WalletAddress::parse("   "), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_inner_whitespace_rejected() {
        assert!(WalletAddress::parse("abc def").is_err());
        assert!(WalletAddress::parse("abc\tdef").is_err());
    }

    #[test]
    fn test_evm_addresses_are_case_normalized() {
        let upper = WalletAddress::parse("0xAbCdEf0123456789aBcDeF0123456789AbCdEf01").unwrap();
        let lower = WalletAddress::parse(" 0xabcdef0123456789abcdef0123456789abcdef01 ").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.kind(), AddressKind::Evm);
    }

    #[test]
    fn test_base58_keeps_case() {
        let a = WalletAddress::parse("9DjLxqbtcBts43ZBafukyD7yY48AQu6p8ndMN5Lxpump").unwrap();
        let b = WalletAddress::parse("9djlxqbtcbts43zbafukyd7yy48aqu6p8ndmn5lxpump").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.kind(), AddressKind::Solana);
    }

    #[test]
    fn test_short_form() {
        let a = WalletAddress::parse("9DjLxqbtcBts43ZBafukyD7yY48AQu6p8ndMN5Lxpump").unwrap();
        assert_eq!(a.short(), "9DjL…pump");
        let tiny = WalletAddress::parse("deployer").unwrap();
        assert_eq!(tiny.short(), "deployer");
        assert_eq!(tiny.kind(), AddressKind::Other);
    }

    #[test]
    fn test_serde_roundtrip_normalizes() {
        let addr: WalletAddress =
            serde_json::from_str("\"0xABCDEF0123456789ABCDEF0123456789ABCDEF01\"").unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert!(serde_json::from_str::<WalletAddress>("\"\"").is_err());
    }
}
