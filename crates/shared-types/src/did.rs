//! # Decentralized Identifiers
//!
//! `did:<method>:<blockchain>:<network>:<id>` identifiers for issuer
//! identities.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a DID string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DidError {
    #[error("DID must start with 'did:': {0}")]
    MissingScheme(String),

    #[error("DID has {found} segments, expected 5 (did:method:blockchain:network:id)")]
    WrongSegmentCount { found: usize },

    #[error("DID segment '{segment}' is empty")]
    EmptySegment { segment: &'static str },
}

/// A parsed decentralized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Build a DID from its components.
    pub fn new(method: &str, blockchain: &str, network: &str, id: &str) -> Result<Self, DidError> {
        Self::parse(&format!("did:{method}:{blockchain}:{network}:{id}"))
    }

    /// Parse and validate a DID string.
    pub fn parse(raw: &str) -> Result<Self, DidError> {
        if !raw.starts_with("did:") {
            return Err(DidError::MissingScheme(raw.to_string()));
        }
        let segments: Vec<&str> = raw.split(':').collect();
        if segments.len() != 5 {
            return Err(DidError::WrongSegmentCount {
                found: segments.len(),
            });
        }
        for (segment, name) in segments[1..]
            .iter()
            .zip(["method", "blockchain", "network", "id"])
        {
            if segment.is_empty() {
                return Err(DidError::EmptySegment { segment: name });
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn method(&self) -> &str {
        self.segment(1)
    }

    pub fn blockchain(&self) -> &str {
        self.segment(2)
    }

    pub fn network(&self) -> &str {
        self.segment(3)
    }

    /// The method-specific identifier (last segment).
    pub fn id(&self) -> &str {
        self.segment(4)
    }

    /// Numeric identity id passed to the state contract.
    ///
    /// The first 31 bytes of `keccak256(did)` interpreted big-endian, which
    /// keeps the value below the BN254 scalar field used by the circuits.
    pub fn numeric_id(&self) -> U256 {
        let digest: [u8; 32] = Keccak256::digest(self.0.as_bytes()).into();
        U256::from_big_endian(&digest[..31])
    }

    fn segment(&self, index: usize) -> &str {
        self.0.split(':').nth(index).unwrap_or_default()
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = DidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DID: &str = "did:polygonid:polygon:amoy:2qQ68JkRcf3ybQNvgRV9BP6qLgBrXmUezqBi4wsEuV";

    #[test]
    fn test_parse_components() {
        let did = Did::parse(DID).unwrap();
        assert_eq!(did.method(), "polygonid");
        assert_eq!(did.blockchain(), "polygon");
        assert_eq!(did.network(), "amoy");
        assert_eq!(did.id(), "2qQ68JkRcf3ybQNvgRV9BP6qLgBrXmUezqBi4wsEuV");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            Did::parse("polygonid:polygon:amoy:abc"),
            Err(DidError::MissingScheme(_))
        ));
        assert!(matches!(
            Did::parse("did:example:456"),
            Err(DidError::WrongSegmentCount { found: 3 })
        ));
        assert!(matches!(
            Did::parse("did:iden3::amoy:abc"),
            Err(DidError::EmptySegment { segment: "blockchain" })
        ));
    }

    #[test]
    fn test_numeric_id_fits_31_bytes() {
        let did = Did::parse(DID).unwrap();
        let id = did.numeric_id();
        assert!(id.bits() <= 248);
        assert_eq!(id, Did::parse(DID).unwrap().numeric_id());
    }

    #[test]
    fn test_serde_as_string() {
        let did = Did::parse(DID).unwrap();
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, format!("\"{DID}\""));
        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(back, did);
        assert!(serde_json::from_str::<Did>("\"not-a-did\"").is_err());
    }
}
