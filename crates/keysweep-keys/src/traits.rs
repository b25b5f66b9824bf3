//! Candidate source trait and types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid secret format: {0}")]
    InvalidFormat(String),
    #[error("Position {0} does not map to a valid key")]
    InvalidPosition(u128),
}

/// Address type produced by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    /// Legacy P2PKH (1...)
    #[default]
    P2pkh,
    /// Native SegWit P2WPKH (bc1q...)
    P2wpkh,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::P2pkh => write!(f, "P2PKH (Legacy)"),
            AddressType::P2wpkh => write!(f, "P2WPKH (SegWit)"),
        }
    }
}

/// Secret half of a candidate.
///
/// `Debug` is redacted; only [`SecretMaterial::exported`] reveals the key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretMaterial {
    bytes: [u8; 32],
    exported: String,
}

impl SecretMaterial {
    pub fn new(bytes: [u8; 32], exported: String) -> Self {
        Self { bytes, exported }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// The source's exportable representation (WIF for Bitcoin).
    pub fn exported(&self) -> &str {
        &self.exported
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretMaterial(..)")
    }
}

/// A generated identifier with the secret it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The identifier looked up in the target set (an address)
    pub identifier: String,
    pub secret: SecretMaterial,
}

impl Candidate {
    pub fn export_secret(&self) -> &str {
        self.secret.exported()
    }
}

/// Capability for producing candidates
pub trait CandidateSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Fresh random candidate
    fn generate(&self) -> Candidate;

    /// Deterministic candidate for a key-space coordinate
    fn from_position(&self, position: u128) -> Result<Candidate, KeyError>;

    /// Candidate for an exported secret
    fn from_secret(&self, secret: &str) -> Result<Candidate, KeyError>;
}
