//! secp256k1 keypairs for Bitcoin candidates

use k256::{
    elliptic_curve::rand_core::OsRng,
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey, SecretKey,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Secp256k1Error {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Scalar {0} is not a valid private key")]
    InvalidScalar(u128),
}

/// A secp256k1 keypair
#[derive(Clone)]
pub struct Secp256k1Keypair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Secp256k1Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let secret_key = SecretKey::random(&mut OsRng);
        let public_key = secret_key.public_key();
        Self { secret_key, public_key }
    }

    /// Create from raw 32-byte private key
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, Secp256k1Error> {
        let secret_key = SecretKey::from_bytes(bytes.into())
            .map_err(|_| Secp256k1Error::InvalidPrivateKey)?;
        let public_key = secret_key.public_key();
        Ok(Self { secret_key, public_key })
    }

    /// Create the keypair whose private scalar equals `scalar`.
    ///
    /// Every non-zero `u128` is below the curve order, so zero is the only
    /// rejected value.
    pub fn from_scalar(scalar: u128) -> Result<Self, Secp256k1Error> {
        if scalar == 0 {
            return Err(Secp256k1Error::InvalidScalar(scalar));
        }
        Self::from_bytes(&scalar_bytes(scalar))
    }

    /// Get the private key as bytes
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.secret_key.to_bytes().into()
    }

    /// Get the uncompressed public key (65 bytes: 0x04 || x || y)
    pub fn public_key_uncompressed(&self) -> [u8; 65] {
        let point = self.public_key.to_encoded_point(false);
        let mut result = [0u8; 65];
        result.copy_from_slice(point.as_bytes());
        result
    }

    /// Get the compressed public key (33 bytes: 0x02/0x03 || x)
    pub fn public_key_compressed(&self) -> [u8; 33] {
        let point = self.public_key.to_encoded_point(true);
        let mut result = [0u8; 33];
        result.copy_from_slice(point.as_bytes());
        result
    }
}

/// Big-endian 32-byte encoding of a `u128` scalar.
pub fn scalar_bytes(scalar: u128) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[16..].copy_from_slice(&scalar.to_be_bytes());
    bytes
}
