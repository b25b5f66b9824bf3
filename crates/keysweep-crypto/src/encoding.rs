//! Address and secret encodings: Base58Check, WIF, Bech32

use thiserror::Error;

use crate::hash::double_sha256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid checksum")]
    InvalidChecksum,
    #[error("Invalid character in input")]
    InvalidCharacter,
    #[error("Invalid length")]
    InvalidLength,
    #[error("Unknown WIF version byte 0x{0:02x}")]
    UnknownVersion(u8),
    #[error("Bech32 encoding failed: {0}")]
    Bech32Error(String),
}

/// Mainnet WIF version byte.
pub const WIF_MAINNET: u8 = 0x80;
/// Testnet WIF version byte.
pub const WIF_TESTNET: u8 = 0xEF;

/// A decoded Wallet Import Format secret.
#[derive(Clone, PartialEq, Eq)]
pub struct WifKey {
    pub secret: [u8; 32],
    pub compressed: bool,
    pub mainnet: bool,
}

/// Base58Check encode (Bitcoin-style with 4-byte checksum)
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);

    let checksum = double_sha256(&data);
    data.extend_from_slice(&checksum[..4]);

    bs58::encode(data).into_string()
}

/// Base58Check decode, returns (version, payload)
pub fn base58check_decode(input: &str) -> Result<(u8, Vec<u8>), EncodingError> {
    let data = bs58::decode(input)
        .into_vec()
        .map_err(|_| EncodingError::InvalidCharacter)?;

    if data.len() < 5 {
        return Err(EncodingError::InvalidLength);
    }

    let (payload_with_version, checksum) = data.split_at(data.len() - 4);
    let computed_checksum = &double_sha256(payload_with_version)[..4];

    if checksum != computed_checksum {
        return Err(EncodingError::InvalidChecksum);
    }

    let version = payload_with_version[0];
    let payload = payload_with_version[1..].to_vec();

    Ok((version, payload))
}

/// Encode WIF (Wallet Import Format) for private key
pub fn wif_encode(private_key: &[u8; 32], compressed: bool, mainnet: bool) -> String {
    let version = if mainnet { WIF_MAINNET } else { WIF_TESTNET };

    if compressed {
        let mut payload = Vec::with_capacity(33);
        payload.extend_from_slice(private_key);
        payload.push(0x01);
        base58check_encode(version, &payload)
    } else {
        base58check_encode(version, private_key)
    }
}

/// Decode a WIF string into its secret and flags
pub fn wif_decode(input: &str) -> Result<WifKey, EncodingError> {
    let (version, payload) = base58check_decode(input.trim())?;

    let mainnet = match version {
        WIF_MAINNET => true,
        WIF_TESTNET => false,
        other => return Err(EncodingError::UnknownVersion(other)),
    };

    let compressed = match payload.len() {
        32 => false,
        33 if payload[32] == 0x01 => true,
        _ => return Err(EncodingError::InvalidLength),
    };

    let mut secret = [0u8; 32];
    secret.copy_from_slice(&payload[..32]);

    Ok(WifKey {
        secret,
        compressed,
        mainnet,
    })
}

/// Bech32 encode for SegWit v0 programs
pub fn bech32_encode_v0(hrp: &str, program: &[u8]) -> Result<String, EncodingError> {
    use bech32::{segwit, Hrp};

    let hrp = Hrp::parse(hrp).map_err(|e| EncodingError::Bech32Error(e.to_string()))?;

    segwit::encode_v0(hrp, program).map_err(|e| EncodingError::Bech32Error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_one() -> [u8; 32] {
        let mut pk = [0u8; 32];
        pk[31] = 1;
        pk
    }

    #[test]
    fn test_base58check_roundtrip() {
        let payload = [1u8; 20];
        let encoded = base58check_encode(0x00, &payload);
        let (version, decoded) = base58check_decode(&encoded).unwrap();
        assert_eq!(version, 0x00);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_base58check_rejects_bad_checksum() {
        let mut encoded = base58check_encode(0x00, &[7u8; 20]);
        let last = encoded.pop().unwrap();
        encoded.push(if last == '1' { '2' } else { '1' });
        assert!(base58check_decode(&encoded).is_err());
    }

    #[test]
    fn test_wif_encode() {
        let wif = wif_encode(&key_one(), true, true);
        assert_eq!(wif, "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn");

        let wif = wif_encode(&key_one(), false, true);
        assert_eq!(wif, "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf");
    }

    #[test]
    fn test_wif_decode() {
        let decoded = wif_decode("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn").unwrap();
        assert_eq!(decoded.secret, key_one());
        assert!(decoded.compressed);
        assert!(decoded.mainnet);

        let decoded = wif_decode("5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf").unwrap();
        assert!(!decoded.compressed);
    }

    #[test]
    fn test_wif_decode_rejects_address() {
        // A P2PKH address is valid Base58Check but carries a 20-byte payload
        let err = wif_decode("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").err().unwrap();
        assert_eq!(err, EncodingError::UnknownVersion(0x00));
    }

    #[test]
    fn test_bech32_v0() {
        let program = hex::decode("751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        let address = bech32_encode_v0("bc", &program).unwrap();
        assert_eq!(address, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }
}
