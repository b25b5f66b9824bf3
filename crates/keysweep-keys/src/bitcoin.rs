//! Bitcoin candidate source

use crate::traits::{AddressType, Candidate, CandidateSource, KeyError, SecretMaterial};
use keysweep_crypto::{
    encoding::{base58check_encode, bech32_encode_v0, wif_decode, wif_encode},
    hash::hash160,
    hex, Secp256k1Keypair,
};

/// Bitcoin mainnet addresses from secp256k1 keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Bitcoin {
    address_type: AddressType,
}

impl Bitcoin {
    pub fn new(address_type: AddressType) -> Self {
        Self { address_type }
    }

    fn candidate(&self, keypair: &Secp256k1Keypair, compressed: bool) -> Result<Candidate, KeyError> {
        let private_key = keypair.private_key_bytes();

        let address = match self.address_type {
            AddressType::P2pkh => {
                // P2PKH: Base58Check(0x00 || HASH160(pubkey))
                let h160 = if compressed {
                    hash160(&keypair.public_key_compressed())
                } else {
                    hash160(&keypair.public_key_uncompressed())
                };
                base58check_encode(0x00, &h160)
            }
            AddressType::P2wpkh => {
                if !compressed {
                    return Err(KeyError::InvalidFormat(
                        "segwit addresses require a compressed key".into(),
                    ));
                }
                let h160 = hash160(&keypair.public_key_compressed());
                bech32_encode_v0("bc", &h160).map_err(|e| KeyError::InvalidFormat(e.to_string()))?
            }
        };

        let wif = wif_encode(&private_key, compressed, true);

        Ok(Candidate {
            identifier: address,
            secret: SecretMaterial::new(private_key, wif),
        })
    }
}

impl CandidateSource for Bitcoin {
    fn name(&self) -> &'static str {
        "bitcoin"
    }

    fn generate(&self) -> Candidate {
        let keypair = Secp256k1Keypair::generate();
        // Compressed keys encode to both address types
        match self.candidate(&keypair, true) {
            Ok(candidate) => candidate,
            Err(_) => unreachable!("compressed keys always encode"),
        }
    }

    fn from_position(&self, position: u128) -> Result<Candidate, KeyError> {
        let keypair =
            Secp256k1Keypair::from_scalar(position).map_err(|_| KeyError::InvalidPosition(position))?;
        self.candidate(&keypair, true)
    }

    fn from_secret(&self, secret: &str) -> Result<Candidate, KeyError> {
        let secret = secret.trim();

        // 64 hex characters: raw scalar, treated as compressed
        if secret.len() == 64 && secret.chars().all(|c| c.is_ascii_hexdigit()) {
            let mut bytes = [0u8; 32];
            hex::decode_to_slice(secret, &mut bytes)
                .map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
            let keypair = Secp256k1Keypair::from_bytes(&bytes)
                .map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
            return self.candidate(&keypair, true);
        }

        let wif = wif_decode(secret).map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        if !wif.mainnet {
            return Err(KeyError::InvalidFormat("testnet keys are not supported".into()));
        }
        let keypair = Secp256k1Keypair::from_bytes(&wif.secret)
            .map_err(|e| KeyError::InvalidFormat(e.to_string()))?;
        self.candidate(&keypair, wif.compressed)
    }
}
