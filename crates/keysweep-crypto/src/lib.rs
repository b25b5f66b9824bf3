//! KeySweep Crypto Primitives
//!
//! Low-level secp256k1, hashing and encoding operations used to turn key-space
//! positions into Bitcoin addresses and exportable secrets.

pub mod secp256k1;
pub mod hash;
pub mod encoding;

pub use self::secp256k1::{Secp256k1Error, Secp256k1Keypair};

// Re-export dependencies for use by other crates
pub use bs58;
pub use hex;
