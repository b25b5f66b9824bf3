//! KeySweep Candidate Sources
//!
//! Trait-based abstraction over "turn a key-space position (or fresh
//! randomness, or an exported secret) into an identifier worth looking up".

pub mod traits;
pub mod bitcoin;

pub use traits::{AddressType, Candidate, CandidateSource, KeyError, SecretMaterial};
pub use bitcoin::Bitcoin;
