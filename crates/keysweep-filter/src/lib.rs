//! KeySweep Membership Engine
//!
//! Two-tier membership: a Bloom pre-filter answers "definitely not" cheaply,
//! the authoritative store answers "yes" exactly.

mod bloom;
mod import;
mod membership;
mod sqlite;
mod store;

pub use bloom::{BloomConfig, BloomFilter};
pub use import::{import_file, import_lines, ImportError, ImportOptions, ImportReport};
pub use membership::{TwoTierFilter, Verdict};
pub use sqlite::SqliteStore;
pub use store::{MemoryStore, StoreError, TargetStore};
