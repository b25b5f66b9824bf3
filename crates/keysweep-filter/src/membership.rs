//! Two-tier membership test

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info};

use crate::bloom::{BloomConfig, BloomFilter};
use crate::import::{import_file, ImportError, ImportOptions, ImportReport};
use crate::store::{StoreError, TargetStore};

/// Outcome of a membership test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    NoMatch,
    Confirmed,
}

impl Verdict {
    #[inline]
    pub fn is_confirmed(self) -> bool {
        matches!(self, Verdict::Confirmed)
    }
}

/// Bloom pre-filter in front of an authoritative store.
///
/// The pre-filter is only ever replaced wholesale; readers holding the old
/// one keep a consistent view until they load again.
pub struct TwoTierFilter {
    store: Arc<dyn TargetStore>,
    prefilter: ArcSwap<BloomFilter>,
    config: BloomConfig,
    lookups: AtomicU64,
    false_positives: AtomicU64,
}

impl TwoTierFilter {
    /// Create the filter and build the pre-filter from the store
    pub fn new(store: Arc<dyn TargetStore>, config: BloomConfig) -> Result<Self, StoreError> {
        let filter = Self {
            store,
            prefilter: ArcSwap::from_pointee(BloomFilter::new(&config)),
            config,
            lookups: AtomicU64::new(0),
            false_positives: AtomicU64::new(0),
        };
        filter.rebuild()?;
        Ok(filter)
    }

    /// Rebuild the pre-filter from the store's current contents.
    ///
    /// Returns the number of identifiers loaded.
    pub fn rebuild(&self) -> Result<usize, StoreError> {
        info!("Loading target identifiers into the pre-filter...");
        let identifiers = self.store.load_all()?;
        let bloom = BloomFilter::from_items(&identifiers, &self.config);

        info!(
            loaded = identifiers.len(),
            bits = bloom.num_bits(),
            hashes = bloom.num_hashes(),
            mib = bloom.size_bytes() / (1024 * 1024),
            "pre-filter rebuilt"
        );

        self.prefilter.store(Arc::new(bloom));
        Ok(identifiers.len())
    }

    /// Bulk-import identifiers, then rebuild the pre-filter.
    ///
    /// Returns the import counters and the number of identifiers loaded.
    pub fn import(
        &self,
        path: impl AsRef<Path>,
        options: &ImportOptions,
    ) -> Result<(ImportReport, usize), ImportError> {
        let report = import_file(path, self.store.as_ref(), options)?;
        let loaded = self.rebuild()?;
        Ok((report, loaded))
    }

    /// Pre-filter answer only
    #[inline]
    pub fn may_contain(&self, identifier: &str) -> bool {
        self.prefilter.load().may_contain(identifier)
    }

    /// Full two-tier answer. A pre-filter hit alone never confirms.
    pub fn test(&self, identifier: &str) -> Result<Verdict, StoreError> {
        if !self.may_contain(identifier) {
            return Ok(Verdict::NoMatch);
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.store.exists(identifier)? {
            Ok(Verdict::Confirmed)
        } else {
            debug!(identifier, "pre-filter false positive");
            self.false_positives.fetch_add(1, Ordering::Relaxed);
            Ok(Verdict::NoMatch)
        }
    }

    /// Identifiers represented in the current pre-filter
    pub fn loaded(&self) -> usize {
        self.prefilter.load().len()
    }

    /// Store lookups triggered by pre-filter hits
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn false_positives(&self) -> u64 {
        self.false_positives.load(Ordering::Relaxed)
    }
}
