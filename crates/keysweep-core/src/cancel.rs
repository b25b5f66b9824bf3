//! Cancellation signal
//!
//! One-way flag visible to every worker. Thread pools share an atomic;
//! process pools additionally share a 4-byte cell in a memory-mapped file
//! that each worker process maps on start-up.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use memmap2::MmapMut;
use tracing::debug;

const FLAG_LEN: u64 = std::mem::size_of::<AtomicU32>() as u64;

#[derive(Debug, Default)]
struct Inner {
    local: AtomicBool,
    shared: OnceLock<SharedFlag>,
}

/// Cloneable handle to a run's cancellation signal
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

impl Cancellation {
    /// Thread-only signal
    pub fn in_process() -> Self {
        Self::default()
    }

    /// Join the shared flag created by a parent process
    pub fn attached(path: impl AsRef<Path>) -> io::Result<Self> {
        let cancel = Self::default();
        let _ = cancel.inner.shared.set(SharedFlag::open(path)?);
        Ok(cancel)
    }

    /// Create the shared flag at `path` so worker processes can join it.
    /// A signal raised earlier is carried over.
    pub fn attach_shared(&self, path: impl AsRef<Path>) -> io::Result<()> {
        if self.inner.shared.get().is_some() {
            return Ok(());
        }

        let flag = SharedFlag::create(path)?;
        if self.inner.local.load(Ordering::Acquire) {
            flag.set();
        }
        let _ = self.inner.shared.set(flag);
        Ok(())
    }

    pub fn shared_path(&self) -> Option<&Path> {
        self.inner.shared.get().map(|flag| flag.path.as_path())
    }

    /// Raise the signal. Idempotent.
    pub fn set(&self) {
        if !self.inner.local.swap(true, Ordering::AcqRel) {
            debug!("cancellation raised");
        }
        if let Some(flag) = self.inner.shared.get() {
            flag.set();
        }
    }

    pub fn is_set(&self) -> bool {
        if self.inner.local.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.shared.get() {
            Some(flag) if flag.is_set() => {
                self.inner.local.store(true, Ordering::Release);
                true
            }
            _ => false,
        }
    }
}

/// A flag cell in a memory-mapped file
#[derive(Debug)]
struct SharedFlag {
    path: PathBuf,
    cell: NonNull<AtomicU32>,
    _map: MmapMut,
}

// SAFETY: `cell` points into `_map`, which lives as long as the flag and is
// only ever accessed through the atomic.
unsafe impl Send for SharedFlag {}
unsafe impl Sync for SharedFlag {}

impl SharedFlag {
    fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(FLAG_LEN)?;
        Self::map(&file, path)
    }

    fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() < FLAG_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("cancellation flag {} is truncated", path.display()),
            ));
        }
        Self::map(&file, path)
    }

    fn map(file: &std::fs::File, path: &Path) -> io::Result<Self> {
        // SAFETY: the file is private to this run; other processes only touch
        // it through the same atomic cell.
        let mut map = unsafe { MmapMut::map_mut(file)? };
        // Mappings are page aligned, so the cast satisfies AtomicU32 alignment
        let cell = NonNull::new(map.as_mut_ptr().cast::<AtomicU32>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "empty mapping"))?;

        Ok(Self {
            path: path.to_path_buf(),
            cell,
            _map: map,
        })
    }

    fn atomic(&self) -> &AtomicU32 {
        // SAFETY: see the Send/Sync impls above
        unsafe { self.cell.as_ref() }
    }

    fn set(&self) {
        self.atomic().store(1, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.atomic().load(Ordering::SeqCst) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_is_idempotent_and_visible_to_clones() {
        let cancel = Cancellation::in_process();
        let clone = cancel.clone();
        assert!(!clone.is_set());

        cancel.set();
        cancel.set();
        assert!(clone.is_set());
        assert_eq!(cancel.shared_path(), None);
    }

    #[test]
    fn test_visible_across_threads() {
        let cancel = Cancellation::in_process();
        let watcher = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                while !cancel.is_set() {
                    thread::yield_now();
                }
            })
        };
        cancel.set();
        watcher.join().unwrap();
    }

    #[test]
    fn test_shared_flag_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancel.flag");

        let parent = Cancellation::in_process();
        parent.attach_shared(&path).unwrap();
        // A second, independent mapping stands in for a worker process
        let child = Cancellation::attached(&path).unwrap();
        assert!(!child.is_set());

        child.set();
        assert!(parent.is_set());
    }

    #[test]
    fn test_parent_signal_reaches_attached_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancel.flag");

        let parent = Cancellation::in_process();
        parent.set();
        parent.attach_shared(&path).unwrap();

        let child = Cancellation::attached(&path).unwrap();
        assert!(child.is_set());
    }

    #[test]
    fn test_attach_missing_flag_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Cancellation::attached(dir.path().join("missing")).is_err());
    }
}
