//! On-disk persistable licenses.
//!
//! Files live at `<dir>/<escaped stream name><offline|online>.dat`. There is
//! no index file; whether a key is persisted is answered by checking the
//! path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use fairkey_core::StreamName;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::KeyRequestError;

/// Characters left unescaped in file names: those allowed in a URL host.
const FILE_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'[')
    .remove(b']')
    .remove(b'_')
    .remove(b'~');

/// Persisted license files under a documents directory.
#[derive(Debug)]
pub struct PersistedKeyStore {
    dir: PathBuf,
    /// Content key identifier to the stream it belongs to.
    names: DashMap<String, StreamName>,
    write_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PersistedKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            names: DashMap::new(),
            write_locks: DashMap::new(),
        }
    }

    /// The documents directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the license file for `stream_name`.
    pub fn path_for(&self, stream_name: &str, persistable: bool) -> PathBuf {
        let suffix = if persistable { "offline" } else { "online" };
        let escaped = utf8_percent_encode(stream_name, FILE_NAME_ENCODE_SET);
        self.dir.join(format!("{escaped}{suffix}.dat"))
    }

    /// Remember which stream `identifier` belongs to, for [`exists`](Self::exists).
    pub fn register(&self, identifier: &str, stream_name: StreamName) {
        self.names.insert(identifier.to_owned(), stream_name);
    }

    /// Whether a persistable license for `identifier` is on disk.
    ///
    /// Identifiers never seen through [`register`](Self::register) are
    /// reported as not persisted.
    pub fn exists(&self, identifier: &str) -> bool {
        self.names
            .get(identifier)
            .is_some_and(|name| self.path_for(name.as_str(), true).is_file())
    }

    /// Atomically write `blob` as the license file for `stream_name`.
    ///
    /// Writes to the same path are serialized. The blob goes to a temporary
    /// file in the same directory which is then renamed over the target, so
    /// readers never observe a partial file.
    #[instrument(skip(self, blob), fields(stream = %stream_name, len = blob.len()))]
    pub async fn write(
        &self,
        stream_name: &StreamName,
        persistable: bool,
        blob: Bytes,
    ) -> Result<PathBuf, KeyRequestError> {
        let path = self.path_for(stream_name.as_str(), persistable);
        let lock = Arc::clone(self.write_locks.entry(path.clone()).or_default().value());
        let held = lock.lock().await;

        let dir = self.dir.clone();
        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &blob))
            .await
            .map_err(std::io::Error::other)
            .and_then(|r| r);

        drop(held);
        drop(lock);
        // The map's own reference is the last one once no writer waits.
        self.write_locks
            .remove_if(&path, |_, lock| Arc::strong_count(lock) == 1);

        written.map_err(|source| KeyRequestError::PersistWriteFailed {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "persisted license");
        Ok(path)
    }

    /// Number of paths with a write in progress or queued.
    pub fn pending_writes(&self) -> usize {
        self.write_locks.len()
    }
}

fn write_atomic(dir: &Path, target: &Path, blob: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(blob)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_escapes_stream_name() {
        let store = PersistedKeyStore::new("/docs");
        assert_eq!(
            store.path_for("Big Buck/Bunny", true),
            PathBuf::from("/docs/Big%20Buck%2FBunnyoffline.dat")
        );
        assert_eq!(
            store.path_for("Bunny", false),
            PathBuf::from("/docs/Bunnyonline.dat")
        );
    }

    #[tokio::test]
    async fn write_then_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PersistedKeyStore::new(tmp.path().join("keys"));
        let name = StreamName::new("Bunny");

        store.register("skd://asset123", name.clone());
        assert!(!store.exists("skd://asset123"));

        let path = store
            .write(&name, true, Bytes::from_static(b"persistable-key"))
            .await
            .unwrap();
        assert_eq!(path, tmp.path().join("keys").join("Bunnyoffline.dat"));
        assert_eq!(std::fs::read(&path).unwrap(), b"persistable-key");
        assert!(store.exists("skd://asset123"));
        assert!(!store.exists("skd://unregistered"));
    }

    #[tokio::test]
    async fn online_file_does_not_count_as_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PersistedKeyStore::new(tmp.path());
        let name = StreamName::new("Bunny");
        store.register("skd://asset123", name.clone());

        store.write(&name, false, Bytes::from_static(b"k")).await.unwrap();
        assert!(!store.exists("skd://asset123"));
    }

    #[tokio::test]
    async fn concurrent_writes_to_one_path_leave_a_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistedKeyStore::new(tmp.path()));
        let name = StreamName::new("Bunny");

        let writes: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                let name = name.clone();
                tokio::spawn(async move {
                    store.write(&name, true, Bytes::from(vec![i; 4096])).await
                })
            })
            .collect();
        for write in writes {
            write.await.unwrap().unwrap();
        }

        let contents = std::fs::read(store.path_for("Bunny", true)).unwrap();
        assert_eq!(contents.len(), 4096);
        assert!(contents.iter().all(|b| *b == contents[0]));
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
        assert_eq!(store.pending_writes(), 0);
    }

    #[tokio::test]
    async fn write_locks_are_pruned_per_path() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PersistedKeyStore::new(tmp.path());
        for i in 0..16 {
            store
                .write(&StreamName::new(format!("stream-{i}")), true, Bytes::from_static(b"k"))
                .await
                .unwrap();
        }
        assert_eq!(store.pending_writes(), 0);
    }

    #[tokio::test]
    async fn write_failure_is_reported_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let store = PersistedKeyStore::new(&blocker);

        let err = store
            .write(&StreamName::new("Bunny"), true, Bytes::from_static(b"k"))
            .await
            .unwrap_err();
        match err {
            KeyRequestError::PersistWriteFailed { path, .. } => {
                assert_eq!(path, blocker.join("Bunnyoffline.dat"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.pending_writes(), 0);
    }
}
