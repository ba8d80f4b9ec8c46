use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

pub type CollectionName = String;
pub type Key = String;
pub type Value = Vec<u8>;

pub const COLLECTION_MEDIUM: &str = "collectionMedium";
pub const COLLECTION_PRIVATE: &str = "collectionPrivate";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("collection must not be an empty string")]
    EmptyCollection,
    #[error("key must not be an empty string")]
    EmptyKey,
    #[error("collection {collection} is not defined for this chaincode")]
    UnknownCollection { collection: CollectionName },
    #[error("ledger i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("unsupported ledger snapshot version {0}")]
    UnsupportedVersion(u8),
}

/// Names of the private data collections a chaincode may touch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collections {
    names: BTreeSet<CollectionName>,
}

impl Collections {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CollectionName>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.names.contains(collection)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Checks a (collection, key) address before it reaches the state.
    pub fn validate(&self, collection: &str, key: &str) -> Result<(), StorageError> {
        if collection.is_empty() {
            return Err(StorageError::EmptyCollection);
        }
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        if !self.contains(collection) {
            return Err(StorageError::UnknownCollection {
                collection: collection.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self::new([COLLECTION_MEDIUM, COLLECTION_PRIVATE])
    }
}

/// Writes buffered by one transaction, applied as a unit on commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSet {
    writes: BTreeMap<(CollectionName, Key), Value>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, collection: &str, key: &str, value: Value) {
        self.writes
            .insert((collection.to_string(), key.to_string()), value);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[u8])> {
        self.writes
            .iter()
            .map(|((c, k), v)| (c.as_str(), k.as_str(), v.as_slice()))
    }
}

/// Committed private data as seen by the peer.
pub trait PrivateDataLedger {
    fn collections(&self) -> &Collections;

    /// Returns `None` when the key has never been written.
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError>;

    fn commit(&mut self, writes: WriteSet) -> Result<(), StorageError>;

    /// Number of committed transactions.
    fn height(&self) -> u64;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct State {
    height: u64,
    #[serde(with = "crate::encoding::base64_map")]
    collections: BTreeMap<CollectionName, BTreeMap<Key, Value>>,
}

impl State {
    fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.collections
            .get(collection)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    fn apply(&mut self, writes: WriteSet) {
        for ((collection, key), value) in writes.writes {
            self.collections
                .entry(collection)
                .or_default()
                .insert(key, value);
        }
        self.height += 1;
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    collections: Collections,
    state: State,
}

impl MemoryLedger {
    pub fn new(collections: Collections) -> Self {
        Self {
            collections,
            state: State::default(),
        }
    }
}

impl PrivateDataLedger for MemoryLedger {
    fn collections(&self) -> &Collections {
        &self.collections
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.collections.validate(collection, key)?;
        Ok(self.state.get(collection, key))
    }

    fn commit(&mut self, writes: WriteSet) -> Result<(), StorageError> {
        for (collection, key, _) in writes.iter() {
            self.collections.validate(collection, key)?;
        }
        self.state.apply(writes);
        Ok(())
    }

    fn height(&self) -> u64 {
        self.state.height
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u8,
    #[serde(flatten)]
    state: State,
}

impl Snapshot {
    const CURRENT_VERSION: u8 = 1;
}

/// Ledger persisted as a single JSON snapshot, rewritten on every commit.
///
/// A state file has one writer at a time. Each commit goes through its own
/// temp file, so a crashed or concurrent commit never leaves a torn snapshot,
/// but two processes committing to the same file still race: the last
/// rename wins and the other process's commit is lost.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    collections: Collections,
    state: State,
}

impl FileLedger {
    /// Loads the snapshot at `path`, or starts empty when it does not exist.
    pub fn open(path: impl Into<PathBuf>, collections: Collections) -> Result<Self, StorageError> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            if snapshot.version != Snapshot::CURRENT_VERSION {
                return Err(StorageError::UnsupportedVersion(snapshot.version));
            }
            tracing::debug!(
                op = "ledger.open",
                path = %path.display(),
                height = snapshot.state.height,
                "Loaded ledger snapshot"
            );
            snapshot.state
        } else {
            tracing::debug!(op = "ledger.open", path = %path.display(), "Starting empty ledger");
            State::default()
        };
        Ok(Self {
            path,
            collections,
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &State) -> Result<(), StorageError> {
        let io_err = |source: std::io::Error| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(io_err)?;
                parent
            }
            None => Path::new("."),
        };
        let snapshot = Snapshot {
            version: Snapshot::CURRENT_VERSION,
            state: state.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        // unique temp file in the target directory, then rename over the snapshot
        let mut file = NamedTempFile::new_in(parent).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl PrivateDataLedger for FileLedger {
    fn collections(&self) -> &Collections {
        &self.collections
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.collections.validate(collection, key)?;
        Ok(self.state.get(collection, key))
    }

    fn commit(&mut self, writes: WriteSet) -> Result<(), StorageError> {
        for (collection, key, _) in writes.iter() {
            self.collections.validate(collection, key)?;
        }
        let writes_len = writes.len();
        let mut next = self.state.clone();
        next.apply(writes);
        self.persist(&next)?;
        self.state = next;
        tracing::info!(
            op = "ledger.commit",
            height = self.state.height,
            writes = writes_len,
            "Committed write set"
        );
        Ok(())
    }

    fn height(&self) -> u64 {
        self.state.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_addresses() {
        let collections = Collections::default();
        assert!(matches!(
            collections.validate("", "k"),
            Err(StorageError::EmptyCollection)
        ));
        assert!(matches!(
            collections.validate(COLLECTION_MEDIUM, ""),
            Err(StorageError::EmptyKey)
        ));
        match collections.validate("collectionOther", "k") {
            Err(StorageError::UnknownCollection { collection }) => {
                assert_eq!(collection, "collectionOther")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        collections.validate(COLLECTION_PRIVATE, "k").unwrap();
    }

    #[test]
    fn write_set_keeps_last_write_per_key() {
        let mut writes = WriteSet::new();
        writes.put(COLLECTION_MEDIUM, "p1", b"first".to_vec());
        writes.put(COLLECTION_MEDIUM, "p1", b"second".to_vec());
        writes.put(COLLECTION_PRIVATE, "p1", b"price".to_vec());
        assert_eq!(writes.len(), 2);
        let medium: Vec<_> = writes
            .iter()
            .filter(|(c, _, _)| *c == COLLECTION_MEDIUM)
            .collect();
        assert_eq!(medium, vec![(COLLECTION_MEDIUM, "p1", &b"second"[..])]);
    }

    #[test]
    fn memory_ledger_commits_and_counts_height() {
        let mut ledger = MemoryLedger::new(Collections::default());
        assert_eq!(ledger.get(COLLECTION_MEDIUM, "p1").unwrap(), None);

        let mut writes = WriteSet::new();
        writes.put(COLLECTION_MEDIUM, "p1", b"{}".to_vec());
        ledger.commit(writes).unwrap();

        assert_eq!(ledger.height(), 1);
        assert_eq!(
            ledger.get(COLLECTION_MEDIUM, "p1").unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(ledger.get(COLLECTION_PRIVATE, "p1").unwrap(), None);
    }

    #[test]
    fn commit_with_undefined_collection_applies_nothing() {
        let mut ledger = MemoryLedger::new(Collections::new([COLLECTION_MEDIUM]));
        let mut writes = WriteSet::new();
        writes.put(COLLECTION_MEDIUM, "p1", b"a".to_vec());
        writes.put(COLLECTION_PRIVATE, "p1", b"b".to_vec());
        assert!(ledger.commit(writes).is_err());
        assert_eq!(ledger.height(), 0);
        assert_eq!(ledger.get(COLLECTION_MEDIUM, "p1").unwrap(), None);
    }

    #[test]
    fn file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("ledger.json");

        let mut ledger = FileLedger::open(&path, Collections::default()).unwrap();
        let mut writes = WriteSet::new();
        writes.put(COLLECTION_PRIVATE, "p1", vec![0, 159, 146, 150]);
        ledger.commit(writes).unwrap();
        drop(ledger);

        let reopened = FileLedger::open(&path, Collections::default()).unwrap();
        assert_eq!(reopened.height(), 1);
        assert_eq!(
            reopened.get(COLLECTION_PRIVATE, "p1").unwrap(),
            Some(vec![0, 159, 146, 150])
        );
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("ledger.json")]);
    }

    #[test]
    fn failed_persist_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("ledger.json");

        let mut ledger = FileLedger::open(&path, Collections::default()).unwrap();
        let mut writes = WriteSet::new();
        writes.put(COLLECTION_MEDIUM, "p1", b"{}".to_vec());

        match ledger.commit(writes) {
            Err(StorageError::Io { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(ledger.height(), 0);
        assert_eq!(ledger.get(COLLECTION_MEDIUM, "p1").unwrap(), None);
    }

    #[test]
    fn commits_do_not_share_a_temp_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        // a fixed `<state>.json.tmp` name would collide with this directory
        fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let mut first = FileLedger::open(&path, Collections::default()).unwrap();
        let mut second = FileLedger::open(&path, Collections::default()).unwrap();
        let mut writes = WriteSet::new();
        writes.put(COLLECTION_MEDIUM, "a", b"1".to_vec());
        first.commit(writes).unwrap();
        let mut writes = WriteSet::new();
        writes.put(COLLECTION_MEDIUM, "b", b"2".to_vec());
        second.commit(writes).unwrap();

        // single writer per file: the later rename replaces the earlier snapshot
        let reopened = FileLedger::open(&path, Collections::default()).unwrap();
        assert_eq!(reopened.height(), 1);
        assert_eq!(reopened.get(COLLECTION_MEDIUM, "a").unwrap(), None);
        assert_eq!(reopened.get(COLLECTION_MEDIUM, "b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn file_ledger_rejects_unknown_snapshot_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, r#"{"version":9,"height":0,"collections":{}}"#).unwrap();
        match FileLedger::open(&path, Collections::default()) {
            Err(StorageError::UnsupportedVersion(9)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
