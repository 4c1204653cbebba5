//! String-keyed record store.
//!
//! Values are persisted as JSON text under fixed keys, the same layout the
//! browser build kept in local storage. Reads never fail: a missing, empty or
//! unparseable value yields the caller's default.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::error::{StoreError, StoreResult};
use crate::events::{ChangeBus, ChangeEvent};

pub mod keys {
    pub const TASKS: &str = "linear_tasks";
    pub const CATEGORIES: &str = "linear_categories";
    pub const USER: &str = "linear_user";
    pub const NEXT_TASK_ID: &str = "linear_next_task_id";
    pub const NEXT_CATEGORY_ID: &str = "linear_next_category_id";
}

pub const DATA_FILE_NAME: &str = "data.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Set { key: String, value: String },
    Remove { key: String },
}

impl Mutation {
    fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. } | Mutation::Remove { key } => key,
        }
    }
}

/// Raw key/value persistence. Implementations store opaque text.
pub trait Backend: Send {
    fn get(&self, key: &str) -> Option<String>;

    /// Apply every mutation in `batch` or none of them.
    fn apply(&mut self, batch: &[Mutation]) -> StoreResult<()>;

    /// Pick up changes written by someone else. Returns whether anything
    /// differed from what this backend last saw.
    fn refresh(&mut self) -> StoreResult<bool> {
        Ok(false)
    }
}

fn apply_to_map(entries: &mut BTreeMap<String, String>, batch: &[Mutation]) {
    for mutation in batch {
        match mutation {
            Mutation::Set { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            Mutation::Remove { key } => {
                entries.remove(key);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw text, bypassing serialization. Handy for simulating
    /// hand-edited or damaged data.
    pub fn with_raw<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn apply(&mut self, batch: &[Mutation]) -> StoreResult<()> {
        apply_to_map(&mut self.entries, batch);
        Ok(())
    }
}

/// Keeps every key in one JSON object on disk.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileBackend {
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = Self::load(&path)?;
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened data file");
        Ok(Self { path, entries })
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(dir.as_ref().join(DATA_FILE_NAME))
    }

    /// `<data dir>/linear-clone`, falling back to `~/.linear-clone`.
    pub fn default_dir() -> StoreResult<PathBuf> {
        if let Some(dir) = dirs::data_local_dir() {
            return Ok(dir.join("linear-clone"));
        }
        dirs::home_dir()
            .map(|home| home.join(".linear-clone"))
            .ok_or_else(|| StoreError::Config("couldn't find a data or home directory".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the data file. Each key stays independent: a value that is not a
    /// JSON string is kept as its JSON text and left for the typed read to
    /// judge. A file that is not a JSON object at all is moved aside to
    /// `<name>.corrupt` so the next save cannot destroy it.
    fn load(path: &Path) -> StoreResult<BTreeMap<String, String>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str::<BTreeMap<String, Value>>(&contents) {
            Ok(entries) => Ok(entries
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(text) => (key, text),
                    other => (key, other.to_string()),
                })
                .collect()),
            Err(e) => {
                let aside = corrupt_path(path);
                match fs::rename(path, &aside) {
                    Ok(()) => tracing::warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "data file is corrupt, starting empty"
                    ),
                    Err(rename_err) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        rename_error = %rename_err,
                        "data file is corrupt and could not be moved aside, starting empty"
                    ),
                }
                Ok(BTreeMap::new())
            }
        }
    }

    /// Write through a temporary file and an atomic rename so a crash never
    /// leaves a half-written data file behind.
    fn save(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp = self.path.with_extension("tmp");
        let mut f = File::create(&temp)?;
        let content = serde_json::to_string_pretty(entries)?;
        f.write_all(content.as_bytes())?;
        f.sync_all()?;
        fs::rename(temp, &self.path)?;
        Ok(())
    }
}

impl Backend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// Applies the batch on top of what is on disk now, so keys this batch
    /// does not name keep whatever another process last wrote to them.
    fn apply(&mut self, batch: &[Mutation]) -> StoreResult<()> {
        let mut next = Self::load(&self.path)?;
        apply_to_map(&mut next, batch);
        self.save(&next)?;
        self.entries = next;
        Ok(())
    }

    fn refresh(&mut self) -> StoreResult<bool> {
        let on_disk = Self::load(&self.path)?;
        if on_disk == self.entries {
            return Ok(false);
        }
        self.entries = on_disk;
        Ok(true)
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(text) = raw else {
        return default;
    };
    if text.is_empty() {
        return default;
    }
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "stored value is malformed, using default");
            default
        }
    }
}

/// Process-wide owner of a [`Backend`].
///
/// Every access goes through one lock, so a read-modify-write done inside
/// [`RecordStore::transaction`] cannot interleave with another caller.
pub struct RecordStore {
    backend: Mutex<Box<dyn Backend>>,
    bus: ChangeBus,
}

impl RecordStore {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
            bus: ChangeBus::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(FileBackend::in_dir(dir)?))
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Backend>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = self.lock().get(key);
        decode(key, raw, default)
    }

    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.transaction(|tx| tx.write(key, value))
    }

    pub fn remove(&self, key: &str) -> StoreResult<()> {
        self.transaction(|tx| {
            tx.remove(key);
            Ok(())
        })
    }

    /// Run `f` under the store lock. Writes staged by `f` are committed as a
    /// single batch once it returns `Ok`; on `Err` nothing is written.
    pub fn transaction<R, F>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<R>,
    {
        let mut guard = self.lock();
        let (result, staged) = {
            let mut tx = Transaction {
                backend: &**guard,
                staged: Vec::new(),
            };
            let result = f(&mut tx)?;
            (result, tx.staged)
        };
        if !staged.is_empty() {
            guard.apply(&staged)?;
            tracing::trace!(writes = staged.len(), "committed transaction");
        }
        Ok(result)
    }

    /// Reload from the backend and announce external modifications.
    pub fn refresh(&self) -> StoreResult<bool> {
        let changed = self.lock().refresh()?;
        if changed {
            tracing::debug!("persisted data changed outside this process");
            self.bus.publish(ChangeEvent::External);
        }
        Ok(changed)
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        self.bus.publish(event);
    }
}

pub struct Transaction<'a> {
    backend: &'a dyn Backend,
    staged: Vec<Mutation>,
}

impl Transaction<'_> {
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.staged.iter().rev().find(|m| m.key() == key) {
            Some(Mutation::Set { value, .. }) => Some(value.clone()),
            Some(Mutation::Remove { .. }) => None,
            None => self.backend.get(key),
        };
        decode(key, raw, default)
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_string(value)?;
        self.staged.push(Mutation::Set {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.staged.push(Mutation::Remove {
            key: key.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_default_for_missing_key() {
        let store = RecordStore::in_memory();
        let value: Vec<u64> = store.read("nothing", vec![42]);
        assert_eq!(value, vec![42]);
    }

    #[test]
    fn read_returns_default_for_corrupt_text() {
        let store = RecordStore::new(
            MemoryBackend::new()
                .with_raw(keys::TASKS, "{not json")
                .with_raw(keys::NEXT_TASK_ID, ""),
        );
        let tasks: Vec<u64> = store.read(keys::TASKS, Vec::new());
        let next: u64 = store.read(keys::NEXT_TASK_ID, 1);
        assert!(tasks.is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn read_returns_default_for_wrong_shape() {
        let store = RecordStore::new(MemoryBackend::new().with_raw(keys::TASKS, "\"hello\""));
        let tasks: Vec<u64> = store.read(keys::TASKS, Vec::new());
        assert!(tasks.is_empty());
    }

    #[test]
    fn write_then_read_preserves_order() {
        let store = RecordStore::in_memory();
        store.write("seq", &vec![3, 1, 2]).unwrap();
        let back: Vec<i32> = store.read("seq", Vec::new());
        assert_eq!(back, vec![3, 1, 2]);
    }

    #[test]
    fn remove_deletes_key() {
        let store = RecordStore::in_memory();
        store.write("k", &5u32).unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.read("k", 0u32), 0);
    }

    #[test]
    fn transaction_sees_its_own_writes() {
        let store = RecordStore::in_memory();
        let seen = store
            .transaction(|tx| {
                tx.write("n", &1u32)?;
                let n: u32 = tx.read("n", 0);
                tx.write("n", &(n + 1))?;
                tx.remove("gone");
                Ok(tx.read("n", 0u32))
            })
            .unwrap();
        assert_eq!(seen, 2);
        assert_eq!(store.read("n", 0u32), 2);
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let store = RecordStore::in_memory();
        let result: StoreResult<()> = store.transaction(|tx| {
            tx.write("n", &1u32)?;
            Err(StoreError::Other("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.read("n", 0u32), 0);
    }

    #[test]
    fn memory_backend_never_reports_external_changes() {
        let store = RecordStore::in_memory();
        let mut rx = store.subscribe();
        assert!(!store.refresh().unwrap());
        assert!(rx.try_recv().is_err());
    }
}
