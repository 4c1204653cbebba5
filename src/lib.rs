//! Local persistence and change tracking for the Linear Clone task tracker.
//!
//! Tasks, categories and the signed-in user are kept as JSON values in a
//! string-keyed store. [`LocalStore`] wires the repositories, the session and
//! the seeder to one shared [`storage::RecordStore`].

pub mod cli;
pub mod commands;
pub mod error;
pub mod events;
pub mod repository;
pub mod seed;
pub mod session;
pub mod storage;
pub mod types;
pub mod watch;

pub mod metadata {
    include!(concat!(env!("OUT_DIR"), "/pkg_info.rs"));
}

use std::path::Path;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::repository::{CategoryRepository, TaskRepository};
use crate::session::SessionStore;
use crate::storage::{Backend, RecordStore};
use crate::watch::{TaskWatcher, WatchOptions};

#[derive(Clone)]
pub struct LocalStore {
    store: Arc<RecordStore>,
    pub tasks: TaskRepository,
    pub categories: CategoryRepository,
    pub session: SessionStore,
}

impl LocalStore {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_store(Arc::new(RecordStore::new(backend)))
    }

    pub fn from_store(store: Arc<RecordStore>) -> Self {
        Self {
            tasks: TaskRepository::new(Arc::clone(&store)),
            categories: CategoryRepository::new(Arc::clone(&store)),
            session: SessionStore::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(RecordStore::in_memory()))
    }

    /// Open (or create) the data file in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_store(Arc::new(RecordStore::open(dir)?)))
    }

    pub fn record_store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn seed(&self) -> StoreResult<bool> {
        seed::seed_sample_data(&self.store)
    }

    pub fn watch_tasks(&self, options: WatchOptions) -> TaskWatcher {
        TaskWatcher::spawn(self.tasks.clone(), options)
    }
}
