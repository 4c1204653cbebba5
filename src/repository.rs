//! Typed CRUD over the record store.
//!
//! Each entity type lives under one collection key as an ordered JSON array,
//! with its id counter under a second key. Lookups are linear scans; the
//! collections are small and insertion order is the display order.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::events::ChangeEvent;
use crate::storage::{RecordStore, Transaction, keys};
use crate::types::{
    Category, CategoryPatch, NewCategory, NewTask, Task, TaskPatch, TaskStatus, Timestamp,
};

pub trait Entity: Clone + Serialize + DeserializeOwned + Send + 'static {
    /// Caller-supplied fields for `create`.
    type Draft;
    /// Partial fields for `update`.
    type Patch;

    const COLLECTION_KEY: &'static str;
    const NEXT_ID_KEY: &'static str;

    fn id(&self) -> u64;

    fn from_draft(id: u64, draft: Self::Draft, now: Timestamp) -> Self;

    /// Shallow-merge `patch` and stamp `updated_at`.
    fn merge(&mut self, patch: Self::Patch, now: Timestamp);

    fn created(id: u64) -> ChangeEvent;
    fn updated(id: u64) -> ChangeEvent;
    fn deleted(id: u64) -> ChangeEvent;
}

impl Entity for Task {
    type Draft = NewTask;
    type Patch = TaskPatch;

    const COLLECTION_KEY: &'static str = keys::TASKS;
    const NEXT_ID_KEY: &'static str = keys::NEXT_TASK_ID;

    fn id(&self) -> u64 {
        self.id
    }

    fn from_draft(id: u64, draft: NewTask, now: Timestamp) -> Self {
        Task {
            id,
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            due_date: draft.due_date,
            category: draft.category,
            user: draft.user,
            created_at: now,
            updated_at: now,
        }
    }

    fn merge(&mut self, patch: TaskPatch, now: Timestamp) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(user) = patch.user {
            self.user = user;
        }
        self.updated_at = now;
    }

    fn created(id: u64) -> ChangeEvent {
        ChangeEvent::TaskCreated(id)
    }

    fn updated(id: u64) -> ChangeEvent {
        ChangeEvent::TaskUpdated(id)
    }

    fn deleted(id: u64) -> ChangeEvent {
        ChangeEvent::TaskDeleted(id)
    }
}

impl Entity for Category {
    type Draft = NewCategory;
    type Patch = CategoryPatch;

    const COLLECTION_KEY: &'static str = keys::CATEGORIES;
    const NEXT_ID_KEY: &'static str = keys::NEXT_CATEGORY_ID;

    fn id(&self) -> u64 {
        self.id
    }

    fn from_draft(id: u64, draft: NewCategory, now: Timestamp) -> Self {
        Category {
            id,
            name: draft.name,
            created_at: now,
            updated_at: now,
        }
    }

    fn merge(&mut self, patch: CategoryPatch, now: Timestamp) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        self.updated_at = now;
    }

    fn created(id: u64) -> ChangeEvent {
        ChangeEvent::CategoryCreated(id)
    }

    fn updated(id: u64) -> ChangeEvent {
        ChangeEvent::CategoryUpdated(id)
    }

    fn deleted(id: u64) -> ChangeEvent {
        ChangeEvent::CategoryDeleted(id)
    }
}

fn id_space_exhausted<E: Entity>() -> StoreError {
    StoreError::Other(format!("no ids left under {}", E::NEXT_ID_KEY))
}

/// Append a new entity inside an open transaction, advancing the id counter.
pub(crate) fn insert<E: Entity>(tx: &mut Transaction<'_>, draft: E::Draft) -> StoreResult<E> {
    let mut entities: Vec<E> = tx.read(E::COLLECTION_KEY, Vec::new());
    let counter: u64 = tx.read(E::NEXT_ID_KEY, 1);
    // A stale counter must still never hand out an id already in use.
    let floor = match entities.iter().map(|e| e.id()).max() {
        Some(max) => max.checked_add(1).ok_or_else(id_space_exhausted::<E>)?,
        None => 1,
    };
    let id = counter.max(floor);
    let next_id = id.checked_add(1).ok_or_else(id_space_exhausted::<E>)?;

    let entity = E::from_draft(id, draft, Utc::now());
    entities.push(entity.clone());
    tx.write(E::COLLECTION_KEY, &entities)?;
    tx.write(E::NEXT_ID_KEY, &next_id)?;
    Ok(entity)
}

pub struct Repository<E> {
    store: Arc<RecordStore>,
    _entity: PhantomData<fn() -> E>,
}

pub type TaskRepository = Repository<Task>;
pub type CategoryRepository = Repository<Category>;

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn get_all(&self) -> Vec<E> {
        self.store.read(E::COLLECTION_KEY, Vec::new())
    }

    pub fn get_by_id(&self, id: u64) -> Option<E> {
        self.get_all().into_iter().find(|e| e.id() == id)
    }

    pub fn create(&self, draft: E::Draft) -> StoreResult<E> {
        let entity = self.store.transaction(|tx| insert::<E>(tx, draft))?;

        tracing::debug!(key = E::COLLECTION_KEY, id = entity.id(), "created");
        self.store.publish(E::created(entity.id()));
        Ok(entity)
    }

    /// Returns `Ok(None)` when no entity has `id`; the collection is left as is.
    pub fn update(&self, id: u64, patch: E::Patch) -> StoreResult<Option<E>> {
        let updated = self.store.transaction(|tx| {
            let mut entities: Vec<E> = tx.read(E::COLLECTION_KEY, Vec::new());
            let Some(entity) = entities.iter_mut().find(|e| e.id() == id) else {
                return Ok(None);
            };
            entity.merge(patch, Utc::now());
            let updated = entity.clone();
            tx.write(E::COLLECTION_KEY, &entities)?;
            Ok(Some(updated))
        })?;

        match &updated {
            Some(_) => {
                tracing::debug!(key = E::COLLECTION_KEY, id, "updated");
                self.store.publish(E::updated(id));
            }
            None => tracing::debug!(key = E::COLLECTION_KEY, id, "update skipped, no such id"),
        }
        Ok(updated)
    }

    /// Returns whether an entity was removed. Deleting an unknown id is a no-op.
    pub fn delete(&self, id: u64) -> StoreResult<bool> {
        let removed = self.store.transaction(|tx| {
            let mut entities: Vec<E> = tx.read(E::COLLECTION_KEY, Vec::new());
            let before = entities.len();
            entities.retain(|e| e.id() != id);
            if entities.len() == before {
                return Ok(false);
            }
            tx.write(E::COLLECTION_KEY, &entities)?;
            Ok(true)
        })?;

        if removed {
            tracing::debug!(key = E::COLLECTION_KEY, id, "deleted");
            self.store.publish(E::deleted(id));
        }
        Ok(removed)
    }
}

impl Repository<Task> {
    pub fn get_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.get_all()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    /// Filters on the category snapshot embedded in each task.
    pub fn get_by_category(&self, category_id: u64) -> Vec<Task> {
        self.get_all()
            .into_iter()
            .filter(|t| t.category.as_ref().is_some_and(|c| c.id == category_id))
            .collect()
    }
}

impl Repository<Category> {
    pub fn create_named<S: Into<String>>(&self, name: S) -> StoreResult<Category> {
        self.create(NewCategory { name: name.into() })
    }

    pub fn rename<S: Into<String>>(&self, id: u64, name: S) -> StoreResult<Option<Category>> {
        self.update(
            id,
            CategoryPatch {
                name: Some(name.into()),
            },
        )
    }
}
