//! First-run sample data.

use chrono::{Days, Utc};

use crate::error::StoreResult;
use crate::events::ChangeEvent;
use crate::repository::insert;
use crate::storage::{RecordStore, keys};
use crate::types::{
    Category, CategorySnapshot, NewCategory, NewTask, Task, TaskPriority, TaskStatus,
};

pub const SEED_CATEGORIES: [&str; 3] = ["Work", "Personal", "Shopping"];

/// Populate sample categories and tasks when both collections are empty.
///
/// Returns `false` without writing anything if either collection already has
/// entries.
pub fn seed_sample_data(store: &RecordStore) -> StoreResult<bool> {
    let seeded = store.transaction(|tx| {
        let tasks: Vec<Task> = tx.read(keys::TASKS, Vec::new());
        let categories: Vec<Category> = tx.read(keys::CATEGORIES, Vec::new());
        if !tasks.is_empty() || !categories.is_empty() {
            return Ok(false);
        }

        let mut created: Vec<Category> = Vec::with_capacity(SEED_CATEGORIES.len());
        for name in SEED_CATEGORIES {
            let category = insert::<Category>(
                tx,
                NewCategory {
                    name: name.to_string(),
                },
            )?;
            created.push(category);
        }
        let work = CategorySnapshot::from(&created[0]);
        let personal = CategorySnapshot::from(&created[1]);
        let next_week = Utc::now().date_naive().checked_add_days(Days::new(7));

        for draft in [
            NewTask {
                title: "Welcome to Linear Clone! 🎉".into(),
                description: "This is your first task. Feel free to edit or delete it.".into(),
                status: TaskStatus::Todo,
                priority: Some(TaskPriority::Medium),
                due_date: None,
                category: Some(work.clone()),
                user: None,
            },
            NewTask {
                title: "Try creating a new task".into(),
                description: "Click the \"New Issue\" button in the header to create a task."
                    .into(),
                status: TaskStatus::Todo,
                priority: Some(TaskPriority::Low),
                due_date: next_week,
                category: Some(personal),
                user: None,
            },
            NewTask {
                title: "Explore the filters".into(),
                description: "Use the filter buttons to view tasks by status.".into(),
                status: TaskStatus::InProgress,
                priority: Some(TaskPriority::High),
                due_date: None,
                category: Some(work),
                user: None,
            },
        ] {
            insert::<Task>(tx, draft)?;
        }
        Ok(true)
    })?;

    if seeded {
        tracing::info!("seeded sample data");
        store.publish(ChangeEvent::Seeded);
    } else {
        tracing::debug!("sample data skipped, store is not empty");
    }
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{CategoryRepository, TaskRepository};
    use std::sync::Arc;

    #[test]
    fn seeds_empty_store() {
        let store = Arc::new(RecordStore::in_memory());
        assert!(seed_sample_data(&store).unwrap());

        let categories = CategoryRepository::new(Arc::clone(&store)).get_all();
        let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, SEED_CATEGORIES);

        let tasks = TaskRepository::new(Arc::clone(&store));
        let all = tasks.get_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(tasks.get_by_category(1).len(), 2);
        assert_eq!(tasks.get_by_category(2).len(), 1);
        assert!(tasks.get_by_category(3).is_empty());
        assert_eq!(tasks.get_by_status(TaskStatus::InProgress).len(), 1);

        let expected_due = Utc::now().date_naive().checked_add_days(Days::new(7));
        assert_eq!(all[1].due_date, expected_due);
        assert!(all[0].due_date.is_none() && all[2].due_date.is_none());
    }

    #[test]
    fn counters_continue_after_seed() {
        let store = Arc::new(RecordStore::in_memory());
        seed_sample_data(&store).unwrap();

        let tasks = TaskRepository::new(Arc::clone(&store));
        let categories = CategoryRepository::new(Arc::clone(&store));
        assert_eq!(tasks.create(NewTask::titled("mine")).unwrap().id, 4);
        assert_eq!(categories.create_named("Errands").unwrap().id, 4);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let store = Arc::new(RecordStore::in_memory());
        assert!(seed_sample_data(&store).unwrap());
        assert!(!seed_sample_data(&store).unwrap());

        assert_eq!(TaskRepository::new(Arc::clone(&store)).get_all().len(), 3);
        assert_eq!(CategoryRepository::new(store).get_all().len(), 3);
    }

    #[test]
    fn skips_when_only_categories_exist() {
        let store = Arc::new(RecordStore::in_memory());
        CategoryRepository::new(Arc::clone(&store))
            .create_named("Mine")
            .unwrap();

        assert!(!seed_sample_data(&store).unwrap());
        assert!(TaskRepository::new(store).get_all().is_empty());
    }
}
