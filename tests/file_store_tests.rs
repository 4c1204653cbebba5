use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use linear_local_store::LocalStore;
use linear_local_store::events::ChangeEvent;
use linear_local_store::storage::{DATA_FILE_NAME, FileBackend, RecordStore, keys};
use linear_local_store::types::{NewTask, Task, TaskPatch, TaskPriority, TaskStatus};
use linear_local_store::watch::WatchOptions;
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn data_survives_reopening() {
    let dir = tempdir().unwrap();

    let first = LocalStore::open(dir.path()).unwrap();
    let work = first.categories.create_named("Work").unwrap();
    let created: Vec<Task> = ["one", "two", "three"]
        .into_iter()
        .map(|title| first.tasks.create(NewTask::titled(title)).unwrap())
        .collect();
    first.session.login("ada", "").unwrap();
    drop(first);

    let second = LocalStore::open(dir.path()).unwrap();
    assert_eq!(second.tasks.get_all(), created);
    assert_eq!(second.categories.get_by_id(work.id), Some(work));
    assert_eq!(second.session.current().unwrap().username, "ada");
    assert_eq!(second.tasks.create(NewTask::titled("four")).unwrap().id, 4);
}

#[test]
fn persisted_layout_uses_browser_keys() {
    let dir = tempdir().unwrap();
    let store = LocalStore::open(dir.path()).unwrap();
    store.seed().unwrap();
    store.session.register("grace", "grace@example.com", "").unwrap();

    let raw = fs::read_to_string(dir.path().join(DATA_FILE_NAME)).unwrap();
    let file: Value = serde_json::from_str(&raw).unwrap();
    for key in [
        keys::TASKS,
        keys::CATEGORIES,
        keys::USER,
        keys::NEXT_TASK_ID,
        keys::NEXT_CATEGORY_ID,
    ] {
        assert!(file[key].is_string(), "missing {key}");
    }

    let tasks: Value = serde_json::from_str(file[keys::TASKS].as_str().unwrap()).unwrap();
    assert_eq!(tasks[0]["status"], "TODO");
    assert_eq!(tasks[0]["category"]["name"], "Work");
    assert!(tasks[1]["dueDate"].is_string());
    assert_eq!(file[keys::NEXT_TASK_ID], "4");
}

#[test]
fn corrupt_data_file_reads_as_empty() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(DATA_FILE_NAME), "{ this is not json").unwrap();

    let store = LocalStore::open(dir.path()).unwrap();
    assert!(store.tasks.get_all().is_empty());
    assert!(store.session.current().is_none());

    let task = store.tasks.create(NewTask::titled("recovered")).unwrap();
    assert_eq!(task.id, 1);
    let reopened = LocalStore::open(dir.path()).unwrap();
    assert_eq!(reopened.tasks.get_all(), vec![task]);

    let kept = fs::read_to_string(dir.path().join("data.json.corrupt")).unwrap();
    assert_eq!(kept, "{ this is not json");
}

#[test]
fn non_string_value_only_affects_its_own_key() {
    let dir = tempdir().unwrap();
    let first = LocalStore::open(dir.path()).unwrap();
    let keep = first.tasks.create(NewTask::titled("keep me")).unwrap();
    let too = first.tasks.create(NewTask::titled("me too")).unwrap();
    drop(first);

    let path = dir.path().join(DATA_FILE_NAME);
    let mut file: BTreeMap<String, Value> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    file.insert(keys::NEXT_TASK_ID.to_string(), Value::from(3));
    fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();

    let store = LocalStore::open(dir.path()).unwrap();
    assert_eq!(store.tasks.get_all(), vec![keep.clone(), too.clone()]);
    let added = store.tasks.create(NewTask::titled("new")).unwrap();
    assert_eq!(added.id, 3);

    let reopened = LocalStore::open(dir.path()).unwrap();
    assert_eq!(reopened.tasks.get_all(), vec![keep, too, added]);
    assert!(!dir.path().join("data.json.corrupt").exists());
}

#[test]
fn writes_leave_other_instances_keys_alone() {
    let dir = tempdir().unwrap();
    let a = LocalStore::open(dir.path()).unwrap();
    let b = LocalStore::open(dir.path()).unwrap();

    b.session.login("ada", "").unwrap();
    let task = a.tasks.create(NewTask::titled("from a")).unwrap();

    let fresh = LocalStore::open(dir.path()).unwrap();
    assert_eq!(fresh.session.current().unwrap().username, "ada");
    assert_eq!(fresh.tasks.get_all(), vec![task]);
}

#[test]
fn corrupt_single_key_falls_back_to_default() {
    let dir = tempdir().unwrap();
    let data = BTreeMap::from([
        (keys::TASKS, "[{\"broken\": "),
        (keys::NEXT_TASK_ID, "7"),
    ]);
    fs::write(
        dir.path().join(DATA_FILE_NAME),
        serde_json::to_string(&data).unwrap(),
    )
    .unwrap();

    let store = LocalStore::open(dir.path()).unwrap();
    assert!(store.tasks.get_all().is_empty());
    assert_eq!(store.tasks.create(NewTask::titled("after")).unwrap().id, 7);
}

#[test]
fn refresh_detects_writes_from_another_instance() {
    let dir = tempdir().unwrap();
    let ours = Arc::new(RecordStore::new(FileBackend::in_dir(dir.path()).unwrap()));
    let theirs = LocalStore::open(dir.path()).unwrap();
    let view = LocalStore::from_store(Arc::clone(&ours));
    let mut events = ours.subscribe();

    assert!(!ours.refresh().unwrap());
    let task = theirs.tasks.create(NewTask::titled("from elsewhere")).unwrap();
    assert!(view.tasks.get_all().is_empty());

    assert!(ours.refresh().unwrap());
    assert_eq!(events.try_recv().unwrap(), ChangeEvent::External);
    assert_eq!(view.tasks.get_all(), vec![task]);
    assert!(!ours.refresh().unwrap());
}

#[test]
fn round_trip_preserves_order_and_fields() {
    let dir = tempdir().unwrap();
    let store = LocalStore::open(dir.path()).unwrap();

    for n in 0..20u64 {
        let draft = NewTask {
            title: format!("task {n}"),
            description: "x".repeat(n as usize),
            status: TaskStatus::ALL[(n % 4) as usize],
            priority: (n % 3 == 0).then_some(TaskPriority::Urgent),
            ..Default::default()
        };
        store.tasks.create(draft).unwrap();
    }
    let written = store.tasks.get_all();
    store.record_store().write(keys::TASKS, &written).unwrap();

    let reopened = LocalStore::open(dir.path()).unwrap();
    assert_eq!(reopened.tasks.get_all(), written);
}

#[test]
fn scenario_create_update_delete() {
    let dir = tempdir().unwrap();
    let store = LocalStore::open(dir.path()).unwrap();

    let a = store.tasks.create(NewTask::titled("A")).unwrap();
    assert_eq!(a.id, 1);
    assert_eq!(a.created_at, a.updated_at);

    let done = store
        .tasks
        .update(a.id, TaskPatch::status(TaskStatus::Done))
        .unwrap()
        .unwrap();
    assert_eq!(done.created_at, a.created_at);
    assert_eq!(store.tasks.get_by_status(TaskStatus::Done), vec![done]);

    assert!(store.tasks.delete(a.id).unwrap());
    assert!(!store.tasks.delete(a.id).unwrap());
    assert!(!store.tasks.delete(999).unwrap());
    assert_eq!(store.tasks.create(NewTask::titled("B")).unwrap().id, 2);
}

#[tokio::test]
async fn watcher_picks_up_external_writes_by_polling() {
    let dir = tempdir().unwrap();
    let ours = LocalStore::open(dir.path()).unwrap();
    let theirs = LocalStore::open(dir.path()).unwrap();

    let watcher = ours.watch_tasks(WatchOptions {
        interval: Duration::from_millis(25),
        category: None,
    });
    let mut rx = watcher.subscribe();

    let task = theirs.tasks.create(NewTask::titled("remote")).unwrap();
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rx.borrow_and_update().clone(), vec![task]);

    watcher.stop().await.unwrap();
}
