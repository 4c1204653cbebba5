//! Keeps a live view of the task collection.
//!
//! The watcher reloads on a fixed interval and whenever the store publishes a
//! task-related [`ChangeEvent`]. Consumers read the latest collection from a
//! `tokio::sync::watch` receiver, which only wakes when the contents differ.

use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};
use crate::events::ChangeEvent;
use crate::repository::TaskRepository;
use crate::types::Task;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Only keep tasks whose category snapshot has this id.
    pub category: Option<u64>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            category: None,
        }
    }
}

pub struct TaskWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    snapshot: watch::Receiver<Vec<Task>>,
}

impl TaskWatcher {
    /// Start watching. Must be called from within a tokio runtime.
    pub fn spawn(tasks: TaskRepository, options: WatchOptions) -> Self {
        Self::spawn_with_token(tasks, options, CancellationToken::new())
    }

    pub fn spawn_with_token(
        tasks: TaskRepository,
        options: WatchOptions,
        cancel: CancellationToken,
    ) -> Self {
        let events = tasks.store().subscribe();
        let initial = load(&tasks, options.category);
        let (sender, snapshot) = watch::channel(initial);
        let handle = tokio::spawn(run(tasks, options, cancel.clone(), sender, events));
        Self {
            cancel,
            handle,
            snapshot,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.snapshot.clone()
    }

    pub fn latest(&self) -> Vec<Task> {
        self.snapshot.borrow().clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(mut self) -> StoreResult<()> {
        self.cancel.cancel();
        (&mut self.handle)
            .await
            .map_err(|e| StoreError::Other(format!("task watcher panicked: {e}")))
    }
}

impl Drop for TaskWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn load(tasks: &TaskRepository, category: Option<u64>) -> Vec<Task> {
    match category {
        Some(id) => tasks.get_by_category(id),
        None => tasks.get_all(),
    }
}

async fn run(
    tasks: TaskRepository,
    options: WatchOptions,
    cancel: CancellationToken,
    sender: watch::Sender<Vec<Task>>,
    mut events: broadcast::Receiver<ChangeEvent>,
) {
    // tokio panics on a zero period.
    let mut ticker = tokio::time::interval(options.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    tracing::debug!(interval_ms = options.interval.as_millis() as u64, "task watcher started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            event = events.recv(), if events_open => match event {
                Ok(event) if event.touches_tasks() => {
                    tracing::trace!(?event, "reloading after change event");
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "task watcher lagged behind change events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    events_open = false;
                    continue;
                }
            },
        }

        let worker = tasks.clone();
        let category = options.category;
        let reloaded = tokio::task::spawn_blocking(move || -> StoreResult<Vec<Task>> {
            worker.store().refresh()?;
            Ok(load(&worker, category))
        })
        .await;

        match reloaded {
            Ok(Ok(fresh)) => {
                sender.send_if_modified(|current| {
                    if *current == fresh {
                        return false;
                    }
                    *current = fresh;
                    true
                });
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "task reload failed"),
            Err(e) => tracing::warn!(error = %e, "task reload worker failed"),
        }
    }
    tracing::debug!("task watcher stopped");
}
