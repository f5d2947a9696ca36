use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::task::JoinHandle;

/// Identifier distinguishing successive tasks registered under the same session code.
pub type TaskId = u64;

/// At most one background task per session code.
#[derive(Default)]
pub struct ScheduledTasks {
    tasks: DashMap<String, (TaskId, JoinHandle<()>)>,
    next_id: AtomicU64,
}

impl ScheduledTasks {
    /// Empty task table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `make(task_id)` for `code` unless a task is already registered.
    ///
    /// Returns `false` (and spawns nothing) when one is.
    pub fn spawn_once<F, Fut>(&self, code: &str, make: F) -> bool
    where
        F: FnOnce(TaskId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match self.tasks.entry(code.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert((id, tokio::spawn(make(id))));
                true
            }
        }
    }

    /// Abort and forget the task for `code`; returns whether one was registered.
    pub fn cancel(&self, code: &str) -> bool {
        match self.tasks.remove(code) {
            Some((_, (_, handle))) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the task for `code` if it is still the one identified by `id`.
    ///
    /// Called by a task on its way out so it never removes a successor.
    pub fn deregister(&self, code: &str, id: TaskId) -> bool {
        self.tasks
            .remove_if(code, |_, (registered, _)| *registered == id)
            .is_some()
    }

    /// Whether a task is registered for `code`.
    pub fn contains(&self, code: &str) -> bool {
        self.tasks.contains_key(code)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn second_spawn_is_a_no_op() {
        let tasks = ScheduledTasks::new();
        assert!(tasks.spawn_once("GAME_1", |_| std::future::pending::<()>()));
        assert!(!tasks.spawn_once("GAME_1", |_| async {}));
        assert!(tasks.contains("GAME_1"));
        assert!(!tasks.contains("GAME_2"));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let tasks = ScheduledTasks::new();
        tasks.spawn_once("GAME_1", |_| std::future::pending::<()>());
        assert!(tasks.cancel("GAME_1"));
        assert!(!tasks.cancel("GAME_1"));
        assert!(!tasks.cancel("GAME_2"));
        assert!(!tasks.contains("GAME_1"));
    }

    #[tokio::test]
    async fn stale_task_cannot_deregister_successor() {
        let tasks = Arc::new(ScheduledTasks::new());
        let mut first_id = None;
        tasks.spawn_once("GAME_1", |id| {
            first_id = Some(id);
            std::future::pending::<()>()
        });
        tasks.cancel("GAME_1");
        tasks.spawn_once("GAME_1", |_| std::future::pending::<()>());

        assert!(!tasks.deregister("GAME_1", first_id.unwrap()));
        assert!(tasks.contains("GAME_1"));
    }

    #[tokio::test]
    async fn task_can_deregister_itself() {
        let tasks = Arc::new(ScheduledTasks::new());
        let inner = tasks.clone();
        tasks.spawn_once("GAME_1", move |id| async move {
            inner.deregister("GAME_1", id);
        });
        for _ in 0..10 {
            if !tasks.contains("GAME_1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!tasks.contains("GAME_1"));
    }
}
