use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, sleep_until, Instant, MissedTickBehavior},
};

use crate::{
    api::ClassificationBackend,
    config::TaskConfig,
    domain::{TaskState, TaskStatusResponse},
};

use super::fetcher::SharedCache;

/// Emitted once per task when it leaves the active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub task_id: String,
    pub state: TaskState,
}

struct ActiveTask {
    state: TaskState,
    started_at: Instant,
    handle: JoinHandle<()>,
}

type ActiveMap = Arc<Mutex<HashMap<String, ActiveTask>>>;

#[derive(Clone)]
struct PollContext {
    backend: Arc<dyn ClassificationBackend>,
    cache: SharedCache,
    config: TaskConfig,
    active: ActiveMap,
    events: mpsc::UnboundedSender<TaskEvent>,
}

/// Tracks in-flight remote tasks, one poll loop per task id.
pub struct TaskRegistry {
    ctx: PollContext,
}

impl TaskRegistry {
    pub fn new(
        backend: Arc<dyn ClassificationBackend>,
        cache: SharedCache,
        config: TaskConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let ctx = PollContext {
            backend,
            cache,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            events,
        };
        (Self { ctx }, receiver)
    }

    /// Starts polling `task_id`. Returns false if it is already tracked.
    pub fn track(&self, task_id: String) -> bool {
        let mut active = self.ctx.active.lock();
        if active.contains_key(&task_id) {
            return false;
        }
        // Inserted under the lock so the poll loop cannot finish before its entry exists.
        let handle = tokio::spawn(poll_until_terminal(self.ctx.clone(), task_id.clone()));
        active.insert(
            task_id.clone(),
            ActiveTask {
                state: TaskState::Pending,
                started_at: Instant::now(),
                handle,
            },
        );
        tracing::info!(target: "task", task_id = %task_id, "tracking task");
        true
    }

    /// Active tasks with their last observed state and age, ordered by id.
    pub fn active(&self) -> Vec<(String, TaskState, std::time::Duration)> {
        let now = Instant::now();
        let mut tasks: Vec<_> = self
            .ctx
            .active
            .lock()
            .iter()
            .map(|(id, task)| {
                (
                    id.clone(),
                    task.state.clone(),
                    now.duration_since(task.started_at),
                )
            })
            .collect();
        tasks.sort_by(|a, b| a.0.cmp(&b.0));
        tasks
    }

    pub fn is_empty(&self) -> bool {
        self.ctx.active.lock().is_empty()
    }

    pub fn cancel(&self, task_id: &str) -> bool {
        let Some(task) = self.ctx.active.lock().remove(task_id) else {
            return false;
        };
        task.handle.abort();
        tracing::info!(target: "task", task_id, "task polling cancelled");
        let _ = self.ctx.events.send(TaskEvent {
            task_id: task_id.to_string(),
            state: TaskState::Cancelled,
        });
        true
    }

    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.ctx.active.lock().keys().cloned().collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }
}

/// State after observing one status response.
pub fn next_state(response: &TaskStatusResponse) -> TaskState {
    TaskState::from_status(&response.status, response.error.as_deref())
}

async fn poll_until_terminal(ctx: PollContext, task_id: String) {
    let deadline = Instant::now() + ctx.config.timeout;
    let mut ticker = interval(ctx.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = sleep_until(deadline) => break TaskState::TimedOut,
        }

        match ctx.backend.task_status(&task_id).await {
            Ok(response) => {
                let state = next_state(&response);
                tracing::debug!(target: "task", task_id = %task_id, status = %response.status, %state, "task status");
                if state.is_terminal() {
                    break state;
                }
                if let Some(task) = ctx.active.lock().get_mut(&task_id) {
                    task.state = state;
                }
            }
            Err(err) => {
                tracing::warn!(target: "task", task_id = %task_id, error = %err, "error checking task status");
            }
        }

        if Instant::now() >= deadline {
            break TaskState::TimedOut;
        }
    };

    finish(&ctx, &task_id, state);
}

fn finish(ctx: &PollContext, task_id: &str, state: TaskState) {
    if ctx.active.lock().remove(task_id).is_none() {
        return;
    }

    match &state {
        TaskState::Completed => {
            ctx.cache.lock().invalidate_all();
            tracing::info!(target: "task", task_id, "task completed; cached result pages invalidated");
        }
        TaskState::Failed(reason) => {
            tracing::warn!(target: "task", task_id, reason = reason.as_deref().unwrap_or("-"), "task failed");
        }
        TaskState::TimedOut => {
            tracing::warn!(
                target: "task",
                task_id,
                timeout_secs = ctx.config.timeout.as_secs(),
                "task did not finish in time; polling stopped"
            );
        }
        _ => {}
    }

    let _ = ctx.events.send(TaskEvent {
        task_id: task_id.to_string(),
        state,
    });
}
