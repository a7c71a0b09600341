//! Post-validation task supervision
//!
//! Tasks run detached on the tokio runtime. Their outcome never reaches the
//! caller that scheduled them; it is only visible by polling the
//! supervisor's status table.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DEFAULT_MAX_TRACKED_TASKS;
use crate::contracts::{PersistenceRequest, PostValidationTask, TaskStatus, TaskType};

/// Work performed by a post-validation task
#[async_trait]
pub trait PostValidationHook: Send + Sync {
    async fn run(&self, task_type: TaskType, request: &PersistenceRequest) -> Result<(), String>;
}

/// Default hook: one structured log record per task
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

#[async_trait]
impl PostValidationHook for TracingHook {
    async fn run(&self, task_type: TaskType, request: &PersistenceRequest) -> Result<(), String> {
        tracing::info!(
            task_type = %task_type,
            operation_id = %request.operation_id,
            operation_type = %request.operation_type,
            simulation_id = %request.simulation_id,
            entity_id = %request.entity_id,
            "Post-validation task"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TaskTable {
    entries: HashMap<Uuid, PostValidationTask>,
    order: VecDeque<Uuid>,
}

impl TaskTable {
    fn insert(&mut self, task: PostValidationTask, max_tracked: usize) {
        self.order.push_back(task.task_id);
        self.entries.insert(task.task_id, task);

        while self.entries.len() > max_tracked {
            let position = self
                .order
                .iter()
                .position(|id| self.entries.get(id).map_or(true, |t| t.status.is_terminal()))
                .unwrap_or(0);
            match self.order.remove(position) {
                Some(id) => {
                    self.entries.remove(&id);
                }
                None => break,
            }
        }
    }

    fn transition(&mut self, task_id: Uuid, next: TaskStatus, error: Option<String>) -> bool {
        match self.entries.get_mut(&task_id) {
            Some(task) if task.status.can_transition_to(next) => {
                task.status = next;
                task.error = error;
                task.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

/// Spawns and tracks post-validation tasks
#[derive(Debug)]
pub struct TaskSupervisor {
    max_tracked: usize,
    table: RwLock<TaskTable>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACKED_TASKS)
    }
}

impl TaskSupervisor {
    pub fn new(max_tracked: usize) -> Self {
        Self {
            max_tracked: max_tracked.max(1),
            table: RwLock::new(TaskTable::default()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `work` as a supervised task and return its pending descriptor.
    ///
    /// Must be called from within a tokio runtime. A task whose work panics
    /// is recorded as failed.
    pub fn spawn<F>(self: &Arc<Self>, task_type: TaskType, work: F) -> PostValidationTask
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let task = PostValidationTask::pending(task_type);
        let task_id = task.task_id;
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.clone(), self.max_tracked);

        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            supervisor.transition(task_id, TaskStatus::Running, None);

            match tokio::spawn(work).await {
                Ok(Ok(())) => {
                    tracing::debug!(task_id = %task_id, task_type = %task_type, "Task completed");
                    supervisor.transition(task_id, TaskStatus::Completed, None);
                }
                Ok(Err(error)) => {
                    tracing::warn!(task_id = %task_id, task_type = %task_type, error = %error, "Task failed");
                    supervisor.transition(task_id, TaskStatus::Failed, Some(error));
                }
                Err(join_error) => {
                    let error = format!("Task aborted: {}", join_error);
                    tracing::error!(task_id = %task_id, task_type = %task_type, error = %error, "Task aborted");
                    supervisor.transition(task_id, TaskStatus::Failed, Some(error));
                }
            }
        });

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);

        task
    }

    fn transition(&self, task_id: Uuid, next: TaskStatus, error: Option<String>) -> bool {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .transition(task_id, next, error)
    }

    /// Current state of a task, if still tracked
    pub fn status(&self, task_id: Uuid) -> Option<PostValidationTask> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&task_id)
            .cloned()
    }

    /// All tracked tasks, oldest first
    pub fn snapshot(&self) -> Vec<PostValidationTask> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .order
            .iter()
            .filter_map(|id| table.entries.get(id).cloned())
            .collect()
    }

    pub fn tracked(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Wait for every task spawned so far, including ones spawned while waiting
    pub async fn drain(&self) {
        loop {
            let handles =
                std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }
}
