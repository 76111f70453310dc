//! Task registry
//!
//! Assigns ids to parent tasks and serves status, rethrottle and cancel
//! requests by id. A task is retired (removed) once its aggregated response
//! has been delivered.
//!
//! ## Rules
//! - Ids are never reused within one registry
//! - Lookups clone the `Arc`; the registry lock is never held while a task's
//!   own lock is taken
//! - [`TaskRegistry::wait_for_completion`] is the normal retirement path

use super::{ParentTask, ResponseReceiver, SliceRethrottle};
use crate::error::{RegistryError, TaskId};
use crate::status::{BulkByScrollResponse, RequestsPerSecond, Status};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// In-process registry of running parent tasks
#[derive(Debug, Default)]
pub struct TaskRegistry {
    next_id: AtomicU64,
    tasks: RwLock<HashMap<TaskId, Arc<ParentTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and return its new id
    pub fn register(&self, task: Arc<ParentTask>) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(id, task = task.description(), slices = task.num_slices(), "registered task");
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task);
        id
    }

    pub fn get(&self, id: TaskId) -> Result<Arc<ParentTask>, RegistryError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    /// Remove a task; returns it if it was registered
    pub fn unregister(&self, id: TaskId) -> Option<Arc<ParentTask>> {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn status(&self, id: TaskId) -> Result<Status, RegistryError> {
        Ok(self.get(id)?.get_status())
    }

    pub fn rethrottle(
        &self,
        id: TaskId,
        requests_per_second: RequestsPerSecond,
    ) -> Result<Vec<SliceRethrottle>, RegistryError> {
        Ok(self.get(id)?.rethrottle(requests_per_second))
    }

    pub fn cancel(&self, id: TaskId, reason: impl Into<String>) -> Result<(), RegistryError> {
        self.get(id)?.cancel(reason);
        Ok(())
    }

    /// Ids and descriptions of registered tasks, ascending by id
    pub fn list(&self) -> Vec<(TaskId, String)> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut listed: Vec<(TaskId, String)> = tasks
            .iter()
            .map(|(id, task)| (*id, task.description().to_string()))
            .collect();
        listed.sort_unstable_by_key(|(id, _)| *id);
        listed
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the task's response, then retire the task.
    ///
    /// The task is removed whether or not a response arrives.
    pub async fn wait_for_completion(
        &self,
        id: TaskId,
        receiver: ResponseReceiver,
    ) -> Result<BulkByScrollResponse, RegistryError> {
        let outcome = receiver.await.map_err(|_| RegistryError::Abandoned(id));
        self.unregister(id);
        if let Ok(response) = &outcome {
            info!(id, success = response.is_success(), "task retired");
        }
        outcome
    }
}
