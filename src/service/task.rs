// src/service/task.rs

//! The pull protocol used by external actuators.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::Slots;
use crate::process::{Delivery, ProcessManager, Reservation, Task, WILDCARD};
use crate::service::ServiceError;

/// Body of `PUT /task/:id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTask {
    pub token: String,
    #[serde(default)]
    pub outputs: Slots,
    #[serde(default)]
    pub warning: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct TaskService {
    manager: ProcessManager,
}

impl TaskService {
    pub fn new(manager: ProcessManager) -> Self {
        Self { manager }
    }

    /// At most one unlocked task of `kind`. An empty kind matches any type.
    pub fn get_tasks(&self, kind: &str) -> Vec<Task> {
        let kind = if kind.is_empty() { WILDCARD } else { kind };
        self.manager
            .fetch(WILDCARD, WILDCARD, kind, false)
            .into_iter()
            .collect()
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task, ServiceError> {
        self.manager
            .fetch(WILDCARD, task_id, WILDCARD, true)
            .ok_or_else(|| ServiceError::NotFound(format!("task {task_id} not found")))
    }

    pub fn reserve_task(&self, task_id: &str) -> Result<Reservation, ServiceError> {
        Ok(self.manager.reserve(task_id)?)
    }

    /// Give a reservation back before its TTL runs out.
    pub fn unlock_task(&self, task_id: &str, token: &str) -> Result<(), ServiceError> {
        if token.is_empty() {
            return Err(ServiceError::BadRequest("missing reservation token".into()));
        }
        self.manager.unlock(task_id, token)?;
        info!(task_id, "actuator released task");
        Ok(())
    }

    /// Finish a reserved task. A non-empty `error` fails it instead.
    pub fn update_task(&self, task_id: &str, update: UpdateTask) -> Result<Delivery, ServiceError> {
        if update.token.is_empty() {
            return Err(ServiceError::BadRequest("missing reservation token".into()));
        }

        let delivery = if update.error.is_empty() {
            let delivery = self
                .manager
                .finish_reserved(task_id, &update.token, update.outputs)?;
            info!(task_id, "actuator finished task");
            delivery
        } else {
            let message = format!("warning: {}\nerror: {}\n", update.warning, update.error);
            let delivery = self.manager.fail_reserved(task_id, &update.token, message)?;
            info!(task_id, error = %update.error, "actuator failed task");
            delivery
        };
        Ok(delivery)
    }
}
