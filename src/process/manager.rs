// src/process/manager.rs

//! The shared task queue.
//!
//! New tasks enter through an admission channel drained by a single loop,
//! which first offers each task to the built-in catalog. Tasks no handler
//! claims are parked in the queue, where external actuators find them with
//! [`ProcessManager::fetch`], lock them with [`ProcessManager::reserve`] and
//! complete them with [`ProcessManager::finish_reserved`].
//!
//! All queue mutation happens under one mutex; completion channels are only
//! signalled after the guard is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builtin::{Catalog, TaskContext};
use crate::dag::Block;
use crate::model::{JudgementHandle, JudgementId, Slots};
use crate::process::task::{Task, TaskError, TaskId, TaskResult, TaskSummary};

/// Matches any value in [`ProcessManager::fetch`].
pub const WILDCARD: &str = "*";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {0} is already reserved")]
    AlreadyReserved(TaskId),

    #[error("reservation token for task {0} is stale")]
    StaleReservation(TaskId),
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    /// How long a reservation stays exclusive without being renewed.
    pub lock_ttl: Duration,
    /// Capacity of the admission channel.
    pub admission_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(3),
            admission_capacity: 128,
        }
    }
}

/// Proof of an exclusive lock on a task.
///
/// `token` embeds `epoch`; only the most recently issued token for a task can
/// complete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub task_id: TaskId,
    pub epoch: u64,
    pub token: String,
}

/// What became of a result handed to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The run was still waiting and received it.
    Delivered,
    /// The run had stopped waiting for the block (timeout or abort); the
    /// result was dropped.
    Discarded,
}

#[derive(Debug)]
struct Lock {
    acquired_at: Instant,
}

struct QueuedTask {
    task: Task,
    lock: Option<Lock>,
    /// Token of the latest reservation, kept after the lock expires so a slow
    /// holder can still finish as long as nobody reserved after it.
    last_token: Option<String>,
    reply: oneshot::Sender<TaskResult>,
}

struct Admission {
    task: Task,
    judgement: JudgementHandle,
    reply: oneshot::Sender<TaskResult>,
}

type Queue = Arc<Mutex<Vec<QueuedTask>>>;

/// Cheaply cloneable handle to the task queue.
#[derive(Clone)]
pub struct ProcessManager {
    queue: Queue,
    admission: mpsc::Sender<Admission>,
    epoch: Arc<AtomicU64>,
    lock_ttl: Duration,
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("queued", &self.queue.lock().len())
            .field("lock_ttl", &self.lock_ttl)
            .finish_non_exhaustive()
    }
}

impl ProcessManager {
    /// Create the manager and spawn its admission loop.
    ///
    /// Must be called from within a Tokio runtime. The loop stops once every
    /// handle has been dropped.
    pub fn new(catalog: Catalog, options: ManagerOptions) -> Self {
        let queue: Queue = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(options.admission_capacity.max(1));

        tokio::spawn(admission_loop(rx, Arc::new(catalog), queue.clone()));

        Self {
            queue,
            admission: tx,
            epoch: Arc::new(AtomicU64::new(0)),
            lock_ttl: options.lock_ttl,
        }
    }

    /// Submit a ready block with its resolved inputs.
    ///
    /// The returned channel resolves immediately for built-in types and once
    /// an actuator finishes the task otherwise.
    pub async fn push(
        &self,
        judgement: JudgementHandle,
        block: &Block,
        inputs: Slots,
    ) -> oneshot::Receiver<TaskResult> {
        let judgement_id = judgement.lock().id;
        let task = Task::from_block(Uuid::new_v4().to_string(), judgement_id, block, inputs);
        let (reply, rx) = oneshot::channel();

        debug!(
            judgement_id,
            block_id = block.id,
            task_id = %task.task_id,
            kind = %task.kind,
            "admitting task"
        );

        if let Err(err) = self
            .admission
            .send(Admission {
                task,
                judgement,
                reply,
            })
            .await
        {
            // Dropping the rejected admission closes `rx` with `Dropped`.
            warn!(task_id = %err.0.task.task_id, "admission loop is gone; task dropped");
        }
        rx
    }

    /// First queued task matching all three keys (`"*"` matches anything).
    ///
    /// Locks older than the TTL are released before matching. Locked tasks
    /// are skipped unless `ignore_lock` is set.
    pub fn fetch(
        &self,
        judgement_id: &str,
        task_id: &str,
        task_type: &str,
        ignore_lock: bool,
    ) -> Option<Task> {
        let mut queue = self.queue.lock();
        self.expire_locks(&mut queue);

        queue
            .iter()
            .find(|q| {
                (ignore_lock || q.lock.is_none())
                    && key_matches(judgement_id, &q.task.judgement_id.to_string())
                    && key_matches(task_id, &q.task.task_id)
                    && key_matches(task_type, &q.task.kind)
            })
            .map(|q| q.task.clone())
    }

    /// Take the exclusive lock on a task.
    pub fn reserve(&self, task_id: &str) -> Result<Reservation, ProcessError> {
        let mut queue = self.queue.lock();
        self.expire_locks(&mut queue);

        let entry = queue
            .iter_mut()
            .find(|q| q.task.task_id == task_id)
            .ok_or_else(|| ProcessError::NotFound(task_id.to_string()))?;

        if entry.lock.is_some() {
            return Err(ProcessError::AlreadyReserved(task_id.to_string()));
        }

        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let token = format!("{epoch}.{}", Uuid::new_v4().simple());
        entry.lock = Some(Lock {
            acquired_at: Instant::now(),
        });
        entry.last_token = Some(token.clone());

        info!(
            task_id,
            judgement_id = entry.task.judgement_id,
            epoch,
            "task reserved"
        );
        Ok(Reservation {
            task_id: task_id.to_string(),
            epoch,
            token,
        })
    }

    /// Release a lock early. The token must be the current one.
    pub fn unlock(&self, task_id: &str, token: &str) -> Result<(), ProcessError> {
        let mut queue = self.queue.lock();
        let entry = queue
            .iter_mut()
            .find(|q| q.task.task_id == task_id)
            .ok_or_else(|| ProcessError::NotFound(task_id.to_string()))?;

        if entry.last_token.as_deref() != Some(token) {
            return Err(ProcessError::StaleReservation(task_id.to_string()));
        }
        entry.lock = None;
        debug!(task_id, "task unlocked");
        Ok(())
    }

    /// Complete a task with outputs, bypassing reservation checks.
    pub fn finish(&self, task_id: &str, outputs: Slots) -> Result<Delivery, ProcessError> {
        let entry = self.take(task_id, None)?;
        Ok(deliver(entry, Ok(outputs)))
    }

    /// Fail a task, bypassing reservation checks.
    pub fn finish_with_error(
        &self,
        task_id: &str,
        message: impl Into<String>,
    ) -> Result<Delivery, ProcessError> {
        let entry = self.take(task_id, None)?;
        Ok(deliver(entry, Err(TaskError::Actuator(message.into()))))
    }

    /// Complete a task on behalf of the holder of `token`.
    pub fn finish_reserved(
        &self,
        task_id: &str,
        token: &str,
        outputs: Slots,
    ) -> Result<Delivery, ProcessError> {
        let entry = self.take(task_id, Some(token))?;
        Ok(deliver(entry, Ok(outputs)))
    }

    /// Fail a task on behalf of the holder of `token`.
    pub fn fail_reserved(
        &self,
        task_id: &str,
        token: &str,
        message: impl Into<String>,
    ) -> Result<Delivery, ProcessError> {
        let entry = self.take(task_id, Some(token))?;
        Ok(deliver(entry, Err(TaskError::Actuator(message.into()))))
    }

    /// Drop every queued task of a judgement. Their channels resolve to
    /// [`TaskError::Dropped`].
    pub fn purge_judgement(&self, judgement_id: JudgementId) -> usize {
        let removed: Vec<QueuedTask> = {
            let mut queue = self.queue.lock();
            let (gone, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut *queue)
                .into_iter()
                .partition(|q| q.task.judgement_id == judgement_id);
            *queue = keep;
            gone
        };

        if !removed.is_empty() {
            info!(judgement_id, count = removed.len(), "purged leftover tasks");
        }
        removed.len()
    }

    /// Snapshot of the queue.
    pub fn list(&self) -> Vec<TaskSummary> {
        let queue = self.queue.lock();
        let out: Vec<TaskSummary> = queue
            .iter()
            .map(|q| TaskSummary {
                task_id: q.task.task_id.clone(),
                judgement_id: q.task.judgement_id,
                block_id: q.task.block_id,
                kind: q.task.kind.clone(),
                locked: q.lock.is_some(),
            })
            .collect();
        debug!(queued = out.len(), "task queue listed");
        out
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    fn take(&self, task_id: &str, token: Option<&str>) -> Result<QueuedTask, ProcessError> {
        let mut queue = self.queue.lock();
        let idx = queue
            .iter()
            .position(|q| q.task.task_id == task_id)
            .ok_or_else(|| ProcessError::NotFound(task_id.to_string()))?;

        if let Some(token) = token {
            if queue[idx].last_token.as_deref() != Some(token) {
                warn!(task_id, "rejecting completion with stale reservation token");
                return Err(ProcessError::StaleReservation(task_id.to_string()));
            }
        }

        Ok(queue.remove(idx))
    }

    fn expire_locks(&self, queue: &mut [QueuedTask]) {
        for entry in queue.iter_mut() {
            let expired = entry
                .lock
                .as_ref()
                .is_some_and(|l| l.acquired_at.elapsed() >= self.lock_ttl);
            if expired {
                entry.lock = None;
                info!(
                    task_id = %entry.task.task_id,
                    judgement_id = entry.task.judgement_id,
                    "reservation expired"
                );
            }
        }
    }
}

fn key_matches(pattern: &str, value: &str) -> bool {
    pattern == WILDCARD || pattern == value
}

fn deliver(entry: QueuedTask, result: TaskResult) -> Delivery {
    let QueuedTask { task, reply, .. } = entry;
    let ok = result.is_ok();
    if reply.send(result).is_err() {
        warn!(
            task_id = %task.task_id,
            judgement_id = task.judgement_id,
            block_id = task.block_id,
            kind = %task.kind,
            "task finished after its block was abandoned; result discarded"
        );
        Delivery::Discarded
    } else {
        debug!(task_id = %task.task_id, ok, "task finished");
        Delivery::Delivered
    }
}

async fn admission_loop(mut rx: mpsc::Receiver<Admission>, catalog: Arc<Catalog>, queue: Queue) {
    info!(handlers = catalog.len(), "process manager started");

    while let Some(Admission {
        task,
        judgement,
        reply,
    }) = rx.recv().await
    {
        match catalog.find(&task.kind) {
            Some(handler) => {
                let mut ctx = TaskContext::new(&task, &judgement);
                let result = handler
                    .work(&mut ctx)
                    .map(|()| ctx.outputs)
                    .map_err(|err| TaskError::Handler {
                        handler: handler.name(),
                        message: err.to_string(),
                    });

                match &result {
                    Ok(outputs) => debug!(
                        task_id = %task.task_id,
                        handler = handler.name(),
                        outputs = outputs.len(),
                        "built-in handled task"
                    ),
                    Err(err) => warn!(
                        task_id = %task.task_id,
                        handler = handler.name(),
                        error = %err,
                        "built-in failed"
                    ),
                }
                let _ = reply.send(result);
            }
            None => {
                info!(
                    task_id = %task.task_id,
                    judgement_id = task.judgement_id,
                    kind = %task.kind,
                    "task queued for actuators"
                );
                queue.lock().push(QueuedTask {
                    task,
                    lock: None,
                    last_token: None,
                    reply,
                });
            }
        }
    }

    info!("process manager stopped (admission channel closed)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Properties;
    use crate::model::{Args, Judgement, Slot};

    fn block(id: i64, kind: &str) -> Block {
        Block::new(id, kind, Properties::new(), vec![], vec![vec![]])
    }

    fn handle(id: JudgementId) -> JudgementHandle {
        Judgement::new(id, 1, Args::new()).into_handle()
    }

    fn manager(ttl: Duration) -> ProcessManager {
        ProcessManager::new(
            Catalog::new().with_handler(crate::builtin::constant::ConstString),
            ManagerOptions {
                lock_ttl: ttl,
                admission_capacity: 8,
            },
        )
    }

    async fn queued(m: &ProcessManager, kind: &str) -> (Task, oneshot::Receiver<TaskResult>) {
        let rx = m.push(handle(1), &block(1, kind), vec![]).await;
        for _ in 0..100 {
            if let Some(t) = m.fetch(WILDCARD, WILDCARD, kind, true) {
                return (t, rx);
            }
            tokio::task::yield_now().await;
        }
        panic!("task never queued");
    }

    #[tokio::test]
    async fn builtin_resolves_without_queueing() {
        let m = manager(Duration::from_secs(3));
        let mut b = block(1, "const_string");
        b.properties.insert("value".into(), "x".into());

        let rx = m.push(handle(1), &b, vec![]).await;
        assert_eq!(rx.await.unwrap(), Ok(vec![Slot::string("x")]));
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn builtin_failure_is_a_handler_error() {
        let m = manager(Duration::from_secs(3));
        let rx = m.push(handle(1), &block(1, "const_string"), vec![]).await;
        assert!(matches!(
            rx.await.unwrap(),
            Err(TaskError::Handler { handler: "const_string", .. })
        ));
    }

    #[tokio::test]
    async fn fetch_skips_locked_tasks_and_honours_wildcards() {
        let m = manager(Duration::from_secs(60));
        let (task, _rx) = queued(&m, "compile").await;

        assert!(m.fetch("1", WILDCARD, "compile", false).is_some());
        assert!(m.fetch("2", WILDCARD, "compile", false).is_none());
        assert!(m.fetch(WILDCARD, WILDCARD, "run", false).is_none());

        m.reserve(&task.task_id).unwrap();
        assert!(m.fetch(WILDCARD, WILDCARD, "compile", false).is_none());
        assert!(m.fetch(WILDCARD, &task.task_id, WILDCARD, true).is_some());
    }

    #[tokio::test]
    async fn reserve_is_exclusive() {
        let m = manager(Duration::from_secs(60));
        let (task, _rx) = queued(&m, "compile").await;

        assert!(m.reserve(&task.task_id).is_ok());
        assert_eq!(
            m.reserve(&task.task_id),
            Err(ProcessError::AlreadyReserved(task.task_id.clone()))
        );
        assert_eq!(
            m.reserve("nope"),
            Err(ProcessError::NotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn finish_removes_and_delivers_once() {
        let m = manager(Duration::from_secs(60));
        let (task, rx) = queued(&m, "compile").await;
        let r = m.reserve(&task.task_id).unwrap();

        assert_eq!(
            m.finish_reserved(&task.task_id, &r.token, vec![Slot::file("a.out")]),
            Ok(Delivery::Delivered)
        );
        assert_eq!(rx.await.unwrap(), Ok(vec![Slot::file("a.out")]));
        assert_eq!(
            m.finish(&task.task_id, vec![]),
            Err(ProcessError::NotFound(task.task_id.clone()))
        );
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimed_and_old_token_fenced() {
        let m = manager(Duration::from_millis(20));
        let (task, rx) = queued(&m, "compile").await;

        let first = m.reserve(&task.task_id).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(m.fetch(WILDCARD, WILDCARD, "compile", false).is_some());
        let second = m.reserve(&task.task_id).unwrap();
        assert!(second.epoch > first.epoch);

        assert_eq!(
            m.finish_reserved(&task.task_id, &first.token, vec![]),
            Err(ProcessError::StaleReservation(task.task_id.clone()))
        );
        m.fail_reserved(&task.task_id, &second.token, "boom").unwrap();
        assert_eq!(rx.await.unwrap(), Err(TaskError::Actuator("boom".into())));
    }

    #[tokio::test]
    async fn result_for_a_run_that_stopped_waiting_is_discarded() {
        let m = manager(Duration::from_secs(60));
        let (task, rx) = queued(&m, "compile").await;
        drop(rx);

        let r = m.reserve(&task.task_id).unwrap();
        assert_eq!(
            m.finish_reserved(&task.task_id, &r.token, vec![]),
            Ok(Delivery::Discarded)
        );
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn unlock_releases_early_for_the_current_holder_only() {
        let m = manager(Duration::from_secs(60));
        let (task, _rx) = queued(&m, "compile").await;
        let first = m.reserve(&task.task_id).unwrap();

        assert_eq!(
            m.unlock(&task.task_id, "1.bogus"),
            Err(ProcessError::StaleReservation(task.task_id.clone()))
        );
        assert!(m.fetch(WILDCARD, WILDCARD, "compile", false).is_none());

        m.unlock(&task.task_id, &first.token).unwrap();
        assert!(m.fetch(WILDCARD, WILDCARD, "compile", false).is_some());

        let second = m.reserve(&task.task_id).unwrap();
        assert_eq!(
            m.unlock(&task.task_id, &first.token),
            Err(ProcessError::StaleReservation(task.task_id.clone()))
        );
        assert_eq!(
            m.unlock("nope", &second.token),
            Err(ProcessError::NotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn purge_drops_judgement_tasks() {
        let m = manager(Duration::from_secs(60));
        let (_task, rx) = queued(&m, "compile").await;

        assert_eq!(m.purge_judgement(2), 0);
        assert_eq!(m.purge_judgement(1), 1);
        assert!(rx.await.is_err());
        assert!(m.list().is_empty());
    }
}
