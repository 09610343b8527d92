use std::sync::{Arc, Mutex};
use std::time::Duration;

use judgedag::model::Slots;
use judgedag::process::Task;
use judgedag::service::{TaskService, UpdateTask};

type Responder = dyn Fn(&Task) -> Result<Slots, String> + Send + Sync;

/// A fake external actuator that:
/// - polls for tasks of one type
/// - reserves them and answers with whatever the responder returns
/// - records every task it completed.
#[derive(Clone)]
pub struct FakeActuator {
    tasks: TaskService,
    kind: String,
    respond: Arc<Responder>,
    handled: Arc<Mutex<Vec<Task>>>,
}

impl FakeActuator {
    pub fn new(
        tasks: TaskService,
        kind: &str,
        respond: impl Fn(&Task) -> Result<Slots, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            tasks,
            kind: kind.to_string(),
            respond: Arc::new(respond),
            handled: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Poll until a task can be reserved, then complete it.
    pub async fn handle_one(&self) -> Task {
        let (task, token) = loop {
            if let Some(task) = self.tasks.get_tasks(&self.kind).pop() {
                if let Ok(r) = self.tasks.reserve_task(&task.task_id) {
                    break (task, r.token);
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        let update = match (self.respond)(&task) {
            Ok(outputs) => UpdateTask {
                token,
                outputs,
                ..UpdateTask::default()
            },
            Err(error) => UpdateTask {
                token,
                error,
                ..UpdateTask::default()
            },
        };
        self.tasks
            .update_task(&task.task_id, update)
            .expect("fake actuator update rejected");

        self.handled.lock().unwrap().push(task.clone());
        task
    }

    /// Keep handling tasks in the background until the test ends.
    pub fn spawn(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                this.handle_one().await;
            }
        })
    }

    pub fn handled(&self) -> Vec<Task> {
        self.handled.lock().unwrap().clone()
    }
}
