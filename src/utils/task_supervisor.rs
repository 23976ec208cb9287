use std::collections::HashMap;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{Error, Result};

/// Tracks long-lived background tasks (the Kafka consumer, anything else
/// that must outlive a request) and notices when one dies unexpectedly.
/// Polling-job workers are not supervised here; their handles live in the
/// polling registry, which owns their cancellation.
pub struct TaskSupervisor {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a background task and register it for monitoring.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F) -> &mut Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(future);

        info!("Spawned background task: {}", name);
        self.tasks.insert(name, handle);
        self
    }

    /// Error if any registered task has terminated on its own. Dead tasks
    /// are dropped from tracking so the check does not re-fire.
    pub fn check_health(&mut self) -> Result<()> {
        let dead: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.clone())
            .collect();

        if dead.is_empty() {
            return Ok(());
        }

        for name in &dead {
            self.tasks.remove(name);
        }

        let msg = format!("Background tasks terminated unexpectedly: {:?}", dead);
        error!("{}", msg);
        Err(Error::Internal(msg))
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort everything on shutdown.
    pub fn shutdown_all(&mut self) {
        info!("Shutting down {} background task(s)", self.tasks.len());
        for (name, handle) in self.tasks.drain() {
            handle.abort();
            info!("Aborted task: {}", name);
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
