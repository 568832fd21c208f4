//! Lifecycle management for the daemon's background services.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tracks the daemon's long-running service tasks by name.
///
/// Every service (detection, device list, config watcher, D-Bus) is spawned
/// through here so shutdown can cancel and join all of them in one place.
/// Each task gets a child of the global [`CancellationToken`]; cancelling the
/// global token tells every service to wind down.
pub struct TaskManager {
    tasks: HashMap<String, JoinHandle<Result<()>>>,
    pub global_token: CancellationToken,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns a named service task.
    ///
    /// The task receives its own cancellation token and is expected to exit
    /// promptly once it fires.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let task_token = self.global_token.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {}", task_name);
            match task_fn(task_token).await {
                Ok(()) => {
                    info!("Task '{}' completed successfully", task_name);
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{}' failed: {}", task_name, e);
                    Err(e)
                }
            }
        });

        self.tasks.insert(name.clone(), handle);
        info!("Task '{}' spawned", name);
        Ok(())
    }

    /// Cancels every service and waits for it to finish.
    ///
    /// Each task gets up to 10 seconds to wind down. The first error (task
    /// failure, panic, or timeout) is returned after all tasks were joined.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());

        self.global_token.cancel();

        let mut first_error = None;
        let handles: Vec<_> = self.tasks.drain().map(|(_, handle)| handle).collect();

        for handle in handles {
            match tokio::time::timeout(Duration::from_secs(10), handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    warn!("Task failed during shutdown: {}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Ok(Err(e)) => {
                    let error = anyhow::anyhow!("Task panicked: {}", e);
                    error!("{}", error);
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(_) => {
                    let error = anyhow::anyhow!("Task shutdown timeout exceeded");
                    error!("{}", error);
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        if let Some(error) = first_error {
            Err(error).context("One or more tasks failed during shutdown")
        } else {
            info!("All tasks stopped");
            Ok(())
        }
    }

    /// Returns the count of active tasks.
    ///
    /// Used only for testing purposes.
    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Checks if a task with the given name is currently running.
    ///
    /// Used only for testing purposes.
    #[cfg(test)]
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    #[tokio::test]
    async fn spawned_task_is_tracked_until_shutdown() {
        let mut manager = TaskManager::new();
        manager
            .spawn_task("idle".to_string(), |token| async move {
                token.cancelled().await;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(manager.active_count(), 1);
        assert!(manager.is_running("idle"));

        manager.shutdown_all().await.unwrap();
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_running_tasks() {
        let mut manager = TaskManager::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        manager
            .spawn_task("worker".to_string(), move |token| async move {
                token.cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        manager.shutdown_all().await.unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_surfaces_task_errors() {
        let mut manager = TaskManager::new();
        manager
            .spawn_task("failing".to_string(), |token| async move {
                token.cancelled().await;
                Err(anyhow::anyhow!("worker broke"))
            })
            .await
            .unwrap();

        let result = manager.shutdown_all().await;
        assert!(result.is_err());
    }
}
