use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use notify::{Event, EventHandler, RecursiveMode, Watcher, recommended_watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{ConfigChangeType, Event as AppEvent, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Configuration file monitoring service provider.
///
/// Provides a non-critical service that monitors the configuration file for
/// changes using efficient filesystem notifications (inotify on Linux) and
/// classifies the changes: hot-reloadable ones reload in place, changes to
/// detection-related sections additionally trigger a device rescan.
///
/// # Priority and Criticality
///
/// - **Priority**: 6 (medium)
/// - **Critical**: No (optional service)
///
/// # Implementation
///
/// Uses the `notify` crate which provides cross-platform filesystem
/// notifications with native backends. Events are debounced so rapid
/// successive writes produce a single reload.
pub struct ConfigWatcherServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ConfigWatcherServiceProvider {
    /// Creates a new configuration watcher service provider.
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ConfigWatcherServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_config_watcher_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ConfigWatcherService"
    }

    fn priority(&self) -> i32 {
        6
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Event handler for filesystem notifications that implements cancel-safe processing.
#[derive(Debug)]
struct AsyncEventHandler {
    sender: mpsc::UnboundedSender<notify::Result<Event>>,
}

impl AsyncEventHandler {
    fn new(sender: mpsc::UnboundedSender<notify::Result<Event>>) -> Self {
        Self { sender }
    }
}

impl EventHandler for AsyncEventHandler {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        if let Err(e) = self.sender.send(event) {
            error!("Failed to send filesystem event to async handler: {}", e);
        }
    }
}

/// Configuration file monitoring service implementation.
///
/// # Cancel Safety
///
/// This implementation is designed to be cancel-safe:
/// - No state is lost when the future is dropped
/// - Proper cleanup of file watchers
/// - Graceful handling of channel closures
async fn run_config_watcher_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let config_path = state.config_manager().path().to_path_buf();
    info!("Config watcher started for: {}", config_path.display());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let event_handler = AsyncEventHandler::new(event_tx);

    let mut watcher = recommended_watcher(event_handler)?;

    let watch_path = if let Some(parent) = config_path.parent() {
        parent.to_path_buf()
    } else {
        config_path.clone()
    };

    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;
    info!("Watching directory: {}", watch_path.display());

    let mut debounce_interval = tokio::time::interval(Duration::from_millis(2000));
    debounce_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut has_pending_event = false;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Config watcher service cancelled");
                break;
            }

            event_result = event_rx.recv() => {
                match event_result {
                    Some(Ok(event)) => {
                        debug!("Received filesystem event: {:?}", event.kind);

                        let affects_config = event.paths.iter().any(|path| {
                            path == &config_path
                                || path.file_name() == config_path.file_name()
                        });

                        // Only react to events that indicate actual file modifications or creation
                        let is_relevant_event = event.kind.is_modify() || event.kind.is_create();

                        if affects_config && is_relevant_event {
                            debug!("Event affects config file, marking for debounced reload");
                            has_pending_event = true;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Filesystem watcher error: {}", e);
                    }
                    None => {
                        warn!("Filesystem event channel closed, exiting");
                        break;
                    }
                }
            }

            _ = debounce_interval.tick(), if has_pending_event => {
                debug!("Debounce interval elapsed, processing config change analysis");
                has_pending_event = false;

                if config_path.exists() {
                    info!("Configuration file change detected, analyzing changes...");

                    match state.config_manager().analyze_config_changes().await {
                        Ok(change_type) => {
                            match &change_type {
                                ConfigChangeType::HotReload => {
                                    info!("Hot-reloadable changes detected");
                                }
                                ConfigChangeType::Rescan { changed_sections } => {
                                    info!(
                                        "Detection-related sections changed: {:?}, a rescan will follow",
                                        changed_sections
                                    );
                                }
                            }
                            if let Err(e) = event_bus.publish(AppEvent::ConfigChangeDetected(change_type)) {
                                error!("Failed to publish config change event: {}", e);
                            }
                        }
                        Err(e) => {
                            error!("Failed to analyze configuration changes: {}", e);
                        }
                    }
                } else {
                    warn!("Configuration file {} no longer exists", config_path.display());
                }
            }
        }
    }

    if let Err(e) = watcher.unwatch(&watch_path) {
        warn!("Failed to unwatch path during cleanup: {}", e);
    }

    info!("Config watcher service stopped");
    Ok(())
}
