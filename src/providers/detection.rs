//! Device detection service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Detection service provider.
///
/// Provides the critical service that fills the device registry: one
/// detection pass at startup, then a new pass whenever a rescan is requested
/// over D-Bus or detection-related configuration changes on disk.
///
/// # Priority and Criticality
///
/// - **Priority**: 10 (highest)
/// - **Critical**: Yes (without it the daemon manages nothing)
pub struct DetectionServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl DetectionServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for DetectionServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_detection_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DetectionService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

/// Runs the initial detection pass and re-runs it on request.
async fn run_detection_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut event_rx = event_bus.subscribe();

    if let Err(e) = state.detector.run_detection().await {
        error!("Initial detection pass failed: {e}");
    }

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Detection service cancelled");
                break;
            }

            event = event_rx.recv() => {
                match event {
                    Ok(Event::RescanRequested) => {
                        info!("Rescan requested");
                        if let Err(e) = state.detector.run_detection().await {
                            error!("Detection pass failed: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        warn!("Event bus closed, detection service exiting");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Detection service lagged by {n} events");
                    }
                }
            }
        }
    }

    Ok(())
}
