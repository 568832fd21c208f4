//! Device list mirroring service provider.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Device list service provider.
///
/// Keeps the serializable device list in sync with the registry by listening
/// for detection and list-change events, and announces row changes with
/// [`Event::DeviceListRefreshed`] so the D-Bus surface can signal its
/// consumers. Non-critical: without it the D-Bus `ListDevices` call serves a
/// stale list, but device control still works.
///
/// # Priority and Criticality
///
/// - **Priority**: 5 (medium)
/// - **Critical**: No
pub struct DeviceListServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl DeviceListServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for DeviceListServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_device_list_service(state, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DeviceListService"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn is_critical(&self) -> bool {
        false
    }
}

async fn rebuild(state: &AppState, event_bus: &EventBus) {
    let controllers = state.registry.controllers().await;
    let mut model = state.device_list.lock().await;
    if model.rebuild(&controllers) {
        info!("Device list rebuilt, {} row(s)", model.rows().len());
        if let Err(e) = event_bus.publish(Event::DeviceListRefreshed) {
            debug!("Device list refresh not delivered: {e}");
        }
    } else {
        debug!("Device list unchanged, skipping rebuild");
    }
}

async fn run_device_list_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut event_rx = event_bus.subscribe();

    // Catch up with anything registered before this service started.
    rebuild(&state, &event_bus).await;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Device list service cancelled");
                break;
            }

            event = event_rx.recv() => {
                match event {
                    Ok(Event::DetectionStarted) => {
                        state.device_list.lock().await.set_loading(true);
                    }
                    Ok(Event::DetectionEnded) => {
                        rebuild(&state, &event_bus).await;
                        state.device_list.lock().await.set_loading(false);
                    }
                    Ok(Event::DeviceListChanged) => {
                        rebuild(&state, &event_bus).await;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        warn!("Event bus closed, device list service exiting");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Device list service lagged by {n} events, resyncing");
                        rebuild(&state, &event_bus).await;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigManager};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::time::sleep;

    fn test_state(event_bus: &EventBus) -> Arc<AppState> {
        let manager = ConfigManager::new(Config::default(), PathBuf::from("unused.yml"));
        Arc::new(AppState::new(manager, event_bus.clone()))
    }

    #[tokio::test]
    async fn provider_metadata() {
        let event_bus = EventBus::new();
        let provider = DeviceListServiceProvider::new(test_state(&event_bus), event_bus);

        assert_eq!(provider.name(), "DeviceListService");
        assert_eq!(provider.priority(), 5);
        assert!(!provider.is_critical());
    }

    #[tokio::test]
    async fn loading_flag_follows_detection_events() {
        let event_bus = EventBus::new();
        let state = test_state(&event_bus);

        let provider = DeviceListServiceProvider::new(state.clone(), event_bus.clone());
        let mut task_manager = TaskManager::new();
        provider.start(&mut task_manager).await.unwrap();
        sleep(Duration::from_millis(20)).await;

        event_bus.publish(Event::DetectionStarted).unwrap();
        sleep(Duration::from_millis(20)).await;
        assert!(state.device_list.lock().await.is_loading());

        event_bus.publish(Event::DetectionEnded).unwrap();
        sleep(Duration::from_millis(20)).await;
        assert!(!state.device_list.lock().await.is_loading());

        let _ = task_manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn list_change_rebuilds_rows() {
        let event_bus = EventBus::new();
        let state = test_state(&event_bus);

        let provider = DeviceListServiceProvider::new(state.clone(), event_bus.clone());
        let mut task_manager = TaskManager::new();
        provider.start(&mut task_manager).await.unwrap();
        sleep(Duration::from_millis(20)).await;

        // Registering publishes DeviceListChanged, which the service mirrors.
        state
            .registry
            .register_controller(Arc::new(crate::drivers::skydimo::hid::SkydimoHidStrip::new(
                NullIo,
                crate::rgb_controller::DeviceInfo {
                    name: "Skydimo LED Strip".into(),
                    vendor: "Skydimo".into(),
                    description: "Skydimo HID LED Strip Controller".into(),
                    version: "1.0".into(),
                    serial: "000000".into(),
                    location: "hid:test".into(),
                    device_type: crate::rgb_controller::DeviceType::LedStrip,
                },
                100,
            )))
            .await;
        sleep(Duration::from_millis(20)).await;

        let model = state.device_list.lock().await;
        assert_eq!(model.rows().len(), 1);
        assert_eq!(model.rows()[0].name, "Skydimo LED Strip");

        drop(model);
        let _ = task_manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn row_change_publishes_refresh_exactly_once() {
        let event_bus = EventBus::new();
        let mut event_rx = event_bus.subscribe();
        let state = test_state(&event_bus);

        let provider = DeviceListServiceProvider::new(state.clone(), event_bus.clone());
        let mut task_manager = TaskManager::new();
        provider.start(&mut task_manager).await.unwrap();
        sleep(Duration::from_millis(20)).await;

        state
            .registry
            .register_controller(Arc::new(crate::drivers::skydimo::hid::SkydimoHidStrip::new(
                NullIo,
                crate::rgb_controller::DeviceInfo {
                    name: "Skydimo LED Strip".into(),
                    vendor: "Skydimo".into(),
                    description: "Skydimo HID LED Strip Controller".into(),
                    version: "1.0".into(),
                    serial: "000000".into(),
                    location: "hid:test".into(),
                    device_type: crate::rgb_controller::DeviceType::LedStrip,
                },
                100,
            )))
            .await;
        sleep(Duration::from_millis(20)).await;

        // A detection pass that leaves the registry as-is must not
        // announce a refresh again.
        event_bus.publish(Event::DetectionEnded).unwrap();
        sleep(Duration::from_millis(20)).await;

        let mut refreshes = 0;
        while let Ok(event) = event_rx.try_recv() {
            if matches!(event, Event::DeviceListRefreshed) {
                refreshes += 1;
            }
        }
        assert_eq!(refreshes, 1);

        let _ = task_manager.shutdown_all().await;
    }

    struct NullIo;

    impl crate::drivers::skydimo::device_io::DeviceIo for NullIo {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            Ok(buf.len())
        }

        fn read(&mut self, _buf: &mut [u8], _timeout_ms: u64) -> Result<usize> {
            Ok(0)
        }
    }
}
