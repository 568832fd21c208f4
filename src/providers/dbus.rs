//! D-Bus service provider for dependency injection.

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    app_context::AppState,
    event::{Event, EventBus},
    interface::DBusInterface,
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// D-Bus service provider for external system integration.
///
/// Provides a critical service that exposes daemon functionality through
/// the D-Bus interface, enabling external applications to list devices,
/// drive LEDs, and request rescans.
///
/// # Priority and Criticality
///
/// - **Priority**: 8 (high)
/// - **Critical**: Yes (the daemon has no other control surface)
///
/// # Interface
///
/// Exposes the interface at:
/// - **Service Name**: `io.github.skydimod`
/// - **Object Path**: `/io/github/skydimod`
///
/// # Requirements
///
/// Requires a running D-Bus session bus. Creation will fail if D-Bus is
/// not available, which is handled gracefully by the system coordinator.
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    /// Creates a new D-Bus service provider with session bus connection.
    pub async fn new(state: Arc<AppState>, event_bus: EventBus) -> Result<Self> {
        let connection = Connection::session().await?;
        Ok(Self {
            state,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();
        let connection = self.connection.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_dbus_service(state, event_bus, connection, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }

    fn is_critical(&self) -> bool {
        true
    }
}

/// D-Bus service for exposing daemon functionality to external applications.
///
/// Serves the interface until cancellation or until a `Stop` call arrives
/// over the bus, which is turned into a [`Event::SystemShutdown`]. While
/// running, [`Event::DeviceListRefreshed`] events are forwarded to bus
/// consumers as the `device_list_changed` signal.
async fn run_dbus_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
    cancel_token: CancellationToken,
) -> Result<()> {
    let interface = DBusInterface::new(
        state,
        env!("CARGO_PKG_VERSION").to_string(),
        event_bus.clone(),
    );
    let stop_listener = interface.stop.listen();

    connection
        .object_server()
        .at("/io/github/skydimod", interface)
        .await?;

    connection.request_name("io.github.skydimod").await?;

    let iface_ref = connection
        .object_server()
        .interface::<_, DBusInterface>("/io/github/skydimod")
        .await?;
    let mut event_rx = event_bus.subscribe();
    tokio::pin!(stop_listener);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("D-Bus service cancelled");
                break;
            }

            () = &mut stop_listener => {
                info!("Stop requested over D-Bus");
                if let Err(e) = event_bus.publish(Event::SystemShutdown) {
                    error!("Failed to publish shutdown event: {e}");
                }
                break;
            }

            event = event_rx.recv() => {
                match event {
                    Ok(Event::DeviceListRefreshed) => {
                        if let Err(e) =
                            DBusInterface::device_list_changed(iface_ref.signal_emitter()).await
                        {
                            warn!("Failed to emit device_list_changed signal: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        warn!("Event bus closed, D-Bus service exiting");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        // A dropped refresh would leave consumers stale.
                        warn!("D-Bus service lagged by {n} events, re-signalling");
                        if let Err(e) =
                            DBusInterface::device_list_changed(iface_ref.signal_emitter()).await
                        {
                            warn!("Failed to emit device_list_changed signal: {e}");
                        }
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
    use serial_test::serial;
    use std::time::Duration;
    use tokio::time::sleep;

    fn mock_app_state(event_bus: &EventBus) -> Arc<AppState> {
        let config_manager =
            ConfigManager::new(Config::default(), std::path::PathBuf::from("/tmp/test.yml"));
        Arc::new(AppState::new(config_manager, event_bus.clone()))
    }

    // Both tests contend for the same well-known bus name.
    #[tokio::test]
    #[serial]
    async fn dbus_service_provider_creation() {
        let event_bus = EventBus::new();
        let state = mock_app_state(&event_bus);

        // D-Bus service creation might fail in test environment without D-Bus
        match DBusServiceProvider::new(state, event_bus).await {
            Ok(provider) => {
                assert_eq!(provider.name(), "DBusService");
                assert_eq!(provider.priority(), 8);
                assert!(provider.is_critical());
            }
            Err(_) => {
                // D-Bus not available in test environment, which is expected
                println!("D-Bus not available in test environment - this is expected");
            }
        }
    }

    #[tokio::test]
    #[serial]
    async fn dbus_service_responds_to_cancellation() {
        let event_bus = EventBus::new();
        let state = mock_app_state(&event_bus);
        let mut task_manager = TaskManager::new();

        // Only test if D-Bus is available
        if let Ok(provider) = DBusServiceProvider::new(state, event_bus).await {
            if provider.start(&mut task_manager).await.is_ok() {
                assert!(task_manager.is_running("DBusService"));
                sleep(Duration::from_millis(50)).await;

                match task_manager.shutdown_all().await {
                    Ok(()) => assert_eq!(task_manager.active_count(), 0),
                    Err(e) => {
                        println!("Shutdown failed (expected due to D-Bus): {e}");
                        assert_eq!(task_manager.active_count(), 0);
                    }
                }
            } else {
                println!("D-Bus service start failed - skipping cancellation test");
            }
        } else {
            println!("D-Bus not available - skipping cancellation test");
        }
    }
}
