//! Application state and global context management.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    config::{Config, ConfigManager},
    detector::Detector,
    device_list::DeviceListModel,
    event::EventBus,
    registry::DeviceRegistry,
};

/// Shared application state containing all runtime data.
///
/// This structure holds the shared state needed by the services: the
/// configuration manager, the device registry, the detector that fills it,
/// and the device list mirrored for external consumers. All fields are
/// wrapped in appropriate synchronization primitives for safe concurrent
/// access.
pub struct AppState {
    /// Configuration manager for centralized config handling
    pub config_manager: Arc<ConfigManager>,
    /// Registry of detected controllers and buses
    pub registry: Arc<DeviceRegistry>,
    /// Detection orchestrator
    pub detector: Arc<Detector>,
    /// Serializable device list mirrored from the registry
    pub device_list: Arc<Mutex<DeviceListModel>>,
}

impl AppState {
    /// Creates a new AppState from the given configuration manager.
    ///
    /// Hardware is not touched here; the detection service runs the first
    /// detection pass after startup.
    pub fn new(config_manager: ConfigManager, event_bus: EventBus) -> Self {
        let config_manager = Arc::new(config_manager);
        let registry = Arc::new(DeviceRegistry::new(event_bus.clone()));
        let detector = Arc::new(Detector::new(
            event_bus,
            registry.clone(),
            config_manager.clone(),
        ));

        Self {
            config_manager,
            registry,
            detector,
            device_list: Arc::new(Mutex::new(DeviceListModel::new())),
        }
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn config(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }

    /// Gets the configuration manager.
    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[tokio::test]
    async fn state_starts_with_empty_registry() {
        let manager = ConfigManager::new(Config::default(), PathBuf::from("unused.yml"));
        let state = AppState::new(manager, EventBus::new());

        assert_eq!(state.registry.controller_count().await, 0);
        assert!(!state.device_list.lock().await.is_loading());
        assert_eq!(state.config().await.version, 1);
    }
}
