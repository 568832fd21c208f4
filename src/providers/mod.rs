//! Dependency injection providers for service management.
//!
//! This module contains all providers for creating and managing system components
//! using the Dependency Injection pattern for loose coupling and testability.

pub mod app_state;
pub mod config_watcher;
pub mod dbus;
pub mod detection;
pub mod device_list;
pub mod traits;

// Re-export core types for convenience
pub use app_state::AppStateProvider;
pub use config_watcher::ConfigWatcherServiceProvider;
pub use dbus::DBusServiceProvider;
pub use detection::DetectionServiceProvider;
pub use device_list::DeviceListServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{
        app_context::AppState,
        config::{Config, ConfigManager},
        event::EventBus,
    };
    use std::sync::Arc;

    fn create_test_app_state(event_bus: &EventBus) -> Arc<AppState> {
        let config_manager =
            ConfigManager::new(Config::default(), std::path::PathBuf::from("/tmp/test.yml"));
        Arc::new(AppState::new(config_manager, event_bus.clone()))
    }

    #[tokio::test]
    async fn all_service_providers_creation() {
        let event_bus = EventBus::new();
        let state = create_test_app_state(&event_bus);

        let detection = DetectionServiceProvider::new(state.clone(), event_bus.clone());
        let device_list = DeviceListServiceProvider::new(state.clone(), event_bus.clone());
        let config_watcher = ConfigWatcherServiceProvider::new(state.clone(), event_bus.clone());

        // Verify provider metadata
        assert_eq!(detection.name(), "DetectionService");
        assert_eq!(device_list.name(), "DeviceListService");
        assert_eq!(config_watcher.name(), "ConfigWatcherService");

        // Verify priority ordering
        assert!(detection.priority() > config_watcher.priority());
        assert!(config_watcher.priority() > device_list.priority());

        // Verify criticality classification
        assert!(detection.is_critical());
        assert!(!device_list.is_critical());
        assert!(!config_watcher.is_critical());
    }

    #[tokio::test]
    async fn service_provider_priority_ordering() {
        let event_bus = EventBus::new();
        let state = create_test_app_state(&event_bus);

        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(DeviceListServiceProvider::new(
                state.clone(),
                event_bus.clone(),
            )),
            Box::new(DetectionServiceProvider::new(
                state.clone(),
                event_bus.clone(),
            )),
            Box::new(ConfigWatcherServiceProvider::new(
                state.clone(),
                event_bus.clone(),
            )),
        ];

        providers.sort_by_key(|b| std::cmp::Reverse(b.priority()));

        assert_eq!(providers[0].name(), "DetectionService");
        assert_eq!(providers[1].name(), "ConfigWatcherService");
        assert_eq!(providers[2].name(), "DeviceListService");
    }

    #[tokio::test]
    async fn provider_metadata_consistency() {
        let event_bus = EventBus::new();
        let state = create_test_app_state(&event_bus);

        let detection1 = DetectionServiceProvider::new(state.clone(), event_bus.clone());
        let detection2 = DetectionServiceProvider::new(state.clone(), event_bus.clone());

        assert_eq!(detection1.name(), detection2.name());
        assert_eq!(detection1.priority(), detection2.priority());
        assert_eq!(detection1.is_critical(), detection2.is_critical());
    }
}
