//! Device detection orchestration.
//!
//! A detection pass clears the registry, runs every enabled detector, and
//! brackets the work with [`Event::DetectionStarted`] and
//! [`Event::DetectionEnded`]. Individual detector failures are logged and
//! never abort the pass.

use std::sync::Arc;

use anyhow::Result;
use hidapi::HidApi;
use log::{debug, error, info};

use crate::{
    config::ConfigManager,
    drivers::skydimo::{self, SkydimoSettings},
    event::{Event, EventBus},
    i2c_smbus::detect::detect_smbus,
    registry::DeviceRegistry,
};

/// Runs detection passes against the registry.
pub struct Detector {
    event_bus: EventBus,
    registry: Arc<DeviceRegistry>,
    config_manager: Arc<ConfigManager>,
}

impl Detector {
    pub fn new(
        event_bus: EventBus,
        registry: Arc<DeviceRegistry>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            event_bus,
            registry,
            config_manager,
        }
    }

    fn publish(&self, event: Event) {
        if let Err(e) = self.event_bus.publish(event) {
            debug!("Detection event not delivered: {e}");
        }
    }

    /// Runs one full detection pass.
    pub async fn run_detection(&self) -> Result<()> {
        info!("Starting device detection");
        self.publish(Event::DetectionStarted);

        self.registry.clear().await;

        let config = self.config_manager.clone_config().await;
        let settings = SkydimoSettings {
            hid_max_leds: config.skydimo.hid_max_leds,
            keepalive: std::time::Duration::from_millis(config.skydimo.keepalive_ms),
        };

        if config.detectors.skydimo_hid {
            match HidApi::new() {
                Ok(api) => {
                    if let Err(e) = skydimo::detect_hid(&api, &self.registry, settings).await {
                        error!("Skydimo HID detection failed: {e}");
                    }
                }
                Err(e) => error!("Failed to initialize HID API: {e}"),
            }
        }

        if config.detectors.skydimo_serial {
            if let Err(e) = skydimo::detect_serial(&self.registry, settings).await {
                error!("Skydimo serial detection failed: {e}");
            }
        }

        if config.detectors.smbus {
            if let Err(e) = detect_smbus(&self.registry, config.smbus.shared_access).await {
                error!("SMBus detection failed: {e}");
            }
        }

        self.publish(Event::DetectionEnded);
        info!(
            "Device detection finished, {} controller(s) registered",
            self.registry.controller_count().await
        );
        Ok(())
    }
}

impl core::fmt::Debug for Detector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Detector").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::path::PathBuf;

    fn manager_with_detectors_disabled() -> Arc<ConfigManager> {
        let mut config = Config::default();
        config.detectors.skydimo_hid = false;
        config.detectors.skydimo_serial = false;
        config.detectors.smbus = false;
        Arc::new(ConfigManager::new(config, PathBuf::from("unused.yml")))
    }

    #[tokio::test]
    async fn pass_is_bracketed_by_detection_events() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();
        let registry = Arc::new(DeviceRegistry::new(event_bus.clone()));

        let detector = Detector::new(
            event_bus,
            registry.clone(),
            manager_with_detectors_disabled(),
        );
        detector.run_detection().await.unwrap();

        match receiver.recv().await.unwrap() {
            Event::DetectionStarted => {}
            other => panic!("Expected DetectionStarted, got {other:?}"),
        }

        // The registry clear publishes a list change before the end marker.
        loop {
            match receiver.recv().await.unwrap() {
                Event::DetectionEnded => break,
                Event::DeviceListChanged => {}
                other => panic!("Unexpected event: {other:?}"),
            }
        }

        assert_eq!(registry.controller_count().await, 0);
    }

    #[tokio::test]
    async fn pass_without_subscribers_still_succeeds() {
        let event_bus = EventBus::new();
        let registry = Arc::new(DeviceRegistry::new(event_bus.clone()));

        let detector = Detector::new(event_bus, registry, manager_with_detectors_disabled());
        detector.run_detection().await.unwrap();
    }
}
