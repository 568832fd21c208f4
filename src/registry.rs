//! Shared registry of detected devices.
//!
//! Detectors register controllers and buses here; consumers take cheap
//! snapshots. Every mutation publishes [`Event::DeviceListChanged`] so the
//! device list and the D-Bus surface stay current without polling.

use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::{
    event::{Event, EventBus},
    i2c_smbus::SmbusInterface,
    rgb_controller::RgbController,
};

/// Registry of detected RGB controllers and SMBus buses.
pub struct DeviceRegistry {
    event_bus: EventBus,
    controllers: RwLock<Vec<Arc<dyn RgbController>>>,
    buses: RwLock<Vec<Arc<dyn SmbusInterface>>>,
}

impl DeviceRegistry {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            event_bus,
            controllers: RwLock::new(Vec::new()),
            buses: RwLock::new(Vec::new()),
        }
    }

    fn notify(&self) {
        // No subscribers yet is fine, e.g. during startup detection.
        if let Err(e) = self.event_bus.publish(Event::DeviceListChanged) {
            debug!("Device list change not delivered: {e}");
        }
    }

    /// Adds a controller and announces the change.
    pub async fn register_controller(&self, controller: Arc<dyn RgbController>) {
        self.controllers.write().await.push(controller);
        self.notify();
    }

    /// Adds a bus and announces the change.
    pub async fn register_bus(&self, bus: Arc<dyn SmbusInterface>) {
        self.buses.write().await.push(bus);
        self.notify();
    }

    /// Snapshot of the registered controllers.
    pub async fn controllers(&self) -> Vec<Arc<dyn RgbController>> {
        self.controllers.read().await.clone()
    }

    /// Snapshot of the registered buses.
    pub async fn buses(&self) -> Vec<Arc<dyn SmbusInterface>> {
        self.buses.read().await.clone()
    }

    pub async fn controller_count(&self) -> usize {
        self.controllers.read().await.len()
    }

    /// Drops all registered devices ahead of a rescan.
    ///
    /// Controllers with background tasks stop when their last `Arc` drops.
    pub async fn clear(&self) {
        self.controllers.write().await.clear();
        self.buses.write().await.clear();
        self.notify();
    }
}

impl core::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceRegistry").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rgb_controller::{
        Color, ColorMode, DeviceInfo, DeviceType, Mode, Zone, ZoneType,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct NullController {
        info: DeviceInfo,
        modes: Vec<Mode>,
    }

    impl NullController {
        fn named(name: &str) -> Self {
            Self {
                info: DeviceInfo {
                    name: name.to_string(),
                    vendor: "Test".into(),
                    description: String::new(),
                    version: "1.0".into(),
                    serial: "0".into(),
                    location: "test".into(),
                    device_type: DeviceType::LedStrip,
                },
                modes: vec![Mode {
                    name: "Direct",
                    value: 0,
                    color_mode: ColorMode::PerLed,
                }],
            }
        }
    }

    #[async_trait]
    impl RgbController for NullController {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn modes(&self) -> &[Mode] {
            &self.modes
        }

        async fn zone(&self) -> Zone {
            Zone {
                name: "Zone",
                zone_type: ZoneType::Linear,
                leds_min: 1,
                leds_max: 1,
                leds_count: 1,
            }
        }

        async fn active_mode(&self) -> usize {
            0
        }

        async fn set_mode(&self, _mode: usize) -> Result<()> {
            Ok(())
        }

        async fn update_leds(&self, _colors: &[Color]) -> Result<()> {
            Ok(())
        }

        async fn resize_zone(&self, _new_size: usize) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registration_publishes_list_change() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        let registry = DeviceRegistry::new(bus);

        registry
            .register_controller(Arc::new(NullController::named("strip")))
            .await;

        assert_eq!(registry.controller_count().await, 1);
        match receiver.recv().await.unwrap() {
            Event::DeviceListChanged => {}
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn registration_without_subscribers_succeeds() {
        let registry = DeviceRegistry::new(EventBus::new());
        registry
            .register_controller(Arc::new(NullController::named("strip")))
            .await;
        assert_eq!(registry.controller_count().await, 1);
    }

    #[tokio::test]
    async fn clear_empties_both_lists() {
        let registry = DeviceRegistry::new(EventBus::new());
        registry
            .register_controller(Arc::new(NullController::named("a")))
            .await;
        registry
            .register_controller(Arc::new(NullController::named("b")))
            .await;

        registry.clear().await;
        assert_eq!(registry.controller_count().await, 0);
        assert!(registry.buses().await.is_empty());
    }

    #[tokio::test]
    async fn snapshots_are_stable_across_later_mutation() {
        let registry = DeviceRegistry::new(EventBus::new());
        registry
            .register_controller(Arc::new(NullController::named("a")))
            .await;

        let snapshot = registry.controllers().await;
        registry.clear().await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].info().name, "a");
    }
}
