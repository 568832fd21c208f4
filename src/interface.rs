use std::sync::Arc;

use event_listener::Event;
use log::error;
use zbus::{interface, object_server::SignalEmitter};

use crate::{
    app_context::AppState,
    event::{Event as AppEvent, EventBus},
    rgb_controller::{Color, RgbController},
};

pub struct DBusInterface {
    state: Arc<AppState>,
    event_bus: EventBus,

    // Events
    pub stop: Event,
    pub version: String,
}

impl DBusInterface {
    pub fn new(state: Arc<AppState>, version: String, event_bus: EventBus) -> Self {
        Self {
            state,
            event_bus,
            stop: Event::new(),
            version,
        }
    }

    async fn controller(&self, device: u32) -> zbus::fdo::Result<Arc<dyn RgbController>> {
        self.state
            .registry
            .controllers()
            .await
            .get(device as usize)
            .cloned()
            .ok_or_else(|| {
                zbus::fdo::Error::InvalidArgs(format!("No device at index {device}"))
            })
    }
}

#[interface(name = "io.github.skydimod1")]
impl DBusInterface {
    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    /// Emitted whenever the device list rows change.
    #[zbus(signal)]
    pub async fn device_list_changed(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    async fn stop(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
    ) -> zbus::fdo::Result<()> {
        emitter.stopped().await?;
        self.stop.notify(1);

        Ok(())
    }

    /// Serializes the device list to JSON.
    async fn list_devices(&self) -> zbus::fdo::Result<String> {
        self.state
            .device_list
            .lock()
            .await
            .to_json()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Requests a new detection pass.
    async fn rescan(&self) {
        if let Err(e) = self.event_bus.publish(AppEvent::RescanRequested) {
            error!("Failed to request rescan: {e}");
        }
    }

    /// Fills every LED of the device with one color.
    async fn set_color(&self, device: u32, red: u8, green: u8, blue: u8) -> zbus::fdo::Result<()> {
        let controller = self.controller(device).await?;
        let count = controller.zone().await.leds_count;
        let colors = vec![Color::new(red, green, blue); count];

        controller
            .update_leds(&colors)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    async fn set_mode(&self, device: u32, mode: u32) -> zbus::fdo::Result<()> {
        let controller = self.controller(device).await?;
        controller
            .set_mode(mode as usize)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    async fn resize_zone(&self, device: u32, size: u32) -> zbus::fdo::Result<()> {
        let controller = self.controller(device).await?;
        controller
            .resize_zone(size as usize)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }

    #[zbus(property)]
    async fn loading(&self) -> bool {
        self.state.device_list.lock().await.is_loading()
    }

    #[zbus(property)]
    async fn device_count(&self) -> u32 {
        self.state.registry.controller_count().await as u32
    }
}
