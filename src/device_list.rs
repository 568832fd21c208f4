//! Flat, serializable view of the detected devices.
//!
//! The model mirrors the registry into rows suitable for external consumers
//! (the D-Bus `ListDevices` call serializes it to JSON). Rebuilds are
//! compared against the current rows so unchanged detection passes do not
//! produce spurious change notifications.

use std::sync::Arc;

use serde::Serialize;

use crate::rgb_controller::RgbController;

/// One row of the device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRow {
    pub name: String,
    pub vendor: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub location: String,
    pub description: String,
    pub serial: String,
    pub version: String,
    pub connected: bool,
}

/// Device list mirrored from the registry.
#[derive(Debug, Default)]
pub struct DeviceListModel {
    rows: Vec<DeviceRow>,
    /// True while a detection pass is running.
    loading: bool,
}

impl DeviceListModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[DeviceRow] {
        &self.rows
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Rebuilds the rows from a registry snapshot.
    ///
    /// Returns `true` when the rows actually changed.
    pub fn rebuild(&mut self, controllers: &[Arc<dyn RgbController>]) -> bool {
        let rows: Vec<DeviceRow> = controllers
            .iter()
            .map(|controller| {
                let info = controller.info();
                DeviceRow {
                    name: info.name.clone(),
                    vendor: info.vendor.clone(),
                    device_type: info.device_type.as_display_str().to_string(),
                    location: info.location.clone(),
                    description: info.description.clone(),
                    serial: info.serial.clone(),
                    version: info.version.clone(),
                    connected: true,
                }
            })
            .collect();

        if rows == self.rows {
            return false;
        }

        self.rows = rows;
        true
    }

    /// Serializes the rows to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.rows)
    }
}
