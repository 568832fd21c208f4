//! Detection for Skydimo LED strips on both transports.
//!
//! One strip family, two transports: a HID endpoint (0x1A86:0xE316) and a
//! CH340-style USB serial adapter (0x1A86:0x7523). A failure to bring up one
//! device never aborts detection of the others.

pub mod device_io;
pub mod hid;
pub mod protocol;
pub mod serial;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use hidapi::HidApi;
use log::{error, info};
use serialport::SerialPortType;

use crate::{
    registry::DeviceRegistry,
    rgb_controller::{DeviceInfo, DeviceType},
};

pub const HID_VID: u16 = 0x1A86;
pub const HID_PID: u16 = 0xE316;

pub const SERIAL_VID: u16 = 0x1A86;
pub const SERIAL_PID: u16 = 0x7523;

pub const DEFAULT_DEVICE_NAME: &str = "Skydimo LED Strip";
pub const DEFAULT_SERIAL: &str = "000000";

const SERIAL_BAUD_RATE: u32 = 115_200;

/// Tuning knobs taken from the daemon configuration.
#[derive(Debug, Clone, Copy)]
pub struct SkydimoSettings {
    /// Addressable LED limit for HID strips.
    pub hid_max_leds: usize,
    /// Stream mode keep-alive period.
    pub keepalive: Duration,
}

impl Default for SkydimoSettings {
    fn default() -> Self {
        Self {
            hid_max_leds: protocol::DEFAULT_MAX_LEDS,
            keepalive: Duration::from_millis(serial::KEEPALIVE_INTERVAL_MS),
        }
    }
}

/// Devices that keep the default name get the transport and location
/// appended so multiple strips stay distinguishable in the list.
fn append_identifier(info: &mut DeviceInfo, identifier: &str) {
    if info.name == DEFAULT_DEVICE_NAME {
        info.name = format!("{} {identifier}", info.name);
    }
}

/// Detects Skydimo HID strips and registers one controller per endpoint.
pub async fn detect_hid(
    api: &HidApi,
    registry: &DeviceRegistry,
    settings: SkydimoSettings,
) -> Result<()> {
    for dev in api
        .device_list()
        .filter(|d| d.vendor_id() == HID_VID && d.product_id() == HID_PID)
    {
        let path = dev.path().to_string_lossy().into_owned();

        let device = match api.open_path(dev.path()) {
            Ok(device) => device,
            Err(e) => {
                error!("Failed to open Skydimo HID device at {path}: {e}");
                continue;
            }
        };

        let name = match dev.product_string() {
            Some(product) if !product.is_empty() => format!("Skydimo {product}"),
            _ => DEFAULT_DEVICE_NAME.to_string(),
        };
        let serial = match dev.serial_number() {
            Some(s) if !s.is_empty() => protocol::hex_serial(s.as_bytes()),
            _ => DEFAULT_SERIAL.to_string(),
        };

        let mut info = DeviceInfo {
            name,
            vendor: "Skydimo".into(),
            description: "Skydimo HID LED Strip Controller".into(),
            version: "1.0".into(),
            serial,
            location: path.clone(),
            device_type: DeviceType::LedStrip,
        };
        append_identifier(&mut info, &format!("(HID: {path})"));

        info!("Registering Skydimo HID strip at {path}");
        registry
            .register_controller(Arc::new(hid::SkydimoHidStrip::new(
                device,
                info,
                settings.hid_max_leds,
            )))
            .await;
    }

    Ok(())
}

/// Detects Skydimo serial strips on matching USB serial adapters.
pub async fn detect_serial(registry: &DeviceRegistry, settings: SkydimoSettings) -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;

    for port_info in ports {
        let matches = matches!(
            &port_info.port_type,
            SerialPortType::UsbPort(usb) if usb.vid == SERIAL_VID && usb.pid == SERIAL_PID
        );
        if !matches {
            continue;
        }

        let port_name = port_info.port_name.clone();
        let mut port = match serialport::new(&port_name, SERIAL_BAUD_RATE)
            .timeout(Duration::from_millis(50))
            .open()
        {
            Ok(port) => port,
            Err(e) => {
                error!("Failed to open Skydimo serial port {port_name}: {e}");
                continue;
            }
        };

        // Identity query is best effort, the strip streams fine without it.
        let (name, serial) = match serial::identify(&mut port).await {
            Ok((model, serial)) => (format!("Skydimo {model}"), serial),
            Err(e) => {
                info!("Skydimo identify on {port_name} failed: {e}");
                (DEFAULT_DEVICE_NAME.to_string(), DEFAULT_SERIAL.to_string())
            }
        };

        let mut info = DeviceInfo {
            name,
            vendor: "Skydimo".into(),
            description: "Skydimo Serial Device".into(),
            version: "1.0".into(),
            serial,
            location: port_name.clone(),
            device_type: DeviceType::LedStrip,
        };
        append_identifier(&mut info, &format!("(Serial: {port_name})"));

        info!("Registering Skydimo serial strip on {port_name}");
        registry
            .register_controller(Arc::new(serial::SkydimoSerialStrip::new(
                port,
                info,
                settings.keepalive,
            )))
            .await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info_named(name: &str) -> DeviceInfo {
        DeviceInfo {
            name: name.to_string(),
            vendor: "Skydimo".into(),
            description: String::new(),
            version: "1.0".into(),
            serial: DEFAULT_SERIAL.into(),
            location: "/dev/ttyUSB0".into(),
            device_type: DeviceType::LedStrip,
        }
    }

    #[test]
    fn default_name_gets_location_suffix() {
        let mut info = info_named(DEFAULT_DEVICE_NAME);
        append_identifier(&mut info, "(Serial: /dev/ttyUSB0)");
        assert_eq!(info.name, "Skydimo LED Strip (Serial: /dev/ttyUSB0)");
    }

    #[test]
    fn identified_name_is_left_alone() {
        let mut info = info_named("Skydimo S1");
        append_identifier(&mut info, "(Serial: /dev/ttyUSB0)");
        assert_eq!(info.name, "Skydimo S1");
    }
}
