//! RGB controller abstraction and device metadata types.
//!
//! Every detected device is exposed through the [`RgbController`] trait so the
//! registry, the D-Bus surface and the device list model never depend on a
//! concrete transport.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Packed RGB color, `0x00BBGGRR` layout.
///
/// The red component lives in the lowest byte so that color buffers can be
/// serialized and compared as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color(u32);

impl Color {
    pub const BLACK: Color = Color(0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self((red as u32) | ((green as u32) << 8) | ((blue as u32) << 16))
    }

    pub const fn red(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub const fn green(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    pub const fn blue(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }
}

/// Device categories known to the list surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Motherboard,
    Dram,
    Gpu,
    Cooler,
    LedStrip,
    Keyboard,
    Mouse,
    Mousemat,
    Headset,
    HeadsetStand,
    Gamepad,
    Light,
    Speaker,
    Virtual,
    Storage,
    Case,
    Microphone,
    Accessory,
    Keypad,
    Laptop,
    Monitor,
    Unknown,
}

impl DeviceType {
    /// Display string used by the device list rows.
    pub fn as_display_str(self) -> &'static str {
        match self {
            DeviceType::Motherboard => "Motherboard",
            DeviceType::Dram => "DRAM",
            DeviceType::Gpu => "GPU",
            DeviceType::Cooler => "Cooler",
            DeviceType::LedStrip => "LED Strip",
            DeviceType::Keyboard => "Keyboard",
            DeviceType::Mouse => "Mouse",
            DeviceType::Mousemat => "Mousemat",
            DeviceType::Headset => "Headset",
            DeviceType::HeadsetStand => "Headset Stand",
            DeviceType::Gamepad => "Gamepad",
            DeviceType::Light => "Light",
            DeviceType::Speaker => "Speaker",
            DeviceType::Virtual => "Virtual",
            DeviceType::Storage => "Storage",
            DeviceType::Case => "Case",
            DeviceType::Microphone => "Microphone",
            DeviceType::Accessory => "Accessory",
            DeviceType::Keypad => "Keypad",
            DeviceType::Laptop => "Laptop",
            DeviceType::Monitor => "Monitor",
            DeviceType::Unknown => "Unknown",
        }
    }
}

/// Static device identity captured at detection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    pub description: String,
    pub version: String,
    pub serial: String,
    pub location: String,
    pub device_type: DeviceType,
}

/// How mode colors are sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    None,
    PerLed,
}

/// A selectable device mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    pub name: &'static str,
    pub value: u8,
    pub color_mode: ColorMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Linear,
    Single,
    Matrix,
}

/// A contiguous group of LEDs on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub name: &'static str,
    pub zone_type: ZoneType,
    pub leds_min: usize,
    pub leds_max: usize,
    pub leds_count: usize,
}

/// Unified interface for RGB device drivers.
///
/// Implementations hold their own transport handle and last-written state
/// behind interior mutability, so the trait takes `&self` throughout.
#[async_trait]
pub trait RgbController: Send + Sync + core::fmt::Debug {
    /// Static identity of the device.
    fn info(&self) -> &DeviceInfo;

    /// Modes supported by the device, index 0 is the default.
    fn modes(&self) -> &[Mode];

    /// The single LED zone of the device.
    async fn zone(&self) -> Zone;

    /// Index of the currently active mode.
    async fn active_mode(&self) -> usize;

    /// Activates a mode by index. Drivers apply mode side effects
    /// (keep-alive start/stop, blanking) here.
    async fn set_mode(&self, mode: usize) -> Result<()>;

    /// Writes a full per-LED color buffer to the device.
    async fn update_leds(&self, colors: &[Color]) -> Result<()>;

    /// Changes the LED count of the zone, if the device supports it.
    async fn resize_zone(&self, new_size: usize) -> Result<()>;
}
