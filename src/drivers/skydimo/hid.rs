//! Skydimo HID LED strip driver.
//!
//! Full-strip updates are written as a sequence of 20-LED data frames
//! followed by an end frame latching the total LED count, every frame
//! protected by a Maxim CRC8.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::rgb_controller::{
    Color, ColorMode, DeviceInfo, Mode, RgbController, Zone, ZoneType,
};

use super::{
    device_io::DeviceIo,
    protocol::{BATCH_LEDS, HidFrame},
};

struct State<Io> {
    io: Io,
    leds_count: usize,
    active_mode: usize,
}

/// Driver for a Skydimo strip reachable over HID.
pub struct SkydimoHidStrip<Io: DeviceIo> {
    info: DeviceInfo,
    modes: Vec<Mode>,
    max_leds: usize,
    state: Mutex<State<Io>>,
}

impl<Io: DeviceIo> SkydimoHidStrip<Io> {
    pub fn new(io: Io, info: DeviceInfo, max_leds: usize) -> Self {
        Self {
            info,
            modes: vec![
                Mode {
                    name: "Direct",
                    value: 0,
                    color_mode: ColorMode::PerLed,
                },
                Mode {
                    name: "Off",
                    value: 1,
                    color_mode: ColorMode::None,
                },
            ],
            max_leds,
            state: Mutex::new(State {
                io,
                leds_count: max_leds,
                active_mode: 0,
            }),
        }
    }

    fn send_frame(io: &mut Io, frame: &HidFrame) -> Result<()> {
        let bytes = frame.to_bytes();
        let written = io.write(&bytes)?;
        if written != bytes.len() {
            return Err(anyhow!(
                "Short HID write: {written} of {} bytes",
                bytes.len()
            ));
        }
        Ok(())
    }

    fn send_colors(io: &mut Io, colors: &[Color], count: usize) -> Result<()> {
        let led_count = count.min(colors.len());

        for offset in (0..led_count).step_by(BATCH_LEDS) {
            let batch = &colors[offset..led_count.min(offset + BATCH_LEDS)];
            Self::send_frame(
                io,
                &HidFrame::RgbData {
                    offset: offset as u16,
                    colors: batch.to_vec(),
                },
            )?;
        }

        Self::send_frame(
            io,
            &HidFrame::End {
                total_leds: led_count as u16,
            },
        )
    }
}

impl<Io: DeviceIo> core::fmt::Debug for SkydimoHidStrip<Io> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SkydimoHidStrip")
            .field("info", &self.info)
            .field("max_leds", &self.max_leds)
            .finish()
    }
}

#[async_trait]
impl<Io: DeviceIo> RgbController for SkydimoHidStrip<Io> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn modes(&self) -> &[Mode] {
        &self.modes
    }

    async fn zone(&self) -> Zone {
        Zone {
            name: "LED Strip",
            zone_type: ZoneType::Linear,
            leds_min: 1,
            leds_max: self.max_leds,
            leds_count: self.state.lock().await.leds_count,
        }
    }

    async fn active_mode(&self) -> usize {
        self.state.lock().await.active_mode
    }

    async fn set_mode(&self, mode: usize) -> Result<()> {
        if mode >= self.modes.len() {
            return Err(anyhow!("Mode index {mode} out of range"));
        }

        let mut state = self.state.lock().await;
        state.active_mode = mode;

        if self.modes[mode].name == "Off" {
            let black = vec![Color::BLACK; state.leds_count];
            let count = state.leds_count;
            Self::send_colors(&mut state.io, &black, count)?;
        }

        Ok(())
    }

    async fn update_leds(&self, colors: &[Color]) -> Result<()> {
        if colors.is_empty() {
            return Err(anyhow!("Empty color buffer"));
        }

        let mut state = self.state.lock().await;
        let count = state.leds_count.min(self.max_leds);
        Self::send_colors(&mut state.io, colors, count)
    }

    async fn resize_zone(&self, new_size: usize) -> Result<()> {
        if new_size < 1 || new_size > self.max_leds {
            return Err(anyhow!(
                "LED count {new_size} outside 1..={}",
                self.max_leds
            ));
        }

        self.state.lock().await.leds_count = new_size;
        Ok(())
    }
}
