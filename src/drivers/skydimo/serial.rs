//! Skydimo serial LED strip driver.
//!
//! The strip speaks an Adalight-style stream protocol at 115200-8-N-1 and
//! reverts to its builtin pattern when frames stop arriving, so Stream mode
//! runs a keep-alive task resending the last color buffer every 250 ms.

use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{error, warn};
use tokio::{sync::Mutex, task::JoinHandle, time::interval};
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tokio_util::sync::CancellationToken;

use crate::rgb_controller::{
    Color, ColorMode, DeviceInfo, Mode, RgbController, Zone, ZoneType,
};

use super::{
    device_io::DeviceIo,
    protocol::{self, IDENTIFY_CMD, SERIAL_LED_COUNT},
};

/// Keep-alive retransmission period.
pub const KEEPALIVE_INTERVAL_MS: u64 = 250;

/// Delay between the identify command and reading its response.
const IDENTIFY_SETTLE_MS: u64 = 10;

const IDENTIFY_READ_TIMEOUT_MS: u64 = 50;

struct State<Io> {
    io: Io,
    last_colors: Vec<Color>,
}

/// Driver for a Skydimo strip behind a USB serial adapter.
pub struct SkydimoSerialStrip<Io: DeviceIo> {
    info: DeviceInfo,
    modes: Vec<Mode>,
    leds_count: usize,
    keepalive_interval: Duration,
    state: Arc<Mutex<State<Io>>>,
    active_mode: Mutex<usize>,
    keepalive: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

/// Queries the strip for its model and serial.
///
/// Sends `Moni-A` and parses the `model,serial\r\n` response. Failure here is
/// non-fatal for detection, the strip works fine with default identity.
pub async fn identify<Io: DeviceIo>(io: &mut Io) -> Result<(String, String)> {
    io.write(IDENTIFY_CMD)?;
    tokio::time::sleep(Duration::from_millis(IDENTIFY_SETTLE_MS)).await;

    let mut buf = [0u8; 64];
    let n = io.read(&mut buf, IDENTIFY_READ_TIMEOUT_MS)?;
    if n == 0 {
        return Err(anyhow!("No identify response"));
    }

    protocol::parse_identify(&buf[..n])
}

impl<Io: DeviceIo> SkydimoSerialStrip<Io> {
    pub fn new(io: Io, info: DeviceInfo, keepalive_interval: Duration) -> Self {
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
                Mode {
                    name: "Stream",
                    value: 2,
                    color_mode: ColorMode::PerLed,
                },
            ],
            leds_count: SERIAL_LED_COUNT,
            keepalive_interval,
            state: Arc::new(Mutex::new(State {
                io,
                last_colors: Vec::new(),
            })),
            active_mode: Mutex::new(0),
            keepalive: Mutex::new(None),
        }
    }

    fn send_colors(state: &mut State<Io>, colors: &[Color], max_leds: usize) -> Result<()> {
        let packet = protocol::serial_color_frame(colors, max_leds);
        state.io.write(&packet).map(|_| ())
    }

    async fn start_keepalive(&self) {
        let mut slot = self.keepalive.lock().await;
        if slot.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let state = self.state.clone();
        let max_leds = self.leds_count;
        let period = self.keepalive_interval;
        let location = self.info.location.clone();

        let handle = tokio::spawn(async move {
            let mut ticks = IntervalStream::new(interval(period));
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    tick = ticks.next() => {
                        if tick.is_none() {
                            break;
                        }
                        let mut guard = state.lock().await;
                        if guard.last_colors.is_empty() {
                            continue;
                        }
                        let colors = guard.last_colors.clone();
                        if let Err(e) = Self::send_colors(&mut guard, &colors, max_leds) {
                            error!("Keep-alive write to {location} failed: {e}");
                        }
                    }
                }
            }
        });

        *slot = Some((token, handle));
    }

    async fn stop_keepalive(&self) {
        if let Some((token, handle)) = self.keepalive.lock().await.take() {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("Keep-alive task join error: {e}");
            }
        }
    }
}

impl<Io: DeviceIo> core::fmt::Debug for SkydimoSerialStrip<Io> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SkydimoSerialStrip")
            .field("info", &self.info)
            .field("leds_count", &self.leds_count)
            .finish()
    }
}

impl<Io: DeviceIo> Drop for SkydimoSerialStrip<Io> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.keepalive.try_lock() {
            if let Some((token, _)) = slot.take() {
                token.cancel();
            }
        }
    }
}

#[async_trait]
impl<Io: DeviceIo> RgbController for SkydimoSerialStrip<Io> {
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
            leds_min: self.leds_count,
            leds_max: self.leds_count,
            leds_count: self.leds_count,
        }
    }

    async fn active_mode(&self) -> usize {
        *self.active_mode.lock().await
    }

    async fn set_mode(&self, mode: usize) -> Result<()> {
        if mode >= self.modes.len() {
            return Err(anyhow!("Mode index {mode} out of range"));
        }

        *self.active_mode.lock().await = mode;

        match self.modes[mode].name {
            "Stream" => self.start_keepalive().await,
            "Off" => {
                self.stop_keepalive().await;
                let black = vec![Color::BLACK; self.leds_count];
                self.update_leds(&black).await?;
            }
            _ => self.stop_keepalive().await,
        }

        Ok(())
    }

    async fn update_leds(&self, colors: &[Color]) -> Result<()> {
        if colors.is_empty() {
            return Err(anyhow!("Empty color buffer"));
        }

        let mut state = self.state.lock().await;
        state.last_colors = colors.to_vec();
        let colors = state.last_colors.clone();
        Self::send_colors(&mut state, &colors, self.leds_count)
    }

    async fn resize_zone(&self, _new_size: usize) -> Result<()> {
        Err(anyhow!("Serial strip has a fixed LED count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rgb_controller::DeviceType;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};

    #[derive(Clone, Default)]
    struct FakePort {
        writes: StdArc<StdMutex<Vec<Vec<u8>>>>,
        response: StdArc<StdMutex<Vec<u8>>>,
    }

    impl DeviceIo for FakePort {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn read(&mut self, buf: &mut [u8], _timeout_ms: u64) -> Result<usize> {
            let response = self.response.lock().unwrap();
            let n = response.len().min(buf.len());
            buf[..n].copy_from_slice(&response[..n]);
            Ok(n)
        }
    }

    fn test_info() -> DeviceInfo {
        DeviceInfo {
            name: "Skydimo LED Strip".into(),
            vendor: "Skydimo".into(),
            description: "Skydimo Serial Device".into(),
            version: "1.0".into(),
            serial: "000000".into(),
            location: "/dev/ttyUSB0".into(),
            device_type: DeviceType::LedStrip,
        }
    }

    fn strip() -> (SkydimoSerialStrip<FakePort>, FakePort) {
        let port = FakePort::default();
        let strip = SkydimoSerialStrip::new(
            port.clone(),
            test_info(),
            Duration::from_millis(KEEPALIVE_INTERVAL_MS),
        );
        (strip, port)
    }

    #[tokio::test]
    async fn update_writes_single_frame() {
        let (strip, port) = strip();
        strip
            .update_leds(&[Color::new(1, 2, 3), Color::new(4, 5, 6)])
            .await
            .unwrap();

        let writes = port.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(&writes[0][..6], &[0x41, 0x64, 0x61, 0x00, 0, 2]);
        assert_eq!(&writes[0][6..], &[1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn off_mode_sends_black_frame_for_all_leds() {
        let (strip, port) = strip();
        strip.set_mode(1).await.unwrap();

        let writes = port.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let frame = &writes[0];
        assert_eq!(frame[5], SERIAL_LED_COUNT as u8);
        assert!(frame[6..].iter().all(|&b| b == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_mode_resends_last_buffer() {
        let (strip, port) = strip();
        strip.update_leds(&[Color::new(9, 8, 7)]).await.unwrap();
        strip.set_mode(2).await.unwrap();

        tokio::time::advance(Duration::from_millis(KEEPALIVE_INTERVAL_MS * 3)).await;
        tokio::task::yield_now().await;
        strip.set_mode(0).await.unwrap();

        let writes = port.writes.lock().unwrap();
        // Initial update plus at least one keep-alive resend of the
        // identical frame.
        assert!(writes.len() >= 2, "expected resends, got {}", writes.len());
        assert!(writes.iter().all(|w| w == &writes[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_is_idle_without_colors() {
        let (strip, port) = strip();
        strip.set_mode(2).await.unwrap();

        tokio::time::advance(Duration::from_millis(KEEPALIVE_INTERVAL_MS * 4)).await;
        tokio::task::yield_now().await;
        strip.set_mode(0).await.unwrap();

        assert!(port.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resize_is_not_supported() {
        let (strip, _) = strip();
        assert!(strip.resize_zone(50).await.is_err());
        assert_eq!(strip.zone().await.leds_count, SERIAL_LED_COUNT);
    }

    #[tokio::test]
    async fn identify_reads_model_and_serial() {
        let mut port = FakePort::default();
        *port.response.lock().unwrap() = b"S1 Pro,AB\r\n".to_vec();

        let (model, serial) = identify(&mut port).await.unwrap();
        assert_eq!(model, "S1 Pro");
        assert_eq!(serial, "4142");

        let writes = port.writes.lock().unwrap();
        assert_eq!(writes[0], IDENTIFY_CMD.to_vec());
    }

    #[tokio::test]
    async fn identify_fails_on_silence() {
        let mut port = FakePort::default();
        assert!(identify(&mut port).await.is_err());
    }
}
