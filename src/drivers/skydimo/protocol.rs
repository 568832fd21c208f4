//! Wire formats for Skydimo LED strips.
//!
//! The HID transport uses fixed 64/61 byte frames protected by a Maxim CRC8,
//! the serial transport uses an Adalight-style header followed by raw RGB
//! triples. Both formats were recovered from hardware captures, so the byte
//! layout here is authoritative.

use anyhow::{Result, anyhow};

use crate::rgb_controller::Color;

/// RGB payload bytes carried by one HID data frame.
pub const MAX_RGB_BYTES: usize = 60;

/// LEDs per HID data frame (3 bytes each).
pub const BATCH_LEDS: usize = 20;

/// Default addressable LED count of the HID strip.
pub const DEFAULT_MAX_LEDS: usize = 100;

/// Fixed LED count of the serial strip.
pub const SERIAL_LED_COUNT: usize = 100;

/// Serial identify command; the strip answers `model,serial\r\n`.
pub const IDENTIFY_CMD: &[u8] = b"Moni-A";

/// Maxim-style CRC8, polynomial 0x07, init 0x00, MSB first.
pub fn crc8_maxim(data: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;

    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// One outgoing HID frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidFrame {
    /// A batch of up to [`BATCH_LEDS`] LEDs starting at `offset`.
    RgbData { offset: u16, colors: Vec<Color> },
    /// Terminates a full-strip update and latches `total_leds` LEDs.
    End { total_leds: u16 },
}

impl HidFrame {
    /// Encodes the frame, CRC included.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            HidFrame::RgbData { offset, ref colors } => {
                let mut buf = Vec::with_capacity(MAX_RGB_BYTES + 4);
                buf.push(0x01);
                buf.push((offset & 0xFF) as u8);
                buf.push((offset >> 8) as u8);

                // Device expects GRB order, short batches are zero padded.
                for color in colors.iter().take(BATCH_LEDS) {
                    buf.extend_from_slice(&[color.green(), color.red(), color.blue()]);
                }
                buf.resize(3 + MAX_RGB_BYTES, 0x00);

                buf.push(crc8_maxim(&buf));
                buf
            }
            HidFrame::End { total_leds } => {
                let mut buf = Vec::with_capacity(MAX_RGB_BYTES + 1);
                buf.extend_from_slice(&[
                    0x01,
                    0xFF,
                    0xFF,
                    (total_leds & 0xFF) as u8,
                    (total_leds >> 8) as u8,
                ]);

                // The end frame is padded to the RGB payload size and the
                // CRC covers exactly those 60 bytes.
                buf.resize(MAX_RGB_BYTES, 0x00);
                buf.push(crc8_maxim(&buf));
                buf
            }
        }
    }
}

/// Builds the serial color frame: `Ada` header, zero flag byte, big-endian
/// LED count, then RGB triples.
pub fn serial_color_frame(colors: &[Color], max_leds: usize) -> Vec<u8> {
    let count = colors.len().min(max_leds);

    let mut packet = Vec::with_capacity(6 + count * 3);
    packet.extend_from_slice(&[
        0x41,
        0x64,
        0x61,
        0x00,
        ((count >> 8) & 0xFF) as u8,
        (count & 0xFF) as u8,
    ]);

    for color in &colors[..count] {
        packet.extend_from_slice(&[color.red(), color.green(), color.blue()]);
    }

    packet
}

/// Parses the identify response `model,serial\r\n`.
///
/// Returns the model string and the raw serial bytes rendered as uppercase
/// hex so non-ASCII serials stay printable.
pub fn parse_identify(buf: &[u8]) -> Result<(String, String)> {
    let comma = buf
        .iter()
        .position(|&b| b == b',')
        .ok_or_else(|| anyhow!("Identify response has no separator: {buf:?}"))?;

    let model = String::from_utf8_lossy(&buf[..comma]).trim().to_string();
    if model.is_empty() {
        return Err(anyhow!("Identify response has empty model"));
    }

    let rest = &buf[comma + 1..];
    let end = rest
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(rest.len());

    Ok((model, hex_serial(&rest[..end])))
}

/// Uppercase hex rendering of raw serial bytes, capped at 16 input bytes.
pub fn hex_serial(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(16)
        .map(|b| format!("{b:02X}"))
        .collect()
}
