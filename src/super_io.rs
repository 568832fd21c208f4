//! Super-IO register access through the kernel helper.
//!
//! Super-IO chips sit on the LPC bus at one of two well-known config
//! addresses (0x2E or 0x4E). Chip detection selects the chip by index and
//! the remaining entry points act on the detected chip, so only
//! `ioctl_detect` carries the index cell. Detection runs once per index and
//! the result is cached, a detect result of zero means no supported chip
//! and config-mode entry is refused.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use log::{debug, info};

use crate::i2c_smbus::pawnio::{HelperIo, PawnIoHandle};

/// Helper module blob for LPC Super-IO access.
const SUPERIO_MODULE: &str = "SuperIo.bin";

/// Super-IO config addresses the helper knows about, by index.
const CONFIG_ADDRS: [u16; 2] = [0x2E, 0x4E];

/// Accessor for Super-IO configuration registers.
pub struct SuperIo {
    helper: Arc<dyn HelperIo>,
    /// Detect result per config index, `Some(0)` meaning no chip.
    chip_types: Mutex<[Option<u64>; 2]>,
}

impl SuperIo {
    pub fn new(helper: Arc<dyn HelperIo>) -> Self {
        Self {
            helper,
            chip_types: Mutex::new([None, None]),
        }
    }

    /// Loads the Super-IO helper module and wraps it.
    pub fn load() -> Result<Self> {
        Ok(Self::new(PawnIoHandle::load_module(SUPERIO_MODULE)?))
    }

    fn index_for(addr: u16) -> Result<u64> {
        CONFIG_ADDRS
            .iter()
            .position(|&a| a == addr)
            .map(|i| i as u64)
            .ok_or_else(|| anyhow!("Unsupported Super-IO config address {addr:#06X}"))
    }

    /// Detects the chip behind `addr`, caching the result.
    pub fn chip_type(&self, addr: u16) -> Result<u64> {
        let index = Self::index_for(addr)?;

        let mut cache = self.chip_types.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(chip) = cache[index as usize] {
            return Ok(chip);
        }

        let out = self.helper.execute("ioctl_detect", &[index], 1)?;
        let chip = out.first().copied().unwrap_or(0);
        cache[index as usize] = Some(chip);

        if chip != 0 {
            info!("Super-IO chip {chip:#X} at {addr:#06X}");
        } else {
            debug!("No Super-IO chip at {addr:#06X}");
        }
        Ok(chip)
    }

    /// Puts the chip at `addr` into config mode.
    ///
    /// Fails when detection finds no supported chip there.
    pub fn enter(&self, addr: u16) -> Result<()> {
        if self.chip_type(addr)? == 0 {
            return Err(anyhow!("No Super-IO chip at {addr:#06X}"));
        }

        self.helper.execute("ioctl_enter", &[], 0)?;
        Ok(())
    }

    /// Writes a config register.
    pub fn outb(&self, addr: u16, reg: u8, value: u8) -> Result<()> {
        Self::index_for(addr)?;
        self.helper
            .execute("ioctl_write", &[reg as u64, value as u64], 0)?;
        Ok(())
    }

    /// Reads a config register.
    pub fn inb(&self, addr: u16, reg: u8) -> Result<u8> {
        Self::index_for(addr)?;
        let out = self.helper.execute("ioctl_read", &[reg as u64], 1)?;
        out.first()
            .map(|&v| v as u8)
            .ok_or_else(|| anyhow!("Empty Super-IO read response"))
    }
}

impl core::fmt::Debug for SuperIo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SuperIo").finish()
    }
}
