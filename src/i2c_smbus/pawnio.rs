//! SMBus bridge over the PawnIO kernel helper.
//!
//! The helper exposes named entry points of a loaded module blob; arguments
//! and results travel as arrays of 64-bit cells. Entry points follow the
//! `ioctl_<driver>_<operation>` naming scheme, where `<driver>` is "i801" or
//! "piix4".

use std::{
    env, fs,
    os::fd::AsRawFd,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, anyhow};
use log::{error, info};
use once_cell::sync::Lazy;

use super::{
    BusInfo, Direction, I2C_SMBUS_BLOCK_MAX, SmbusData, SmbusError, SmbusInterface,
    TransactionSize,
};

/// Low-level access to a loaded helper module.
///
/// Split out as a trait so the bus logic is testable without the kernel
/// driver present.
#[cfg_attr(test, mockall::automock)]
pub trait HelperIo: Send + Sync {
    /// Executes a named entry point with the given input cells and returns
    /// up to `out_len` output cells.
    fn execute(&self, entry: &str, input: &[u64], out_len: usize) -> Result<Vec<u64>>;
}

const HELPER_DEVICE: &str = "/dev/pawnio";
const ENTRY_NAME_MAX: usize = 32;

#[repr(C)]
struct LoadRequest {
    blob: *const u8,
    size: u64,
}

#[repr(C)]
struct ExecuteRequest {
    entry: [u8; ENTRY_NAME_MAX],
    input: *const u64,
    in_count: u64,
    output: *mut u64,
    out_count: u64,
    return_count: *mut u64,
}

const fn ioc(dir: libc::c_ulong, nr: libc::c_ulong, size: libc::c_ulong) -> libc::c_ulong {
    // _IOC(dir, 'p', nr, size)
    (dir << 30) | ((b'p' as libc::c_ulong) << 8) | nr | (size << 16)
}

const IOC_WRITE: libc::c_ulong = 1;
const IOC_READ_WRITE: libc::c_ulong = 3;

const HELPER_IOC_LOAD: libc::c_ulong =
    ioc(IOC_WRITE, 0x01, size_of::<LoadRequest>() as libc::c_ulong);
const HELPER_IOC_EXECUTE: libc::c_ulong =
    ioc(IOC_READ_WRITE, 0x02, size_of::<ExecuteRequest>() as libc::c_ulong);

/// An open helper device with one module blob loaded.
///
/// The device handle closes when the last bus holding the `Arc` drops.
#[derive(Debug)]
pub struct PawnIoHandle {
    file: fs::File,
}

impl PawnIoHandle {
    /// Opens the helper device and loads `filename` from the executable's
    /// directory.
    pub fn load_module(filename: &str) -> Result<Arc<Self>> {
        let exe = env::current_exe().context("Failed to get executable path")?;
        let dir = exe
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("Executable has no parent directory"))?;
        let blob_path = dir.join(filename);

        if !blob_path.exists() {
            return Err(anyhow!(
                "Failed to find {filename} in the executable's directory"
            ));
        }

        let blob = fs::read(&blob_path)
            .with_context(|| format!("Failed to read {}", blob_path.display()))?;

        let file = fs::File::options()
            .read(true)
            .write(true)
            .open(HELPER_DEVICE)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    error!("Permission denied, helper initialization aborted");
                } else {
                    error!("Could not open {HELPER_DEVICE}, helper initialization aborted");
                }
                anyhow!("{e}")
            })?;

        let handle = Self { file };
        handle
            .load(&blob)
            .with_context(|| format!("Failed to load {filename}"))?;

        info!("Helper module {filename} loaded");
        Ok(Arc::new(handle))
    }

    fn load(&self, blob: &[u8]) -> Result<()> {
        let request = LoadRequest {
            blob: blob.as_ptr(),
            size: blob.len() as u64,
        };

        // SAFETY: request points at a live blob for the duration of the call.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), HELPER_IOC_LOAD, &request) };
        if ret < 0 {
            return Err(anyhow!(
                "Helper load ioctl failed: {}",
                std::io::Error::last_os_error()
            ));
        }
        Ok(())
    }
}

impl HelperIo for PawnIoHandle {
    fn execute(&self, entry: &str, input: &[u64], out_len: usize) -> Result<Vec<u64>> {
        if entry.len() >= ENTRY_NAME_MAX {
            return Err(anyhow!("Entry point name too long: {entry}"));
        }

        let mut name = [0u8; ENTRY_NAME_MAX];
        name[..entry.len()].copy_from_slice(entry.as_bytes());

        let mut output = vec![0u64; out_len];
        let mut return_count: u64 = 0;

        let request = ExecuteRequest {
            entry: name,
            input: input.as_ptr(),
            in_count: input.len() as u64,
            output: output.as_mut_ptr(),
            out_count: out_len as u64,
            return_count: &mut return_count,
        };

        // SAFETY: all pointers in the request outlive the ioctl call.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), HELPER_IOC_EXECUTE, &request) };
        if ret < 0 {
            return Err(anyhow!(
                "Helper execute '{entry}' failed: {}",
                std::io::Error::last_os_error()
            ));
        }

        output.truncate((return_count as usize).min(out_len));
        Ok(output)
    }
}

const BLOCK_CELLS: usize = I2C_SMBUS_BLOCK_MAX / 8;

/// Serializes bus transactions across all helper buses in this process when
/// shared access is enabled.
static SMBUS_ACCESS: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// One SMBus master behind the helper.
pub struct PawnIoSmbus {
    helper: Arc<dyn HelperIo>,
    info: BusInfo,
    shared_access: bool,
}

impl PawnIoSmbus {
    pub fn new(helper: Arc<dyn HelperIo>, info: BusInfo, shared_access: bool) -> Result<Self> {
        let bus = Self {
            helper,
            info,
            shared_access,
        };
        bus.port_sel().map_err(|e| anyhow!("Port select: {e}"))?;
        Ok(bus)
    }

    fn entry(&self, operation: &str) -> String {
        format!("ioctl_{}_{operation}", self.info.driver)
    }

    /// Whether transactions take the process-wide access lock.
    ///
    /// Used only for testing purposes.
    #[cfg(test)]
    pub fn shared_access(&self) -> bool {
        self.shared_access
    }

    /// Selects the adapter port. Only piix4 is multi-ported.
    fn port_sel(&self) -> Result<(), SmbusError> {
        let Some(port) = self.info.port else {
            return Ok(());
        };
        if self.info.driver != "piix4" {
            return Ok(());
        }

        self.helper
            .execute(&self.entry("port_sel"), &[port as u64], 1)
            .map(|_| ())
            .map_err(|_| SmbusError::Io)
    }

    fn read(
        &self,
        addr: u8,
        command: u8,
        size: TransactionSize,
    ) -> Result<SmbusData, SmbusError> {
        match size {
            TransactionSize::Byte => self
                .helper
                .execute(&self.entry("read_byte"), &[addr as u64], 1)
                .map_err(|_| SmbusError::Io)?
                .first()
                .map(|&v| SmbusData::Byte(v as u8))
                .ok_or(SmbusError::Protocol),

            TransactionSize::ByteData => self
                .helper
                .execute(&self.entry("read_byte_data"), &[addr as u64, command as u64], 1)
                .map_err(|_| SmbusError::Io)?
                .first()
                .map(|&v| SmbusData::Byte(v as u8))
                .ok_or(SmbusError::Protocol),

            TransactionSize::WordData => self
                .helper
                .execute(&self.entry("read_word_data"), &[addr as u64, command as u64], 1)
                .map_err(|_| SmbusError::Io)?
                .first()
                .map(|&v| SmbusData::Word(v as u16))
                .ok_or(SmbusError::Protocol),

            TransactionSize::BlockData => {
                // First output cell is the block length, the rest carry the
                // bytes packed little-endian.
                let out = self
                    .helper
                    .execute(
                        &self.entry("read_block_data"),
                        &[addr as u64, command as u64],
                        1 + BLOCK_CELLS,
                    )
                    .map_err(|_| SmbusError::Io)?;

                let len = *out.first().ok_or(SmbusError::Protocol)? as usize;
                if len == 0 || len > I2C_SMBUS_BLOCK_MAX {
                    return Err(SmbusError::Protocol);
                }

                Ok(SmbusData::Block(unpack_block(&out[1..], len)))
            }

            TransactionSize::Quick => Err(SmbusError::NotSupported),
        }
    }

    fn write(
        &self,
        addr: u8,
        direction: Direction,
        command: u8,
        size: TransactionSize,
        data: &SmbusData,
    ) -> Result<SmbusData, SmbusError> {
        match size {
            TransactionSize::Quick => {
                let bit = match direction {
                    Direction::Write => 0u64,
                    Direction::Read => 1u64,
                };
                self.helper
                    .execute(&self.entry("write_quick"), &[addr as u64, bit], 0)
                    .map_err(|_| SmbusError::Io)?;
            }

            TransactionSize::Byte => {
                let SmbusData::Byte(value) = data else {
                    return Err(SmbusError::InvalidArg);
                };
                self.helper
                    .execute(&self.entry("write_byte"), &[addr as u64, *value as u64], 0)
                    .map_err(|_| SmbusError::Io)?;
            }

            TransactionSize::ByteData => {
                let SmbusData::Byte(value) = data else {
                    return Err(SmbusError::InvalidArg);
                };
                self.helper
                    .execute(
                        &self.entry("write_byte_data"),
                        &[addr as u64, command as u64, *value as u64],
                        0,
                    )
                    .map_err(|_| SmbusError::Io)?;
            }

            TransactionSize::WordData => {
                let SmbusData::Word(value) = data else {
                    return Err(SmbusError::InvalidArg);
                };
                self.helper
                    .execute(
                        &self.entry("write_word_data"),
                        &[addr as u64, command as u64, *value as u64],
                        0,
                    )
                    .map_err(|_| SmbusError::Io)?;
            }

            TransactionSize::BlockData => {
                let SmbusData::Block(block) = data else {
                    return Err(SmbusError::InvalidArg);
                };
                if block.is_empty() || block.len() > I2C_SMBUS_BLOCK_MAX {
                    return Err(SmbusError::InvalidArg);
                }

                let mut input = vec![addr as u64, command as u64, block.len() as u64];
                input.extend_from_slice(&pack_block(block));
                self.helper
                    .execute(&self.entry("write_block_data"), &input, 0)
                    .map_err(|_| SmbusError::Io)?;
            }
        }

        Ok(SmbusData::None)
    }
}

impl core::fmt::Debug for PawnIoSmbus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PawnIoSmbus").field("info", &self.info).finish()
    }
}

impl SmbusInterface for PawnIoSmbus {
    fn info(&self) -> &BusInfo {
        &self.info
    }

    fn xfer(
        &self,
        addr: u8,
        direction: Direction,
        command: u8,
        size: TransactionSize,
        data: SmbusData,
    ) -> Result<SmbusData, SmbusError> {
        let _guard = self
            .shared_access
            .then(|| SMBUS_ACCESS.lock().unwrap_or_else(|e| e.into_inner()));

        // Multi-port adapters share one helper handle, reselect every time.
        self.port_sel()?;

        if direction == Direction::Read && size != TransactionSize::Quick {
            self.read(addr, command, size)
        } else {
            self.write(addr, direction, command, size, &data)
        }
    }
}

/// Packs block bytes little-endian into helper cells.
fn pack_block(block: &[u8]) -> [u64; BLOCK_CELLS] {
    let mut cells = [0u64; BLOCK_CELLS];
    for (i, &byte) in block.iter().enumerate() {
        cells[i / 8] |= (byte as u64) << ((i % 8) * 8);
    }
    cells
}

/// Unpacks `len` block bytes from helper cells.
fn unpack_block(cells: &[u64], len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| {
            cells
                .get(i / 8)
                .map(|&cell| ((cell >> ((i % 8) * 8)) & 0xFF) as u8)
                .unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate;
    use pretty_assertions::assert_eq;

    fn i801_info() -> BusInfo {
        BusInfo {
            driver: "i801".into(),
            device_name: "Intel SMBus adapter".into(),
            pci_vendor: 0x8086,
            pci_device: 0x7A23,
            pci_subsystem_vendor: 0x1043,
            pci_subsystem_device: 0x8882,
            port: None,
        }
    }

    fn piix4_info(port: u8) -> BusInfo {
        BusInfo {
            driver: "piix4".into(),
            device_name: format!("AMD SMBus adapter port {port}"),
            pci_vendor: 0x1022,
            pci_device: 0x790B,
            pci_subsystem_vendor: 0,
            pci_subsystem_device: 0,
            port: Some(port),
        }
    }

    #[test]
    fn block_pack_unpack_roundtrip() {
        let block: Vec<u8> = (1..=17).collect();
        let cells = pack_block(&block);
        assert_eq!(unpack_block(&cells, block.len()), block);
        // Bytes are little-endian within a cell.
        assert_eq!(cells[0], 0x0807060504030201);
    }

    #[test]
    fn read_word_uses_driver_prefixed_entry() {
        let mut helper = MockHelperIo::new();
        helper
            .expect_execute()
            .with(
                predicate::eq("ioctl_i801_read_word_data"),
                predicate::function(|input: &[u64]| input == [0x2D, 0x07]),
                predicate::eq(1),
            )
            .times(1)
            .returning(|_, _, _| Ok(vec![0xBEEF]));

        let bus = PawnIoSmbus::new(Arc::new(helper), i801_info(), false).unwrap();
        assert_eq!(bus.read_word_data(0x2D, 0x07).unwrap(), 0xBEEF);
    }

    #[test]
    fn block_read_validates_returned_length() {
        let mut helper = MockHelperIo::new();
        helper
            .expect_execute()
            .returning(|_, _, _| Ok(vec![0; 1 + BLOCK_CELLS])); // len 0

        let bus = PawnIoSmbus::new(Arc::new(helper), i801_info(), false).unwrap();
        assert_eq!(
            bus.read_block_data(0x30, 0x01).unwrap_err(),
            SmbusError::Protocol
        );
    }

    #[test]
    fn block_read_unpacks_cells() {
        let mut helper = MockHelperIo::new();
        helper.expect_execute().returning(|entry, _, _| {
            assert_eq!(entry, "ioctl_i801_read_block_data");
            let mut out = vec![3u64];
            out.extend_from_slice(&pack_block(&[0xAA, 0xBB, 0xCC]));
            Ok(out)
        });

        let bus = PawnIoSmbus::new(Arc::new(helper), i801_info(), false).unwrap();
        assert_eq!(
            bus.read_block_data(0x30, 0x01).unwrap(),
            vec![0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn oversized_block_write_is_invalid() {
        let helper = MockHelperIo::new(); // must not be called
        let bus = PawnIoSmbus::new(Arc::new(helper), i801_info(), false).unwrap();

        let block = vec![0u8; I2C_SMBUS_BLOCK_MAX + 1];
        assert_eq!(
            bus.write_block_data(0x30, 0x01, &block).unwrap_err(),
            SmbusError::InvalidArg
        );
    }

    #[test]
    fn block_write_packs_length_and_cells() {
        let mut helper = MockHelperIo::new();
        helper.expect_execute().times(1).returning(|entry, input, out_len| {
            assert_eq!(entry, "ioctl_i801_write_block_data");
            assert_eq!(out_len, 0);
            assert_eq!(input[0], 0x30);
            assert_eq!(input[1], 0x01);
            assert_eq!(input[2], 2); // length
            assert_eq!(input[3], 0x0000000000000201); // bytes 1, 2 packed LE
            Ok(Vec::new())
        });

        let bus = PawnIoSmbus::new(Arc::new(helper), i801_info(), false).unwrap();
        bus.write_block_data(0x30, 0x01, &[1, 2]).unwrap();
    }

    #[test]
    fn piix4_selects_port_on_creation_and_per_xfer() {
        let mut helper = MockHelperIo::new();
        helper
            .expect_execute()
            .with(
                predicate::eq("ioctl_piix4_port_sel"),
                predicate::function(|input: &[u64]| input == [1]),
                predicate::eq(1),
            )
            .times(2) // once in new(), once before the transaction
            .returning(|_, _, _| Ok(vec![0]));
        helper
            .expect_execute()
            .with(
                predicate::eq("ioctl_piix4_read_byte"),
                predicate::always(),
                predicate::eq(1),
            )
            .times(1)
            .returning(|_, _, _| Ok(vec![0x55]));

        let bus = PawnIoSmbus::new(Arc::new(helper), piix4_info(1), false).unwrap();
        assert_eq!(bus.read_byte(0x2D).unwrap(), 0x55);
    }

    #[test]
    fn helper_failure_maps_to_io_error() {
        let mut helper = MockHelperIo::new();
        helper
            .expect_execute()
            .returning(|_, _, _| Err(anyhow!("no helper")));

        let bus = PawnIoSmbus::new(Arc::new(helper), i801_info(), true).unwrap();
        assert_eq!(bus.read_byte(0x2D).unwrap_err(), SmbusError::Io);
    }

    #[test]
    fn quick_write_carries_direction_bit() {
        let mut helper = MockHelperIo::new();
        helper.expect_execute().times(1).returning(|entry, input, _| {
            assert_eq!(entry, "ioctl_i801_write_quick");
            assert_eq!(input, [0x2D, 1]);
            Ok(Vec::new())
        });

        let bus = PawnIoSmbus::new(Arc::new(helper), i801_info(), false).unwrap();
        bus.write_quick(0x2D, Direction::Read).unwrap();
    }
}
