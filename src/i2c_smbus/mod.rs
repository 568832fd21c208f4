//! SMBus interface abstraction.
//!
//! Buses register with the [`DeviceRegistry`](crate::registry::DeviceRegistry)
//! behind the [`SmbusInterface`] trait. The only implementation today is the
//! kernel-helper bridge in [`pawnio`], detected per platform in [`detect`].

pub mod detect;
pub mod pawnio;

/// Largest SMBus block transfer.
pub const I2C_SMBUS_BLOCK_MAX: usize = 32;

/// SMBus transaction sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSize {
    Quick,
    Byte,
    ByteData,
    WordData,
    BlockData,
}

/// Transfer direction. For quick transactions the direction bit carries the
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// Payload of an SMBus transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmbusData {
    None,
    Byte(u8),
    Word(u16),
    Block(Vec<u8>),
}

/// Errno-style SMBus failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmbusError {
    /// Helper execution failed (EIO).
    Io,
    /// Device answered with a malformed block (EPROTO).
    Protocol,
    /// Caller supplied an invalid argument (EINVAL).
    InvalidArg,
    /// Transaction size not supported by the bus (EOPNOTSUPP).
    NotSupported,
}

impl core::fmt::Display for SmbusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            SmbusError::Io => "SMBus I/O error",
            SmbusError::Protocol => "SMBus protocol error",
            SmbusError::InvalidArg => "Invalid SMBus argument",
            SmbusError::NotSupported => "SMBus transaction not supported",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for SmbusError {}

/// Identity of a registered bus, mirrored into the device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusInfo {
    /// Platform driver name ("i801", "piix4").
    pub driver: String,
    /// Human-readable adapter name, port suffix included.
    pub device_name: String,
    pub pci_vendor: u16,
    pub pci_device: u16,
    pub pci_subsystem_vendor: u16,
    pub pci_subsystem_device: u16,
    /// Adapter port for multi-port controllers.
    pub port: Option<u8>,
}

/// An SMBus master.
///
/// `xfer` is the single primitive; the derived operations mirror the
/// standard SMBus command set and are what drivers actually call.
pub trait SmbusInterface: Send + Sync + core::fmt::Debug {
    fn info(&self) -> &BusInfo;

    fn xfer(
        &self,
        addr: u8,
        direction: Direction,
        command: u8,
        size: TransactionSize,
        data: SmbusData,
    ) -> Result<SmbusData, SmbusError>;

    fn write_quick(&self, addr: u8, direction: Direction) -> Result<(), SmbusError> {
        self.xfer(addr, direction, 0, TransactionSize::Quick, SmbusData::None)
            .map(|_| ())
    }

    fn read_byte(&self, addr: u8) -> Result<u8, SmbusError> {
        match self.xfer(addr, Direction::Read, 0, TransactionSize::Byte, SmbusData::None)? {
            SmbusData::Byte(value) => Ok(value),
            _ => Err(SmbusError::Protocol),
        }
    }

    fn write_byte(&self, addr: u8, value: u8) -> Result<(), SmbusError> {
        self.xfer(
            addr,
            Direction::Write,
            value,
            TransactionSize::Byte,
            SmbusData::Byte(value),
        )
        .map(|_| ())
    }

    fn read_byte_data(&self, addr: u8, command: u8) -> Result<u8, SmbusError> {
        match self.xfer(
            addr,
            Direction::Read,
            command,
            TransactionSize::ByteData,
            SmbusData::None,
        )? {
            SmbusData::Byte(value) => Ok(value),
            _ => Err(SmbusError::Protocol),
        }
    }

    fn write_byte_data(&self, addr: u8, command: u8, value: u8) -> Result<(), SmbusError> {
        self.xfer(
            addr,
            Direction::Write,
            command,
            TransactionSize::ByteData,
            SmbusData::Byte(value),
        )
        .map(|_| ())
    }

    fn read_word_data(&self, addr: u8, command: u8) -> Result<u16, SmbusError> {
        match self.xfer(
            addr,
            Direction::Read,
            command,
            TransactionSize::WordData,
            SmbusData::None,
        )? {
            SmbusData::Word(value) => Ok(value),
            _ => Err(SmbusError::Protocol),
        }
    }

    fn write_word_data(&self, addr: u8, command: u8, value: u16) -> Result<(), SmbusError> {
        self.xfer(
            addr,
            Direction::Write,
            command,
            TransactionSize::WordData,
            SmbusData::Word(value),
        )
        .map(|_| ())
    }

    fn read_block_data(&self, addr: u8, command: u8) -> Result<Vec<u8>, SmbusError> {
        match self.xfer(
            addr,
            Direction::Read,
            command,
            TransactionSize::BlockData,
            SmbusData::None,
        )? {
            SmbusData::Block(block) => Ok(block),
            _ => Err(SmbusError::Protocol),
        }
    }

    fn write_block_data(&self, addr: u8, command: u8, block: &[u8]) -> Result<(), SmbusError> {
        self.xfer(
            addr,
            Direction::Write,
            command,
            TransactionSize::BlockData,
            SmbusData::Block(block.to_vec()),
        )
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Bus that records the last xfer and replays a canned answer.
    #[derive(Debug)]
    struct ScriptedBus {
        info: BusInfo,
        last: Mutex<Option<(u8, Direction, u8, TransactionSize, SmbusData)>>,
        answer: SmbusData,
    }

    impl ScriptedBus {
        fn answering(answer: SmbusData) -> Self {
            Self {
                info: BusInfo {
                    driver: "i801".into(),
                    device_name: "test adapter".into(),
                    pci_vendor: 0x8086,
                    pci_device: 0x7A23,
                    pci_subsystem_vendor: 0,
                    pci_subsystem_device: 0,
                    port: None,
                },
                last: Mutex::new(None),
                answer,
            }
        }
    }

    impl SmbusInterface for ScriptedBus {
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
            *self.last.lock().unwrap() = Some((addr, direction, command, size, data));
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn read_byte_data_unwraps_byte() {
        let bus = ScriptedBus::answering(SmbusData::Byte(0x42));
        assert_eq!(bus.read_byte_data(0x2D, 0x10).unwrap(), 0x42);

        let last = bus.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.0, 0x2D);
        assert_eq!(last.1, Direction::Read);
        assert_eq!(last.2, 0x10);
        assert_eq!(last.3, TransactionSize::ByteData);
    }

    #[test]
    fn write_word_data_passes_word_payload() {
        let bus = ScriptedBus::answering(SmbusData::None);
        bus.write_word_data(0x50, 0x03, 0xBEEF).unwrap();

        let last = bus.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.3, TransactionSize::WordData);
        assert_eq!(last.4, SmbusData::Word(0xBEEF));
    }

    #[test]
    fn read_word_rejects_wrong_payload_shape() {
        let bus = ScriptedBus::answering(SmbusData::Byte(1));
        assert_eq!(
            bus.read_word_data(0x50, 0).unwrap_err(),
            SmbusError::Protocol
        );
    }

    #[test]
    fn block_roundtrip_through_trait_helpers() {
        let bus = ScriptedBus::answering(SmbusData::Block(vec![1, 2, 3]));
        assert_eq!(bus.read_block_data(0x30, 0x01).unwrap(), vec![1, 2, 3]);

        bus.write_block_data(0x30, 0x01, &[9, 8]).unwrap();
        let last = bus.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.4, SmbusData::Block(vec![9, 8]));
    }
}
