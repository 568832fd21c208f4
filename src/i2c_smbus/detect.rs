//! SMBus controller detection.
//!
//! Walks the PCI device tree in sysfs looking for SMBus-class controllers
//! (class 0x0c0500), then loads the matching helper module and registers one
//! bus per adapter port. Intel controllers are single-ported; AMD FCH
//! controllers expose two ports behind one helper handle.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::{error, info, warn};

use super::{
    BusInfo, SmbusInterface,
    pawnio::{HelperIo, PawnIoHandle, PawnIoSmbus},
};
use crate::registry::DeviceRegistry;

const SYSFS_PCI_DEVICES: &str = "/sys/bus/pci/devices";

/// PCI class code for SMBus serial bus controllers.
const PCI_CLASS_SMBUS: u32 = 0x0c0500;

const VENDOR_INTEL: u16 = 0x8086;
const VENDOR_AMD: u16 = 0x1022;

const I801_MODULE: &str = "SmbusI801.bin";
const PIIX4_MODULE: &str = "SmbusPIIX4.bin";

const PIIX4_PORTS: [u8; 2] = [0, 1];

/// One SMBus-class PCI function found in sysfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciSmbusController {
    pub vendor: u16,
    pub device: u16,
    pub subsystem_vendor: u16,
    pub subsystem_device: u16,
}

fn read_sysfs_hex(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path).ok()?;
    u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok()
}

/// Scans a sysfs PCI device directory for SMBus-class controllers.
///
/// Takes the root explicitly so tests can point it at a synthetic tree.
pub fn scan_pci(root: &Path) -> Result<Vec<PciSmbusController>> {
    let mut found = Vec::new();

    let entries = fs::read_dir(root)
        .with_context(|| format!("Failed to read {}", root.display()))?;

    for entry in entries.flatten() {
        let dev: PathBuf = entry.path();

        let Some(class) = read_sysfs_hex(&dev.join("class")) else {
            continue;
        };
        if class != PCI_CLASS_SMBUS {
            continue;
        }

        let Some(vendor) = read_sysfs_hex(&dev.join("vendor")) else {
            continue;
        };
        let Some(device) = read_sysfs_hex(&dev.join("device")) else {
            continue;
        };
        let subsystem_vendor = read_sysfs_hex(&dev.join("subsystem_vendor")).unwrap_or(0);
        let subsystem_device = read_sysfs_hex(&dev.join("subsystem_device")).unwrap_or(0);

        found.push(PciSmbusController {
            vendor: vendor as u16,
            device: device as u16,
            subsystem_vendor: subsystem_vendor as u16,
            subsystem_device: subsystem_device as u16,
        });
    }

    Ok(found)
}

fn bus_info(controller: &PciSmbusController, driver: &str, port: Option<u8>) -> BusInfo {
    let mut device_name = format!(
        "SMBus controller {:04X}:{:04X}",
        controller.vendor, controller.device
    );
    if let Some(port) = port {
        device_name.push_str(&format!(" port {port}"));
    }

    BusInfo {
        driver: driver.to_string(),
        device_name,
        pci_vendor: controller.vendor,
        pci_device: controller.device,
        pci_subsystem_vendor: controller.subsystem_vendor,
        pci_subsystem_device: controller.subsystem_device,
        port,
    }
}

fn i801_bus(
    helper: Arc<dyn HelperIo>,
    controller: &PciSmbusController,
    shared_access: bool,
) -> Result<PawnIoSmbus> {
    PawnIoSmbus::new(helper, bus_info(controller, "i801", None), shared_access)
}

fn piix4_buses(
    helper: Arc<dyn HelperIo>,
    controller: &PciSmbusController,
    shared_access: bool,
) -> Result<Vec<PawnIoSmbus>> {
    // Both ports share the helper handle; transactions reselect the port.
    PIIX4_PORTS
        .iter()
        .map(|&port| {
            PawnIoSmbus::new(
                helper.clone(),
                bus_info(controller, "piix4", Some(port)),
                shared_access,
            )
        })
        .collect()
}

async fn register_i801(
    registry: &DeviceRegistry,
    controller: &PciSmbusController,
    shared_access: bool,
) -> Result<()> {
    let helper = PawnIoHandle::load_module(I801_MODULE)?;
    let bus = i801_bus(helper, controller, shared_access)?;

    info!("Registering i801 SMBus adapter {:04X}", controller.device);
    registry.register_bus(Arc::new(bus)).await;
    Ok(())
}

async fn register_piix4(
    registry: &DeviceRegistry,
    controller: &PciSmbusController,
    shared_access: bool,
) -> Result<()> {
    let helper = PawnIoHandle::load_module(PIIX4_MODULE)?;

    for bus in piix4_buses(helper, controller, shared_access)? {
        info!(
            "Registering piix4 SMBus adapter {:04X} port {}",
            controller.device,
            bus.info().port.unwrap_or(0)
        );
        registry.register_bus(Arc::new(bus)).await;
    }

    Ok(())
}

/// Detects SMBus controllers and registers a bus for each adapter port.
///
/// `shared_access` comes from `smbus.shared_access` in the configuration and
/// applies to every registered bus.
pub async fn detect_smbus(registry: &DeviceRegistry, shared_access: bool) -> Result<()> {
    let controllers = scan_pci(Path::new(SYSFS_PCI_DEVICES))?;
    if controllers.is_empty() {
        info!("No SMBus-class PCI controllers found");
        return Ok(());
    }

    for controller in &controllers {
        let result = match controller.vendor {
            VENDOR_INTEL => register_i801(registry, controller, shared_access).await,
            VENDOR_AMD => register_piix4(registry, controller, shared_access).await,
            other => {
                warn!("Unsupported SMBus controller vendor {other:04X}, skipping");
                continue;
            }
        };

        if let Err(e) = result {
            error!(
                "Failed to bring up SMBus controller {:04X}:{:04X}: {e}",
                controller.vendor, controller.device
            );
        }
    }

    Ok(())
}
