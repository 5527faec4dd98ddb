//! ## Initialization
//!
//! Finding USBTMC devices with libusb and preparing one for a session: picking the
//! TMC interface, detaching the kernel driver, locating the bulk endpoints and
//! reading the identification strings.
//!

use anyhow::Result;
use rusb::{
    Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext,
};
use tracing::debug;

use crate::constants::usb::{USBTMC_CLASS_CODE, USBTMC_SUBCLASS_CODE};
use crate::error::Error;
use crate::types::{
    DeviceAddr, DeviceId, DeviceInfo, DeviceMode, Endpoint, InstrumentInfo, UsbtmcEndpoints,
};

/// Device filter
pub trait DeviceFilter {
    fn apply_filter<T: UsbContext>(&self, device: &Device<T>, device_desc: &DeviceDescriptor)
        -> bool;
}

/// Get first found TMC device
impl DeviceFilter for () {
    fn apply_filter<T: UsbContext>(&self, _: &Device<T>, _: &DeviceDescriptor) -> bool {
        true
    }
}

/// Get TMC device by USB device address
impl DeviceFilter for DeviceAddr {
    fn apply_filter<T: UsbContext>(&self, device: &Device<T>, _: &DeviceDescriptor) -> bool {
        self.bus == device.bus_number() && self.device == device.address()
    }
}

/// Get TMC device by USB identifiers
impl DeviceFilter for DeviceId {
    fn apply_filter<T: UsbContext>(&self, _: &Device<T>, device_desc: &DeviceDescriptor) -> bool {
        self.vendor_id == device_desc.vendor_id() && self.product_id == device_desc.product_id()
    }
}

/// Get TMC device by USB identifiers (idVendor, idProduct)
impl DeviceFilter for (u16, u16) {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        DeviceId {
            vendor_id: self.0,
            product_id: self.1,
        }
        .apply_filter(device, device_desc)
    }
}

/// Get TMC device by info (both USB identifiers and address)
impl DeviceFilter for DeviceInfo {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.id.apply_filter(device, device_desc) && self.address.apply_filter(device, device_desc)
    }
}

/// Allow apply filter by reference
impl<F: DeviceFilter> DeviceFilter for &F {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        (**self).apply_filter(device, device_desc)
    }
}

fn is_tmc_interface(class: u8, sub_class: u8) -> bool {
    class == USBTMC_CLASS_CODE && sub_class == USBTMC_SUBCLASS_CODE
}

fn is_tmc_device<T: UsbContext>(device: &Device<T>, device_desc: &DeviceDescriptor) -> bool {
    (0..device_desc.num_configurations()).any(|config_no| {
        device
            .config_descriptor(config_no)
            .map(|config_desc| {
                config_desc.interfaces().any(|interface| {
                    interface
                        .descriptors()
                        .any(|d| is_tmc_interface(d.class_code(), d.sub_class_code()))
                })
            })
            .unwrap_or(false)
    })
}

/// ### List Devices
///
/// List all TMC devices using a libusb context.
///
pub fn list_devices<T: UsbContext>(context: &T) -> Result<Vec<DeviceInfo>> {
    Ok(context
        .devices()?
        .iter()
        .filter_map(|device| {
            let device_desc = device.device_descriptor().ok()?;
            is_tmc_device(&device, &device_desc).then(|| DeviceInfo {
                id: DeviceId {
                    vendor_id: device_desc.vendor_id(),
                    product_id: device_desc.product_id(),
                },
                address: DeviceAddr {
                    bus: device.bus_number(),
                    device: device.address(),
                },
            })
        })
        .collect())
}

/// ### Open Device
///
/// Open the first TMC device accepted by `filter`.
///
pub fn open_device<T: UsbContext>(
    context: &T,
    filter: impl DeviceFilter,
) -> Result<(Device<T>, DeviceHandle<T>)> {
    for device in context.devices()?.iter() {
        let Ok(device_desc) = device.device_descriptor() else {
            continue;
        };
        if is_tmc_device(&device, &device_desc) && filter.apply_filter(&device, &device_desc) {
            match device.open() {
                Ok(handle) => return Ok((device, handle)),
                Err(e) => debug!("skipping {device:?}: {e}"),
            }
        }
    }

    Err(Error::DeviceNotFound.into())
}

/// ### Get USBTMC Mode
///
/// Get the device mode (configuration, interface and interface setting) that is compatible
/// with USBTMC.
///
pub fn get_usbtmc_mode(device: &Device<Context>) -> Result<DeviceMode> {
    let device_desc = device.device_descriptor()?;

    for n in 0..device_desc.num_configurations() {
        let config_desc = device.config_descriptor(n)?;
        for interface in config_desc.interfaces() {
            if let Some(interface_desc) = interface
                .descriptors()
                .find(|d| is_tmc_interface(d.class_code(), d.sub_class_code()))
            {
                return Ok(DeviceMode {
                    config_number: config_desc.number(),
                    interface_number: interface_desc.interface_number(),
                    setting_number: interface_desc.setting_number(),
                    has_kernel_driver: false,
                });
            }
        }
    }

    Err(Error::DeviceIncompatible.into())
}

/// ### Detach Kernel Driver
///
/// If the interface uses a kernel driver, detach it for the duration of the program.
///
pub fn detach_kernel_driver(
    mode: &mut DeviceMode,
    handle: &mut DeviceHandle<Context>,
) -> Result<()> {
    mode.has_kernel_driver = match handle.kernel_driver_active(mode.interface_number) {
        Ok(true) => {
            handle.detach_kernel_driver(mode.interface_number)?;
            true
        }
        _ => false,
    };

    Ok(())
}

/// ### Get Endpoints
///
/// Find the bulk and interrupt endpoints of the interface setting in `mode`.
///
pub fn get_endpoints(mode: &DeviceMode, device: &Device<Context>) -> Result<UsbtmcEndpoints> {
    let device_desc = device.device_descriptor()?;
    let config_desc = (0..device_desc.num_configurations())
        .filter_map(|n| device.config_descriptor(n).ok())
        .find(|c| c.number() == mode.config_number)
        .ok_or(Error::InterfaceNotFound)?;

    let interface = config_desc
        .interfaces()
        .find(|inter| inter.number() == mode.interface_number)
        .ok_or(Error::InterfaceNotFound)?;
    let interface_desc = interface
        .descriptors()
        .find(|d| d.setting_number() == mode.setting_number)
        .ok_or(Error::InterfaceSettingNotFound)?;

    let endpoints: Vec<Endpoint> = interface_desc
        .endpoint_descriptors()
        .map(|endpoint| Endpoint {
            address: endpoint.address(),
            max_packet_size: endpoint.max_packet_size(),
            transfer_type: endpoint.transfer_type(),
            direction: endpoint.direction(),
        })
        .collect();

    let find = |transfer_type: TransferType, direction: Direction| {
        endpoints
            .iter()
            .find(|ep| ep.transfer_type == transfer_type && ep.direction == direction)
            .cloned()
    };

    let bulk_out_ep =
        find(TransferType::Bulk, Direction::Out).ok_or(Error::BulkOutEndpointNotFound)?;
    let bulk_in_ep =
        find(TransferType::Bulk, Direction::In).ok_or(Error::BulkInEndpointNotFound)?;
    let interrupt_ep = find(TransferType::Interrupt, Direction::In);

    debug!(
        bulk_in = bulk_in_ep.address,
        bulk_out = bulk_out_ep.address,
        "found endpoints"
    );

    Ok(UsbtmcEndpoints {
        bulk_out_ep,
        bulk_in_ep,
        interrupt_ep,
    })
}

/// ### Read Instrument Info
///
/// Manufacturer, product and serial number strings. Missing strings are left empty.
///
pub fn read_instrument_info(
    device: &Device<Context>,
    handle: &DeviceHandle<Context>,
) -> Result<InstrumentInfo> {
    let device_desc = device.device_descriptor()?;

    let read = |index: Option<u8>| -> String {
        index
            .and_then(|i| handle.read_string_descriptor_ascii(i).ok())
            .unwrap_or_default()
    };

    Ok(InstrumentInfo {
        manufacturer: read(device_desc.manufacturer_string_index()),
        product: read(device_desc.product_string_index()),
        serial_number: read(device_desc.serial_number_string_index()),
    })
}
