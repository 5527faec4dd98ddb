//! ## Types
//!
//! The different types used across the crate
//!

use std::fmt;

use rusb::{Direction, TransferType};
use serde::{Deserialize, Serialize};

/// ### Device Id
///
/// USB identifiers of a device.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// ### Device Address
///
/// Location of a device on the bus.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddr {
    pub bus: u8,
    pub device: u8,
}

/// ### Device Info
///
/// A discovered TMC device, before it is opened.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub address: DeviceAddr,
}

/// ### Device Mode
///
/// A collection of the configuration, interface and interface number. Also if the interface
/// has a kernel driver attached.
///
#[derive(Debug, Clone, Default)]
pub struct DeviceMode {
    /// The USB configuration number
    pub config_number: u8,
    /// The interface number specific to the configuration
    pub interface_number: u8,
    /// The setting number specific to the interface
    pub setting_number: u8,
    /// If the device has a kernel driver. Important for returning control to the OS (on Linux).
    pub has_kernel_driver: bool,
}

/// ### Endpoint
///
/// Properties of an endpoint.
///
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Address of the endpoint on the interface
    pub address: u8,
    /// The maximal size a packet can have on this endpoint
    pub max_packet_size: u16,
    /// The transfer type of the endpoint (for USBTMC, Bulk or Interrupt)
    pub transfer_type: TransferType,
    /// The direction of the endpoint (for USBTMC, In or Out)
    pub direction: Direction,
}

/// ### USBTMC Endpoints
///
/// Endpoints specific to the USBTMC spec.
///
#[derive(Clone, Debug)]
pub struct UsbtmcEndpoints {
    /// The mandatory BULK OUT endpoint
    pub bulk_out_ep: Endpoint,
    /// The mandatory BULK IN endpoint
    pub bulk_in_ep: Endpoint,
    /// The optional INTERRUPT IN endpoint
    pub interrupt_ep: Option<Endpoint>,
}

/// ### Binding
///
/// What a session needs to know about the device it talks to. Supplied by whoever
/// discovered the device.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub interface_number: u8,
    pub bulk_in: u8,
    pub bulk_out: u8,
}

impl Binding {
    pub fn endpoint(&self, pipe: Pipe) -> u8 {
        match pipe {
            Pipe::BulkIn => self.bulk_in,
            Pipe::BulkOut => self.bulk_out,
        }
    }
}

impl From<(&DeviceMode, &UsbtmcEndpoints)> for Binding {
    fn from((mode, endpoints): (&DeviceMode, &UsbtmcEndpoints)) -> Self {
        Binding {
            interface_number: mode.interface_number,
            bulk_in: endpoints.bulk_in_ep.address,
            bulk_out: endpoints.bulk_out_ep.address,
        }
    }
}

/// One of the two bulk pipes of a USBTMC interface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pipe {
    BulkIn,
    BulkOut,
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipe::BulkIn => f.write_str("bulk-in"),
            Pipe::BulkOut => f.write_str("bulk-out"),
        }
    }
}

/// ### Capabilities
///
/// The collected capabilities of a USBTMC device, as returned by GET_CAPABILITIES.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// bcdUSBTMC
    pub bcd_version: u16,
    /// bcdUSB488
    pub bcd_usb488_version: u16,
    pub interface_capabilities: u8,
    pub device_capabilities: u8,
    pub usb488_interface_capabilities: u8,
    pub usb488_device_capabilities: u8,
}

impl Capabilities {
    /// Can accept a control command for pulse
    pub fn accepts_indicator_pulse_request(&self) -> bool {
        self.interface_capabilities & 0b0000_0100 != 0
    }

    /// Only sends data to the controller
    pub fn is_talk_only(&self) -> bool {
        self.interface_capabilities & 0b0000_0010 != 0
    }

    /// Only accepts data from the controller
    pub fn is_listen_only(&self) -> bool {
        self.interface_capabilities & 0b0000_0001 != 0
    }

    /// When returning data, it has a terminator character in the data
    pub fn supports_bulk_in_term_char(&self) -> bool {
        self.device_capabilities & 0b0000_0001 != 0
    }
}

/// ### Instrument Info
///
/// Strings identifying an attached instrument.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
}

impl InstrumentInfo {
    pub fn new(
        manufacturer: impl Into<String>,
        product: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        InstrumentInfo {
            manufacturer: manufacturer.into(),
            product: product.into(),
            serial_number: serial_number.into(),
        }
    }
}
