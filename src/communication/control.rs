//! ## Control
//!
//! Set of control requests to send to the device.
//!

use rusb::{Direction, Recipient, RequestType};
use tracing::{debug, warn};

use crate::constants::{control_lengths, control_requests, usbtmc_status};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::Transport;
use crate::types::{Capabilities, Pipe};

/// Turn a USBTMC status byte other than SUCCESS into an error
pub(crate) fn expect_success(request: u8, status: u8) -> Result<()> {
    match status {
        usbtmc_status::STATUS_SUCCESS => Ok(()),
        _ => Err(unexpected_status(request, status)),
    }
}

pub(crate) fn unexpected_status(request: u8, status: u8) -> Error {
    let request = control_requests::name(request);
    warn!(
        "{request} returned {status:#04x} ({})",
        usbtmc_status::name(status)
    );
    Error::Status { request, status }
}

impl<T: Transport> Session<T> {
    /// Class request with a device-to-host data stage, read into `buf`
    pub(crate) fn class_request_in(
        &mut self,
        recipient: Recipient,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<()> {
        let bm_request_type = rusb::request_type(Direction::In, RequestType::Class, recipient);
        buf.fill(0x00);

        let timeout = self.timeout();
        self.transport
            .read_control(bm_request_type, request, value, index, buf, timeout)?;

        debug!(
            "{} returned {:#04x}",
            control_requests::name(request),
            buf.first().copied().unwrap_or_default()
        );
        Ok(())
    }

    /// ### Get Capabilities
    ///
    /// Ask the device which optional USBTMC and USB488 features it supports.
    ///
    pub fn get_capabilities(&mut self) -> Result<Capabilities> {
        let mut buffer = [0x00; control_lengths::GET_CAPABILITIES];
        let w_index = u16::from(self.binding.interface_number);

        self.class_request_in(
            Recipient::Interface,
            control_requests::GET_CAPABILITIES,
            0x0000,
            w_index,
            &mut buffer,
        )?;
        expect_success(control_requests::GET_CAPABILITIES, buffer[0])?;

        let capabilities = Capabilities {
            bcd_version: u16::from_le_bytes([buffer[2], buffer[3]]),
            bcd_usb488_version: u16::from_le_bytes([buffer[12], buffer[13]]),
            interface_capabilities: buffer[4],
            device_capabilities: buffer[5],
            usb488_interface_capabilities: buffer[14],
            usb488_device_capabilities: buffer[15],
        };
        debug!(?capabilities, "capabilities");

        Ok(capabilities)
    }

    /// ### Indicator Pulse
    ///
    /// Blink the device's activity indicator. Only devices advertising
    /// [`Capabilities::accepts_indicator_pulse_request`] support it.
    ///
    pub fn indicator_pulse(&mut self) -> Result<()> {
        let mut buffer = [0x00; control_lengths::INDICATOR_PULSE];
        let w_index = u16::from(self.binding.interface_number);

        self.class_request_in(
            Recipient::Interface,
            control_requests::INDICATOR_PULSE,
            0x0000,
            w_index,
            &mut buffer,
        )?;
        expect_success(control_requests::INDICATOR_PULSE, buffer[0])
    }

    /// ### Clear Halt
    ///
    /// Clear any halt on the bulk endpoint of `pipe`. After a failed read,
    /// aborting the bulk-in transfer is usually the better choice.
    ///
    pub fn clear_halt(&mut self, pipe: Pipe) -> Result<()> {
        let endpoint = self.binding.endpoint(pipe);
        debug!(%pipe, endpoint, "clearing halt");
        self.transport.clear_halt(endpoint)?;
        Ok(())
    }

    /// ### Reset Configuration
    ///
    /// Reinitialize the current USB configuration and its interfaces.
    ///
    pub fn reset_configuration(&mut self) -> Result<()> {
        self.transport.reset_configuration()?;
        Ok(())
    }

    pub(crate) fn bulk_in_max_packet_size(&self) -> Result<usize> {
        match self.transport.max_packet_size(self.binding.bulk_in) {
            Some(size) if size > 0 => Ok(usize::from(size)),
            _ => {
                warn!("couldn't get wMaxPacketSize of {:#04x}", self.binding.bulk_in);
                Err(Error::MaxPacketSizeUnknown(self.binding.bulk_in))
            }
        }
    }
}
