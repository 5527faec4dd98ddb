//! libusb transport.

use std::time::Duration;

use rusb::{Context, DeviceHandle};
use tracing::{debug, warn};

use super::Transport;
use crate::types::{DeviceMode, UsbtmcEndpoints};

/// ### Rusb Transport
///
/// The USBTMC interface of a device opened through libusb.
///
/// Once built, the transport owns the device: when dropped it releases the interface
/// if it was claimed, and attaches the kernel driver again if it was detached when
/// opening.
///
pub struct RusbTransport {
    handle: DeviceHandle<Context>,
    mode: DeviceMode,
    endpoints: UsbtmcEndpoints,
    claimed: bool,
}

impl RusbTransport {
    /// Take ownership of an opened handle. The interface is claimed with
    /// [`RusbTransport::claim`].
    pub fn new(
        handle: DeviceHandle<Context>,
        mode: DeviceMode,
        endpoints: UsbtmcEndpoints,
    ) -> Self {
        RusbTransport {
            handle,
            mode,
            endpoints,
            claimed: false,
        }
    }

    /// Activate the configuration of the TMC interface, then claim the interface
    /// and select its setting
    pub fn claim(&mut self) -> rusb::Result<()> {
        let interface = self.mode.interface_number;

        self.handle.set_active_configuration(self.mode.config_number)?;
        self.handle.claim_interface(interface)?;
        self.claimed = true;
        self.handle.set_alternate_setting(interface, self.mode.setting_number)?;

        debug!(interface, "interface claimed");
        Ok(())
    }

    pub fn handle(&self) -> &DeviceHandle<Context> {
        &self.handle
    }

    pub fn mode(&self) -> &DeviceMode {
        &self.mode
    }

    pub fn endpoints(&self) -> &UsbtmcEndpoints {
        &self.endpoints
    }
}

impl Transport for RusbTransport {
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        self.handle
            .read_control(request_type, request, value, index, buf, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        self.handle.read_bulk(endpoint, buf, timeout)
    }

    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.write_bulk(endpoint, buf, timeout)
    }

    fn clear_halt(&mut self, endpoint: u8) -> rusb::Result<()> {
        self.handle.clear_halt(endpoint)
    }

    fn max_packet_size(&self, endpoint: u8) -> Option<u16> {
        [&self.endpoints.bulk_in_ep, &self.endpoints.bulk_out_ep]
            .into_iter()
            .chain(self.endpoints.interrupt_ep.as_ref())
            .find(|ep| ep.address == endpoint)
            .map(|ep| ep.max_packet_size)
            .filter(|size| *size != 0)
    }

    fn reset_configuration(&mut self) -> rusb::Result<()> {
        debug!(config = self.mode.config_number, "resetting configuration");

        if self.claimed {
            self.handle.release_interface(self.mode.interface_number)?;
            self.claimed = false;
        }
        self.claim()
    }
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        if self.claimed {
            if let Err(e) = self.handle.release_interface(self.mode.interface_number) {
                warn!("failed to release device usb interface: {e}");
            }
        }
        if self.mode.has_kernel_driver {
            if let Err(e) = self.handle.attach_kernel_driver(self.mode.interface_number) {
                warn!("failed to attach kernel driver to usb device: {e}");
            }
        }
    }
}
