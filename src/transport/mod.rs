//! ## Transport
//!
//! The narrow view of the host USB stack the protocol engine works through.
//!
//! Device enumeration and endpoint discovery happen elsewhere (see `init`); a session
//! only ever issues control and bulk transfers, clears halts and asks for the max
//! packet size of an endpoint. [`RusbTransport`] implements this over libusb; tests
//! implement it with a scripted device.
//!

mod usb;

use std::time::Duration;

pub use usb::RusbTransport;

/// ### Transport
///
/// Blocking USB transfers on one device. Every call returns the number of bytes moved,
/// or the error the USB stack reported (`rusb::Error::Timeout` on timeout).
///
pub trait Transport {
    /// Control transfer with a device-to-host data stage
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
        -> rusb::Result<usize>;

    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Clear a halt (CLEAR_FEATURE(ENDPOINT_HALT)) on `endpoint`
    fn clear_halt(&mut self, endpoint: u8) -> rusb::Result<()>;

    /// wMaxPacketSize of `endpoint`, if the endpoint is known
    fn max_packet_size(&self, endpoint: u8) -> Option<u16>;

    /// Reinitialize the current configuration and its interfaces
    fn reset_configuration(&mut self) -> rusb::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        (**self).read_control(request_type, request, value, index, buf, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        (**self).read_bulk(endpoint, buf, timeout)
    }

    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        (**self).write_bulk(endpoint, buf, timeout)
    }

    fn clear_halt(&mut self, endpoint: u8) -> rusb::Result<()> {
        (**self).clear_halt(endpoint)
    }

    fn max_packet_size(&self, endpoint: u8) -> Option<u16> {
        (**self).max_packet_size(endpoint)
    }

    fn reset_configuration(&mut self) -> rusb::Result<()> {
        (**self).reset_configuration()
    }
}
