//! ## Registry
//!
//! Session identifiers for the attached instruments. Identifier 0 is the control
//! session: reading it yields a listing of the instruments, writing to it is refused.
//! Identifiers 1 and up each name one instrument session.
//!

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::error::{Error, Result};
use crate::init::{self, DeviceFilter};
use crate::session::Session;
use crate::transport::{RusbTransport, Transport};
use crate::types::{Binding, InstrumentInfo};

pub type SessionId = usize;

/// Identifier of the control session
pub const CONTROL_SESSION: SessionId = 0;

pub type SharedSession<T> = Arc<Mutex<Session<T>>>;

struct Slot<T: Transport> {
    session: SharedSession<T>,
    info: InstrumentInfo,
}

/// ### Driver
///
/// Owns the attached sessions and hands them out by identifier.
///
pub struct Driver<T: Transport> {
    config: DriverConfig,
    slots: RwLock<Vec<Option<Slot<T>>>>,
    instruments: Arc<AtomicUsize>,
}

impl<T: Transport> Driver<T> {
    pub fn new(config: DriverConfig) -> Result<Self> {
        config.validate()?;
        let slots = (0..config.max_sessions).map(|_| None).collect();
        Ok(Driver {
            config,
            slots: RwLock::new(slots),
            instruments: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// A session configured like every other session of this driver
    pub fn new_session(
        &self,
        transport: T,
        binding: Binding,
        info: InstrumentInfo,
    ) -> Result<Session<T>> {
        let mut session = Session::with_config(transport, binding, info, self.config.clone())?;
        session.attach_counter(Arc::clone(&self.instruments));
        Ok(session)
    }

    /// ### Register
    ///
    /// Store `session` under the lowest free identifier.
    ///
    pub fn register(&self, mut session: Session<T>) -> Result<SessionId> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);

        let id = slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.is_none())
            .map(|(id, _)| id)
            .ok_or(Error::NoFreeSession)?;

        session.attach_counter(Arc::clone(&self.instruments));
        let info = session.info().clone();
        info!(
            id,
            manufacturer = %info.manufacturer,
            product = %info.product,
            serial = %info.serial_number,
            "instrument attached"
        );

        slots[id] = Some(Slot {
            session: Arc::new(Mutex::new(session)),
            info,
        });
        self.instruments.fetch_add(1, Ordering::SeqCst);

        Ok(id)
    }

    /// Build a session for an already opened transport and register it
    pub fn attach(
        &self,
        transport: T,
        binding: Binding,
        info: InstrumentInfo,
    ) -> Result<SessionId> {
        let session = self.new_session(transport, binding, info)?;
        self.register(session)
    }

    /// ### Adopt
    ///
    /// Register a freshly opened device: `identify` reads its identification strings
    /// through the transport, then the device is cleared and registered. A device
    /// refusing the clear is registered anyway.
    ///
    /// The transport is dropped on every failure, which lets it give the device back.
    ///
    pub fn adopt(
        &self,
        transport: T,
        binding: Binding,
        identify: impl FnOnce(&T) -> anyhow::Result<InstrumentInfo>,
    ) -> anyhow::Result<SessionId> {
        let info = identify(&transport)?;
        let mut session = self.new_session(transport, binding, info)?;
        if let Err(e) = session.clear() {
            warn!("initial clear failed: {e}");
        }

        Ok(self.register(session)?)
    }

    /// ### Unregister
    ///
    /// Free identifier `id`. The session is returned so the caller decides when the
    /// device is let go.
    ///
    pub fn unregister(&self, id: SessionId) -> Result<SharedSession<T>> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .get_mut(id)
            .filter(|_| id != CONTROL_SESSION)
            .and_then(Option::take)
            .ok_or(Error::UnknownSession(id))?;

        self.instruments.fetch_sub(1, Ordering::SeqCst);
        info!(id, "instrument detached");
        Ok(slot.session)
    }

    pub fn session(&self, id: SessionId) -> Result<SharedSession<T>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(id)
            .and_then(Option::as_ref)
            .map(|slot| Arc::clone(&slot.session))
            .ok_or(Error::UnknownSession(id))
    }

    pub fn instrument_info(&self, id: SessionId) -> Result<InstrumentInfo> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(id)
            .and_then(Option::as_ref)
            .map(|slot| slot.info.clone())
            .ok_or(Error::UnknownSession(id))
    }

    /// Attached instruments in identifier order
    pub fn list(&self) -> Vec<(SessionId, InstrumentInfo)> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|slot| (id, slot.info.clone())))
            .collect()
    }

    pub fn num_instruments(&self) -> usize {
        self.instruments.load(Ordering::SeqCst)
    }

    /// ### Listing
    ///
    /// The text the control session serves: a header line, then one tab separated
    /// line per instrument.
    ///
    pub fn listing(&self) -> String {
        let mut listing = String::from("Minor Number\tManufacturer\tProduct\tSerial Number\n");
        for (id, info) in self.list() {
            listing.push_str(&format!(
                "{id:03}\t{}\t{}\t{}\n",
                info.manufacturer, info.product, info.serial_number
            ));
        }
        listing
    }

    pub fn control(&self) -> ControlSession<'_, T> {
        ControlSession {
            driver: self,
            position: 0,
        }
    }
}

impl Driver<RusbTransport> {
    /// ### Open
    ///
    /// Find a USBTMC device accepted by `filter`, claim its interface and register a
    /// session for it. The device is cleared first; a device refusing the clear is
    /// registered anyway.
    ///
    /// Use `filter` to select the instrument:
    /// - `()` - first found USBTMC device
    /// - `(idVendor, idProduct)` or `DeviceId` - device by USB identifiers
    /// - `DeviceAddr` - device by USB bus and device number
    /// - `DeviceInfo` - device by both USB identifiers and address
    ///
    pub fn open(&self, filter: impl DeviceFilter) -> anyhow::Result<SessionId> {
        let context = rusb::Context::new()?;
        let (device, mut handle) = init::open_device(&context, filter)?;

        let mut mode = init::get_usbtmc_mode(&device)?;
        let endpoints = init::get_endpoints(&mode, &device)?;
        init::detach_kernel_driver(&mut mode, &mut handle)?;

        let binding = Binding::from((&mode, &endpoints));
        let mut transport = RusbTransport::new(handle, mode, endpoints);
        transport.claim()?;
        debug!(?binding, mode = ?transport.mode(), "device opened");

        self.adopt(transport, binding, |transport| {
            init::read_instrument_info(&device, transport.handle())
        })
    }
}

/// ### Control Session
///
/// Read-only view of identifier 0. The listing is produced on the first read and
/// served in one go; later reads return 0 until [`ControlSession::rewind`].
///
pub struct ControlSession<'a, T: Transport> {
    driver: &'a Driver<T>,
    position: usize,
}

impl<T: Transport> ControlSession<'_, T> {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.position != 0 {
            return Ok(0);
        }
        let listing = self.driver.listing();
        let len = listing.len().min(buf.len());
        buf[..len].copy_from_slice(&listing.as_bytes()[..len]);
        self.position += len;
        Ok(len)
    }

    pub fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(Error::NotPermitted)
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl<T: Transport> std::io::Read for ControlSession<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        ControlSession::read(self, buf).map_err(Into::into)
    }
}
