//! ## Session
//!
//! One attached instrument: its transport, tag sequence, attributes, end-of-stream
//! flag and I/O buffer. Message I/O lives in `communication::bulk`, control requests
//! in `communication::control` and the abort/clear machines in `communication::recovery`.
//!
//! A session is not internally synchronized. Callers serialize access to it (the
//! registry hands sessions out behind a mutex).
//!

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::attributes::{Attribute, AttributeSet, VALUE_OFF, VALUE_ON};
use crate::config::DriverConfig;
use crate::constants::misc::DRIVER_VERSION;
use crate::error::Result;
use crate::frame::TagSequence;
use crate::transport::Transport;
use crate::types::{Binding, Capabilities, InstrumentInfo, Pipe};

/// ### Request
///
/// Out-of-band operations on a session.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    SetAttribute(Attribute, i32),
    GetAttribute(Attribute),
    ClearHalt(Pipe),
    GetCapabilities,
    IndicatorPulse,
    AbortBulk(Pipe),
    Clear,
    InstrumentInfo,
    ResetConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Done,
    Value(i32),
    Capabilities(Capabilities),
    Instrument(InstrumentInfo),
}

/// ### Session
///
/// Protocol state of one instrument.
///
pub struct Session<T: Transport> {
    pub(crate) transport: T,
    pub(crate) binding: Binding,
    pub(crate) info: InstrumentInfo,
    pub(crate) config: DriverConfig,
    pub(crate) tags: TagSequence,
    pub(crate) attributes: AttributeSet,
    /// Set by a short buffered read, consumed by the next read
    pub(crate) eof: bool,
    /// Staging area for outgoing and incoming frames
    pub(crate) buffer: Vec<u8>,
    instruments: Arc<AtomicUsize>,
}

impl<T: Transport> Session<T> {
    /// ### New
    ///
    /// A session with the default driver configuration.
    ///
    pub fn new(transport: T, binding: Binding, info: InstrumentInfo) -> Self {
        let config = DriverConfig::default();
        Self::build(transport, binding, info, config, Arc::new(AtomicUsize::new(0)))
    }

    /// ### With Config
    ///
    /// A session using `config` for its buffer size, timeouts, retry ceiling and
    /// initial attributes.
    ///
    pub fn with_config(
        transport: T,
        binding: Binding,
        info: InstrumentInfo,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(
            transport,
            binding,
            info,
            config,
            Arc::new(AtomicUsize::new(0)),
        ))
    }

    fn build(
        transport: T,
        binding: Binding,
        info: InstrumentInfo,
        config: DriverConfig,
        instruments: Arc<AtomicUsize>,
    ) -> Self {
        Session {
            transport,
            binding,
            info,
            attributes: config.initial_attributes(),
            buffer: vec![0x00; config.io_buffer_size],
            config,
            tags: TagSequence::new(),
            eof: false,
            instruments,
        }
    }

    /// Share the registry's live instrument count
    pub(crate) fn attach_counter(&mut self, instruments: Arc<AtomicUsize>) {
        self.instruments = instruments;
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn info(&self) -> &InstrumentInfo {
        &self.info
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn tags(&self) -> &TagSequence {
        &self.tags
    }

    /// Whether the next buffered read will report end of file without device I/O
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.attributes.timeout()
    }

    /// ### Get Attribute
    ///
    /// Current value of `attribute`. Read-only values are computed on demand.
    ///
    pub fn get_attribute(&self, attribute: Attribute) -> i32 {
        if let Some(value) = self.attributes.get(attribute) {
            return value;
        }
        let clamp = |v: usize| i32::try_from(v).unwrap_or(i32::MAX);
        match attribute {
            Attribute::NumInstruments => clamp(self.instruments.load(Ordering::SeqCst)),
            Attribute::MinorNumbers => clamp(self.config.max_sessions),
            Attribute::IoBufferSize => clamp(self.config.io_buffer_size),
            Attribute::DefaultTimeout => {
                i32::try_from(self.config.default_timeout_ms).unwrap_or(i32::MAX)
            }
            Attribute::DebugMode => {
                if self.config.debug {
                    VALUE_ON
                } else {
                    VALUE_OFF
                }
            }
            Attribute::Version => DRIVER_VERSION,
            // writable attributes are answered by the attribute set
            _ => VALUE_OFF,
        }
    }

    /// Like [`Session::get_attribute`], by numeric identifier
    pub fn get_attribute_by_id(&self, id: i32) -> Result<i32> {
        Ok(self.get_attribute(Attribute::from_id(id)?))
    }

    /// ### Set Attribute
    ///
    /// Validate and store `value`. Fails with `InvalidArgument` for read-only
    /// attributes and out-of-domain values, leaving the session untouched.
    ///
    pub fn set_attribute(&mut self, attribute: Attribute, value: i32) -> Result<()> {
        self.attributes.set(attribute, value)?;
        debug!(
            attribute = %attribute,
            value = %attribute.format_value(value),
            "attribute set"
        );
        Ok(())
    }

    pub fn set_attribute_by_id(&mut self, id: i32, value: i32) -> Result<()> {
        self.set_attribute(Attribute::from_id(id)?, value)
    }

    /// ### Execute
    ///
    /// Run an out-of-band request.
    ///
    pub fn execute(&mut self, request: Request) -> Result<Response> {
        match request {
            Request::SetAttribute(attribute, value) => {
                self.set_attribute(attribute, value)?;
                Ok(Response::Done)
            }
            Request::GetAttribute(attribute) => Ok(Response::Value(self.get_attribute(attribute))),
            Request::ClearHalt(pipe) => {
                self.clear_halt(pipe)?;
                Ok(Response::Done)
            }
            Request::GetCapabilities => Ok(Response::Capabilities(self.get_capabilities()?)),
            Request::IndicatorPulse => {
                self.indicator_pulse()?;
                Ok(Response::Done)
            }
            Request::AbortBulk(Pipe::BulkIn) => {
                self.abort_bulk_in()?;
                Ok(Response::Done)
            }
            Request::AbortBulk(Pipe::BulkOut) => {
                self.abort_bulk_out()?;
                Ok(Response::Done)
            }
            Request::Clear => {
                self.clear()?;
                Ok(Response::Done)
            }
            Request::InstrumentInfo => Ok(Response::Instrument(self.info.clone())),
            Request::ResetConfiguration => {
                self.reset_configuration()?;
                Ok(Response::Done)
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("binding", &self.binding)
            .field("info", &self.info)
            .field("tags", &self.tags)
            .field("attributes", &self.attributes)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> std::io::Read for Session<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Session::read(self, buf).map_err(Into::into)
    }
}

impl<T: Transport> std::io::Write for Session<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Session::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
