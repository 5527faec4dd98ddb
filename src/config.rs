//! ## Configuration
//!
//! Driver-wide settings. Loaded by the host application (any serde format) or left at
//! their defaults.
//!

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeSet;
use crate::constants::misc::{
    DEFAULT_IO_BUFFER_SIZE, DEFAULT_TIMEOUT_MS, MAX_READS_TO_CLEAR_BULK_IN, MAX_SESSIONS,
    READ_ALIGNMENT_SLACK, USBTMC_HEADER_SIZE,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Size of each session's I/O buffer, header included
    pub io_buffer_size: usize,
    /// Timeout given to new sessions, in milliseconds
    pub default_timeout_ms: u32,
    /// Retry ceiling shared by every drain and poll loop of the recovery machines
    pub max_reads_to_clear: usize,
    /// Number of session identifiers, the control identifier 0 included
    pub max_sessions: usize,
    /// Reported through the debug-mode attribute
    pub debug: bool,
    /// Attributes new sessions start with
    pub attributes: AttributeSet,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_reads_to_clear: MAX_READS_TO_CLEAR_BULK_IN,
            max_sessions: MAX_SESSIONS,
            debug: false,
            attributes: AttributeSet::default(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.io_buffer_size < 16 || self.io_buffer_size % 4 != 0 {
            return Err(Error::invalid(format!(
                "io buffer size {} must be a multiple of 4 and at least 16",
                self.io_buffer_size
            )));
        }
        if i32::try_from(self.io_buffer_size).is_err() {
            return Err(Error::invalid("io buffer size too large"));
        }
        if self.max_reads_to_clear == 0 {
            return Err(Error::invalid("max_reads_to_clear must be at least 1"));
        }
        if self.max_sessions < 2 {
            return Err(Error::invalid("max_sessions must leave room for one instrument"));
        }
        Ok(())
    }

    /// Largest command chunk a single DEV_DEP_MSG_OUT frame carries
    pub fn max_write_chunk(&self) -> usize {
        self.io_buffer_size - USBTMC_HEADER_SIZE
    }

    /// Largest response chunk requested with a single REQUEST_DEV_DEP_MSG_IN
    pub fn max_read_chunk(&self) -> usize {
        self.io_buffer_size - USBTMC_HEADER_SIZE - READ_ALIGNMENT_SLACK
    }

    /// Attributes for a new session: the configured ones with the default timeout applied
    pub(crate) fn initial_attributes(&self) -> AttributeSet {
        AttributeSet {
            timeout_ms: self.default_timeout_ms,
            ..self.attributes.clone()
        }
    }
}
