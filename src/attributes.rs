//! ## Attributes
//!
//! Per-session settings that change how reads and writes behave, plus the read-only
//! values a session can report about the driver.
//!
//! Values travel as integers. Booleans use `0` (off) and `1` (on); the read mode uses
//! `0` (raw) and `1` (buffered). [`parse_value`] accepts the names as well.
//!

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::misc::{DEFAULT_TERM_CHAR, DEFAULT_TIMEOUT_MS};
use crate::error::{Error, Result};

pub const VALUE_OFF: i32 = 0;
pub const VALUE_ON: i32 = 1;

/// ### Attribute
///
/// Identifier of a session attribute. The discriminant is the stable numeric id.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    AutoAbortOnError = 0,
    ReadMode = 1,
    Timeout = 2,
    NumInstruments = 3,
    MinorNumbers = 4,
    IoBufferSize = 5,
    DefaultTimeout = 6,
    DebugMode = 7,
    Version = 8,
    TermCharEnabled = 9,
    TermChar = 10,
    AddNlOnRead = 11,
    RemNlOnWrite = 12,
}

impl Attribute {
    pub const ALL: [Attribute; 13] = [
        Attribute::AutoAbortOnError,
        Attribute::ReadMode,
        Attribute::Timeout,
        Attribute::NumInstruments,
        Attribute::MinorNumbers,
        Attribute::IoBufferSize,
        Attribute::DefaultTimeout,
        Attribute::DebugMode,
        Attribute::Version,
        Attribute::TermCharEnabled,
        Attribute::TermChar,
        Attribute::AddNlOnRead,
        Attribute::RemNlOnWrite,
    ];

    pub fn from_id(id: i32) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|attr| *attr as i32 == id)
            .ok_or_else(|| Error::invalid(format!("unknown attribute id {id}")))
    }

    pub fn id(self) -> i32 {
        self as i32
    }

    /// Read-only attributes are computed on demand and cannot be set
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Attribute::NumInstruments
                | Attribute::MinorNumbers
                | Attribute::IoBufferSize
                | Attribute::DefaultTimeout
                | Attribute::DebugMode
                | Attribute::Version
        )
    }

    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            Attribute::AutoAbortOnError
                | Attribute::DebugMode
                | Attribute::TermCharEnabled
                | Attribute::AddNlOnRead
                | Attribute::RemNlOnWrite
        )
    }

    /// External name, as used on a command line or in configuration files
    pub fn name(self) -> &'static str {
        match self {
            Attribute::AutoAbortOnError => "auto-abort-on-error",
            Attribute::ReadMode => "read-mode",
            Attribute::Timeout => "timeout",
            Attribute::NumInstruments => "number-of-instruments",
            Attribute::MinorNumbers => "minor-numbers",
            Attribute::IoBufferSize => "io-buffer-size",
            Attribute::DefaultTimeout => "default-timeout",
            Attribute::DebugMode => "debug-mode",
            Attribute::Version => "version",
            Attribute::TermCharEnabled => "terminator-enabled",
            Attribute::TermChar => "terminator-character",
            Attribute::AddNlOnRead => "add-newline-on-read",
            Attribute::RemNlOnWrite => "strip-newline-on-write",
        }
    }

    fn short_name(self) -> &'static str {
        match self {
            Attribute::AutoAbortOnError => "autoabort",
            Attribute::ReadMode => "readmode",
            Attribute::Timeout => "timeout",
            Attribute::NumInstruments => "numinst",
            Attribute::MinorNumbers => "numminors",
            Attribute::IoBufferSize => "buffsize",
            Attribute::DefaultTimeout => "deftimeout",
            Attribute::DebugMode => "debug",
            Attribute::Version => "version",
            Attribute::TermCharEnabled => "termcharenab",
            Attribute::TermChar => "termchar",
            Attribute::AddNlOnRead => "addnlread",
            Attribute::RemNlOnWrite => "remnlwrite",
        }
    }

    /// Render a value the way [`parse_value`] reads it back
    pub fn format_value(self, value: i32) -> String {
        if self.is_boolean() {
            return if value == VALUE_OFF { "off" } else { "on" }.to_string();
        }
        match self {
            Attribute::ReadMode => match ReadMode::try_from(value) {
                Ok(mode) => mode.to_string(),
                Err(_) => value.to_string(),
            },
            _ => value.to_string(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|attr| {
                attr.name() == s
                    || attr.short_name() == s
                    || attr.name().replace('-', "_") == s
            })
            .ok_or_else(|| Error::invalid(format!("unknown attribute '{s}'")))
    }
}

/// Parse an attribute value given by name (`on`, `off`, `raw`, `buffered`) or as a decimal number
pub fn parse_value(attribute: Attribute, s: &str) -> Result<i32> {
    let s = s.trim();
    let named = match (attribute, s) {
        (Attribute::ReadMode, _) => s.parse::<ReadMode>().ok().map(i32::from),
        (a, "off") if a.is_boolean() => Some(VALUE_OFF),
        (a, "on") if a.is_boolean() => Some(VALUE_ON),
        _ => None,
    };
    match named {
        Some(value) => Ok(value),
        None => s
            .parse::<i32>()
            .map_err(|_| Error::invalid(format!("bad value '{s}' for {attribute}"))),
    }
}

/// ### Read Mode
///
/// How a short read is reported to the caller.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Every read goes to the device
    Raw,
    /// After a short read, the next read returns 0 bytes (end of file) without device I/O
    #[default]
    Buffered,
}

impl From<ReadMode> for i32 {
    fn from(mode: ReadMode) -> i32 {
        match mode {
            ReadMode::Raw => 0,
            ReadMode::Buffered => 1,
        }
    }
}

impl TryFrom<i32> for ReadMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ReadMode::Raw),
            1 => Ok(ReadMode::Buffered),
            _ => Err(Error::invalid(format!("bad read mode {value}"))),
        }
    }
}

impl FromStr for ReadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw" | "read" => Ok(ReadMode::Raw),
            "buffered" | "fread" => Ok(ReadMode::Buffered),
            _ => Err(Error::invalid(format!("unknown read mode '{s}'"))),
        }
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::Raw => f.write_str("raw"),
            ReadMode::Buffered => f.write_str("buffered"),
        }
    }
}

/// ### Attribute Set
///
/// The writable attributes of one session.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSet {
    pub auto_abort_on_error: bool,
    pub read_mode: ReadMode,
    /// Transfer timeout in milliseconds
    pub timeout_ms: u32,
    pub term_char_enabled: bool,
    pub term_char: u8,
    pub add_nl_on_read: bool,
    pub rem_nl_on_write: bool,
}

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet {
            auto_abort_on_error: false,
            read_mode: ReadMode::Buffered,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            term_char_enabled: false,
            term_char: DEFAULT_TERM_CHAR,
            add_nl_on_read: false,
            rem_nl_on_write: false,
        }
    }
}

impl AttributeSet {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    /// Terminator to request from the device, if enabled
    pub fn term_char(&self) -> Option<u8> {
        self.term_char_enabled.then_some(self.term_char)
    }

    /// Value of a writable attribute. `None` for read-only identifiers.
    pub fn get(&self, attribute: Attribute) -> Option<i32> {
        let value = match attribute {
            Attribute::AutoAbortOnError => bool_value(self.auto_abort_on_error),
            Attribute::ReadMode => self.read_mode.into(),
            Attribute::Timeout => i32::try_from(self.timeout_ms).unwrap_or(i32::MAX),
            Attribute::TermCharEnabled => bool_value(self.term_char_enabled),
            Attribute::TermChar => i32::from(self.term_char),
            Attribute::AddNlOnRead => bool_value(self.add_nl_on_read),
            Attribute::RemNlOnWrite => bool_value(self.rem_nl_on_write),
            _ => return None,
        };
        Some(value)
    }

    /// Validate `value` for `attribute`, then store it. Nothing changes on error.
    pub fn set(&mut self, attribute: Attribute, value: i32) -> Result<()> {
        match attribute {
            Attribute::AutoAbortOnError => self.auto_abort_on_error = bool_arg(attribute, value)?,
            Attribute::ReadMode => self.read_mode = ReadMode::try_from(value)?,
            Attribute::Timeout => {
                self.timeout_ms = u32::try_from(value)
                    .map_err(|_| Error::invalid(format!("negative timeout {value}")))?
            }
            Attribute::TermCharEnabled => self.term_char_enabled = bool_arg(attribute, value)?,
            Attribute::TermChar => {
                self.term_char = u8::try_from(value)
                    .map_err(|_| Error::invalid(format!("terminator {value} is not a byte")))?
            }
            Attribute::AddNlOnRead => self.add_nl_on_read = bool_arg(attribute, value)?,
            Attribute::RemNlOnWrite => self.rem_nl_on_write = bool_arg(attribute, value)?,
            _ => return Err(Error::invalid(format!("{attribute} is read-only"))),
        }
        Ok(())
    }
}

fn bool_value(b: bool) -> i32 {
    if b {
        VALUE_ON
    } else {
        VALUE_OFF
    }
}

fn bool_arg(attribute: Attribute, value: i32) -> Result<bool> {
    match value {
        VALUE_OFF => Ok(false),
        VALUE_ON => Ok(true),
        _ => Err(Error::invalid(format!("{attribute} takes on/off, got {value}"))),
    }
}
