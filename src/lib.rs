//! # Rust USBTMC Driver
//!
//! Pure Rust implementation of the host side of the USBTMC protocol to talk to
//! test and measurement instruments.
//!
//! The library frames DEVICE_DEPENDENT messages on the BULK OUT and BULK IN endpoints,
//! keeps host and device synchronized through the abort and clear procedures,
//! and manages per-instrument attributes (timeouts, termination character, read mode...).
//! Instruments are handed out as numbered sessions by a [`Driver`]; session 0 lists
//! them.
//!
//! ## Usage
//!
//! To use, add the following line to your project's Cargo.toml dependencies:
//! ```toml
//! rs-usbtmc-driver = "0.2"
//! ```
//!
//! ## Example
//!
//! The example below opens the first instrument found, queries its identity and
//! lowers the timeout.
//!
//! ```no_run
//! use rs_usbtmc_driver::{Attribute, Driver, DriverConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let driver = Driver::new(DriverConfig::default())?;
//!     let id = driver.open(())?;
//!
//!     let session = driver.session(id)?;
//!     let mut session = session.lock().unwrap();
//!     session.set_attribute(Attribute::Timeout, 2000)?;
//!
//!     session.write(b"*IDN?\n")?;
//!     let mut response = [0u8; 256];
//!     let len = session.read(&mut response)?;
//!     println!("{}", String::from_utf8_lossy(&response[..len]));
//!
//!     print!("{}", driver.listing());
//!     Ok(())
//! }
//! ```
//!
//! Any type implementing [`Transport`] can stand in for the USB device, which is how
//! the protocol engine is tested without hardware.
//!

pub mod attributes;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod init;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;
mod communication {
    pub mod bulk;
    pub mod control;
    pub mod recovery;
}

pub use attributes::{parse_value, Attribute, AttributeSet, ReadMode};
pub use config::DriverConfig;
pub use error::{Error, Result};
pub use frame::{MsgInHeader, MsgInRequest, MsgOutHeader, TagSequence};
pub use init::{list_devices, DeviceFilter};
pub use registry::{ControlSession, Driver, SessionId, SharedSession, CONTROL_SESSION};
pub use session::{Request, Response, Session};
pub use transport::{RusbTransport, Transport};
pub use types::{
    Binding, Capabilities, DeviceAddr, DeviceId, DeviceInfo, InstrumentInfo, Pipe,
};
