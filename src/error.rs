//! ## USBTMC Errors
//!
//! The errors used throughout the crate.
//!
//! Device-facing operations return [`Error`]. Discovery helpers in `init` keep returning
//! `anyhow::Result`, with these variants as the underlying cause.
//!

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // TransportError
    #[error("usb transfer failed: {0}")]
    Transport(#[from] rusb::Error),

    // ProtocolError
    #[error("{request} returned unexpected status {status:#04x}")]
    Status { request: &'static str, status: u8 },
    #[error("bulk header mismatch: expected tag {expected}, got {tag}/{inverse:#04x}, id {msg_id}")]
    Desynchronized {
        expected: u8,
        msg_id: u8,
        tag: u8,
        inverse: u8,
    },
    #[error("device reported {reported} bytes but only {available} are valid")]
    BadTransferSize { reported: usize, available: usize },
    #[error("response shorter than a bulk header ({0} bytes)")]
    ShortResponse(usize),
    #[error("max packet size of endpoint {0:#04x} is unknown")]
    MaxPacketSizeUnknown(u8),

    // RecoveryExhausted
    #[error("device buffer could not be cleared within {attempts} cycles")]
    RecoveryExhausted { attempts: usize },

    // InvalidArgument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // AddressingError
    #[error("device data does not fit the buffer ({needed} bytes needed, {available} available)")]
    Addressing { needed: usize, available: usize },

    // Registry
    #[error("operation not permitted on the control session")]
    NotPermitted,
    #[error("no free session identifier")]
    NoFreeSession,
    #[error("session {0} is not in use")]
    UnknownSession(usize),

    // Discovery
    #[error("device not found")]
    DeviceNotFound,
    #[error("device is not compatible with USBTMC")]
    DeviceIncompatible,
    #[error("specified interface not found")]
    InterfaceNotFound,
    #[error("specified interface setting not found")]
    InterfaceSettingNotFound,
    #[error("bulk out endpoint not found")]
    BulkOutEndpointNotFound,
    #[error("bulk in endpoint not found")]
    BulkInEndpointNotFound,
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// The device answered, but not with what the protocol allows at this point
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::Status { .. }
                | Error::Desynchronized { .. }
                | Error::BadTransferSize { .. }
                | Error::ShortResponse(_)
                | Error::MaxPacketSizeUnknown(_)
        )
    }

    /// A recovery loop ran out of attempts (device too slow or stuck)
    pub fn is_recovery_exhausted(&self) -> bool {
        matches!(self, Error::RecoveryExhausted { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(rusb::Error::Timeout))
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            Error::Transport(rusb::Error::Timeout) => ErrorKind::TimedOut,
            Error::Transport(rusb::Error::NoDevice) => ErrorKind::NotConnected,
            Error::Transport(_) => ErrorKind::Other,
            Error::InvalidArgument(_) => ErrorKind::InvalidInput,
            Error::NotPermitted | Error::Status { .. } => ErrorKind::PermissionDenied,
            Error::Addressing { .. } => ErrorKind::InvalidData,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::control_requests;

    #[test]
    fn status_error_names_the_request() {
        let err = Error::Status {
            request: control_requests::name(control_requests::CHECK_CLEAR_STATUS),
            status: 0x80,
        };
        assert_eq!(
            err.to_string(),
            "CHECK_CLEAR_STATUS returned unexpected status 0x80"
        );
        assert!(err.is_protocol());
        assert!(!err.is_recovery_exhausted());
    }

    #[test]
    fn exhaustion_is_distinct_from_protocol_errors() {
        let err = Error::RecoveryExhausted { attempts: 100 };
        assert!(err.is_recovery_exhausted());
        assert!(!err.is_protocol());
    }

    #[test]
    fn timeout_maps_to_io_timed_out() {
        let err: std::io::Error = Error::Transport(rusb::Error::Timeout).into();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
