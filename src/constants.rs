//! ## Constants
//!
//! Wire constants fixed by the USBTMC specification, plus the driver defaults.
//!

pub mod usb {
    /// The class code for usbtmc
    pub const USBTMC_CLASS_CODE: u8 = 0xFE;
    /// The subclass code for usbtmc
    pub const USBTMC_SUBCLASS_CODE: u8 = 0x03;
}

pub mod misc {
    /// The size in bytes of a USBTMC header in a bulk transfer
    pub const USBTMC_HEADER_SIZE: usize = 12;
    /// Bytes kept free at the end of the I/O buffer when requesting DEV_DEP_MSG_IN data,
    /// so that an aligned response never overruns the buffer
    pub const READ_ALIGNMENT_SLACK: usize = 3;
    /// Size of the per-session I/O buffer
    pub const DEFAULT_IO_BUFFER_SIZE: usize = 4096;
    /// Default transfer timeout in milliseconds
    pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;
    /// Ceiling for every drain and poll loop of the recovery machines
    pub const MAX_READS_TO_CLEAR_BULK_IN: usize = 100;
    /// Number of session identifiers, including the reserved control identifier 0
    pub const MAX_SESSIONS: usize = 16;
    /// Default termination character (NI-VISA default '\n')
    pub const DEFAULT_TERM_CHAR: u8 = b'\n';
    /// Driver version reported through the version attribute (1.1)
    pub const DRIVER_VERSION: i32 = 110;
}

pub mod usbtmc_status {
    /// Success
    pub const STATUS_SUCCESS: u8 = 0x01;
    /// The device received a split transaction CHECK_STATUS request and is still processing it
    pub const STATUS_PENDING: u8 = 0x02;
    /// Failure for unspecified or undefined reason
    pub const STATUS_FAILED: u8 = 0x80;
    /// The device received an INITIATE_ABORT request, but the request is not in progress
    pub const STATUS_TRANSFER_NOT_IN_PROGRESS: u8 = 0x81;
    /// The device got a CHECK_STATUS request without any INITIATE request being processed
    pub const STATUS_SPLIT_NOT_IN_PROGRESS: u8 = 0x82;
    /// The device got an INITIATE request, but another one is already being processed
    pub const STATUS_SPLIT_IN_PROGRESS: u8 = 0x83;

    /// Human readable name of a status byte, for logs
    pub fn name(status: u8) -> &'static str {
        match status {
            STATUS_SUCCESS => "SUCCESS",
            STATUS_PENDING => "PENDING",
            STATUS_FAILED => "FAILED",
            STATUS_TRANSFER_NOT_IN_PROGRESS => "TRANSFER_NOT_IN_PROGRESS",
            STATUS_SPLIT_NOT_IN_PROGRESS => "SPLIT_NOT_IN_PROGRESS",
            STATUS_SPLIT_IN_PROGRESS => "SPLIT_IN_PROGRESS",
            _ => "RESERVED",
        }
    }
}

pub mod control_requests {
    pub const INITIATE_ABORT_BULK_OUT: u8 = 1;
    pub const CHECK_ABORT_BULK_OUT_STATUS: u8 = 2;
    pub const INITIATE_ABORT_BULK_IN: u8 = 3;
    pub const CHECK_ABORT_BULK_IN_STATUS: u8 = 4;
    pub const INITIATE_CLEAR: u8 = 5;
    pub const CHECK_CLEAR_STATUS: u8 = 6;
    pub const GET_CAPABILITIES: u8 = 7;
    pub const INDICATOR_PULSE: u8 = 64;

    /// Human readable name of a class request, for logs and errors
    pub fn name(request: u8) -> &'static str {
        match request {
            INITIATE_ABORT_BULK_OUT => "INITIATE_ABORT_BULK_OUT",
            CHECK_ABORT_BULK_OUT_STATUS => "CHECK_ABORT_BULK_OUT_STATUS",
            INITIATE_ABORT_BULK_IN => "INITIATE_ABORT_BULK_IN",
            CHECK_ABORT_BULK_IN_STATUS => "CHECK_ABORT_BULK_IN_STATUS",
            INITIATE_CLEAR => "INITIATE_CLEAR",
            CHECK_CLEAR_STATUS => "CHECK_CLEAR_STATUS",
            GET_CAPABILITIES => "GET_CAPABILITIES",
            INDICATOR_PULSE => "INDICATOR_PULSE",
            _ => "UNKNOWN",
        }
    }
}

pub mod control_lengths {
    /// Response length of INITIATE_ABORT_BULK_IN / INITIATE_ABORT_BULK_OUT
    pub const INITIATE_ABORT: usize = 2;
    /// Response length of CHECK_ABORT_BULK_IN_STATUS / CHECK_ABORT_BULK_OUT_STATUS
    pub const CHECK_ABORT_STATUS: usize = 8;
    /// Response length of INITIATE_CLEAR
    pub const INITIATE_CLEAR: usize = 1;
    /// Response length of CHECK_CLEAR_STATUS
    pub const CHECK_CLEAR_STATUS: usize = 2;
    /// Response length of GET_CAPABILITIES
    pub const GET_CAPABILITIES: usize = 0x18;
    /// Response length of INDICATOR_PULSE
    pub const INDICATOR_PULSE: usize = 1;
}

pub mod bulk_msg_id {
    pub const DEVICE_DEPENDENT_MSG_OUT: u8 = 1;
    pub const REQUEST_DEVICE_DEPENDENT_MSG_IN: u8 = 2;
    pub const DEVICE_DEPENDENT_MSG_IN: u8 = 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names() {
        assert_eq!(usbtmc_status::name(0x01), "SUCCESS");
        assert_eq!(usbtmc_status::name(0x81), "TRANSFER_NOT_IN_PROGRESS");
        assert_eq!(usbtmc_status::name(0x83), "SPLIT_IN_PROGRESS");
        assert_eq!(usbtmc_status::name(0x40), "RESERVED");
    }
}
