//! ## Frame
//!
//! Bulk transfer headers of the USBTMC protocol and the bTag sequence.
//!
//! Every bulk message starts with a 12 byte header:
//!
//! | offset | field                 |
//! |--------|-----------------------|
//! | 0      | MsgID                 |
//! | 1      | bTag                  |
//! | 2      | bTagInverse           |
//! | 3      | reserved              |
//! | 4..8   | TransferSize (LE)     |
//! | 8      | bmTransferAttributes  |
//! | 9      | TermChar (IN request) |
//! | 10..12 | reserved              |
//!

use crate::constants::bulk_msg_id;
use crate::constants::misc::USBTMC_HEADER_SIZE;
use crate::error::{Error, Result};

const EOM: u8 = 0b0000_0001;
const TERM_CHAR_ENABLED: u8 = 0b0000_0010;
const TERM_CHAR_REACHED: u8 = 0b0000_0010;

/// ### DEV_DEP_MSG_OUT header
///
/// Precedes one chunk of a command sent to the BULK OUT endpoint.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgOutHeader {
    pub tag: u8,
    /// Logical size of the chunk, alignment padding excluded
    pub transfer_size: u32,
    /// Set on the chunk completing the message
    pub end_of_message: bool,
}

impl MsgOutHeader {
    pub fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
        let mut header = [0x00; USBTMC_HEADER_SIZE];

        header[0] = bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT;
        header[1] = self.tag;
        header[2] = !self.tag;
        header[4..8].copy_from_slice(&self.transfer_size.to_le_bytes());
        if self.end_of_message {
            header[8] = EOM;
        }

        header
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw = RawHeader::parse(bytes)?;
        raw.expect(bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT, raw.tag)?;
        Ok(MsgOutHeader {
            tag: raw.tag,
            transfer_size: raw.transfer_size,
            end_of_message: raw.attributes & EOM != 0,
        })
    }
}

/// ### REQUEST_DEV_DEP_MSG_IN header
///
/// Asks the device to send up to `transfer_size` bytes of its response.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgInRequest {
    pub tag: u8,
    pub transfer_size: u32,
    /// Ask the device to end the transfer on this character
    pub term_char: Option<u8>,
}

impl MsgInRequest {
    pub fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
        let mut header = [0x00; USBTMC_HEADER_SIZE];

        header[0] = bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN;
        header[1] = self.tag;
        header[2] = !self.tag;
        header[4..8].copy_from_slice(&self.transfer_size.to_le_bytes());
        if let Some(tc) = self.term_char {
            header[8] = TERM_CHAR_ENABLED;
            header[9] = tc;
        }

        header
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw = RawHeader::parse(bytes)?;
        raw.expect(bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN, raw.tag)?;
        Ok(MsgInRequest {
            tag: raw.tag,
            transfer_size: raw.transfer_size,
            term_char: (raw.attributes & TERM_CHAR_ENABLED != 0).then_some(raw.term_char),
        })
    }
}

/// ### DEV_DEP_MSG_IN header
///
/// Header the device puts in front of its response data on the BULK IN endpoint.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgInHeader {
    pub tag: u8,
    pub transfer_size: u32,
    pub end_of_message: bool,
    pub term_char_reached: bool,
}

impl MsgInHeader {
    pub fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
        let mut header = [0x00; USBTMC_HEADER_SIZE];

        header[0] = bulk_msg_id::DEVICE_DEPENDENT_MSG_IN;
        header[1] = self.tag;
        header[2] = !self.tag;
        header[4..8].copy_from_slice(&self.transfer_size.to_le_bytes());
        if self.end_of_message {
            header[8] |= EOM;
        }
        if self.term_char_reached {
            header[8] |= TERM_CHAR_REACHED;
        }

        header
    }

    /// Parse a response header, checking it answers the request tagged `expected_tag`
    pub fn decode(bytes: &[u8], expected_tag: u8) -> Result<Self> {
        let raw = RawHeader::parse(bytes)?;
        raw.expect(bulk_msg_id::DEVICE_DEPENDENT_MSG_IN, expected_tag)?;
        Ok(MsgInHeader {
            tag: raw.tag,
            transfer_size: raw.transfer_size,
            end_of_message: raw.attributes & EOM != 0,
            term_char_reached: raw.attributes & TERM_CHAR_REACHED != 0,
        })
    }
}

struct RawHeader {
    msg_id: u8,
    tag: u8,
    inverse: u8,
    transfer_size: u32,
    attributes: u8,
    term_char: u8,
}

impl RawHeader {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < USBTMC_HEADER_SIZE {
            return Err(Error::ShortResponse(bytes.len()));
        }
        Ok(RawHeader {
            msg_id: bytes[0],
            tag: bytes[1],
            inverse: bytes[2],
            transfer_size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            attributes: bytes[8],
            term_char: bytes[9],
        })
    }

    fn expect(&self, msg_id: u8, tag: u8) -> Result<()> {
        if self.msg_id != msg_id || self.tag != tag || self.inverse != !tag {
            return Err(Error::Desynchronized {
                expected: tag,
                msg_id: self.msg_id,
                tag: self.tag,
                inverse: self.inverse,
            });
        }
        Ok(())
    }
}

/// Length of `n` bytes once padded to the 4 byte alignment bulk transfers require
pub fn padded_len(n: usize) -> usize {
    (n + 3) & !3
}

/// ### bTag sequence
///
/// Per-session transfer tags. The tag is never 0: past 255 it wraps around to 1.
/// The tags last used in each direction are kept for INITIATE_ABORT requests.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSequence {
    next: u8,
    last_write: u8,
    last_read: u8,
}

impl Default for TagSequence {
    fn default() -> Self {
        TagSequence {
            next: 1,
            last_write: 0,
            last_read: 0,
        }
    }
}

impl TagSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tag the next frame will carry
    pub fn current(&self) -> u8 {
        self.next
    }

    /// Take the current tag for a frame sent on BULK OUT and move to the next one
    pub fn next_write(&mut self) -> u8 {
        let tag = self.next;
        self.last_write = tag;
        self.next = match tag.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        tag
    }

    /// Remember `tag` as the one whose response is expected on BULK IN
    pub fn mark_read(&mut self, tag: u8) {
        self.last_read = tag;
    }

    pub fn last_write(&self) -> u8 {
        self.last_write
    }

    pub fn last_read(&self) -> u8 {
        self.last_read
    }
}
