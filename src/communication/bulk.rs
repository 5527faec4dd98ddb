//! Bulk
//!
//! Message I/O: DEV_DEP_MSG_OUT writes and DEV_DEP_MSG_IN reads on the bulk endpoints.
//!

use tracing::{trace, warn};

use crate::attributes::ReadMode;
use crate::constants::misc::USBTMC_HEADER_SIZE;
use crate::error::{Error, Result};
use crate::frame::{padded_len, MsgInHeader, MsgInRequest, MsgOutHeader};
use crate::session::Session;
use crate::transport::Transport;
use crate::types::Pipe;

/// What one DEV_DEP_MSG_IN transfer delivered
struct Chunk {
    len: usize,
    end_of_message: bool,
    term_char_reached: bool,
}

impl<T: Transport> Session<T> {
    /// ### Write
    ///
    /// Send `data` to the instrument as one message, split into as many
    /// DEV_DEP_MSG_OUT transfers as the I/O buffer requires. The last transfer
    /// carries EOM. With `rem_nl_on_write`, a trailing '\n' of the message is
    /// not sent.
    ///
    /// Returns `data.len()`: a write either goes through completely or fails.
    ///
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.eof = false;

        let max_chunk = self.config.max_write_chunk();
        let mut done = 0;

        while done < data.len() {
            let remaining = data.len() - done;
            let this_part = remaining.min(max_chunk);
            let end_of_message = this_part == remaining;

            let mut chunk = &data[done..done + this_part];
            if end_of_message && self.attributes.rem_nl_on_write && chunk.last() == Some(&b'\n') {
                chunk = &chunk[..chunk.len() - 1];
            }

            if let Err(e) = self.send_msg_out(chunk, end_of_message) {
                warn!("unable to send data: {e}");
                self.recover(Pipe::BulkOut);
                return Err(e);
            }

            done += this_part;
        }

        Ok(data.len())
    }

    fn send_msg_out(&mut self, chunk: &[u8], end_of_message: bool) -> Result<()> {
        let header = MsgOutHeader {
            tag: self.tags.next_write(),
            transfer_size: chunk.len() as u32,
            end_of_message,
        };

        // header, data, then zeros up to the 4 byte boundary
        let data_end = USBTMC_HEADER_SIZE + chunk.len();
        let total = padded_len(data_end);
        self.buffer[..USBTMC_HEADER_SIZE].copy_from_slice(&header.encode());
        self.buffer[USBTMC_HEADER_SIZE..data_end].copy_from_slice(chunk);
        self.buffer[data_end..total].fill(0x00);

        trace!(tag = header.tag, size = chunk.len(), eom = end_of_message, "DEV_DEP_MSG_OUT");

        let timeout = self.timeout();
        self.transport
            .write_bulk(self.binding.bulk_out, &self.buffer[..total], timeout)?;
        Ok(())
    }

    /// ### Read
    ///
    /// Read up to `buf.len()` bytes of the instrument's response.
    ///
    /// Keeps requesting DEV_DEP_MSG_IN transfers until the device ends its message
    /// (EOM or a chunk shorter than requested), a transfer stops on the enabled
    /// termination character, or `buf` is full. With
    /// `add_nl_on_read`, a '\n' is appended if room is left.
    ///
    /// In buffered mode a read returning fewer bytes than asked for makes the
    /// following read return 0 without touching the device, so line oriented
    /// consumers see end of file instead of retrying.
    ///
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.attributes.read_mode == ReadMode::Buffered && self.eof {
            self.eof = false;
            return Ok(0);
        }

        let count = buf.len();
        let max_chunk = self.config.max_read_chunk();
        let mut done = 0;

        while done < count {
            let this_part = (count - done).min(max_chunk);
            let chunk = self.read_chunk(&mut buf[done..], this_part)?;

            done += chunk.len;
            if chunk.end_of_message || chunk.len < this_part {
                break;
            }
            if self.attributes.term_char_enabled && chunk.term_char_reached {
                break;
            }
        }

        if self.attributes.add_nl_on_read && done < count {
            buf[done] = b'\n';
            done += 1;
        }

        if done < count && self.attributes.read_mode == ReadMode::Buffered {
            self.eof = true;
        }

        Ok(done)
    }

    /// One REQUEST_DEV_DEP_MSG_IN / DEV_DEP_MSG_IN exchange, copying the data to `out`
    fn read_chunk(&mut self, out: &mut [u8], this_part: usize) -> Result<Chunk> {
        let timeout = self.timeout();
        let tag = self.tags.next_write();
        let request = MsgInRequest {
            tag,
            transfer_size: this_part as u32,
            term_char: self.attributes.term_char(),
        };

        trace!(tag, size = this_part, "REQUEST_DEV_DEP_MSG_IN");

        if let Err(e) = self
            .transport
            .write_bulk(self.binding.bulk_out, &request.encode(), timeout)
        {
            warn!("unable to request data: {e}");
            self.recover(Pipe::BulkOut);
            return Err(e.into());
        }
        self.tags.mark_read(tag);

        let actual = match self
            .transport
            .read_bulk(self.binding.bulk_in, &mut self.buffer, timeout)
        {
            Ok(actual) => actual,
            Err(e) => {
                warn!("unable to read data: {e}");
                self.recover(Pipe::BulkIn);
                return Err(e.into());
            }
        };

        match self.unpack_chunk(actual, tag, this_part, out) {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                warn!("bad DEV_DEP_MSG_IN response: {e}");
                if e.is_protocol() {
                    self.recover(Pipe::BulkIn);
                }
                Err(e)
            }
        }
    }

    fn unpack_chunk(
        &self,
        actual: usize,
        tag: u8,
        requested: usize,
        out: &mut [u8],
    ) -> Result<Chunk> {
        let header = MsgInHeader::decode(&self.buffer[..actual], tag)?;

        let reported = header.transfer_size as usize;
        let available = actual - USBTMC_HEADER_SIZE;
        if reported > available {
            return Err(Error::BadTransferSize {
                reported,
                available,
            });
        }
        if reported > out.len() {
            return Err(Error::Addressing {
                needed: reported,
                available: out.len(),
            });
        }
        if reported > requested {
            return Err(Error::BadTransferSize {
                reported,
                available: requested,
            });
        }

        out[..reported]
            .copy_from_slice(&self.buffer[USBTMC_HEADER_SIZE..USBTMC_HEADER_SIZE + reported]);

        trace!(tag, size = reported, eom = header.end_of_message, "DEV_DEP_MSG_IN");

        Ok(Chunk {
            len: reported,
            end_of_message: header.end_of_message,
            term_char_reached: header.term_char_reached,
        })
    }
}
