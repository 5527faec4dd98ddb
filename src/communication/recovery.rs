//! ## Recovery
//!
//! Abort and clear procedures restoring host/device synchronization after a failed
//! or abandoned transfer (USBTMC 4.2.1.2, 4.2.1.4 and 4.2.1.6).
//!
//! Every poll loop and every drain pass is bounded by the configured
//! `max_reads_to_clear`; running out is reported as [`Error::RecoveryExhausted`].
//!

use rusb::Recipient;
use tracing::{debug, trace, warn};

use super::control::{expect_success, unexpected_status};
use crate::constants::{control_lengths, control_requests, usbtmc_status};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::Transport;
use crate::types::Pipe;

/// bmAbortBulkIn / bmClear bit 0: the device has data queued on BULK IN
const BULK_IN_FIFO_BYTES: u8 = 0b0000_0001;

impl<T: Transport> Session<T> {
    /// Automatic abort after a failed transfer, if enabled. A failing recovery is
    /// logged and never retried: the caller gets the original error.
    pub(crate) fn recover(&mut self, pipe: Pipe) {
        if !self.attributes.auto_abort_on_error {
            return;
        }
        debug!(%pipe, "aborting after error");
        let result = match pipe {
            Pipe::BulkIn => self.abort_bulk_in(),
            Pipe::BulkOut => self.abort_bulk_out(),
        };
        if let Err(e) = result {
            warn!(%pipe, "automatic abort failed: {e}");
        }
    }

    /// ### Abort Bulk In
    ///
    /// Abort the last DEV_DEP_MSG_IN transfer and drain whatever the device still
    /// has queued. A device answering FAILED had nothing in progress: that is
    /// success.
    ///
    pub fn abort_bulk_in(&mut self) -> Result<()> {
        let w_index = u16::from(self.binding.bulk_in);
        let mut status = [0x00; control_lengths::INITIATE_ABORT];

        self.class_request_in(
            Recipient::Endpoint,
            control_requests::INITIATE_ABORT_BULK_IN,
            u16::from(self.tags.last_read()),
            w_index,
            &mut status,
        )?;

        match status[0] {
            usbtmc_status::STATUS_FAILED => {
                debug!("no bulk in transfer in progress");
                return Ok(());
            }
            usbtmc_status::STATUS_SUCCESS => {}
            other => return Err(unexpected_status(control_requests::INITIATE_ABORT_BULK_IN, other)),
        }

        let max_size = self.bulk_in_max_packet_size()?;
        self.drain_bulk_in(max_size)?;

        let ceiling = self.config.max_reads_to_clear;
        for _ in 0..ceiling {
            let mut status = [0x00; control_lengths::CHECK_ABORT_STATUS];
            self.class_request_in(
                Recipient::Endpoint,
                control_requests::CHECK_ABORT_BULK_IN_STATUS,
                0x0000,
                w_index,
                &mut status,
            )?;

            match status[0] {
                usbtmc_status::STATUS_SUCCESS => return Ok(()),
                usbtmc_status::STATUS_PENDING => {
                    if status[1] & BULK_IN_FIFO_BYTES != 0 {
                        self.drain_bulk_in(max_size)?;
                    }
                }
                other => {
                    return Err(unexpected_status(
                        control_requests::CHECK_ABORT_BULK_IN_STATUS,
                        other,
                    ))
                }
            }
        }

        warn!("abort bulk in still pending after {ceiling} polls");
        Err(Error::RecoveryExhausted { attempts: ceiling })
    }

    /// ### Abort Bulk Out
    ///
    /// Abort the last DEV_DEP_MSG_OUT transfer, wait for the device to confirm,
    /// then clear the bulk-out halt.
    ///
    pub fn abort_bulk_out(&mut self) -> Result<()> {
        let w_index = u16::from(self.binding.bulk_out);
        let mut status = [0x00; control_lengths::INITIATE_ABORT];

        self.class_request_in(
            Recipient::Endpoint,
            control_requests::INITIATE_ABORT_BULK_OUT,
            u16::from(self.tags.last_write()),
            w_index,
            &mut status,
        )?;
        expect_success(control_requests::INITIATE_ABORT_BULK_OUT, status[0])?;

        let ceiling = self.config.max_reads_to_clear;
        let mut confirmed = false;
        for _ in 0..ceiling {
            let mut status = [0x00; control_lengths::CHECK_ABORT_STATUS];
            self.class_request_in(
                Recipient::Endpoint,
                control_requests::CHECK_ABORT_BULK_OUT_STATUS,
                0x0000,
                w_index,
                &mut status,
            )?;

            match status[0] {
                usbtmc_status::STATUS_SUCCESS => {
                    confirmed = true;
                    break;
                }
                usbtmc_status::STATUS_PENDING => continue,
                other => {
                    return Err(unexpected_status(
                        control_requests::CHECK_ABORT_BULK_OUT_STATUS,
                        other,
                    ))
                }
            }
        }

        if !confirmed {
            warn!("abort bulk out still pending after {ceiling} polls");
            return Err(Error::RecoveryExhausted { attempts: ceiling });
        }

        self.clear_halt(Pipe::BulkOut)
    }

    /// ### Clear
    ///
    /// Clear the device's input and output buffers, then the bulk-out halt.
    ///
    pub fn clear(&mut self) -> Result<()> {
        let w_index = u16::from(self.binding.interface_number);
        let mut status = [0x00; control_lengths::INITIATE_CLEAR];

        debug!("sending INITIATE_CLEAR");
        self.class_request_in(
            Recipient::Interface,
            control_requests::INITIATE_CLEAR,
            0x0000,
            w_index,
            &mut status,
        )?;
        expect_success(control_requests::INITIATE_CLEAR, status[0])?;

        let max_size = self.bulk_in_max_packet_size()?;

        let ceiling = self.config.max_reads_to_clear;
        let mut cleared = false;
        for _ in 0..ceiling {
            let mut status = [0x00; control_lengths::CHECK_CLEAR_STATUS];
            self.class_request_in(
                Recipient::Interface,
                control_requests::CHECK_CLEAR_STATUS,
                0x0000,
                w_index,
                &mut status,
            )?;

            match status[0] {
                usbtmc_status::STATUS_SUCCESS => {
                    cleared = true;
                    break;
                }
                usbtmc_status::STATUS_PENDING => {
                    if status[1] & BULK_IN_FIFO_BYTES != 0 {
                        self.drain_bulk_in(max_size)?;
                    }
                }
                other => {
                    return Err(unexpected_status(
                        control_requests::CHECK_CLEAR_STATUS,
                        other,
                    ))
                }
            }
        }

        if !cleared {
            warn!("clear still pending after {ceiling} polls");
            return Err(Error::RecoveryExhausted { attempts: ceiling });
        }

        self.eof = false;
        self.clear_halt(Pipe::BulkOut)
    }

    /// Read BULK IN until a short packet shows the device has nothing more queued.
    /// Packets are read whole, whatever the size of the session's I/O buffer.
    fn drain_bulk_in(&mut self, max_size: usize) -> Result<()> {
        let ceiling = self.config.max_reads_to_clear;
        let timeout = self.timeout();
        let mut packet = vec![0x00; max_size];

        for _ in 0..ceiling {
            let actual = self
                .transport
                .read_bulk(self.binding.bulk_in, &mut packet, timeout)?;
            trace!(actual, "drained bulk in");
            if actual < max_size {
                return Ok(());
            }
        }

        warn!("couldn't clear device buffer within {ceiling} cycles");
        Err(Error::RecoveryExhausted { attempts: ceiling })
    }
}
