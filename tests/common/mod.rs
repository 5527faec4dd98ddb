#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rs_usbtmc_driver::constants::bulk_msg_id;
use rs_usbtmc_driver::{
    Binding, DriverConfig, InstrumentInfo, MsgInHeader, MsgInRequest, Session, Transport,
};

pub const BULK_IN: u8 = 0x81;
pub const BULK_OUT: u8 = 0x02;
pub const INTERFACE: u8 = 0;

pub const BINDING: Binding = Binding {
    interface_number: INTERFACE,
    bulk_in: BULK_IN,
    bulk_out: BULK_OUT,
};

/// Everything the engine asked of the device, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Control {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    },
    BulkOut {
        endpoint: u8,
        data: Vec<u8>,
    },
    BulkIn {
        endpoint: u8,
        capacity: usize,
    },
    ClearHalt(u8),
    ResetConfiguration,
}

/// What the device puts on BULK IN for the next read
#[derive(Debug, Clone)]
pub enum BulkIn {
    /// Response data, framed with the tag of the last REQUEST_DEV_DEP_MSG_IN. Data
    /// beyond the requested size stays queued for the next request.
    Reply { data: Vec<u8>, eom: bool },
    /// Bytes sent as is
    Raw(Vec<u8>),
    Fail(rusb::Error),
}

/// Mock USBTMC device
///
/// Control requests are answered from a queue of status buffers; an empty queue
/// stalls the pipe. BULK IN reads are served from a queue as well; an empty queue
/// times out.
#[derive(Debug)]
pub struct MockTransport {
    pub events: Vec<Event>,
    pub control: VecDeque<Vec<u8>>,
    pub bulk_in: VecDeque<BulkIn>,
    pub bulk_out_failures: VecDeque<rusb::Error>,
    pub max_packet_size: Option<u16>,
    /// Set once the transport is dropped
    pub dropped: Arc<AtomicBool>,
    last_request: Option<MsgInRequest>,
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport {
            events: Vec::new(),
            control: VecDeque::new(),
            bulk_in: VecDeque::new(),
            bulk_out_failures: VecDeque::new(),
            max_packet_size: Some(64),
            dropped: Arc::new(AtomicBool::new(false)),
            last_request: None,
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_control(mut self, response: &[u8]) -> Self {
        self.control.push_back(response.to_vec());
        self
    }

    pub fn with_reply(mut self, data: &[u8], eom: bool) -> Self {
        self.bulk_in.push_back(BulkIn::Reply {
            data: data.to_vec(),
            eom,
        });
        self
    }

    pub fn with_bulk_in(mut self, entry: BulkIn) -> Self {
        self.bulk_in.push_back(entry);
        self
    }

    /// Class request codes, in the order they were issued
    pub fn requests(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Control { request, .. } => Some(*request),
                _ => None,
            })
            .collect()
    }

    pub fn bulk_out_frames(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::BulkOut { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// DEV_DEP_MSG_OUT frames only
    pub fn messages_out(&self) -> Vec<Vec<u8>> {
        self.bulk_out_frames()
            .into_iter()
            .filter(|f| f[0] == bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT)
            .collect()
    }

    pub fn bulk_in_reads(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::BulkIn { .. }))
            .count()
    }

    pub fn cleared_halts(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::ClearHalt(ep) => Some(*ep),
                _ => None,
            })
            .collect()
    }

    fn frame_reply(&mut self, mut data: Vec<u8>, eom: bool) -> Vec<u8> {
        let request = self.last_request.unwrap_or(MsgInRequest {
            tag: 0,
            transfer_size: u32::MAX,
            term_char: None,
        });

        let requested = request.transfer_size as usize;
        let eom = if data.len() > requested {
            let rest = data.split_off(requested);
            self.bulk_in.push_front(BulkIn::Reply { data: rest, eom });
            false
        } else {
            eom
        };

        let header = MsgInHeader {
            tag: request.tag,
            transfer_size: data.len() as u32,
            end_of_message: eom,
            term_char_reached: false,
        };
        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&data);
        frame.resize((frame.len() + 3) & !3, 0x00);
        frame
    }
}

impl Transport for MockTransport {
    fn read_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        self.events.push(Event::Control {
            request_type,
            request,
            value,
            index,
            length: buf.len(),
        });
        let response = self.control.pop_front().ok_or(rusb::Error::Pipe)?;
        let len = response.len().min(buf.len());
        buf[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        self.events.push(Event::BulkIn {
            endpoint,
            capacity: buf.len(),
        });
        let bytes = match self.bulk_in.pop_front().ok_or(rusb::Error::Timeout)? {
            BulkIn::Reply { data, eom } => self.frame_reply(data, eom),
            BulkIn::Raw(bytes) => bytes,
            BulkIn::Fail(e) => return Err(e),
        };
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }

    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        self.events.push(Event::BulkOut {
            endpoint,
            data: buf.to_vec(),
        });
        if let Some(e) = self.bulk_out_failures.pop_front() {
            return Err(e);
        }
        if buf.first() == Some(&bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN) {
            self.last_request = MsgInRequest::decode(buf).ok();
        }
        Ok(buf.len())
    }

    fn clear_halt(&mut self, endpoint: u8) -> rusb::Result<()> {
        self.events.push(Event::ClearHalt(endpoint));
        Ok(())
    }

    fn max_packet_size(&self, _endpoint: u8) -> Option<u16> {
        self.max_packet_size
    }

    fn reset_configuration(&mut self) -> rusb::Result<()> {
        self.events.push(Event::ResetConfiguration);
        Ok(())
    }
}

pub fn info() -> InstrumentInfo {
    InstrumentInfo::new("ACME Instruments", "DMM 6500", "SN0001")
}

pub fn session(mock: MockTransport) -> Session<MockTransport> {
    Session::new(mock, BINDING, info())
}

pub fn session_with(mock: MockTransport, config: DriverConfig) -> Session<MockTransport> {
    Session::with_config(mock, BINDING, info(), config).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
