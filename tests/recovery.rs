mod common;

use pretty_assertions::assert_eq;
use rs_usbtmc_driver::constants::control_requests::{
    CHECK_ABORT_BULK_IN_STATUS, CHECK_ABORT_BULK_OUT_STATUS, CHECK_CLEAR_STATUS,
    INITIATE_ABORT_BULK_IN, INITIATE_ABORT_BULK_OUT, INITIATE_CLEAR,
};
use rs_usbtmc_driver::{Attribute, DriverConfig, Error};

use common::{
    init_tracing, session, session_with, BulkIn, Event, MockTransport, BULK_IN, BULK_OUT,
    INTERFACE,
};

const SUCCESS: u8 = 0x01;
const PENDING: u8 = 0x02;
const FAILED: u8 = 0x80;

/// bmRequestType of class requests to an endpoint / an interface
const TO_ENDPOINT: u8 = 0xA2;
const TO_INTERFACE: u8 = 0xA1;

fn ceiling(max_reads_to_clear: usize) -> DriverConfig {
    DriverConfig {
        max_reads_to_clear,
        ..DriverConfig::default()
    }
}

fn control_events(mock: &MockTransport) -> Vec<(u8, u8, u16, u16, usize)> {
    mock.events
        .iter()
        .filter_map(|e| match e {
            Event::Control {
                request_type,
                request,
                value,
                index,
                length,
            } => Some((*request_type, *request, *value, *index, *length)),
            _ => None,
        })
        .collect()
}

#[test]
fn abort_bulk_in_without_transfer_in_progress_is_one_request() {
    init_tracing();
    let mut session = session(MockTransport::new().with_control(&[FAILED, 0x00]));

    session.abort_bulk_in().unwrap();

    assert_eq!(session.transport().requests(), vec![INITIATE_ABORT_BULK_IN]);
    assert_eq!(session.transport().bulk_in_reads(), 0);
}

#[test]
fn abort_bulk_in_drains_until_confirmed() {
    let mock = MockTransport::new()
        .with_control(&[SUCCESS, 0x01])
        .with_bulk_in(BulkIn::Raw(vec![0x00; 10]))
        .with_control(&[PENDING, 0x01, 0, 0, 0, 0, 0, 0])
        .with_bulk_in(BulkIn::Raw(vec![0x00; 5]))
        .with_control(&[SUCCESS, 0x00, 0, 0, 0, 0, 0, 0]);
    let mut session = session(mock);

    session.abort_bulk_in().unwrap();

    assert_eq!(
        control_events(session.transport()),
        vec![
            (TO_ENDPOINT, INITIATE_ABORT_BULK_IN, 0, u16::from(BULK_IN), 2),
            (TO_ENDPOINT, CHECK_ABORT_BULK_IN_STATUS, 0, u16::from(BULK_IN), 8),
            (TO_ENDPOINT, CHECK_ABORT_BULK_IN_STATUS, 0, u16::from(BULK_IN), 8),
        ]
    );
    assert_eq!(session.transport().bulk_in_reads(), 2);
}

#[test]
fn abort_bulk_in_names_the_last_requested_tag() {
    let mock = MockTransport::new()
        .with_reply(b"1", true)
        .with_reply(b"2", true)
        .with_control(&[FAILED, 0x00]);
    let mut session = session(mock);
    let mut buf = [0u8; 1];
    session.read(&mut buf).unwrap();
    session.read(&mut buf).unwrap();

    session.abort_bulk_in().unwrap();

    let (_, _, value, _, _) = control_events(session.transport())[0];
    assert_eq!(value, 2);
}

#[test]
fn endless_bulk_in_data_exhausts_the_drain() {
    let mock = MockTransport::new()
        .with_control(&[SUCCESS, 0x00])
        .with_bulk_in(BulkIn::Raw(vec![0xAA; 64]))
        .with_bulk_in(BulkIn::Raw(vec![0xAA; 64]))
        .with_bulk_in(BulkIn::Raw(vec![0xAA; 64]))
        .with_bulk_in(BulkIn::Raw(vec![0xAA; 64]));
    let mut session = session_with(mock, ceiling(3));

    let err = session.abort_bulk_in().unwrap_err();

    assert!(matches!(err, Error::RecoveryExhausted { attempts: 3 }));
    assert_eq!(session.transport().bulk_in_reads(), 3);
    assert_eq!(session.transport().requests(), vec![INITIATE_ABORT_BULK_IN]);
}

#[test]
fn drain_reads_whole_packets_with_a_small_io_buffer() {
    let mut mock = MockTransport::new().with_control(&[SUCCESS, 0x00]);
    for _ in 0..5 {
        mock = mock.with_bulk_in(BulkIn::Raw(vec![0xAA; 64]));
    }
    mock = mock
        .with_bulk_in(BulkIn::Raw(vec![0xAA; 3]))
        .with_control(&[SUCCESS, 0x00, 0, 0, 0, 0, 0, 0]);
    let config = DriverConfig {
        io_buffer_size: 16,
        ..DriverConfig::default()
    };
    let mut session = session_with(mock, config);

    session.abort_bulk_in().unwrap();

    assert_eq!(session.transport().bulk_in_reads(), 6);
    assert!(session.transport().bulk_in.is_empty());
    assert!(session
        .transport()
        .events
        .iter()
        .all(|e| !matches!(e, Event::BulkIn { capacity, .. } if *capacity != 64)));
}

#[test]
fn abort_bulk_in_pending_forever_is_exhausted() {
    let mut mock = MockTransport::new()
        .with_control(&[SUCCESS, 0x00])
        .with_bulk_in(BulkIn::Raw(vec![]));
    for _ in 0..4 {
        mock = mock.with_control(&[PENDING, 0x00, 0, 0, 0, 0, 0, 0]);
    }
    let mut session = session_with(mock, ceiling(4));

    let err = session.abort_bulk_in().unwrap_err();

    assert!(err.is_recovery_exhausted());
    assert_eq!(session.transport().requests().len(), 5);
}

#[test]
fn abort_bulk_in_unknown_max_packet_size() {
    let mut mock = MockTransport::new().with_control(&[SUCCESS, 0x00]);
    mock.max_packet_size = None;
    let mut session = session(mock);

    assert!(matches!(
        session.abort_bulk_in().unwrap_err(),
        Error::MaxPacketSizeUnknown(BULK_IN)
    ));
}

#[test]
fn abort_bulk_out_waits_then_clears_the_halt() {
    let mock = MockTransport::new()
        .with_control(&[SUCCESS, 0x01])
        .with_control(&[PENDING, 0, 0, 0, 0, 0, 0, 0])
        .with_control(&[PENDING, 0, 0, 0, 0, 0, 0, 0])
        .with_control(&[SUCCESS, 0, 0, 0, 0, 0, 0, 0]);
    let mut session = session(mock);
    session.write(b"*TRG").unwrap();

    session.abort_bulk_out().unwrap();

    let events = control_events(session.transport());
    assert_eq!(
        events[0],
        (TO_ENDPOINT, INITIATE_ABORT_BULK_OUT, 1, u16::from(BULK_OUT), 2)
    );
    assert_eq!(
        session.transport().requests(),
        vec![
            INITIATE_ABORT_BULK_OUT,
            CHECK_ABORT_BULK_OUT_STATUS,
            CHECK_ABORT_BULK_OUT_STATUS,
            CHECK_ABORT_BULK_OUT_STATUS,
        ]
    );
    assert_eq!(session.transport().cleared_halts(), vec![BULK_OUT]);
}

#[test]
fn abort_bulk_out_refused_by_device() {
    let mut session = session(MockTransport::new().with_control(&[FAILED, 0x00]));

    let err = session.abort_bulk_out().unwrap_err();

    assert!(matches!(
        err,
        Error::Status {
            request: "INITIATE_ABORT_BULK_OUT",
            status: FAILED
        }
    ));
    assert!(session.transport().cleared_halts().is_empty());
}

#[test]
fn clear_drains_pending_data_and_resets_the_session() {
    let mock = MockTransport::new()
        .with_reply(b"stale", true)
        .with_control(&[SUCCESS])
        .with_control(&[PENDING, 0x01])
        .with_bulk_in(BulkIn::Raw(vec![0x00; 12]))
        .with_control(&[SUCCESS, 0x00]);
    let mut session = session(mock);
    let mut buf = [0u8; 32];
    session.read(&mut buf).unwrap();
    assert!(session.at_eof());

    session.clear().unwrap();

    assert!(!session.at_eof());
    assert_eq!(
        control_events(session.transport()),
        vec![
            (TO_INTERFACE, INITIATE_CLEAR, 0, u16::from(INTERFACE), 1),
            (TO_INTERFACE, CHECK_CLEAR_STATUS, 0, u16::from(INTERFACE), 2),
            (TO_INTERFACE, CHECK_CLEAR_STATUS, 0, u16::from(INTERFACE), 2),
        ]
    );
    assert_eq!(session.transport().cleared_halts(), vec![BULK_OUT]);
}

#[test]
fn clear_gives_up_after_exactly_the_retry_ceiling() {
    let mut mock = MockTransport::new().with_control(&[SUCCESS]);
    for _ in 0..6 {
        mock = mock.with_control(&[PENDING, 0x00]);
    }
    let mut session = session_with(mock, ceiling(5));

    let err = session.clear().unwrap_err();

    assert!(matches!(err, Error::RecoveryExhausted { attempts: 5 }));
    let polls = session
        .transport()
        .requests()
        .into_iter()
        .filter(|r| *r == CHECK_CLEAR_STATUS)
        .count();
    assert_eq!(polls, 5);
    assert_eq!(session.transport().control.len(), 1);
    assert!(session.transport().cleared_halts().is_empty());
}

#[test]
fn clear_refused_by_device() {
    let mut session = session(MockTransport::new().with_control(&[FAILED]));

    assert!(matches!(
        session.clear().unwrap_err(),
        Error::Status {
            request: "INITIATE_CLEAR",
            ..
        }
    ));
    assert_eq!(session.transport().requests(), vec![INITIATE_CLEAR]);
}

#[test]
fn failed_write_aborts_bulk_out_when_enabled() {
    let mut mock = MockTransport::new()
        .with_control(&[SUCCESS, 0x01])
        .with_control(&[SUCCESS, 0, 0, 0, 0, 0, 0, 0]);
    mock.bulk_out_failures.push_back(rusb::Error::Pipe);
    let mut session = session(mock);
    session.set_attribute(Attribute::AutoAbortOnError, 1).unwrap();

    let err = session.write(b"*IDN?").unwrap_err();

    assert!(matches!(err, Error::Transport(rusb::Error::Pipe)));
    let (_, request, value, index, _) = control_events(session.transport())[0];
    assert_eq!((request, value, index), (INITIATE_ABORT_BULK_OUT, 1, u16::from(BULK_OUT)));
    assert_eq!(session.transport().cleared_halts(), vec![BULK_OUT]);
}

#[test]
fn failed_write_leaves_the_device_alone_by_default() {
    let mut mock = MockTransport::new();
    mock.bulk_out_failures.push_back(rusb::Error::Pipe);
    let mut session = session(mock);

    assert!(session.write(b"*IDN?").is_err());
    assert!(session.transport().requests().is_empty());
}

#[test]
fn failing_automatic_abort_returns_the_original_error() {
    // no control responses queued: every class request stalls
    let mut mock = MockTransport::new();
    mock.bulk_out_failures.push_back(rusb::Error::Timeout);
    let mut session = session(mock);
    session.set_attribute(Attribute::AutoAbortOnError, 1).unwrap();

    let err = session.write(b"*IDN?").unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(session.transport().requests(), vec![INITIATE_ABORT_BULK_OUT]);
}

#[test]
fn read_timeout_aborts_bulk_in_when_enabled() {
    let mut session = session(MockTransport::new().with_control(&[FAILED, 0x01]));
    session.set_attribute(Attribute::AutoAbortOnError, 1).unwrap();

    let mut buf = [0u8; 16];
    let err = session.read(&mut buf).unwrap_err();

    assert!(err.is_timeout());
    let (request_type, request, value, index, _) = control_events(session.transport())[0];
    assert_eq!(
        (request_type, request, value, index),
        (TO_ENDPOINT, INITIATE_ABORT_BULK_IN, 1, u16::from(BULK_IN))
    );
}

#[test]
fn desynchronized_response_aborts_bulk_in_when_enabled() {
    let header = rs_usbtmc_driver::MsgInHeader {
        tag: 0x42,
        transfer_size: 0,
        end_of_message: true,
        term_char_reached: false,
    };
    let mock = MockTransport::new()
        .with_bulk_in(BulkIn::Raw(header.encode().to_vec()))
        .with_control(&[FAILED, 0x01]);
    let mut session = session(mock);
    session.set_attribute(Attribute::AutoAbortOnError, 1).unwrap();

    let mut buf = [0u8; 16];
    let err = session.read(&mut buf).unwrap_err();

    assert!(matches!(err, Error::Desynchronized { expected: 1, tag: 0x42, .. }));
    assert_eq!(session.transport().requests(), vec![INITIATE_ABORT_BULK_IN]);
}
