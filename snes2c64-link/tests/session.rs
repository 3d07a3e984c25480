//! Session behavior against the simulated adapter.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use snes2c64_link::sim::{ReadFault, SimEvent, SimulatedAdapter};
use snes2c64_link::{DeviceSession, LinkConfig, LinkError, PortOpener, SessionManager, SessionState};
use snes2c64_proto::{
    codec, C64Target, FrameBytes, GamepadMap, Opcode, Response, Serialize, SlotIndex, SnesKey,
    Status, Tagged, Version,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn slot(index: u8) -> SlotIndex {
    SlotIndex::new(index).unwrap()
}

fn fast() -> LinkConfig {
    LinkConfig::default().with_response_timeout(Duration::from_millis(150))
}

fn sample_map() -> GamepadMap {
    GamepadMap::new()
        .with(SnesKey::B, C64Target::Fire1)
        .with(SnesKey::Up, C64Target::JoyUp)
}

#[test]
fn end_to_end_upload_then_download() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());

    let session = manager.open("sim0").unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.port(), "sim0");
    assert_eq!(session.firmware_version().unwrap(), "v1.2");
    assert_eq!(session.firmware_version().unwrap(), "v1.2");
    assert_eq!(adapter.count(Opcode::GetVersion), 1);

    let map = sample_map();
    session.upload_slot(slot(3), map).unwrap();
    assert_eq!(adapter.slot(slot(3)), map);

    let maps = session.download_all_slots().unwrap();
    assert_eq!(maps[3], map);
    for (i, other) in maps.iter().enumerate().filter(|(i, _)| *i != 3) {
        assert!(codec::is_empty(other), "slot {i} should be empty");
    }
    assert_eq!(adapter.count(Opcode::ReadSlot), 8);
    assert_eq!(session.read_slot(slot(3)).unwrap(), map);
}

#[test]
fn version_is_fetched_lazily_without_probe() {
    init_logging();
    let adapter = SimulatedAdapter::new("v2.0-beta");
    let stream = adapter.open("sim0").unwrap();
    let session = DeviceSession::connect(stream, "sim0", fast().with_probe(false)).unwrap();

    assert_eq!(adapter.count(Opcode::GetVersion), 0);
    assert_eq!(session.cached_version(), None);
    assert_eq!(session.firmware_version().unwrap(), "v2.0-beta");
    assert_eq!(session.cached_version(), Some("v2.0-beta"));
    assert_eq!(adapter.count(Opcode::GetVersion), 1);
}

#[test]
fn concurrent_operation_is_busy_not_queued() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());
    let session = manager.open("sim0").unwrap();
    adapter.set_response_delay(Duration::from_millis(60));

    let downloader = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.download_all_slots())
    };
    thread::sleep(Duration::from_millis(100));

    let err = session.upload_slot(slot(0), sample_map()).unwrap_err();
    assert!(matches!(err, LinkError::Busy));

    assert!(downloader.join().unwrap().is_ok());
    assert_eq!(adapter.count(Opcode::WriteSlot), 0);
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn silent_adapter_times_out_within_deadline() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_silent(true);
    let stream = adapter.open("sim0").unwrap();
    let session = DeviceSession::connect(stream, "sim0", fast().with_probe(false)).unwrap();

    let start = Instant::now();
    let err = session.read_slot(slot(1)).unwrap_err();
    let elapsed = start.elapsed();

    match err {
        LinkError::Timeout { request, timeout } => {
            assert_eq!(request.opcode, Opcode::ReadSlot);
            assert_eq!(request.slot, Some(slot(1)));
            assert_eq!(timeout, Duration::from_millis(150));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_millis(650), "took {elapsed:?}");

    // a timeout is not fatal
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn probe_failure_closes_stream() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_silent(true);
    let mut manager = SessionManager::new(adapter.clone(), fast());

    let err = manager.open("sim0").unwrap_err();
    assert!(matches!(err, LinkError::Timeout { .. }));
    assert_eq!(adapter.open_streams(), 0);
    assert!(manager.current().is_none());
}

#[test]
fn download_fails_whole_on_fifth_read() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2").with_slot(slot(0), &sample_map());
    let mut manager = SessionManager::new(adapter.clone(), fast());
    let session = manager.open("sim0").unwrap();
    adapter.fail_read(5, ReadFault::Corrupt);

    let err = session.download_all_slots().unwrap_err();
    match err {
        LinkError::Malformed { request, .. } => assert_eq!(request.slot, Some(slot(4))),
        other => panic!("expected malformed response, got {other:?}"),
    }
    assert_eq!(adapter.count(Opcode::ReadSlot), 5);

    // the session survives a bad frame
    let maps = session.download_all_slots().unwrap();
    assert_eq!(maps[0], sample_map());
}

#[test]
fn missing_reply_mid_download_is_a_timeout() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), fast());
    let session = manager.open("sim0").unwrap();
    adapter.fail_read(2, ReadFault::Silent);

    let err = session.download_all_slots().unwrap_err();
    assert!(matches!(err, LinkError::Timeout { .. }));
    assert_eq!(adapter.count(Opcode::ReadSlot), 2);
}

#[test]
fn reopening_closes_previous_port_first() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());

    let first = manager.open("A").unwrap();
    let second = manager.open("B").unwrap();

    let lifecycle: Vec<SimEvent> = adapter
        .events()
        .into_iter()
        .filter(|event| !matches!(event, SimEvent::Received { .. }))
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            SimEvent::Opened("A".into()),
            SimEvent::Closed("A".into()),
            SimEvent::Opened("B".into()),
        ]
    );
    assert_eq!(adapter.open_streams(), 1);

    assert!(matches!(first.read_slot(slot(0)), Err(LinkError::Disconnected)));
    assert!(second.read_slot(slot(0)).is_ok());
    assert!(Arc::ptr_eq(&manager.current().unwrap(), &second));
}

#[test]
fn failed_open_still_closes_previous_session() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.remove_port("gone");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());

    manager.open("A").unwrap();
    let err = manager.open("gone").unwrap_err();

    assert!(matches!(err, LinkError::PortUnavailable { ref port, .. } if port == "gone"));
    assert_eq!(adapter.open_streams(), 0);
    assert!(manager.current().is_none());
}

#[test]
fn stale_input_is_discarded_before_request() {
    init_logging();
    let mut bogus = Version::new();
    bogus.push_str("bogus").unwrap();
    // Tagged like the first request of a fresh session.
    let stale: FrameBytes = Tagged::new(1, Response::Version(bogus)).serialize_to_vec().unwrap();

    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_stale_input(&stale);
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());

    let session = manager.open("sim0").unwrap();
    assert_eq!(session.firmware_version().unwrap(), "v1.2");
}

#[test]
fn late_reply_does_not_answer_next_request() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2")
        .with_slot(slot(1), &GamepadMap::new().with(SnesKey::L, C64Target::Fire3))
        .with_slot(slot(2), &sample_map());
    let stream = adapter.open("sim0").unwrap();
    let session = DeviceSession::connect(stream, "sim0", fast().with_probe(false)).unwrap();

    adapter.set_response_delay(Duration::from_millis(250));
    assert!(matches!(session.read_slot(slot(1)), Err(LinkError::Timeout { .. })));

    // The slot 1 reply is still in flight when the next request goes out.
    adapter.set_response_delay(Duration::ZERO);
    assert_eq!(session.read_slot(slot(2)).unwrap(), sample_map());
    assert!(session.read_slot(slot(3)).unwrap().is_empty());
}

#[test]
fn late_reply_after_settling_does_not_answer_next_request() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2").with_slot(slot(1), &sample_map());
    let stream = adapter.open("sim0").unwrap();
    let session = DeviceSession::connect(stream, "sim0", fast().with_probe(false)).unwrap();

    adapter.set_response_delay(Duration::from_millis(250));
    assert!(matches!(session.read_slot(slot(1)), Err(LinkError::Timeout { .. })));

    // Both replies arrive together, the stale one first.
    adapter.set_response_delay(Duration::from_millis(100));
    assert!(session.read_slot(slot(0)).unwrap().is_empty());
    assert!(session.is_connected());
}

#[test]
fn upload_times_out_within_deadline() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_silent(true);
    let stream = adapter.open("sim0").unwrap();
    let session = DeviceSession::connect(stream, "sim0", fast().with_probe(false)).unwrap();

    let start = Instant::now();
    let err = session.upload_slot(slot(6), sample_map()).unwrap_err();
    let elapsed = start.elapsed();

    match err {
        LinkError::Timeout { request, timeout } => {
            assert_eq!(request.opcode, Opcode::WriteSlot);
            assert_eq!(request.slot, Some(slot(6)));
            assert_eq!(timeout, Duration::from_millis(150));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(elapsed < Duration::from_millis(650), "took {elapsed:?}");
    assert!(session.is_connected());
}

#[test]
fn download_times_out_within_one_deadline() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_silent(true);
    let stream = adapter.open("sim0").unwrap();
    let session = DeviceSession::connect(stream, "sim0", fast().with_probe(false)).unwrap();

    let start = Instant::now();
    let err = session.download_all_slots().unwrap_err();
    let elapsed = start.elapsed();

    match err {
        LinkError::Timeout { request, .. } => {
            assert_eq!(request.opcode, Opcode::ReadSlot);
            assert_eq!(request.slot, Some(slot(0)));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    // gives up on the first slot instead of trying the other seven
    assert!(elapsed < Duration::from_millis(650), "took {elapsed:?}");
    assert_eq!(adapter.count(Opcode::ReadSlot), 1);
}

#[test]
fn version_times_out_within_deadline() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_silent(true);
    let stream = adapter.open("sim0").unwrap();
    let session = DeviceSession::connect(stream, "sim0", fast().with_probe(false)).unwrap();

    let start = Instant::now();
    let err = session.firmware_version().unwrap_err();
    let elapsed = start.elapsed();

    match err {
        LinkError::Timeout { request, timeout } => {
            assert_eq!(request.opcode, Opcode::GetVersion);
            assert_eq!(request.slot, None);
            assert_eq!(timeout, Duration::from_millis(150));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(elapsed < Duration::from_millis(650), "took {elapsed:?}");
    assert_eq!(session.cached_version(), None);
}

#[test]
fn upload_and_refresh_reads_back_every_slot() {
    init_logging();
    let kept = GamepadMap::new().with(SnesKey::R, C64Target::FireA);
    let adapter = SimulatedAdapter::new("v1.2").with_slot(slot(7), &kept);
    let mut manager = SessionManager::new(adapter.clone(), fast());
    let session = manager.open("sim0").unwrap();

    let maps = session.upload_and_refresh(slot(2), sample_map()).unwrap();

    assert_eq!(maps[2], sample_map());
    assert_eq!(maps[7], kept);
    assert_eq!(maps.iter().filter(|map| !map.is_empty()).count(), 2);
    assert_eq!(adapter.count(Opcode::WriteSlot), 1);
    assert_eq!(adapter.count(Opcode::ReadSlot), 8);
}

#[test]
fn upload_and_refresh_stops_on_rejected_write() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_write_status(Status::StorageFailure);
    let mut manager = SessionManager::new(adapter.clone(), fast());
    let session = manager.open("sim0").unwrap();

    let err = session.upload_and_refresh(slot(2), sample_map()).unwrap_err();
    assert!(matches!(err, LinkError::Rejected { status: Status::StorageFailure, .. }));
    assert_eq!(adapter.count(Opcode::ReadSlot), 0);
    assert!(session.is_connected());
}

#[test]
fn abort_does_not_wait_for_running_download() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());
    let session = manager.open("sim0").unwrap();
    adapter.set_response_delay(Duration::from_millis(80));

    let downloader = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.download_all_slots())
    };
    thread::sleep(Duration::from_millis(120));

    let start = Instant::now();
    session.abort();
    assert!(start.elapsed() < Duration::from_millis(40));
    assert_eq!(session.state(), SessionState::Disconnected);

    assert!(matches!(downloader.join().unwrap(), Err(LinkError::Disconnected)));
    assert!(adapter.count(Opcode::ReadSlot) < 8);
    assert_eq!(adapter.open_streams(), 0);
}

#[test]
fn abort_when_idle_closes_at_once() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());
    let session = manager.open("sim0").unwrap();

    session.abort();
    assert_eq!(adapter.open_streams(), 0);
    assert!(matches!(session.read_slot(slot(0)), Err(LinkError::Disconnected)));
}

#[test]
fn rejected_write_keeps_session() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    adapter.set_write_status(Status::StorageFailure);
    let mut manager = SessionManager::new(adapter.clone(), fast());
    let session = manager.open("sim0").unwrap();

    let err = session.upload_slot(slot(2), sample_map()).unwrap_err();
    assert!(matches!(err, LinkError::Rejected { status: Status::StorageFailure, .. }));
    assert!(session.is_connected());
}

#[test]
fn unplugged_cable_closes_session() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), fast());
    let session = manager.open("sim0").unwrap();
    adapter.unplug_after(0);

    let err = session.upload_slot(slot(0), sample_map()).unwrap_err();
    assert!(matches!(err, LinkError::StreamClosed { .. }));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(adapter.open_streams(), 0);

    assert!(matches!(session.read_slot(slot(0)), Err(LinkError::Disconnected)));
    assert!(manager.current().is_none());
}

#[test]
fn close_aborts_download_between_frames() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());
    let session = manager.open("sim0").unwrap();
    adapter.set_response_delay(Duration::from_millis(50));

    let downloader = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.download_all_slots())
    };
    thread::sleep(Duration::from_millis(120));
    manager.close_current();

    assert!(matches!(downloader.join().unwrap(), Err(LinkError::Disconnected)));
    assert!(adapter.count(Opcode::ReadSlot) < 8);
    assert_eq!(adapter.open_streams(), 0);
}

#[test]
fn close_is_idempotent() {
    init_logging();
    let adapter = SimulatedAdapter::new("v1.2");
    let mut manager = SessionManager::new(adapter.clone(), LinkConfig::default());
    let session = manager.open("sim0").unwrap();

    session.close();
    session.close();
    manager.close_current();

    let closes = adapter
        .events()
        .iter()
        .filter(|event| matches!(event, SimEvent::Closed(_)))
        .count();
    assert_eq!(closes, 1);
    assert!(matches!(session.firmware_version(), Err(LinkError::Disconnected)));
}
