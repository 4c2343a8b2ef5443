//! End-to-end tests of the discovery session.
//!
//! These drive a [`DiscoverySession`] with a scripted transport and check
//! what gets published and what gets requested from the devices.

use std::time::Duration;

use antz_discovery::{
    ChannelTable, DiscoverySession, MemorySink, ProfileDispatcher, RequestScheduler, RetryPolicy, ScriptedTransport,
    SentCommand, SessionConfig, Sleeper,
};
use antz_protocol::{DeviceIdentity, MessageLayout};
use approx::assert_relative_eq;
use serde_json::Value;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Default)]
struct CountingSleeper {
    sleeps: usize,
}

impl Sleeper for CountingSleeper {
    fn sleep(&mut self, _duration: Duration) {
        self.sleeps += 1;
    }
}

type TestSession = DiscoverySession<ScriptedTransport, MemorySink, CountingSleeper>;

fn test_config() -> SessionConfig {
    SessionConfig {
        idle_sleep: Duration::ZERO,
        ..SessionConfig::default()
    }
}

fn scripted(capture: &str) -> ScriptedTransport {
    ScriptedTransport::from_capture(capture.as_bytes()).expect("capture parses")
}

fn session_with(transport: ScriptedTransport, layout: MessageLayout, config: SessionConfig) -> TestSession {
    DiscoverySession::new(
        transport,
        MemorySink::new(),
        ProfileDispatcher::new(
            layout,
            RequestScheduler::new(RetryPolicy::default(), CountingSleeper::default()),
        ),
        ChannelTable::with_defaults(),
        config,
    )
}

fn session_from_capture(text: &str, layout: MessageLayout) -> TestSession {
    session_with(scripted(text), layout, test_config())
}

fn events(session: &TestSession) -> Vec<Value> {
    session.sink().values()
}

fn requested_pages(session: &TestSession) -> Vec<u8> {
    session
        .transport()
        .acknowledged()
        .iter()
        .map(|(_, data)| data[6])
        .collect()
}

// Tracker 586 (0x024A), transmission type 0xD5, on channel 1.
const TRACKER_CAPTURE: &str = "\
# location page 1, asset #2: 300 m, heading 90, treeing, latitude low 0xC71C
4E: 01 01 02 2C 01 40 40 1C C7 83 4A 02 D5 29
# location page 2, asset #2: latitude high 0x1C71, longitude -90
4E: 01 02 02 71 1C 00 00 00 C0 83 4A 02 D5 29
# identification pages
4E: 01 10 02 03 52 45 58 20 20 83 4A 02 D5 29
4E: 01 11 02 01 42 4F 4E 45 53 83 4A 02 D5 29
# channel event, ignored
40: 01 01 03
# manufacturer, product, battery
4E: 01 50 FF FF 02 01 00 C8 0D 83 4A 02 D5 29
4E: 01 51 FF FF 1E 78 56 34 12 83 4A 02 D5 29
4E: 01 52 FF 00 64 00 00 80 23 83 4A 02 D5 29
";

// ============================================================================
// Asset Tracker
// ============================================================================

#[test]
fn test_tracker_session_publishes_full_record() {
    let mut session = session_from_capture(TRACKER_CAPTURE, MessageLayout::FlagsAfterPayload);
    session.start().unwrap();
    let stats = session.run();

    assert_eq!(stats.messages, 8);
    assert_eq!(stats.broadcasts, 7);
    assert_eq!(stats.events, 7);
    assert_eq!(stats.dropped, 0);

    let events = events(&session);
    let kinds: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
    assert_eq!(
        kinds,
        vec![
            "asset_position",
            "asset_location",
            "asset_identification",
            "asset_name",
            "manufacturer",
            "product",
            "battery"
        ]
    );

    assert_eq!(events[0]["distance"], 300);
    assert_eq!(events[0]["heading"], 90.0);
    assert_eq!(events[0]["status"]["situation"], "Treeing");
    assert_relative_eq!(events[1]["latitude"].as_f64().unwrap(), 40.0, epsilon = 1e-6);
    assert_relative_eq!(events[1]["longitude"].as_f64().unwrap(), -90.0);
    assert_eq!(events[3]["name"], "REX  BONES");
    assert_eq!(events[3]["asset_type"], "DogCollar");
    assert_eq!(events[4]["manufacturer"], "Garmin");
    assert_eq!(events[4]["model"], "Alpha 10");
    assert_eq!(events[5]["serial_number"], 0x1234_5678);
    assert_eq!(events[6]["voltage"], 3.5);
    assert_eq!(events[6]["uptime_seconds"], 1600);

    for event in &events {
        assert_eq!(event["device"]["number"], 586);
        assert_eq!(event["channel"], 1);
    }
    assert!(session.sink().records.iter().all(|(topic, _)| topic == "ant/asset/586"));
}

#[test]
fn test_tracker_pages_requested_once() {
    let mut session = session_from_capture(TRACKER_CAPTURE, MessageLayout::FlagsAfterPayload);
    session.run();

    assert_eq!(requested_pages(&session), vec![0x10, 0x50, 0x51, 0x52]);
    let first = session.transport().acknowledged()[0];
    assert_eq!(first, (1, [0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x10, 0x04]));

    let tracker = DeviceIdentity::new(586, 0x29, 0xD5);
    let registry = session.dispatcher().registry();
    assert!(registry.is_paired(&tracker));
    assert_eq!(registry.known_indexes(&tracker), vec![2]);
    assert_eq!(registry.asset(&tracker, 2).unwrap().name().as_deref(), Some("REX  BONES"));
    assert!(registry.device(&tracker).unwrap().manufacturer.is_some());
}

#[test]
fn test_failed_requests_retry_with_backoff() {
    let mut transport = scripted("4E: 01 01 00 FF FF 00 00 00 00 83 4A 02 D5 29\n");
    transport.fail_all_acks();
    let mut session = session_with(transport, MessageLayout::FlagsAfterPayload, test_config());
    // every request fails: four requests, five attempts each
    session.run();

    assert_eq!(session.transport().acknowledged().len(), 20);
    assert_eq!(session.dispatcher().scheduler().sleeper().sleeps, 16);
    // the event is still published
    assert_eq!(session.stats().events, 1);
}

#[test]
fn test_disconnect_then_reconnect_requests_again() {
    let capture = "\
4E: 01 01 00 10 00 00 00 00 00 83 4A 02 D5 29
4E: 01 20 00 00 00 00 00 00 00 83 4A 02 D5 29
4E: 01 01 00 10 00 00 00 00 00 83 4A 02 D5 29
";
    let mut session = session_from_capture(capture, MessageLayout::FlagsAfterPayload);
    session.run();

    let events = events(&session);
    assert_eq!(events[1]["event"], "disconnect");
    assert_eq!(
        requested_pages(&session),
        vec![0x10, 0x50, 0x51, 0x52, 0x10, 0x50, 0x51, 0x52]
    );
}

#[test]
fn test_location_page_2_alone_has_no_latitude() {
    let capture = "4E: 01 02 05 71 1C 00 00 00 40 83 4A 02 D5 29\n";
    let mut session = session_from_capture(capture, MessageLayout::FlagsAfterPayload);
    session.run();

    let events = events(&session);
    assert_eq!(events.len(), 1);
    assert!(events[0]["latitude"].is_null());
    assert_relative_eq!(events[0]["longitude"].as_f64().unwrap(), 90.0);
}

// ============================================================================
// Other Profiles and Layouts
// ============================================================================

#[test]
fn test_flags_at_end_layout() {
    let capture = "\
# heart rate 0x2BB3, flags in the last byte
4E: 00 04 FF FF FF 00 04 01 48 B3 2B 51 78 83
";
    let mut session = session_from_capture(capture, MessageLayout::FlagsAtEnd);
    session.run();

    let events = events(&session);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "heart_rate");
    assert_eq!(events[0]["heart_rate"], 72);
    assert_eq!(session.sink().records[0].0, "ant/hrm/11187");
}

#[test]
fn test_malformed_and_unknown_messages() {
    let capture = "\
# too short
4E: 01 02 03
# truncated trailer
4E: 01 01 00 00 00 00 00 00 00 9F 4A 02
# bike speed sensor
4E: 03 00 FF FF FF 10 20 30 40 83 39 30 01 7B
# no trailer at all
4E: 02 00 01 02 03 04 05 06 07
";
    let mut session = session_from_capture(capture, MessageLayout::FlagsAfterPayload);
    let stats = session.run();

    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.events, 2);

    let events = events(&session);
    assert_eq!(events[0]["profile"], "unknown");
    assert_eq!(events[0]["payload"], "00FFFFFF10203040");
    assert!(events[1]["device"].is_null());

    let topics: Vec<&str> = session.sink().records.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(topics, vec!["ant/unknown/12345", "ant/unknown/ch2"]);
    assert_eq!(requested_pages(&session), vec![0x50, 0x51, 0x50, 0x51]);
}

#[test]
fn test_promoted_channels_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("paired_channels.csv");

    let mut session = session_with(
        scripted(TRACKER_CAPTURE),
        MessageLayout::FlagsAfterPayload,
        SessionConfig {
            promote_paired: true,
            ..test_config()
        },
    );
    session.run();
    assert_eq!(session.stats().promoted, 1);
    assert!(session
        .transport()
        .sent()
        .contains(&SentCommand::Open { channel: 2 }));
    session.channels().save_file(&store).unwrap();

    let mut restored = ChannelTable::with_defaults();
    assert_eq!(restored.load_file(&store).unwrap(), 1);
    let paired = restored.lookup(2).unwrap();
    assert_eq!(paired.identity(), Some(DeviceIdentity::new(586, 0x29, 0xD5)));
    assert_eq!(paired.search_timeout, 0x06);
}
