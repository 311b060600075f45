use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use pibot_core::LogBook;
use pibot_core::testing::{FakeProbe, FakeRemotePc, FakeWakeSource, RecordingSink};
use pibot_core::watch::{
    DebouncedWatcher, FixedClock, LinkCondition, RotationWatcher, TemperatureCondition,
    TimeWindow, WakeSignalCondition, Watcher, WatcherSupervisor,
};
use tempfile::tempdir;

const OWNER: i64 = 7;

fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
    let naive = NaiveDate::from_ymd_opt(y, mo, d)
        .expect("date")
        .and_hms_opt(h, mi, s)
        .expect("time");
    Local
        .from_local_datetime(&naive)
        .earliest()
        .expect("local time")
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("time")
}

fn temperature_watcher(probe: Arc<FakeProbe>, sink: Arc<RecordingSink>) -> DebouncedWatcher {
    DebouncedWatcher::new(
        "temperature",
        Box::new(TemperatureCondition::new(probe, 60.0)),
        sink,
        OWNER,
        Duration::from_secs(60),
    )
}

#[tokio::test]
async fn temperature_alerts_once_per_episode() {
    let probe = Arc::new(FakeProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = temperature_watcher(probe.clone(), sink.clone());

    probe.set_temperature(Some(71.5));
    for _ in 0..3 {
        watcher.tick().await.expect("tick");
    }
    assert_eq!(sink.messages().len(), 1);
    assert!(sink.texts()[0].contains("71.5"));
    assert_eq!(sink.messages()[0].0, OWNER);

    probe.set_temperature(Some(55.0));
    watcher.tick().await.expect("tick");
    assert_eq!(sink.messages().len(), 1);
    assert!(!watcher.latch().is_set());

    probe.set_temperature(Some(65.0));
    watcher.tick().await.expect("tick");
    watcher.tick().await.expect("tick");
    assert_eq!(sink.messages().len(), 2);
}

#[tokio::test]
async fn threshold_itself_does_not_alert() {
    let probe = Arc::new(FakeProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = temperature_watcher(probe.clone(), sink.clone());
    probe.set_temperature(Some(60.0));
    watcher.tick().await.expect("tick");
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn undelivered_alert_is_retried() {
    let probe = Arc::new(FakeProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = temperature_watcher(probe.clone(), sink.clone());
    probe.set_temperature(Some(80.0));

    sink.set_failing(true);
    assert!(watcher.tick().await.is_err());
    assert!(!watcher.latch().is_set());

    sink.set_failing(false);
    watcher.tick().await.expect("tick");
    assert_eq!(sink.messages().len(), 1);
    assert!(watcher.latch().is_set());
}

#[tokio::test]
async fn unreadable_sensor_is_an_error_tick() {
    let probe = Arc::new(FakeProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = temperature_watcher(probe.clone(), sink.clone());
    probe.set_temperature(None);
    assert!(watcher.tick().await.is_err());
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn link_watcher_waits_grace_then_interval() {
    let probe = Arc::new(FakeProbe::new());
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = DebouncedWatcher::new(
        "link",
        Box::new(LinkCondition::new(probe.clone(), "wlan0")),
        sink.clone(),
        OWNER,
        Duration::from_secs(120),
    )
    .with_initial_delay(Duration::from_secs(10));

    assert_eq!(watcher.next_delay(), Duration::from_secs(10));
    assert_eq!(watcher.next_delay(), Duration::from_secs(120));
    assert_eq!(watcher.next_delay(), Duration::from_secs(120));

    probe.set_link_up(false);
    watcher.tick().await.expect("tick");
    watcher.tick().await.expect("tick");
    assert_eq!(sink.messages().len(), 1);
    assert!(sink.texts()[0].contains("wlan0"));

    probe.set_link_up(true);
    watcher.tick().await.expect("tick");
    assert_eq!(sink.messages().len(), 1);
}

fn wake_watcher(
    source: Arc<FakeWakeSource>,
    remote: Arc<FakeRemotePc>,
    clock: Arc<FixedClock>,
    sink: Arc<RecordingSink>,
) -> DebouncedWatcher {
    let condition = WakeSignalCondition::new(
        source,
        remote,
        TimeWindow::new(hm(6, 0), hm(12, 0)),
        clock,
    );
    DebouncedWatcher::new(
        "wake_signal",
        Box::new(condition),
        sink,
        OWNER,
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn wake_signal_inside_window_wakes_pc() {
    let source = Arc::new(FakeWakeSource::new());
    let remote = Arc::new(FakeRemotePc::new());
    let clock = Arc::new(FixedClock::new(local(2026, 5, 4, 7, 30, 0)));
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = wake_watcher(source.clone(), remote.clone(), clock, sink.clone());

    source.push(true);
    source.push(true);
    watcher.tick().await.expect("tick");
    watcher.tick().await.expect("tick");
    assert_eq!(remote.wakes(), 1);
    assert_eq!(sink.messages().len(), 1);

    watcher.tick().await.expect("tick");
    source.push(true);
    watcher.tick().await.expect("tick");
    assert_eq!(remote.wakes(), 2);
}

#[tokio::test]
async fn wake_signal_outside_window_is_discarded() {
    let source = Arc::new(FakeWakeSource::new());
    let remote = Arc::new(FakeRemotePc::new());
    let clock = Arc::new(FixedClock::new(local(2026, 5, 4, 22, 0, 0)));
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = wake_watcher(source.clone(), remote.clone(), clock.clone(), sink.clone());

    source.push(true);
    watcher.tick().await.expect("tick");

    // The signal is not replayed once the window opens.
    clock.set(local(2026, 5, 5, 6, 30, 0));
    watcher.tick().await.expect("tick");
    assert_eq!(remote.wakes(), 0);
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn wake_endpoint_errors_are_not_fatal() {
    let source = Arc::new(FakeWakeSource::new());
    let remote = Arc::new(FakeRemotePc::new());
    let clock = Arc::new(FixedClock::new(local(2026, 5, 4, 9, 0, 0)));
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = wake_watcher(source.clone(), remote.clone(), clock, sink.clone());

    source.push_error("connection refused");
    source.push(true);
    assert!(watcher.tick().await.is_err());
    watcher.tick().await.expect("tick");
    assert_eq!(remote.wakes(), 1);
}

#[tokio::test]
async fn undelivered_wake_alert_does_not_wake_twice() {
    let source = Arc::new(FakeWakeSource::new());
    let remote = Arc::new(FakeRemotePc::new());
    let clock = Arc::new(FixedClock::new(local(2026, 5, 4, 8, 0, 0)));
    let sink = Arc::new(RecordingSink::new());
    let mut watcher = wake_watcher(source.clone(), remote.clone(), clock, sink.clone());

    sink.set_failing(true);
    source.push(true);
    assert!(watcher.tick().await.is_err());
    assert_eq!(remote.wakes(), 1);

    sink.set_failing(false);
    source.push(true);
    watcher.tick().await.expect("tick");
    assert_eq!(remote.wakes(), 1);
    assert_eq!(sink.messages().len(), 1);

    // A fresh episode wakes again.
    watcher.tick().await.expect("tick");
    source.push(true);
    watcher.tick().await.expect("tick");
    assert_eq!(remote.wakes(), 2);
}

#[tokio::test(start_paused = true)]
async fn supervisor_survives_panics_and_errors() {
    let probe = Arc::new(FakeProbe::new());
    let sink = Arc::new(RecordingSink::new());
    probe.panic_on_next_read();
    probe.set_temperature(Some(90.0));

    let failing_probe = Arc::new(FakeProbe::new());
    failing_probe.set_temperature(None);

    let mut supervisor = WatcherSupervisor::new();
    supervisor.spawn(Box::new(temperature_watcher(probe.clone(), sink.clone())));
    supervisor.spawn(Box::new(temperature_watcher(failing_probe.clone(), sink.clone())));
    assert_eq!(supervisor.names(), vec!["temperature", "temperature"]);

    tokio::time::sleep(Duration::from_secs(150)).await;

    assert!(probe.temperature_reads() >= 2);
    assert!(failing_probe.temperature_reads() >= 2);
    assert_eq!(sink.messages().len(), 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn rotation_fires_at_boundary_and_rolls_over() {
    let tmp = tempdir().expect("tempdir");
    let log = Arc::new(LogBook::open(&tmp.path().join("access.log")).expect("open"));
    log.append("denied id=1").expect("append");
    log.append("denied id=2").expect("append");

    let clock = Arc::new(FixedClock::new(local(2026, 8, 31, 23, 59, 30)));
    let mut watcher = RotationWatcher::new(log.clone(), vec![hm(0, 0)], clock.clone());

    assert_eq!(watcher.next_delay(), Duration::from_secs(30));
    assert_eq!(watcher.target(), Some(local(2026, 9, 1, 0, 0, 0)));

    // Timer fired a moment early.
    clock.set(local(2026, 8, 31, 23, 59, 59));
    watcher.tick().await.expect("rotate");
    assert_eq!(log.line_count().expect("count"), 1);

    assert_eq!(watcher.next_delay(), Duration::from_secs(24 * 60 * 60 + 1));
    assert_eq!(watcher.target(), Some(local(2026, 9, 2, 0, 0, 0)));
}

#[test]
fn manual_clear_matches_scheduled_rotation() {
    let tmp = tempdir().expect("tempdir");
    let log = LogBook::open(&tmp.path().join("access.log")).expect("open");
    for n in 0..10 {
        log.append(&format!("entry {n}")).expect("append");
    }
    log.reset().expect("reset");
    let raw = log.read_all().expect("read");
    assert_eq!(raw.lines().count(), 1);
    assert!(raw.ends_with("log started\n"));
}
