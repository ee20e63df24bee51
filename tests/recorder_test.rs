//! Integration tests for the recording engine.

use crossbeam_channel::{unbounded, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};
use synheart_session_recorder::{
    CallbackHost, Config, DropReason, FinishReason, FrozenSession, Persister, Recorder,
    RecorderError, RegistryError, SampleError, SampleEvent, SensorType, SessionState,
};

const PERIOD_NS: u64 = 25_000_000;

fn recorder_with(config: &Config, host: Arc<CallbackHost>) -> (Recorder, Receiver<FrozenSession>) {
    let (tx, rx) = unbounded();
    let recorder = Recorder::new(config, host, Box::new(tx)).expect("recorder");
    (recorder, rx)
}

fn sample(sensor: SensorType, i: u64) -> SampleEvent {
    let values = vec![i as f64 * 0.001; sensor.expected_values()];
    SampleEvent::new(sensor, values, i * PERIOD_NS)
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_leading_channel_finishes_at_target() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, sessions) = recorder_with(&Config::default(), host);
    recorder.start_session("leading").unwrap();

    // a faster non-leading channel filling up does not end the session
    for i in 0..1_000 {
        let _ = recorder.dispatch(&sample(SensorType::Gyroscope, i));
    }
    for i in 0..799 {
        recorder.dispatch(&sample(SensorType::Accelerometer, i)).unwrap();
    }
    assert!(recorder.is_recording());
    assert!(sessions.try_recv().is_err());

    recorder.dispatch(&sample(SensorType::Accelerometer, 799)).unwrap();
    assert!(!recorder.is_recording());

    let frozen = sessions.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(
        frozen.reason,
        FinishReason::LeadingChannelFilled {
            key: "raw_acc_x".to_string()
        }
    );
    assert_eq!(frozen.channel("raw_acc_x").unwrap().len(), 800);
    // the gyroscope stopped at the target once satisfied
    assert_eq!(frozen.channel("processed_gyro_x").unwrap().len(), 800);
}

#[test]
fn test_duration_fallback_without_samples() {
    let config = Config {
        recorded_sensors: vec![SensorType::Gyroscope],
        ..Config::default()
    };
    let host = Arc::new(CallbackHost::full());
    let (recorder, sessions) = recorder_with(&config, host);

    let start = Instant::now();
    recorder.start_session_at("silent", start).unwrap();

    assert!(!recorder.check_deadline_at(start + Duration::from_secs(29)));
    assert!(recorder.is_recording());

    assert!(recorder.check_deadline_at(start + Duration::from_secs(30)));
    assert_eq!(recorder.state(), SessionState::Idle);

    let frozen = sessions.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(frozen.reason, FinishReason::MaxDurationElapsed);
    assert!(frozen.leading_keys.is_empty());
    assert_eq!(frozen.row_count(), 0);
}

#[test]
fn test_dispatcher_pulse_ends_silent_session() {
    let config = Config {
        max_duration: Duration::from_millis(300),
        deadline_check_interval_ms: 50,
        ..Config::default()
    };
    let host = Arc::new(CallbackHost::full());
    let (recorder, sessions) = recorder_with(&config, host.clone());
    let states = recorder.subscribe();

    let started = Instant::now();
    recorder.start_session("quiet").unwrap();

    // nothing is delivered; only the dispatcher's periodic check can end it
    let frozen = sessions.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(frozen.id.as_str(), "quiet");
    assert_eq!(frozen.reason, FinishReason::MaxDurationElapsed);
    assert_eq!(frozen.row_count(), 0);
    assert!(!recorder.is_recording());
    assert!(host.attached().is_empty());

    assert_eq!(states.recv().unwrap().state, SessionState::Recording);
    assert_eq!(states.recv().unwrap().state, SessionState::Finished);
}

#[test]
fn test_duration_checked_on_each_sample() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, sessions) = recorder_with(&Config::default(), host);

    let start = Instant::now();
    recorder.start_session_at("slow", start).unwrap();
    recorder
        .dispatch_at(&sample(SensorType::Accelerometer, 0), start + Duration::from_secs(1))
        .unwrap();
    assert!(recorder.is_recording());

    recorder
        .dispatch_at(&sample(SensorType::Accelerometer, 1), start + Duration::from_secs(31))
        .unwrap();
    let frozen = sessions.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(frozen.reason, FinishReason::MaxDurationElapsed);
    assert_eq!(frozen.channel("raw_acc_x").unwrap().len(), 2);
}

#[test]
fn test_no_cross_session_leakage() {
    let config = Config {
        target_samples: 50,
        ..Config::default()
    };
    let host = Arc::new(CallbackHost::full());
    let (recorder, sessions) = recorder_with(&config, host);

    recorder.start_session("first").unwrap();
    for i in 0..30 {
        recorder.dispatch(&sample(SensorType::Gravity, i)).unwrap();
    }
    for i in 0..50 {
        recorder.dispatch(&sample(SensorType::Accelerometer, i)).unwrap();
    }
    let first = sessions.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.channel("processed_gravity_x").unwrap().len(), 30);

    recorder.start_session("second").unwrap();
    assert_eq!(recorder.current_session_id().unwrap().as_str(), "second");
    let levels = recorder.fill_levels();
    assert!(!levels.is_empty());
    assert!(levels.iter().all(|&(_, len)| len == 0));
}

#[test]
fn test_earlier_session_queue_never_feeds_next_session() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, _sessions) = recorder_with(&Config::default(), host);

    recorder.start_session("first").unwrap();
    let old_feed = recorder.feed(SensorType::Accelerometer).unwrap();
    recorder.stop_session().unwrap();
    recorder.start_session("second").unwrap();

    // a host thread that grabbed the first session's queue sends late
    for i in 0..5 {
        let _ = old_feed.try_send(sample(SensorType::Accelerometer, i));
    }
    let feed = recorder.feed(SensorType::Accelerometer).unwrap();
    feed.send(sample(SensorType::Accelerometer, 0)).unwrap();

    assert!(wait_for(|| recorder.fill_levels().contains(&("raw_acc_x", 1))));
    std::thread::sleep(Duration::from_millis(100));
    assert!(recorder.fill_levels().contains(&("raw_acc_x", 1)));
    assert_eq!(recorder.current_session_id().unwrap().as_str(), "second");
}

#[test]
fn test_invalid_config_is_rejected() {
    let host = Arc::new(CallbackHost::full());
    for target_samples in [0, usize::MAX / 4] {
        let config = Config {
            target_samples,
            ..Config::default()
        };
        let (tx, _rx) = unbounded::<FrozenSession>();
        let result = Recorder::new(&config, host.clone(), Box::new(tx));
        assert!(matches!(result, Err(RecorderError::Config(_))));
    }
}

#[test]
fn test_abort_discards_without_persisting() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, sessions) = recorder_with(&Config::default(), host.clone());
    let states = recorder.subscribe();

    recorder.start_session("aborted").unwrap();
    for i in 0..10 {
        recorder.dispatch(&sample(SensorType::Accelerometer, i)).unwrap();
    }

    let aborted = recorder.stop_session().unwrap();
    assert_eq!(aborted.as_str(), "aborted");
    assert_eq!(recorder.state(), SessionState::Idle);
    assert!(recorder.fill_levels().is_empty());
    assert!(host.attached().is_empty());
    assert!(recorder.stop_session().is_none());

    assert!(states.recv().unwrap().recording);
    assert_eq!(states.recv().unwrap().state, SessionState::Idle);

    let audit = recorder.audit().clone();
    drop(recorder);
    // the sink was dropped without ever receiving a session
    assert!(sessions.recv().is_err());
    assert_eq!(audit.stats().sessions_aborted, 1);
    assert_eq!(audit.stats().sessions_finished, 0);
}

#[test]
fn test_double_start_is_rejected() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, _sessions) = recorder_with(&Config::default(), host);

    recorder.start_session("one").unwrap();
    recorder.dispatch(&sample(SensorType::Accelerometer, 0)).unwrap();

    assert!(matches!(
        recorder.start_session("two"),
        Err(RecorderError::AlreadyRecording)
    ));
    assert_eq!(recorder.current_session_id().unwrap().as_str(), "one");
    let levels = recorder.fill_levels();
    assert!(levels.contains(&("raw_acc_x", 1)));
}

#[test]
fn test_malformed_sample_does_not_abort() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, _sessions) = recorder_with(&Config::default(), host);
    recorder.start_session("robust").unwrap();

    let short = SampleEvent::new(SensorType::Accelerometer, vec![1.0], 0);
    assert!(matches!(recorder.dispatch(&short), Err(DropReason::Invalid(_))));
    let nan = SampleEvent::new(SensorType::Accelerometer, vec![1.0, f64::NAN, 0.0], 0);
    assert!(matches!(recorder.dispatch(&nan), Err(DropReason::Invalid(_))));

    assert!(recorder.is_recording());
    recorder.dispatch(&sample(SensorType::Accelerometer, 1)).unwrap();
    assert!(recorder.fill_levels().contains(&("raw_acc_x", 1)));
    assert_eq!(recorder.audit().stats().samples_invalid, 2);
}

#[test]
fn test_sample_while_idle_is_dropped() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, _sessions) = recorder_with(&Config::default(), host);

    assert_eq!(
        recorder.dispatch(&sample(SensorType::Accelerometer, 0)),
        Err(DropReason::NotRecording)
    );
    assert_eq!(recorder.state(), SessionState::Idle);
    assert_eq!(recorder.audit().stats().samples_out_of_session, 1);
}

#[test]
fn test_low_frequency_sensor_reports_once() {
    let host = Arc::new(CallbackHost::full());
    let (recorder, _sessions) = recorder_with(&Config::default(), host.clone());
    recorder.start_session("ambient").unwrap();
    assert!(host.is_attached(SensorType::Light));

    let light = SampleEvent::new(SensorType::Light, vec![321.5], 0);
    recorder.dispatch(&light).unwrap();
    assert!(!host.is_attached(SensorType::Light));
    assert_eq!(
        recorder.dispatch(&light),
        Err(DropReason::Satisfied(SensorType::Light))
    );
}

#[test]
fn test_missing_mandatory_sensor_is_fatal() {
    let host = Arc::new(CallbackHost::with_sensors(&[
        SensorType::Gyroscope,
        SensorType::Gravity,
    ]));
    let (tx, _rx) = unbounded::<FrozenSession>();
    let result = Recorder::new(&Config::default(), host, Box::new(tx));
    assert!(matches!(
        result,
        Err(RecorderError::Registry(RegistryError::MissingMandatorySensor(
            SensorType::Accelerometer
        )))
    ));
}

#[test]
fn test_missing_optional_sensor_shrinks_channel_set() {
    let host = Arc::new(CallbackHost::with_sensors(&[
        SensorType::Accelerometer,
        SensorType::Light,
    ]));
    let (recorder, _sessions) = recorder_with(&Config::default(), host);

    assert_eq!(recorder.registered_high_freq_channels(), vec!["raw_acc_x"]);
    assert_eq!(recorder.registered_low_freq_channels(), vec!["light"]);
    assert!(recorder.feed(SensorType::Accelerometer).is_none());

    recorder.start_session("sparse").unwrap();
    assert!(recorder.feed(SensorType::Gyroscope).is_none());
    assert!(recorder.feed(SensorType::Accelerometer).is_some());
    assert!(recorder.feed(SensorType::Light).is_some());
}

#[test]
fn test_persisted_artifact_is_row_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        target_samples: 5,
        ..Config::default()
    };
    let host = Arc::new(CallbackHost::full());
    let recorder = Recorder::new(&config, host, Box::new(Persister::new(dir.path()))).unwrap();

    recorder.start_session("1700000000000").unwrap();
    for i in 0..3 {
        recorder.dispatch(&sample(SensorType::Gyroscope, i)).unwrap();
    }
    for i in 0..5 {
        recorder.dispatch(&sample(SensorType::Accelerometer, i)).unwrap();
    }
    let audit = recorder.audit().clone();
    drop(recorder);
    assert_eq!(audit.stats().artifacts_written, 1);

    let csv = std::fs::read_to_string(dir.path().join("1700000000000").join("high_freq.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "raw_acc_x,raw_acc_y,raw_acc_z,raw_acc_timeref,\
         processed_gyro_x,processed_gyro_y,processed_gyro_z,processed_gyro_timeref,timestamp"
    );
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[3],
        "0.002000,0.002000,0.002000,0.050000,0.002000,0.002000,0.002000,0.050000,1700000000000"
    );

    let summary = std::fs::read_to_string(dir.path().join("1700000000000").join("summary.txt")).unwrap();
    assert_eq!(summary.lines().count(), 8);
    assert!(summary.starts_with("raw_acc_x, 0.002000, 0.000000, 0.004000, "));
}

#[test]
fn test_persistence_failure_does_not_block_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "occupied").unwrap();

    let config = Config {
        target_samples: 2,
        ..Config::default()
    };
    let host = Arc::new(CallbackHost::full());
    let recorder = Recorder::new(&config, host, Box::new(Persister::new(&blocker))).unwrap();

    recorder.start_session("doomed").unwrap();
    for i in 0..2 {
        recorder.dispatch(&sample(SensorType::Accelerometer, i)).unwrap();
    }
    assert!(wait_for(|| recorder.audit().stats().artifacts_failed == 1));

    recorder.start_session("next").unwrap();
    assert!(recorder.is_recording());
}

#[test]
fn test_threaded_feed_with_sample_preview() {
    let config = Config {
        target_samples: 20,
        stream_samples: true,
        ..Config::default()
    };
    let host = Arc::new(CallbackHost::full());
    let (recorder, sessions) = recorder_with(&config, host.clone());
    let preview = recorder.subscribe_samples();

    recorder.start_session("threaded").unwrap();
    for i in 0..20 {
        let event = SampleEvent::new(SensorType::Accelerometer, vec![0.1234567, 0.0, 9.81], i * PERIOD_NS);
        host.deliver(event);
    }

    let frozen = sessions.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(frozen.channel("raw_acc_x").unwrap().len(), 20);

    let first = preview.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(first.values, vec![0.123457, 0.0, 9.81]);
    assert_eq!(preview.try_iter().count(), 19);
}

#[test]
fn test_unregistered_sensor_is_rejected() {
    let host = Arc::new(CallbackHost::with_sensors(&[SensorType::Accelerometer]));
    let (recorder, _sessions) = recorder_with(&Config::default(), host);
    recorder.start_session("sparse").unwrap();

    assert_eq!(
        recorder.dispatch(&sample(SensorType::Gyroscope, 0)),
        Err(DropReason::Invalid(SampleError::Unregistered(SensorType::Gyroscope)))
    );
    assert!(recorder.is_recording());
}
