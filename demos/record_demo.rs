//! Demonstration of a skew-tolerant recording session.
//!
//! This example shows how to:
//! 1. Build a recorder over a simulated host with mismatched sensor rates
//! 2. Watch state changes and a live sample preview
//! 3. Let the leading channel end the session
//! 4. Inspect the written artifact
//!
//! Run with: cargo run --example record_demo

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, tick};
use synheart_session_recorder::{
    persist::{HIGH_FREQ_DATA_FILENAME, SUMMARY_FILENAME},
    Config, Persister, Recorder, SensorType, SessionId, SessionState, SimulatedHost,
};

fn main() {
    println!("Synheart Session Recorder - Demo");
    println!("================================");
    println!();

    let export_dir = std::env::temp_dir().join("synheart-recorder-demo");
    let config = Config {
        target_samples: 200,
        max_duration: Duration::from_secs(20),
        high_freq_sample_period_us: 10_000,
        stream_samples: true,
        export_path: export_dir.clone(),
        ..Config::default()
    };

    // The gyroscope lags well behind the accelerometer, as it does on real phones
    let host = SimulatedHost::without(&[SensorType::Pressure])
        .with_period(SensorType::Gyroscope, Duration::from_millis(25));

    let recorder = match Recorder::new(&config, Arc::new(host), Box::new(Persister::new(&export_dir))) {
        Ok(recorder) => recorder,
        Err(e) => {
            eprintln!("Error creating recorder: {e}");
            return;
        }
    };

    println!("High-frequency channels: {:?}", recorder.registered_high_freq_channels());
    println!("Low-frequency channels: {:?}", recorder.registered_low_freq_channels());
    println!();

    let states = recorder.subscribe();
    let samples = recorder.subscribe_samples();
    let progress = tick(Duration::from_millis(500));

    let id = SessionId::now();
    if let Err(e) = recorder.start_session(id.clone()) {
        eprintln!("Error starting session: {e}");
        return;
    }

    let mut previewed = 0usize;
    loop {
        select! {
            recv(states) -> change => match change {
                Ok(change) if change.state == SessionState::Finished => break,
                Ok(change) => println!("State: {:?}", change.state),
                Err(_) => break,
            },
            recv(samples) -> sample => {
                if let Ok(sample) = sample {
                    previewed += 1;
                    if previewed % 250 == 0 {
                        println!("  preview: {} {:?}", sample.sensor_type, sample.values);
                    }
                }
            },
            recv(progress) -> _ => {
                let fill: Vec<String> = recorder
                    .fill_levels()
                    .into_iter()
                    .filter(|(key, _)| key.ends_with("_x"))
                    .map(|(key, len)| format!("{key}={len}"))
                    .collect();
                println!("  fill: {}", fill.join(" "));
            },
        }
    }

    // dropping the recorder waits for the artifact to be written
    drop(recorder);

    let session_dir = export_dir.join(id.as_str());
    println!();
    println!("Session {id} finished");
    match std::fs::read_to_string(session_dir.join(HIGH_FREQ_DATA_FILENAME)) {
        Ok(csv) => println!("  {} rows written", csv.lines().count().saturating_sub(1)),
        Err(e) => eprintln!("  could not read artifact: {e}"),
    }
    if let Ok(summary) = std::fs::read_to_string(session_dir.join(SUMMARY_FILENAME)) {
        println!();
        println!("Summary (key, mean, min, max, stddev):");
        print!("{summary}");
    }
}
