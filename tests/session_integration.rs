//! Session integration tests: load a WAV, detect, edit and derive regions.
//!
//! Run with:
//! ```bash
//! cargo test -p reslice --test session_integration
//! ```

mod helpers;

use helpers::tolerances::{BPM_TOLERANCE, INT16_EPSILON, ONSET_TOLERANCE_S};
use helpers::*;
use reslice::prelude::*;
use reslice::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_load_wav_detect_and_slice() {
    let dir = tempfile::tempdir().unwrap();
    let onsets = [0.25, 0.75, 1.25];
    let path = wav_fixture(&dir, "plucks.wav", &generate_plucks(1.75, &onsets));

    let session = SliceSession::builder()
        .wav(&path)
        .bpm(120.0)
        .subdivision(16)
        .build()
        .unwrap();
    assert_eq!(session.source(), Some(path.as_path()));
    assert_eq!(session.total_samples(), (1.75 * 44100.0) as usize);

    let detection = session.detect_onsets(false).unwrap();
    assert_onsets_near(&detection.raw_onsets, &onsets, ONSET_TOLERANCE_S);

    // 120 bpm, 16 steps per bar: every onset sits exactly on the 0.125 s grid.
    assert_eq!(session.marker_times(), vec![0.25, 0.75, 1.25]);
    assert_eq!(detection.quantized_bpm, Some(120.0));

    let regions = session.export_regions(true).unwrap();
    assert_eq!(
        regions,
        vec![
            Region::new(0, 33075, 36),
            Region::new(33075, 55125, 37),
            Region::new(55125, 77175, 38),
        ]
    );
}

#[test]
fn test_stereo_wav_is_downmixed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo.wav");
    write_wav_f32(&path, &generate_clicks(1.0, &[0.5]), TEST_SAMPLE_RATE, 2);

    let session = SliceSession::builder().wav(&path).build().unwrap();
    assert_eq!(session.audio().source_channels(), 2);
    assert_eq!(session.total_samples(), 44100);
    assert!((peak(session.audio().samples()) - 0.8).abs() < 1e-6);
}

#[test]
fn test_detected_tempo_drives_grid() {
    let dir = tempfile::tempdir().unwrap();
    let path = wav_fixture(&dir, "clicks.wav", &generate_click_track(120.0, 8.0, 0.0));

    let session = SliceSession::builder().wav(&path).build().unwrap();
    assert_eq!(session.bpm(), 140.0);

    let detection = session.detect_onsets(true).unwrap();
    let bpm = detection.detected_bpm.expect("tempo should be estimated");
    assert!((bpm - 120.0).abs() <= BPM_TOLERANCE, "estimated {bpm}");
    assert_eq!(session.detected_bpm(), Some(bpm));
    assert_eq!(session.bpm(), bpm as f64);
    assert_eq!(session.grid().unwrap().bpm(), bpm as f64);
    assert_eq!(detection.quantized_bpm, Some(bpm as f64));
}

#[test]
fn test_reload_discards_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = wav_fixture(&dir, "loop.wav", &generate_clicks(1.0, &[0.1, 0.6]));

    let mut session = SliceSession::builder().wav(&path).build().unwrap();
    session.detect_onsets(false).unwrap();
    session.insert_marker(0.9).unwrap();
    assert_eq!(session.markers().len(), 3);

    session.reload().unwrap();
    assert!(session.markers().is_empty());
    assert_eq!(session.regions().len(), 1);
    assert_eq!(session.source(), Some(path.as_path()));
}

#[test]
fn test_load_replaces_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let first = wav_fixture(&dir, "a.wav", &generate_clicks(1.0, &[0.5]));
    let second = dir.path().join("b.wav");
    write_wav_i16(&second, &generate_clicks(2.0, &[0.5, 1.5]), 22050);

    let mut session = SliceSession::builder().wav(&first).build().unwrap();
    session.set_markers([0.0, 0.5]).unwrap();

    session.load(&second).unwrap();
    assert_eq!(session.sample_rate(), 22050);
    assert_eq!(session.total_samples(), 88200);
    assert_eq!(session.source(), Some(second.as_path()));
    assert!(session.markers().is_empty());
    assert_eq!(session.envelope().total_samples(), 88200);
    assert!((peak(session.audio().samples()) - 0.8).abs() <= 2.0 * INT16_EPSILON);

    assert!(matches!(
        session.load(dir.path().join("missing.wav")),
        Err(Error::Playback(_))
    ));
    // A failed load leaves the previous buffer in place.
    assert_eq!(session.source(), Some(second.as_path()));
    assert_eq!(session.total_samples(), 88200);
}

#[test]
fn test_background_detection_polling() {
    let session = Arc::new(test_session(generate_clicks(2.0, &[0.2, 0.9, 1.6])));
    let mut handle = session.detect_in_background(false).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let detection = loop {
        match handle.poll() {
            DetectionStatus::Running => {
                assert!(Instant::now() < deadline, "detection timed out");
                std::thread::sleep(Duration::from_millis(5));
            }
            DetectionStatus::Complete(detection) => break detection,
            DetectionStatus::Failed(e) => panic!("detection failed: {e}"),
        }
    };

    assert_eq!(detection.raw_onsets.len(), 3);
    assert_eq!(session.markers(), detection.markers);
    assert!(!session.is_detecting());
    assert!(matches!(handle.poll(), DetectionStatus::Failed(Error::DetectionConsumed)));
}

#[test]
fn test_config_from_json() {
    let config: SliceConfig =
        serde_json::from_str(r#"{ "bpm": 174.0, "rows_per_bar": 8, "base_pitch": 48 }"#).unwrap();
    assert_eq!(config.bpm, 174.0);
    assert_eq!(config.hop_size, 512);

    let session = SliceSession::builder()
        .config(config)
        .audio(AudioBuffer::new(vec![0.0; 44100], TEST_SAMPLE_RATE))
        .build()
        .unwrap();
    assert_eq!(session.grid().unwrap().rows_per_bar(), 8);
    assert_eq!(session.regions()[0].pitch_id, 48);
}

#[test]
fn test_silence_yields_single_region() {
    let session = test_session(vec![0.0; 88200]);
    let detection = session.detect_onsets(true).unwrap();

    assert!(detection.raw_onsets.is_empty());
    assert_eq!(detection.detected_bpm, None);
    assert_eq!(session.bpm(), 140.0);
    assert_eq!(session.regions().to_vec(), vec![Region::new(0, 88200, 36)]);
}

#[test]
fn test_row_envelope_covers_row() {
    let session = test_session(generate_noise(441_000, 0.5, 7));
    session.set_bpm(120.0).unwrap();
    session.set_rows_per_bar(4).unwrap();

    // One row is 22050 samples, about 21.5 blocks of 1024.
    let blocks = session.row_envelope(1).unwrap();
    assert_eq!(blocks, 21..44);
    assert!(session
        .envelope()
        .blocks()[blocks]
        .iter()
        .all(|b| b.rms > 0.1));
}

#[test]
fn test_boundary_settings_keep_regions_well_formed() {
    let session = SliceSession::builder()
        .audio(AudioBuffer::new(vec![0.0; 1000], 1000))
        .base_pitch(i32::MAX)
        .dedup_epsilon(0.0)
        .build()
        .unwrap();

    session.set_markers([0.5, 0.25, 0.25, 0.5]).unwrap();
    assert_eq!(session.marker_times(), vec![0.25, 0.5]);

    let regions = session.export_regions(true).unwrap();
    assert_eq!(regions.len(), 2);
    assert!(regions.iter().all(|r| r.pitch_id == i32::MAX));
    assert_eq!(regions[1].end_sample, 1000);
}
