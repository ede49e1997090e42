use std::process::Command;

use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_click_track"))
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8(stdout.to_vec())
        .expect("stdout UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("JSON line"))
        .collect()
}

#[test]
fn schedule_prints_click_grid() {
    let output = cli()
        .args(["schedule", "--bpm", "120", "--beats", "3", "--count", "4"])
        .output()
        .expect("failed to run click_track schedule");
    assert!(
        output.status.success(),
        "CLI exited with {:?}",
        output.status.code()
    );

    let clicks = json_lines(&output.stdout);
    assert_eq!(clicks.len(), 4);

    let beats: Vec<u64> = clicks
        .iter()
        .map(|c| c["beat"].as_u64().unwrap_or(u64::MAX))
        .collect();
    assert_eq!(beats, vec![0, 1, 2, 0], "wraps after three beats");

    let first = clicks[0]["scheduled_time"].as_f64().unwrap_or_default();
    let second = clicks[1]["scheduled_time"].as_f64().unwrap_or_default();
    assert!((first - 0.05).abs() < 1e-9);
    assert!((second - first - 0.5).abs() < 1e-9);
    assert_eq!(clicks[0]["frequency"].as_f64(), Some(1000.0));
    assert_eq!(clicks[1]["frequency"].as_f64(), Some(800.0));
}

#[test]
fn schedule_rejects_invalid_subdivision() {
    let output = cli()
        .args(["schedule", "--subdivision", "5"])
        .output()
        .expect("failed to run click_track schedule");
    assert!(!output.status.success(), "subdivision 5 must be rejected");
}

#[test]
fn schedule_rejects_out_of_range_bpm() {
    let output = cli()
        .args(["schedule", "--bpm", "400"])
        .output()
        .expect("failed to run click_track schedule");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("400"), "expected BPM in error, got {stderr}");
}

#[test]
fn render_rejects_bar_too_long_to_count() {
    let path = std::env::temp_dir().join(format!("click_track_huge_{}.wav", std::process::id()));
    let output = cli()
        .args(["render", "--beats", "1073741824", "--subdivision", "4", "--output"])
        .arg(&path)
        .output()
        .expect("failed to run click_track render");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr UTF-8");
    assert!(stderr.contains("1073741824"), "expected beat count in error, got {stderr}");
    assert!(!path.exists(), "nothing rendered for a rejected meter");
}

#[test]
fn tap_estimates_tempo() {
    let output = cli()
        .args(["tap", "0", "500", "1000", "1500"])
        .output()
        .expect("failed to run click_track tap");
    assert!(output.status.success());

    let taps = json_lines(&output.stdout);
    assert_eq!(taps.len(), 4);
    assert!(taps[0]["bpm"].is_null(), "first tap has no estimate");
    assert_eq!(taps[3]["bpm"].as_u64(), Some(120));
}

#[test]
fn render_writes_wav_file() {
    let path = std::env::temp_dir().join(format!("click_track_cli_{}.wav", std::process::id()));
    let output = cli()
        .args(["render", "--bars", "1", "--sample-rate", "8000", "--output"])
        .arg(&path)
        .output()
        .expect("failed to run click_track render");
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary = json_lines(&output.stdout);
    assert_eq!(summary[0]["clicks"].as_u64(), Some(4));
    assert_eq!(summary[0]["sample_rate"].as_u64(), Some(8000));

    let reader = hound::WavReader::open(&path).expect("rendered WAV readable");
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(
        Some(reader.len() as u64),
        summary[0]["samples"].as_u64(),
        "file length matches summary"
    );
    let _ = std::fs::remove_file(&path);
}

#[test]
fn play_silent_reports_active_beats() {
    let output = cli()
        .args(["play", "--silent", "--bpm", "300", "--seconds", "0.8"])
        .output()
        .expect("failed to run click_track play");
    assert!(
        output.status.success(),
        "play failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let beats = json_lines(&output.stdout);
    assert!(!beats.is_empty(), "expected at least one active beat line");
    assert_eq!(beats[0]["beat"].as_u64(), Some(0), "starts on the downbeat");
}
