//! Offline rendering of click tracks.
//!
//! Runs the same lookahead scheduler and voicing as live playback against a
//! hand-stepped clock, then mixes the tones into a mono buffer. Useful for
//! exporting a click track and for checking timing without a sound card.

use std::path::Path;

use serde::Serialize;

use super::click::{ClickVoicing, ToneRequest};
use crate::config::AppConfig;
use crate::engine::backend::{ClockSource, ManualClock};
use crate::scheduler::{ClickEvent, LookaheadScheduler};
use crate::tempo::{TempoConfig, TempoState};

/// A click together with the tone that voices it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledClick {
    #[serde(flatten)]
    pub event: ClickEvent,
    pub frequency: f32,
    pub amplitude: f32,
    #[serde(skip)]
    pub tone: ToneRequest,
}

pub struct RenderedTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub clicks: Vec<ScheduledClick>,
}

impl RenderedTrack {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

const PREALLOCATED_CLICKS: usize = 4096;

/// Schedule the first `count` clicks of a run starting at time zero,
/// ticking at the configured cadence.
pub fn plan_clicks(config: &AppConfig, tempo: TempoConfig, count: usize) -> Vec<ScheduledClick> {
    let clock = ManualClock::new();
    let tempo = TempoState::new(tempo);
    let voicing = ClickVoicing::new(config.click.clone());
    let mut scheduler = LookaheadScheduler::new(&config.scheduler);
    scheduler.reset(clock.now());

    let mut step = config.scheduler.tick_interval().as_secs_f64();
    if scheduler.schedule_ahead_secs() > 0.0 {
        step = step.min(scheduler.schedule_ahead_secs());
    }

    let mut clicks = Vec::with_capacity(count.min(PREALLOCATED_CLICKS));
    while clicks.len() < count {
        scheduler.fill_window(clock.now(), &tempo, |event, snapshot| {
            let tone = voicing.tone_for(&event, snapshot.volume);
            clicks.push(ScheduledClick {
                event,
                frequency: tone.frequency,
                amplitude: tone.peak_amplitude,
                tone,
            });
        });
        clock.advance(step);
    }
    clicks.truncate(count);
    clicks
}

/// Render `bars` full bars to mono samples at `sample_rate`.
pub fn render_click_track(
    config: &AppConfig,
    tempo: TempoConfig,
    bars: u32,
    sample_rate: u32,
) -> RenderedTrack {
    let tempo = tempo.clamped();
    let pulses = (bars as u64).saturating_mul(tempo.pulses_per_bar());
    let count = usize::try_from(pulses).unwrap_or(usize::MAX);
    let clicks = plan_clicks(config, tempo, count);

    let end_time = clicks
        .iter()
        .map(|click| click.tone.stop_time)
        .fold(0.0_f64, f64::max);
    let length = (end_time * sample_rate as f64).ceil() as usize;

    let mut samples = vec![0.0_f32; length];
    for click in &clicks {
        click.tone.mix_into(&mut samples, 0, sample_rate);
    }
    for sample in samples.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }

    log::info!(
        "[Render] {} clicks over {} bar(s), {} samples at {} Hz",
        clicks.len(),
        bars,
        samples.len(),
        sample_rate
    );

    RenderedTrack {
        samples,
        sample_rate,
        clicks,
    }
}

/// Write a rendered track as a mono 32-bit float WAV file.
pub fn write_wav<P: AsRef<Path>>(track: &RenderedTrack, path: P) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: track.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &track.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::Subdivision;

    fn tempo(bpm: u32, beats_per_bar: u32, subdivision: Subdivision) -> TempoConfig {
        TempoConfig {
            bpm,
            beats_per_bar,
            subdivision,
            volume: 0.5,
        }
    }

    #[test]
    fn test_plan_matches_live_grid() {
        let clicks = plan_clicks(
            &AppConfig::default(),
            tempo(120, 4, Subdivision::Eighth),
            10,
        );

        assert_eq!(clicks.len(), 10);
        for (i, click) in clicks.iter().enumerate() {
            let expected = 0.05 + i as f64 * 0.25;
            assert!(
                (click.event.scheduled_time - expected).abs() < 1e-9,
                "click {i} at {}",
                click.event.scheduled_time
            );
            assert_eq!(click.event.beat, (i as u32 / 2) % 4);
            assert_eq!(click.event.sub_beat, i as u32 % 2);
        }
        assert_eq!(clicks[0].frequency, 1000.0);
        assert_eq!(clicks[1].frequency, 600.0);
        assert_eq!(clicks[2].frequency, 800.0);
    }

    #[test]
    fn test_plan_zero_clicks_is_empty() {
        let clicks = plan_clicks(&AppConfig::default(), TempoConfig::default(), 0);
        assert!(clicks.is_empty());
    }

    #[test]
    fn test_render_zero_bars_of_huge_meter_is_empty() {
        let track = render_click_track(
            &AppConfig::default(),
            tempo(120, 1 << 30, Subdivision::Sixteenth),
            0,
            8_000,
        );
        assert!(track.clicks.is_empty());
        assert!(track.samples.is_empty());
    }

    #[test]
    fn test_render_one_bar() {
        let sample_rate = 8_000;
        let track = render_click_track(
            &AppConfig::default(),
            tempo(120, 4, Subdivision::Quarter),
            1,
            sample_rate,
        );

        assert_eq!(track.clicks.len(), 4);
        // last click at 0.05 + 3 * 0.5, cut 55 ms later
        let expected_len = ((1.55 + 0.055) * sample_rate as f64).ceil() as usize;
        assert!(
            (track.samples.len() as i64 - expected_len as i64).abs() <= 1,
            "len {} vs {}",
            track.samples.len(),
            expected_len
        );

        let first_click = (0.05 * sample_rate as f64) as usize;
        assert!(track.samples[..first_click].iter().all(|&s| s == 0.0));
        assert!(track.samples.iter().any(|&s| s.abs() > 0.1));
        assert!(track.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_write_wav_round_trips_length() {
        let track = render_click_track(
            &AppConfig::default(),
            tempo(240, 2, Subdivision::Quarter),
            1,
            8_000,
        );
        let path = std::env::temp_dir().join(format!(
            "click_track_render_test_{}.wav",
            std::process::id()
        ));

        write_wav(&track, &path).expect("write wav");
        let reader = hound::WavReader::open(&path).expect("open wav");
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, track.samples.len());

        let _ = std::fs::remove_file(&path);
    }
}
