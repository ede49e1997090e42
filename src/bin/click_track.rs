use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use click_track::audio::render::{plan_clicks, render_click_track, write_wav};
use click_track::config::AppConfig;
use click_track::engine::{AudioBackend, CpalBackend, MetronomeHandle, SilentBackend};
use click_track::tempo::{Subdivision, TapTempo, TempoConfig, TempoPatch};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "click_track", about = "Sample-accurate metronome click track")]
struct Cli {
    /// Tuning config file (defaults to $CLICK_TRACK_CONFIG or assets/click_track.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log verbosity on stderr
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct TempoArgs {
    #[arg(long, default_value_t = 120)]
    bpm: u32,
    #[arg(long, default_value_t = 4)]
    beats: u32,
    /// Pulses per beat: 1 quarter, 2 eighth, 3 triplet, 4 sixteenth
    #[arg(long, default_value = "1", value_parser = parse_subdivision)]
    subdivision: Subdivision,
    #[arg(long, default_value_t = 0.5)]
    volume: f32,
}

impl TempoArgs {
    fn to_config(self) -> Result<TempoConfig> {
        let config = TempoConfig {
            bpm: self.bpm,
            beats_per_bar: self.beats,
            subdivision: self.subdivision,
            volume: self.volume,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the click track and print the active beat as JSON lines
    Play {
        #[command(flatten)]
        tempo: TempoArgs,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 8.0)]
        seconds: f64,
        /// Run on a silent clock instead of the output device
        #[arg(long)]
        silent: bool,
    },
    /// Print the first clicks of a run starting at t=0 as JSON lines
    Schedule {
        #[command(flatten)]
        tempo: TempoArgs,
        #[arg(long, default_value_t = 16)]
        count: usize,
    },
    /// Render whole bars to a mono WAV file
    Render {
        #[command(flatten)]
        tempo: TempoArgs,
        #[arg(long, default_value_t = 4)]
        bars: u32,
        #[arg(long, default_value_t = 48_000)]
        sample_rate: u32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Feed tap timestamps (ms) to the tap-tempo estimator
    Tap {
        #[arg(required = true)]
        taps_ms: Vec<f64>,
    },
}

fn parse_subdivision(raw: &str) -> Result<Subdivision, String> {
    let value: u32 = raw
        .parse()
        .map_err(|_| format!("expected 1-4, got '{raw}'"))?;
    Subdivision::try_from(value).map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    click_track::init_logging(cli.log_level);

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Play {
            tempo,
            seconds,
            silent,
        } => run_play(config, tempo.to_config()?, seconds, silent),
        Commands::Schedule { tempo, count } => run_schedule(&config, tempo.to_config()?, count),
        Commands::Render {
            tempo,
            bars,
            sample_rate,
            output,
        } => run_render(&config, tempo.to_config()?, bars, sample_rate, output),
        Commands::Tap { taps_ms } => run_tap(&config, &taps_ms),
    }
}

#[derive(Serialize)]
struct ActiveBeatLine {
    elapsed_ms: u64,
    beat: u32,
    sub_beat: u32,
}

fn run_play(config: AppConfig, tempo: TempoConfig, seconds: f64, silent: bool) -> Result<ExitCode> {
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("--seconds must be a positive number");
    }

    let backend: Arc<dyn AudioBackend> = if silent {
        Arc::new(SilentBackend::new())
    } else {
        Arc::new(CpalBackend::new(config.audio.clone()))
    };
    let poll = config.relay.poll_interval();
    let handle = MetronomeHandle::with_backend(config, backend);
    handle.apply_patch(&TempoPatch {
        bpm: Some(tempo.bpm.into()),
        beats_per_bar: Some(tempo.beats_per_bar),
        subdivision: Some(tempo.subdivision.pulses()),
        volume: Some(tempo.volume),
    });

    let mut active = handle.subscribe_active_beat();
    handle
        .play()
        .with_context(|| format!("starting {} backend", handle.backend_name()))?;

    let started = Instant::now();
    let deadline = started + Duration::from_secs_f64(seconds);
    while Instant::now() < deadline {
        if active.has_changed().unwrap_or(false) {
            if let Some(beat) = *active.borrow_and_update() {
                let line = ActiveBeatLine {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    beat: beat.beat,
                    sub_beat: beat.sub_beat,
                };
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        std::thread::sleep(poll / 2);
    }

    handle.stop();
    Ok(ExitCode::from(0))
}

fn run_schedule(config: &AppConfig, tempo: TempoConfig, count: usize) -> Result<ExitCode> {
    for click in plan_clicks(config, tempo, count) {
        println!("{}", serde_json::to_string(&click)?);
    }
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
struct RenderSummary {
    output: String,
    clicks: usize,
    samples: usize,
    sample_rate: u32,
    duration_secs: f64,
}

fn run_render(
    config: &AppConfig,
    tempo: TempoConfig,
    bars: u32,
    sample_rate: u32,
    output: PathBuf,
) -> Result<ExitCode> {
    if sample_rate == 0 {
        bail!("--sample-rate must be positive");
    }

    let track = render_click_track(config, tempo, bars, sample_rate);
    write_wav(&track, &output).with_context(|| format!("writing {}", output.display()))?;

    let summary = RenderSummary {
        output: output.display().to_string(),
        clicks: track.clicks.len(),
        samples: track.samples.len(),
        sample_rate: track.sample_rate,
        duration_secs: track.duration_secs(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
struct TapLine {
    tap_ms: f64,
    bpm: Option<u32>,
}

fn run_tap(config: &AppConfig, taps_ms: &[f64]) -> Result<ExitCode> {
    let mut tapper = TapTempo::new(&config.tap);
    for &tap_ms in taps_ms {
        let line = TapLine {
            tap_ms,
            bpm: tapper.record_tap(tap_ms),
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(ExitCode::from(0))
}
