//! CpalClock - the audio device's own timeline as clock source
//!
//! The output stream callback is the timing authority: it counts rendered
//! frames and mixes every scheduled tone sample-accurately at its absolute
//! start frame. The scheduler only ever pushes tones ahead of time through a
//! lock-free SPSC ring, so jitter in the scheduling thread never reaches the
//! audio.
//!
//! Thread safety:
//! - frame counter: AtomicU64 written by the callback, read by `now()`
//! - tone queue: rtrb SPSC ring (producer behind a mutex, single consumer
//!   in the callback)
//! - the cpal stream itself is owned by a dedicated thread because it may
//!   not be `Send`; resume/shutdown requests reach it over a channel

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use rtrb::{Consumer, Producer, RingBuffer};

use super::click::ToneRequest;
use crate::config::AudioConfig;
use crate::error::AudioError;

enum StreamCommand {
    Resume(mpsc::Sender<Result<(), AudioError>>),
    Shutdown,
}

pub struct CpalClock {
    frame_counter: Arc<AtomicU64>,
    sample_rate: u32,
    tones: Mutex<Producer<ToneRequest>>,
    control: Mutex<mpsc::Sender<StreamCommand>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CpalClock {
    /// Open the default output device. The stream starts suspended; call
    /// [`CpalClock::resume`] to start the timeline.
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let frame_counter = Arc::new(AtomicU64::new(0));
        let (producer, consumer) = RingBuffer::new(config.tone_queue_capacity.max(1));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (control_tx, control_rx) = mpsc::channel();

        let stream_frames = Arc::clone(&frame_counter);
        let max_voices = config.max_voices.max(1);
        let worker = std::thread::Builder::new()
            .name("click-track-output".to_string())
            .spawn(move || {
                match create_output_stream(consumer, stream_frames, max_voices) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        run_stream_owner(stream, control_rx);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to spawn output thread: {}", e),
            })?;

        let sample_rate = ready_rx.recv().map_err(|_| AudioError::StreamFailure {
            reason: "output thread exited before reporting".to_string(),
        })??;

        log::info!("[CpalClock] Output stream opened at {} Hz", sample_rate);

        Ok(Self {
            frame_counter,
            sample_rate,
            tones: Mutex::new(producer),
            control: Mutex::new(control_tx),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio rendered so far.
    pub fn now(&self) -> f64 {
        self.frame_counter.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    pub fn schedule_tone(&self, tone: ToneRequest) -> Result<(), AudioError> {
        let mut producer = self.tones.lock().map_err(|_| AudioError::LockPoisoned {
            component: "tone_queue".to_string(),
        })?;
        producer.push(tone).map_err(|_| AudioError::ToneQueueFull)
    }

    /// Start (or restart) the device timeline.
    pub fn resume(&self) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        {
            let control = self.control.lock().map_err(|_| AudioError::LockPoisoned {
                component: "stream_control".to_string(),
            })?;
            control
                .send(StreamCommand::Resume(reply_tx))
                .map_err(|_| AudioError::StreamFailure {
                    reason: "output thread is gone".to_string(),
                })?;
        }
        reply_rx.recv().map_err(|_| AudioError::StreamFailure {
            reason: "output thread dropped resume reply".to_string(),
        })?
    }
}

impl Drop for CpalClock {
    fn drop(&mut self) {
        if let Ok(control) = self.control.lock() {
            let _ = control.send(StreamCommand::Shutdown);
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_stream_owner(stream: cpal::Stream, control_rx: mpsc::Receiver<StreamCommand>) {
    for command in control_rx {
        match command {
            StreamCommand::Resume(reply) => {
                let result = stream.play().map_err(|e| AudioError::HardwareError {
                    details: format!("Output start failed: {}", e),
                });
                let _ = reply.send(result);
            }
            StreamCommand::Shutdown => break,
        }
    }
    drop(stream);
    log::info!("[CpalClock] Output stream closed");
}

fn create_output_stream(
    consumer: Consumer<ToneRequest>,
    frame_counter: Arc<AtomicU64>,
    max_voices: usize,
) -> Result<(cpal::Stream, u32), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })?;

    let config = device
        .default_output_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    let sample_rate = stream_config.sample_rate.0;

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, consumer, frame_counter, max_voices)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, consumer, frame_counter, max_voices)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &stream_config, consumer, frame_counter, max_voices)
        }
        other => {
            return Err(AudioError::StreamOpenFailed {
                reason: format!("Unsupported output sample format {:?}", other),
            })
        }
    }?;

    // Some hosts start streams on creation; hold the timeline until resume.
    if let Err(err) = stream.pause() {
        log::warn!("[CpalClock] Could not pause new stream: {}", err);
    }

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    mut consumer: Consumer<ToneRequest>,
    frame_counter: Arc<AtomicU64>,
    max_voices: usize,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels_count = stream_config.channels as usize;
    let sample_rate = stream_config.sample_rate.0;
    let mut voices: Vec<ToneRequest> = Vec::with_capacity(max_voices);
    let mut mono: Vec<f32> = Vec::with_capacity(8192);

    let err_fn = |err: cpal::StreamError| eprintln!("Output stream error: {}", err);

    device
        .build_output_stream(
            stream_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Real-time audio callback - no locks, no logging
                while let Ok(tone) = consumer.pop() {
                    if voices.len() < voices.capacity() {
                        voices.push(tone);
                    }
                }

                let frame_count = data.len() / channels_count;
                let first_frame = frame_counter.load(Ordering::Relaxed);

                // Allocates only if the host grows its buffer past the initial size
                mono.clear();
                mono.resize(frame_count, 0.0);

                for voice in &voices {
                    voice.mix_into(&mut mono, first_frame, sample_rate);
                }

                for (frame, &value) in data.chunks_mut(channels_count).zip(mono.iter()) {
                    let sample = T::from_sample(value.clamp(-1.0, 1.0));
                    for slot in frame.iter_mut() {
                        *slot = sample;
                    }
                }

                let end_time = (first_frame + frame_count as u64) as f64 / sample_rate as f64;
                voices.retain(|voice| voice.stop_time > end_time);

                frame_counter.fetch_add(frame_count as u64, Ordering::Release);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })
}
