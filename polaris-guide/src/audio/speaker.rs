//! Sound card output via cpal
//!
//! Each clip is decoded up front and played on its own thread, which owns
//! the cpal stream for the clip's lifetime.

use crate::audio::decode::{self, DecodedAudio};
use crate::audio::output::{AudioOutput, FlagControl, PlaybackHandle, PlaybackOutcome};
use crate::audio::resource::AudioResource;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Playback cursor shared with the audio callback
struct ClipSource {
    audio: DecodedAudio,
    /// Source frames advanced per output frame
    step: f64,
    position: Mutex<f64>,
    muted: Arc<AtomicBool>,
    done: AtomicBool,
    error: Mutex<Option<String>>,
}

impl ClipSource {
    fn fill<T>(&self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        let src_channels = usize::from(self.audio.channels.max(1));
        let frames = self.audio.frames();
        let muted = self.muted.load(Ordering::Relaxed);
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);

        for frame in data.chunks_mut(channels) {
            let index = *position as usize;
            if index >= frames {
                for out in frame.iter_mut() {
                    *out = T::from_sample(0.0f32);
                }
                self.done.store(true, Ordering::SeqCst);
                continue;
            }
            for (c, out) in frame.iter_mut().enumerate() {
                let sample = if muted {
                    0.0
                } else {
                    self.audio.samples[index * src_channels + c.min(src_channels - 1)]
                };
                *out = T::from_sample(sample.clamp(-1.0, 1.0));
            }
            *position += self.step;
        }
    }
}

/// Plays clips on the default output device
pub struct SpeakerOutput {
    device_name: String,
}

impl SpeakerOutput {
    /// Check that an output device exists
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("No default output device".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!("Using audio output device: {}", device_name);
        Ok(Self { device_name })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// Prefer a config matching the clip's rate and channel count
fn pick_config(device: &cpal::Device, audio: &DecodedAudio) -> Result<(StreamConfig, SampleFormat)> {
    let rate = audio.sample_rate;
    let matching = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(format!("Failed to get device configs: {}", e)))?
        .find(|c| {
            c.channels() == audio.channels
                && c.min_sample_rate().0 <= rate
                && c.max_sample_rate().0 >= rate
                && c.sample_format() == SampleFormat::F32
        });

    if let Some(supported) = matching {
        let format = supported.sample_format();
        return Ok((supported.with_sample_rate(cpal::SampleRate(rate)).config(), format));
    }

    let supported = device
        .default_output_config()
        .map_err(|e| Error::Audio(format!("Failed to get default config: {}", e)))?;
    let format = supported.sample_format();
    Ok((supported.config(), format))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    source: Arc<ClipSource>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let errors = Arc::clone(&source);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| source.fill(data, channels),
            move |err| {
                error!("Audio stream error: {}", err);
                *errors.error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::Audio(format!("Failed to build stream: {}", e)))
}

fn open_stream(audio: DecodedAudio, muted: Arc<AtomicBool>) -> Result<(Stream, Arc<ClipSource>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("No default output device".to_string()))?;
    let (config, format) = pick_config(&device, &audio)?;

    let source = Arc::new(ClipSource {
        step: f64::from(audio.sample_rate) / f64::from(config.sample_rate.0),
        audio,
        position: Mutex::new(0.0),
        muted,
        done: AtomicBool::new(false),
        error: Mutex::new(None),
    });

    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&source))?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&source))?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&source))?,
        other => {
            return Err(Error::Audio(format!("Unsupported sample format: {:?}", other)));
        }
    };
    stream
        .play()
        .map_err(|e| Error::Audio(format!("Failed to start stream: {}", e)))?;
    Ok((stream, source))
}

impl AudioOutput for SpeakerOutput {
    fn start(&self, resource: &AudioResource, muted: bool) -> Result<PlaybackHandle> {
        let audio = decode::decode_file(resource.path())?;
        let muted = Arc::new(AtomicBool::new(muted));
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let token = cancel.clone();
        let thread_muted = Arc::clone(&muted);
        std::thread::spawn(move || {
            let (stream, source) = match open_stream(audio, thread_muted) {
                Ok(opened) => opened,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            let outcome = loop {
                if token.is_cancelled() {
                    break None;
                }
                if source.done.load(Ordering::SeqCst) {
                    break Some(PlaybackOutcome::Ended);
                }
                if let Some(err) = source
                    .error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                {
                    break Some(PlaybackOutcome::Failed(err));
                }
                std::thread::sleep(POLL_INTERVAL);
            };

            drop(stream);
            if let Some(outcome) = outcome {
                let _ = tx.send(outcome);
            }
        });

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("Playback thread exited".to_string()))??;

        Ok(PlaybackHandle {
            control: Box::new(FlagControl { muted, cancel }),
            finished: rx,
        })
    }
}
