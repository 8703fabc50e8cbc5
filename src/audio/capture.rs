//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device, captures at its native sample
//! rate, downmixes and resamples to 16 kHz mono, and delivers fixed
//! 4096-sample chunks to a sink callback until stopped. Samples cross from
//! the cpal callback thread to the chunker thread through a lock-free ring
//! buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{error, info};

use super::ring_buffer::{sample_ring_buffer, SampleConsumer};
use crate::error::VoiceError;

/// Input sample rate expected by the live endpoint.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Chunk size in samples (256 ms at 16 kHz). One transport frame per chunk.
pub const CHUNK_SAMPLES: usize = 4096;

/// List available input device names.
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.input_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// List available output device names.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.output_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// Wrapper to make `cpal::Stream` Send.
///
/// The stream is only kept alive and eventually dropped; its audio callback
/// runs on a thread cpal manages internally.
struct SendStream(#[allow(dead_code)] Stream);

// SAFETY: the stream is never accessed after creation, only dropped.
unsafe impl Send for SendStream {}

/// Resolved info about the audio input we will use.
struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
}

/// Find and configure the input device.
fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig, VoiceError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| VoiceError::Device(format!("failed to enumerate input devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| VoiceError::Device(format!("input device not found: {name}")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| VoiceError::Device("no default input device available".into()))?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device
        .default_input_config()
        .map_err(|e| VoiceError::Device(format!("failed to get default input config: {e}")))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels, "Input device config (will resample to {}Hz mono if needed)", INPUT_SAMPLE_RATE,
    );

    Ok(CaptureConfig {
        device,
        stream_config,
        native_rate,
    })
}

/// Simple linear resampler from `from_rate` to `to_rate`, mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Accumulates samples and emits exactly `size`-sample chunks.
struct Chunker {
    buf: Vec<f32>,
    size: usize,
}

impl Chunker {
    fn new(size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(size * 2),
            size,
        }
    }

    /// Feed samples in; invoke `emit` once per completed chunk.
    fn push(&mut self, samples: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        self.buf.extend_from_slice(samples);
        while self.buf.len() >= self.size {
            let chunk: Vec<f32> = self.buf.drain(..self.size).collect();
            emit(chunk);
        }
    }
}

/// A running capture pipeline. Dropping it stops capture.
pub struct CaptureHandle {
    live: Arc<AtomicBool>,
    stream: Option<SendStream>,
    chunker: Option<std::thread::JoinHandle<()>>,
}

impl CaptureHandle {
    /// Stop capture and release the input device. Idempotent.
    ///
    /// Joins the chunker thread before returning, so no chunk is delivered
    /// to the sink after this returns.
    pub fn stop(&mut self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        // Dropping the stream disconnects the device and its callback.
        self.stream.take();
        if let Some(handle) = self.chunker.take() {
            if handle.join().is_err() {
                error!("Chunker thread panicked");
            }
        }
        info!("Audio capture stopped");
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Chunker thread body: drain the ring buffer into fixed-size chunks and
/// deliver them to the sink until the live flag drops.
fn run_chunker(
    live: Arc<AtomicBool>,
    mut consumer: SampleConsumer,
    mut sink: impl FnMut(Vec<f32>),
) {
    let mut framer = Chunker::new(CHUNK_SAMPLES);
    let mut read_buf = vec![0.0f32; CHUNK_SAMPLES];
    while live.load(Ordering::SeqCst) {
        let read = consumer.pop_slice(&mut read_buf);
        if read == 0 {
            std::thread::sleep(Duration::from_millis(10));
            continue;
        }
        framer.push(&read_buf[..read], &mut sink);
    }
}

/// Start audio capture, delivering 4096-sample 16 kHz mono chunks to `sink`.
///
/// `device_name` of `None` uses the system default input.
pub fn start_capture(
    device_name: Option<&str>,
    sink: impl FnMut(Vec<f32>) + Send + 'static,
) -> Result<CaptureHandle, VoiceError> {
    let cfg = resolve_device(device_name)?;
    let native_rate = cfg.native_rate;
    let channels = cfg.stream_config.channels;
    let needs_resample = native_rate != INPUT_SAMPLE_RATE;
    let needs_downmix = channels > 1;

    let (mut producer, consumer) = sample_ring_buffer(None);

    let stream = cfg
        .device
        .build_input_stream(
            &cfg.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };

                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, INPUT_SAMPLE_RATE)
                } else {
                    mono
                };

                // Ring buffer full means the chunker fell behind; oldest
                // audio is dropped and the consumer catches up.
                producer.push_slice(&resampled);
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None, // no timeout
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => VoiceError::Permission(
                "microphone unavailable or access denied".into(),
            ),
            other => VoiceError::Device(format!("failed to build input stream: {other}")),
        })?;

    stream
        .play()
        .map_err(|e| VoiceError::Device(format!("failed to start input stream: {e}")))?;

    let live = Arc::new(AtomicBool::new(true));
    let live_chunker = Arc::clone(&live);

    let chunker = std::thread::spawn(move || run_chunker(live_chunker, consumer, sink));

    info!(chunk_samples = CHUNK_SAMPLES, "Audio capture started");

    Ok(CaptureHandle {
        live,
        stream: Some(SendStream(stream)),
        chunker: Some(chunker),
    })
}
