//! Gapless playback scheduling via rodio.
//!
//! Segments are rendered back-to-back in arrival order on a monotonically
//! advancing timeline. `interrupt` drops everything queued (barge-in) and
//! rewinds the watermark to "now"; muting only zeroes the output gain, so
//! scheduling and decoding continue while silent.

use std::time::Instant;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, info, warn};

use super::codec::PlaybackSegment;
use crate::error::VoiceError;

/// Output sample rate delivered by the live endpoint.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Tracks the next available start time on the playback clock.
///
/// All times are in seconds on a caller-supplied monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    next_start: f64,
}

impl Timeline {
    pub fn new() -> Self {
        Self { next_start: 0.0 }
    }

    /// Place a segment of `duration` seconds arriving at `now`.
    ///
    /// Returns its start time: back-to-back with whatever is already
    /// scheduled, never earlier than `now`. Advances the watermark.
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = if self.next_start > now {
            self.next_start
        } else {
            now
        };
        self.next_start = start + duration;
        start
    }

    /// Rewind the watermark to `now` (everything scheduled was cancelled).
    pub fn reset(&mut self, now: f64) {
        self.next_start = now;
    }

    /// The current watermark.
    pub fn watermark(&self) -> f64 {
        self.next_start
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper to make `rodio::OutputStream` Send.
///
/// The stream is only kept alive and eventually dropped; audio rendering
/// runs on a thread rodio manages internally.
struct SendOutput(#[allow(dead_code)] OutputStream);

// SAFETY: the output stream is never accessed after creation, only dropped.
unsafe impl Send for SendOutput {}

/// Owns the output device and schedules decoded segments for gapless play.
pub struct PlaybackScheduler {
    _stream: SendOutput,
    handle: OutputStreamHandle,
    sink: Sink,
    muted: bool,
    timeline: Timeline,
    epoch: Instant,
}

impl PlaybackScheduler {
    /// Open the default audio output device.
    pub fn new() -> Result<Self, VoiceError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| VoiceError::Device(format!("failed to open audio output: {e}")))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| VoiceError::Device(format!("failed to create audio sink: {e}")))?;

        info!("Playback scheduler ready");

        Ok(Self {
            _stream: SendOutput(stream),
            handle,
            sink,
            muted: false,
            timeline: Timeline::new(),
            epoch: Instant::now(),
        })
    }

    /// Seconds elapsed on the scheduler's clock.
    fn clock(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Schedule a segment directly after the last one (or now, whichever is
    /// later). Returns the scheduled start time.
    pub fn enqueue(&mut self, segment: PlaybackSegment) -> f64 {
        let duration = segment.duration_secs();
        let start = self.timeline.schedule(self.clock(), duration);
        debug!(
            samples = segment.samples.len(),
            start = format!("{:.3}", start),
            "Segment scheduled"
        );
        self.sink.append(SamplesBuffer::new(
            segment.channels,
            segment.sample_rate,
            segment.samples,
        ));
        start
    }

    /// Cancel every scheduled segment, including ones that have not started,
    /// and rewind the watermark to now.
    ///
    /// Replaces the sink rather than reusing the stopped one: appending to
    /// a stopped sink can block until its flushed sources settle, which
    /// would stall the session task right after a barge-in.
    pub fn interrupt(&mut self) {
        let queued = self.sink.len();
        self.sink.stop();
        match Sink::try_new(&self.handle) {
            Ok(sink) => {
                sink.set_volume(if self.muted { 0.0 } else { 1.0 });
                self.sink = sink;
            }
            Err(e) => warn!("Could not replace audio sink: {}", e),
        }
        self.timeline.reset(self.clock());
        if queued > 0 {
            info!(dropped = queued, "Playback interrupted");
        }
    }

    /// Silence or restore output without touching the schedule.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.sink.set_volume(if muted { 0.0 } else { 1.0 });
    }
}
