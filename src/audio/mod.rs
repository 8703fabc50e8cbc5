//! Audio subsystem: PCM transport codec, microphone capture, and scheduled
//! playback.

pub mod capture;
pub mod codec;
pub mod playback;
pub mod ring_buffer;
