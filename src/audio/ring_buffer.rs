//! Lock-free SPSC ring buffer for captured audio samples.
//!
//! Carries f32 samples from the cpal callback thread to the chunker thread
//! without locks.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~4 seconds of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 64_000;

/// Producer half — lives in the cpal audio callback.
pub struct SampleProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half — lives in the chunker thread.
pub struct SampleConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair.
pub fn sample_ring_buffer(capacity: Option<usize>) -> (SampleProducer, SampleConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<f32>::new(cap);
    let (prod, cons) = rb.split();
    (SampleProducer { inner: prod }, SampleConsumer { inner: cons })
}

impl SampleProducer {
    /// Push a slice of samples. Returns how many were written (less than
    /// `samples.len()` when the buffer is full).
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl SampleConsumer {
    /// Pop up to `buf.len()` samples into `buf`. Returns how many were read.
    pub fn pop_slice(&mut self, buf: &mut [f32]) -> usize {
        self.inner.pop_slice(buf)
    }

    /// Number of samples currently available for reading.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_round_trip() {
        let (mut prod, mut cons) = sample_ring_buffer(Some(8));
        assert_eq!(prod.push_slice(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(cons.available(), 3);
        let mut out = [0.0f32; 3];
        assert_eq!(cons.pop_slice(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_push_past_capacity_truncates() {
        let (mut prod, cons) = sample_ring_buffer(Some(4));
        let written = prod.push_slice(&[0.0; 10]);
        assert_eq!(written, 4);
        assert_eq!(cons.available(), 4);
    }
}
