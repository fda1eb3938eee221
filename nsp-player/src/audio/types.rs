//! Core audio data types
//!
//! **Format:**
//! - Samples are f32 (floating point -1.0 to 1.0)
//! - Interleaved frames: `[c0, c1, .., cN, c0, c1, ..]`
//! - Sample rate is whatever the source was decoded at; nothing is resampled

use crate::error::{Error, Result};
use std::sync::Arc;

/// Decoded audio shared read-only between a session and every stream.
///
/// Cloning is cheap (reference counted); the sample data is never mutated
/// after construction, so any number of streams may read it concurrently.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
    frames: usize,
}

impl SampleBuffer {
    /// Wrap interleaved samples.
    ///
    /// # Errors
    /// `Error::InvalidBuffer` when `channels` or `sample_rate` is zero, or the
    /// sample count is not a whole number of frames.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidBuffer("channel count must be at least 1".to_string()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidBuffer("sample rate must be greater than zero".to_string()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(Error::InvalidBuffer(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }

        let frames = samples.len() / channels as usize;
        Ok(Self {
            samples: samples.into(),
            channels,
            sample_rate,
            frames,
        })
    }

    /// Silent buffer of the given length
    pub fn silence(frames: usize, channels: u16, sample_rate: u32) -> Result<Self> {
        Self::new(vec![0.0; frames * channels as usize], channels, sample_rate)
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Native sample rate the data was decoded or synthesized at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in seconds at the native rate
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// All samples, interleaved
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// One frame's samples, `None` past the end
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        if index >= self.frames {
            return None;
        }
        let start = index * self.channels as usize;
        Some(&self.samples[start..start + self.channels as usize])
    }

    /// Sample for output channel `channel` of frame `index`.
    ///
    /// Output channels beyond the buffer's wrap around (mono feeds every
    /// output); frames past the end are silence.
    pub fn sample_for_output(&self, index: usize, channel: usize) -> f32 {
        match self.frame(index) {
            Some(frame) => frame[channel % frame.len()],
            None => 0.0,
        }
    }
}

/// Lifecycle of one playback handle.
///
/// Handles are never reused: a stopped handle is dropped and the next group
/// opens a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Device opened, nothing emitted yet
    Open,
    /// Emitting frames
    Streaming,
    /// Stopped explicitly or after completion
    Stopped,
}
