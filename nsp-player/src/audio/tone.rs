//! Synthesized identification tone
//!
//! Used by test mode for devices with no identification clip in the
//! library's `test/` folder, and by `--dry-run` rehearsals.

use crate::audio::SampleBuffer;
use crate::error::{Error, Result};
use std::f32::consts::PI;
use std::fmt;

/// Fade length at each end, so the tone starts and stops without clicks
const FADE_SECONDS: f64 = 0.01;

const IDENTIFICATION_BASE_HZ: f32 = 440.0;
const IDENTIFICATION_STEP_HZ: f32 = 110.0;

/// Sine tone parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestTone {
    pub frequency_hz: f32,
    pub duration_secs: f64,
    /// Peak amplitude, 0.0-1.0
    pub amplitude: f32,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for TestTone {
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            duration_secs: 1.0,
            amplitude: 0.5,
            sample_rate: 48000,
            channels: 1,
        }
    }
}

impl TestTone {
    pub fn new(frequency_hz: f32, duration_secs: f64) -> Self {
        Self {
            frequency_hz,
            duration_secs,
            ..Self::default()
        }
    }

    /// Tone identifying the device at `position` of a plan when it has no
    /// clip of its own; each position gets its own pitch.
    pub fn identification(position: usize) -> Self {
        Self::new(IDENTIFICATION_BASE_HZ + IDENTIFICATION_STEP_HZ * position as f32, 1.0)
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Render the tone.
    ///
    /// # Errors
    /// `Error::InvalidBuffer` for a non-positive duration or frequency.
    pub fn render(&self) -> Result<SampleBuffer> {
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(Error::InvalidBuffer(format!(
                "tone duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if !(self.frequency_hz.is_finite() && self.frequency_hz > 0.0) {
            return Err(Error::InvalidBuffer(format!(
                "tone frequency must be positive, got {}",
                self.frequency_hz
            )));
        }

        let rate = self.sample_rate as f64;
        let frames = (self.duration_secs * rate).round() as usize;
        let fade_frames = ((FADE_SECONDS * rate) as usize).min(frames / 2).max(1);
        let channels = self.channels.max(1) as usize;
        let amplitude = self.amplitude.clamp(0.0, 1.0);

        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let t = i as f32 / self.sample_rate as f32;
            let envelope = if i < fade_frames {
                i as f32 / fade_frames as f32
            } else if frames - i <= fade_frames {
                (frames - i - 1) as f32 / fade_frames as f32
            } else {
                1.0
            };
            let value = amplitude * envelope * (2.0 * PI * self.frequency_hz * t).sin();
            samples.extend(std::iter::repeat(value).take(channels));
        }

        SampleBuffer::new(samples, self.channels.max(1), self.sample_rate)
    }
}

impl fmt::Display for TestTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz tone ({:.2}s)", self.frequency_hz, self.duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_length_matches_duration() {
        let buffer = TestTone::new(1000.0, 0.5).with_sample_rate(44100).render().unwrap();
        assert_eq!(buffer.frames(), 22050);
        assert_eq!(buffer.sample_rate(), 44100);
    }

    #[test]
    fn test_tone_is_faded_at_both_ends() {
        let buffer = TestTone::new(440.0, 0.2).render().unwrap();
        let samples = buffer.samples();
        assert_eq!(samples[0], 0.0);
        assert_eq!(*samples.last().unwrap(), 0.0);
    }

    #[test]
    fn test_tone_respects_amplitude() {
        let tone = TestTone {
            amplitude: 0.25,
            ..TestTone::new(440.0, 0.5)
        };
        let peak = tone
            .render()
            .unwrap()
            .samples()
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak <= 0.25 + 1e-6);
        assert!(peak > 0.2);
    }

    #[test]
    fn test_stereo_tone_duplicates_channels() {
        let tone = TestTone {
            channels: 2,
            ..TestTone::new(440.0, 0.1)
        };
        let buffer = tone.render().unwrap();
        let frame = buffer.frame(100).unwrap();
        assert_eq!(frame[0], frame[1]);
    }

    #[test]
    fn test_identification_tones_differ_by_position() {
        assert_eq!(TestTone::identification(0).frequency_hz, 440.0);
        assert_eq!(TestTone::identification(2).frequency_hz, 660.0);
        assert_ne!(TestTone::identification(1), TestTone::identification(3));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(TestTone::new(440.0, 0.0).render().is_err());
        assert!(TestTone::new(0.0, 1.0).render().is_err());
        assert!(TestTone::new(440.0, f64::NAN).render().is_err());
    }
}
