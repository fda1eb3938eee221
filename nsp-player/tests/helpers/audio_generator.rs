//! Audio Test File Generation Utilities
//!
//! Generates simple WAV files with known characteristics (length, rate,
//! channel count) so decode and playback results can be checked exactly.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Layout of a generated file
#[derive(Debug, Clone, Copy)]
pub struct WavLayout {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for WavLayout {
    fn default() -> Self {
        Self {
            sample_rate: TEST_SAMPLE_RATE,
            channels: 2,
        }
    }
}

/// Frames covering `duration_ms` at `sample_rate`
pub fn frame_count(sample_rate: u32, duration_ms: u64) -> u64 {
    (sample_rate as u64 * duration_ms) / 1000
}

/// Generate a silent 16-bit WAV file
pub fn generate_silent_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    layout: WavLayout,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: layout.channels,
        sample_rate: layout.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_samples = frame_count(layout.sample_rate, duration_ms) * layout.channels as u64;

    // Write silence (zeros)
    for _ in 0..total_samples {
        writer.write_sample(0i16)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a 16-bit sine WAV file, same signal on every channel
///
/// # Example
/// ```no_run
/// # use std::path::Path;
/// // 1 second of 440 Hz at 50% amplitude, 44.1kHz stereo
/// generate_sine_wav(Path::new("/tmp/sine_440hz_1s.wav"), 1000, 440.0, 0.5, WavLayout::default())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
    layout: WavLayout,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: layout.channels,
        sample_rate: layout.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = frame_count(layout.sample_rate, duration_ms);
    let amplitude_i16 = (amplitude * i16::MAX as f32) as i16;

    for frame_idx in 0..total_frames {
        let t = frame_idx as f32 / layout.sample_rate as f32;
        let sample_value = (2.0 * PI * frequency_hz * t).sin();
        let sample_i16 = (sample_value * amplitude_i16 as f32) as i16;

        for _ in 0..layout.channels {
            writer.write_sample(sample_i16)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
