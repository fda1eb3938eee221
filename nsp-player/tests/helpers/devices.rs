//! Simulated device fixtures

use nsp_player::audio::{ActivityRecorder, SampleBuffer, SimulatedBackend, StreamActivity};
use nsp_player::catalog::DeviceInfo;
use nsp_player::DeviceId;
use std::time::Instant;

/// Output rate used by most scheduler tests
pub const RATE: u32 = 48000;

/// Simulated devices with the given native rates, ids `0..rates.len()`
pub fn backend_with_rates(rates: &[u32]) -> SimulatedBackend {
    let devices = rates
        .iter()
        .enumerate()
        .map(|(i, &rate)| DeviceInfo {
            id: DeviceId(i as u32),
            name: format!("Test speaker {}", i),
            native_sample_rate: rate,
            max_output_channels: 2,
        })
        .collect();
    SimulatedBackend::new(devices)
}

/// Constant mono buffer, so every emitted frame of real audio is non-zero
pub fn constant_buffer(seconds: f64) -> SampleBuffer {
    let frames = (seconds * RATE as f64).round() as usize;
    SampleBuffer::new(vec![0.25; frames], 1, RATE).unwrap()
}

/// Activity for one device, in start order
pub fn activity_for(recorder: &ActivityRecorder, device: u32) -> Vec<StreamActivity> {
    recorder
        .activity()
        .into_iter()
        .filter(|a| a.device == DeviceId(device))
        .collect()
}

/// Start time of a stream relative to `origin`, in milliseconds
pub fn millis_since(origin: Instant, at: Instant) -> f64 {
    at.saturating_duration_since(origin).as_secs_f64() * 1000.0
}
