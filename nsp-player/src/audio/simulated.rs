//! Simulated output devices
//!
//! A hardware-free backend used by `--dry-run` and by the scheduler and
//! session tests. Each stream runs its cursor on a plain thread, paced in
//! real time at the stream's sample rate, and reports what it did to an
//! [`ActivityRecorder`].

use crate::audio::buffer::{FillStatus, FrameCursor};
use crate::audio::stream::{EndOfStream, OutputBackend, PlaybackStream};
use crate::audio::{SampleBuffer, StreamState};
use crate::catalog::{DeviceCatalog, DeviceInfo};
use crate::error::{Error, Result};
use crate::plan::DeviceId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default callback size: 10ms at 48kHz
const DEFAULT_CHUNK_FRAMES: usize = 480;

/// What one simulated stream did
#[derive(Debug, Clone)]
pub struct StreamActivity {
    pub device: DeviceId,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
    /// Frames handed to the "transport", including silence padding
    pub frames_emitted: usize,
    /// Frames with at least one non-zero sample
    pub audible_frames: usize,
}

#[derive(Debug, Default)]
struct RecorderState {
    activity: Vec<StreamActivity>,
    active: usize,
    max_concurrent: usize,
}

/// Shared log of simulated stream activity
#[derive(Debug, Clone, Default)]
pub struct ActivityRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl ActivityRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stream started so far, in start order
    pub fn activity(&self) -> Vec<StreamActivity> {
        self.state
            .lock()
            .map(|state| state.activity.clone())
            .unwrap_or_default()
    }

    /// Highest number of streams that were emitting at the same time
    pub fn max_concurrent(&self) -> usize {
        self.state.lock().map(|state| state.max_concurrent).unwrap_or(0)
    }

    fn record_start(&self, device: DeviceId, started_at: Instant) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        state.active += 1;
        state.max_concurrent = state.max_concurrent.max(state.active);
        state.activity.push(StreamActivity {
            device,
            started_at,
            finished_at: None,
            frames_emitted: 0,
            audible_frames: 0,
        });
        state.activity.len() - 1
    }

    fn record_finish(&self, index: usize, frames_emitted: usize, audible_frames: usize) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.active = state.active.saturating_sub(1);
        if let Some(entry) = state.activity.get_mut(index) {
            entry.finished_at = Some(Instant::now());
            entry.frames_emitted = frames_emitted;
            entry.audible_frames = audible_frames;
        }
    }
}

/// Simulated device set, acting as both catalog and output backend
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    devices: Vec<DeviceInfo>,
    unavailable: HashSet<DeviceId>,
    stalled: HashSet<DeviceId>,
    chunk_frames: usize,
    recorder: ActivityRecorder,
}

impl SimulatedBackend {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            unavailable: HashSet::new(),
            stalled: HashSet::new(),
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            recorder: ActivityRecorder::new(),
        }
    }

    /// Devices `0..count`, all with the same rate and channel count
    pub fn uniform(count: u32, sample_rate: u32, channels: u16) -> Self {
        let devices = (0..count)
            .map(|i| DeviceInfo {
                id: DeviceId(i),
                name: format!("Simulated speaker {}", i),
                native_sample_rate: sample_rate,
                max_output_channels: channels,
            })
            .collect();
        Self::new(devices)
    }

    /// Listed by the catalog, but every open fails
    pub fn with_unavailable(mut self, device: DeviceId) -> Self {
        self.unavailable.insert(device);
        self
    }

    /// Opens and starts, but never emits a frame
    pub fn with_stalled(mut self, device: DeviceId) -> Self {
        self.stalled.insert(device);
        self
    }

    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = chunk_frames.max(1);
        self
    }

    pub fn recorder(&self) -> ActivityRecorder {
        self.recorder.clone()
    }
}

impl DeviceCatalog for SimulatedBackend {
    fn list(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }
}

impl OutputBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open_output(
        &self,
        device: DeviceId,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn PlaybackStream>> {
        let info = self
            .devices
            .iter()
            .find(|d| d.id == device)
            .ok_or_else(|| Error::DeviceUnavailable {
                device,
                reason: "no such simulated device".to_string(),
            })?;

        if self.unavailable.contains(&device) {
            return Err(Error::DeviceUnavailable {
                device,
                reason: "device busy".to_string(),
            });
        }
        if channels == 0 || channels > info.max_output_channels {
            return Err(Error::DeviceUnavailable {
                device,
                reason: format!(
                    "{} channels requested, device has {}",
                    channels, info.max_output_channels
                ),
            });
        }
        if sample_rate == 0 {
            return Err(Error::DeviceUnavailable {
                device,
                reason: "sample rate must be greater than zero".to_string(),
            });
        }

        debug!(
            "Opened simulated device {}: sample_rate={}, channels={}",
            device, sample_rate, channels
        );

        Ok(Box::new(SimulatedStream {
            device,
            sample_rate,
            channels,
            chunk_frames: self.chunk_frames,
            stalled: self.stalled.contains(&device),
            recorder: self.recorder.clone(),
            state: StreamState::Open,
            stop_flag: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(AtomicUsize::new(0)),
            worker: None,
        }))
    }
}

/// One simulated output stream
pub struct SimulatedStream {
    device: DeviceId,
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    stalled: bool,
    recorder: ActivityRecorder,
    state: StreamState,
    stop_flag: Arc<AtomicBool>,
    progress: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackStream for SimulatedStream {
    fn device_id(&self) -> DeviceId {
        self.device
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn start(&mut self, buffer: SampleBuffer, frames: usize) -> Result<EndOfStream> {
        if self.state != StreamState::Open {
            return Err(Error::AudioOutput(format!(
                "stream on device {} already {:?}",
                self.device, self.state
            )));
        }

        let mut cursor = FrameCursor::new(buffer, frames);
        self.progress = cursor.progress();
        let (mut end_of_stream, waiter) = EndOfStream::channel();

        let started_at = Instant::now();
        let entry = self.recorder.record_start(self.device, started_at);
        let recorder = self.recorder.clone();
        let stop_flag = Arc::clone(&self.stop_flag);
        let channels = self.channels as usize;
        let chunk_frames = self.chunk_frames;
        let sample_rate = self.sample_rate as f64;
        let stalled = self.stalled;

        let worker = thread::Builder::new()
            .name(format!("sim-device-{}", self.device))
            .spawn(move || {
                let mut chunk = vec![0.0f32; chunk_frames * channels];
                let mut audible = 0usize;

                while !stop_flag.load(Ordering::Acquire) {
                    if stalled {
                        thread::sleep(Duration::from_millis(1));
                        continue;
                    }

                    let before = cursor.position();
                    let status = cursor.fill(&mut chunk, channels);
                    let emitted = cursor.position() - before;
                    audible += chunk
                        .chunks(channels)
                        .take(emitted)
                        .filter(|frame| frame.iter().any(|s| *s != 0.0))
                        .count();

                    // Pace against the start time so rounding never accumulates
                    let due = started_at
                        + Duration::from_secs_f64(cursor.position() as f64 / sample_rate);
                    if let Some(delay) = due.checked_duration_since(Instant::now()) {
                        thread::sleep(delay);
                    }

                    if status == FillStatus::Finished {
                        end_of_stream.signal();
                        break;
                    }
                }

                recorder.record_finish(entry, cursor.position(), audible);
            })
            .map_err(|e| Error::AudioOutput(format!("failed to spawn simulated stream: {}", e)))?;

        self.worker = Some(worker);
        self.state = StreamState::Streaming;
        Ok(waiter)
    }

    fn stop(&mut self) -> Result<()> {
        if self.state == StreamState::Stopped {
            return Ok(());
        }
        self.state = StreamState::Stopped;
        self.stop_flag.store(true, Ordering::Release);

        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::AudioOutput(format!("simulated device {} panicked", self.device)))?;
        }
        Ok(())
    }

    fn frames_emitted(&self) -> usize {
        self.progress.load(Ordering::Acquire)
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stream::EndOfStreamWait;

    #[test]
    fn test_uniform_catalog() {
        let backend = SimulatedBackend::uniform(3, 48000, 2);
        let devices = backend.list().unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[2].id, DeviceId(2));
        assert_eq!(devices[0].native_sample_rate, 48000);
    }

    #[test]
    fn test_open_rejects_unknown_and_unavailable() {
        let backend = SimulatedBackend::uniform(2, 48000, 2).with_unavailable(DeviceId(1));
        assert!(matches!(
            backend.open_output(DeviceId(5), 48000, 2),
            Err(Error::DeviceUnavailable { .. })
        ));
        assert!(matches!(
            backend.open_output(DeviceId(1), 48000, 2),
            Err(Error::DeviceUnavailable { .. })
        ));
        assert!(backend.open_output(DeviceId(0), 48000, 2).is_ok());
    }

    #[test]
    fn test_open_rejects_too_many_channels() {
        let backend = SimulatedBackend::uniform(1, 48000, 2);
        assert!(backend.open_output(DeviceId(0), 48000, 8).is_err());
    }

    #[test]
    fn test_stream_emits_requested_frames() {
        let backend = SimulatedBackend::uniform(1, 48000, 2);
        let recorder = backend.recorder();
        let mut stream = backend.open_output(DeviceId(0), 48000, 2).unwrap();
        assert_eq!(stream.state(), StreamState::Open);

        let buffer = SampleBuffer::new(vec![0.5; 2400], 1, 48000).unwrap();
        let eos = stream.start(buffer, 4800).unwrap();
        assert_eq!(eos.wait_timeout(Duration::from_secs(2)), EndOfStreamWait::Finished);
        stream.stop().unwrap();

        assert_eq!(stream.frames_emitted(), 4800);
        let activity = recorder.activity();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].frames_emitted, 4800);
        assert_eq!(activity[0].audible_frames, 2400);
    }

    #[test]
    fn test_stalled_stream_stops_on_request() {
        let backend = SimulatedBackend::uniform(1, 48000, 2).with_stalled(DeviceId(0));
        let mut stream = backend.open_output(DeviceId(0), 48000, 2).unwrap();
        let buffer = SampleBuffer::silence(480, 2, 48000).unwrap();

        let eos = stream.start(buffer, 480).unwrap();
        assert_eq!(eos.wait_timeout(Duration::from_millis(30)), EndOfStreamWait::TimedOut);
        stream.stop().unwrap();
        stream.stop().unwrap();
        assert_eq!(stream.state(), StreamState::Stopped);
        assert_eq!(stream.frames_emitted(), 0);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let backend = SimulatedBackend::uniform(1, 48000, 2);
        let mut stream = backend.open_output(DeviceId(0), 48000, 2).unwrap();
        let buffer = SampleBuffer::silence(48, 2, 48000).unwrap();
        let _eos = stream.start(buffer.clone(), 48).unwrap();
        assert!(stream.start(buffer, 48).is_err());
    }
}
