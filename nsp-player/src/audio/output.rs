//! Audio output using cpal
//!
//! Device ids are indices into the default host's output device enumeration,
//! which is also what `nspeakers devices` prints.
//!
//! Each `CpalStream` builds its cpal stream when opened (so an unplugged or
//! misconfigured device fails at open time, before the start gate) and plays
//! silence until `start` installs a cursor and resumes the stream.

use crate::audio::buffer::{FillStatus, FrameCursor};
use crate::audio::stream::{EndOfStream, EndOfStreamSender, OutputBackend, PlaybackStream};
use crate::audio::{SampleBuffer, StreamState};
use crate::catalog::{DeviceCatalog, DeviceInfo};
use crate::error::{Error, Result};
use crate::plan::DeviceId;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

const DEFAULT_SCRATCH_FRAMES: usize = 8192;

/// Device catalog backed by the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCatalog;

impl DeviceCatalog for CpalCatalog {
    fn list(&self) -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        let mut infos = Vec::new();
        for (index, device) in devices.enumerate() {
            let id = DeviceId(index as u32);
            match describe_device(id, &device) {
                Ok(info) => infos.push(info),
                Err(e) => warn!("Skipping output device {}: {}", id, e),
            }
        }

        debug!("Found {} output devices", infos.len());
        Ok(infos)
    }

    fn query_device(&self, id: DeviceId) -> Result<DeviceInfo> {
        let device = find_device(id).map_err(|_| Error::UnknownDevice(id))?;
        describe_device(id, &device).map_err(|_| Error::UnknownDevice(id))
    }
}

fn describe_device(id: DeviceId, device: &Device) -> Result<DeviceInfo> {
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let default_config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

    let max_output_channels = device
        .supported_output_configs()
        .ok()
        .and_then(|configs| configs.map(|c| c.channels()).max())
        .unwrap_or_else(|| default_config.channels());

    Ok(DeviceInfo {
        id,
        name,
        native_sample_rate: default_config.sample_rate().0,
        max_output_channels,
    })
}

fn find_device(id: DeviceId) -> Result<Device> {
    let host = cpal::default_host();
    let mut devices = host.output_devices().map_err(|e| Error::DeviceUnavailable {
        device: id,
        reason: format!("failed to enumerate devices: {}", e),
    })?;

    devices.nth(id.index()).ok_or_else(|| Error::DeviceUnavailable {
        device: id,
        reason: "no output device with this id".to_string(),
    })
}

/// Opens cpal output streams
#[derive(Debug, Default, Clone)]
pub struct CpalBackend {
    /// Fixed callback size in frames; `None` keeps the device default
    buffer_size: Option<u32>,
}

impl CpalBackend {
    pub fn new(buffer_size: Option<u32>) -> Self {
        Self { buffer_size }
    }
}

impl OutputBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open_output(
        &self,
        device_id: DeviceId,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn PlaybackStream>> {
        let device = find_device(device_id)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let sample_format = pick_sample_format(&device, device_id, sample_rate, channels)?;

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: match self.buffer_size {
                Some(size) => cpal::BufferSize::Fixed(size),
                None => cpal::BufferSize::Default,
            },
        };

        debug!(
            "Opening device {} ({}): sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            device_id, device_name, sample_rate, channels, sample_format, config.buffer_size
        );

        let slot: PlaybackSlot = Arc::new(Mutex::new(None));
        let error_flag = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, device_id, &slot, &error_flag)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, device_id, &slot, &error_flag)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, device_id, &slot, &error_flag)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &config, device_id, &slot, &error_flag)?,
            other => {
                return Err(Error::DeviceUnavailable {
                    device: device_id,
                    reason: format!("unsupported sample format {:?}", other),
                });
            }
        };

        Ok(Box::new(CpalStream {
            device_id,
            device_name,
            stream,
            slot,
            progress: None,
            state: StreamState::Open,
            error_flag,
        }))
    }
}

/// Pick a sample format the device supports at this rate and channel count,
/// preferring f32 (our internal format).
fn pick_sample_format(
    device: &Device,
    device_id: DeviceId,
    sample_rate: u32,
    channels: u16,
) -> Result<SampleFormat> {
    let configs = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceUnavailable {
            device: device_id,
            reason: format!("failed to get device configs: {}", e),
        })?;

    let matching: Vec<SampleFormat> = configs
        .filter(|c| {
            c.channels() == channels
                && c.min_sample_rate().0 <= sample_rate
                && c.max_sample_rate().0 >= sample_rate
        })
        .map(|c| c.sample_format())
        .collect();

    if matching.contains(&SampleFormat::F32) {
        return Ok(SampleFormat::F32);
    }

    matching.first().copied().ok_or_else(|| Error::DeviceUnavailable {
        device: device_id,
        reason: format!("no configuration with {} channels at {} Hz", channels, sample_rate),
    })
}

struct ActivePlayback {
    cursor: FrameCursor,
    end_of_stream: EndOfStreamSender,
}

type PlaybackSlot = Arc<Mutex<Option<ActivePlayback>>>;

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    device_id: DeviceId,
    slot: &PlaybackSlot,
    error_flag: &Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let slot = Arc::clone(slot);
    let error_flag = Arc::clone(error_flag);
    let mut scratch: Vec<f32> = vec![0.0; scratch_frames(config) * channels];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Only a host that overruns the requested size reallocates here
                if scratch.len() < data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let chunk = &mut scratch[..data.len()];
                render_chunk(&slot, chunk, channels);

                for (out, sample) in data.iter_mut().zip(chunk.iter()) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
            },
            move |err| {
                error!("Audio stream error on device {}: {}", device_id, err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable {
            device: device_id,
            reason: format!("failed to build stream: {}", e),
        })?;

    // Built streams may start running on some hosts; stay silent until start()
    if let Err(e) = stream.pause() {
        debug!("Device {} could not be paused after open: {}", device_id, e);
    }

    Ok(stream)
}

/// Scratch frames allocated up front for the callback: the fixed buffer size
/// when one is set, otherwise a size that covers common host defaults.
fn scratch_frames(config: &StreamConfig) -> usize {
    match config.buffer_size {
        cpal::BufferSize::Fixed(size) => size as usize,
        cpal::BufferSize::Default => DEFAULT_SCRATCH_FRAMES,
    }
}

/// Fill one callback chunk. Never blocks: if the slot is busy (start/stop in
/// progress) the chunk is silence.
fn render_chunk(slot: &PlaybackSlot, chunk: &mut [f32], channels: usize) {
    let Ok(mut guard) = slot.try_lock() else {
        chunk.fill(0.0);
        return;
    };

    match guard.as_mut() {
        Some(active) => {
            if active.cursor.fill(chunk, channels) == FillStatus::Finished {
                active.end_of_stream.signal();
            }
        }
        None => chunk.fill(0.0),
    }
}

/// Open cpal output bound to one device
pub struct CpalStream {
    device_id: DeviceId,
    device_name: String,
    stream: Stream,
    slot: PlaybackSlot,
    progress: Option<Arc<AtomicUsize>>,
    state: StreamState,
    error_flag: Arc<AtomicBool>,
}

impl CpalStream {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl PlaybackStream for CpalStream {
    fn device_id(&self) -> DeviceId {
        self.device_id
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn start(&mut self, buffer: SampleBuffer, frames: usize) -> Result<EndOfStream> {
        if self.state != StreamState::Open {
            return Err(Error::AudioOutput(format!(
                "stream on device {} already {:?}",
                self.device_id, self.state
            )));
        }

        let cursor = FrameCursor::new(buffer, frames);
        self.progress = Some(cursor.progress());
        let (sender, end_of_stream) = EndOfStream::channel();

        {
            let mut slot = self
                .slot
                .lock()
                .map_err(|_| Error::AudioOutput("playback slot poisoned".to_string()))?;
            *slot = Some(ActivePlayback {
                cursor,
                end_of_stream: sender,
            });
        }

        self.stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.state = StreamState::Streaming;

        debug!("Device {} streaming {} frames", self.device_id, frames);
        Ok(end_of_stream)
    }

    fn stop(&mut self) -> Result<()> {
        if self.state == StreamState::Stopped {
            return Ok(());
        }
        self.state = StreamState::Stopped;

        let result = self
            .stream
            .pause()
            .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)));

        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }

        debug!("Device {} stopped", self.device_id);
        result
    }

    fn frames_emitted(&self) -> usize {
        self.progress
            .as_ref()
            .map(|p| p.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_out_of_range_device_is_unknown() {
        let id = DeviceId(u32::MAX);
        assert!(matches!(CpalCatalog.query_device(id), Err(Error::UnknownDevice(d)) if d == id));
    }

    #[test]
    fn test_scratch_follows_fixed_buffer_size() {
        let mut config = StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(48000),
            buffer_size: cpal::BufferSize::Fixed(256),
        };
        assert_eq!(scratch_frames(&config), 256);

        config.buffer_size = cpal::BufferSize::Default;
        assert_eq!(scratch_frames(&config), DEFAULT_SCRATCH_FRAMES);
    }

    #[test]
    fn test_render_chunk_without_playback_is_silence() {
        let slot: PlaybackSlot = Arc::new(Mutex::new(None));
        let mut chunk = [0.5f32; 8];
        render_chunk(&slot, &mut chunk, 2);
        assert_eq!(chunk, [0.0; 8]);
    }

    #[test]
    fn test_render_chunk_signals_end_of_stream() {
        let buffer = SampleBuffer::new(vec![0.25; 4], 1, 48000).unwrap();
        let (sender, eos) = EndOfStream::channel();
        let slot: PlaybackSlot = Arc::new(Mutex::new(Some(ActivePlayback {
            cursor: FrameCursor::new(buffer, 4),
            end_of_stream: sender,
        })));

        let mut chunk = [0.0f32; 12];
        render_chunk(&slot, &mut chunk, 2);

        assert_eq!(&chunk[..8], &[0.25; 8]);
        assert_eq!(&chunk[8..], &[0.0; 4]);
        assert_eq!(
            eos.wait_timeout(std::time::Duration::from_millis(10)),
            crate::audio::stream::EndOfStreamWait::Finished
        );
    }

    #[test]
    fn test_render_chunk_busy_slot_is_silence() {
        let buffer = SampleBuffer::new(vec![0.25; 4], 1, 48000).unwrap();
        let (sender, _eos) = EndOfStream::channel();
        let slot: PlaybackSlot = Arc::new(Mutex::new(Some(ActivePlayback {
            cursor: FrameCursor::new(buffer, 4),
            end_of_stream: sender,
        })));

        let _held = slot.lock().unwrap();
        let mut chunk = [0.5f32; 4];
        render_chunk(&slot, &mut chunk, 1);
        assert_eq!(chunk, [0.0; 4]);
    }
}
