//! Group-sequential playback scheduler
//!
//! Plays one buffer (or one buffer per device) through every group of a
//! [`GroupPlan`]. Groups run one after another; devices inside a group start
//! together.
//!
//! **Per group:**
//! 1. One blocking worker per device opens its stream (in parallel)
//! 2. Once every open has resolved, wait for the gate at `t0 + wait`
//! 3. Send the start commands back-to-back
//! 4. Join every worker; `t0` becomes the join time
//!
//! Streams are created, started, stopped and dropped on their own worker,
//! since cpal streams cannot cross threads. A device that fails to open is
//! recorded and treated as complete, so it never holds up its group.

use crate::audio::stream::{EndOfStreamWait, OutputBackend};
use crate::audio::SampleBuffer;
use crate::error::{Error, Result};
use crate::plan::{DeviceGroup, DeviceId, GroupPlan};
use futures::future::join_all;
use nsp_common::human_time::format_duration;
use nsp_common::time::{seconds_to_frames, try_seconds_to_duration};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Extra time a stream gets past its expected length before it is force-stopped
pub const STOP_GRACE: Duration = Duration::from_millis(250);

/// Final stretch of the gate that is spun instead of slept
const SPIN_WINDOW: Duration = Duration::from_millis(2);

/// Channel count used for devices the scheduler has no information about
pub const DEFAULT_CHANNELS: u16 = 2;

/// How one device's part of a group ended
#[derive(Debug)]
pub enum DeviceStatus {
    /// All requested frames were emitted
    Completed,
    /// The stop guard fired before the transport reported completion
    ForceStopped,
    /// Stream could not be opened; counted as complete
    OpenFailed(Error),
    /// Stream opened but failed while starting or streaming
    Failed(Error),
    /// The start command never arrived
    Aborted,
}

/// Result of one device worker
#[derive(Debug)]
pub struct DeviceOutcome {
    pub device: DeviceId,
    pub status: DeviceStatus,
    pub frames_emitted: usize,
    pub started_at: Option<Instant>,
    pub finished_at: Instant,
}

impl DeviceOutcome {
    fn without_playback(device: DeviceId, status: DeviceStatus) -> Self {
        Self {
            device,
            status,
            frames_emitted: 0,
            started_at: None,
            finished_at: Instant::now(),
        }
    }

    /// Error that kept this device from playing, if any
    pub fn error(&self) -> Option<&Error> {
        match &self.status {
            DeviceStatus::OpenFailed(e) | DeviceStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// What happened in one group
#[derive(Debug)]
pub struct GroupReport {
    /// Position of the group in the plan (0-based)
    pub index: usize,
    pub group: DeviceGroup,
    /// When the start gate was due
    pub gate: Instant,
    /// When the start commands were actually sent
    pub started_at: Instant,
    /// When the last worker was joined
    pub finished_at: Instant,
    pub outcomes: Vec<DeviceOutcome>,
}

impl GroupReport {
    /// Devices that failed in this group, with their errors
    pub fn failures(&self) -> Vec<(DeviceId, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| (o.device, e)))
            .collect()
    }

    /// Number of devices whose stream actually started
    pub fn started_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.started_at.is_some()).count()
    }

    pub fn is_degraded(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| !matches!(o.status, DeviceStatus::Completed))
    }
}

/// Result of one scheduler run
#[derive(Debug)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
    /// Completion time of the last group; the next run's `t0`
    pub finished_at: Instant,
}

impl RunReport {
    pub fn failures(&self) -> Vec<(DeviceId, &Error)> {
        self.groups.iter().flat_map(|g| g.failures()).collect()
    }
}

struct StartCommand {
    buffer: SampleBuffer,
    frames: usize,
    guard: Duration,
}

/// Drives an [`OutputBackend`] through a plan
pub struct SyncScheduler {
    backend: Arc<dyn OutputBackend>,
    channels: HashMap<DeviceId, u16>,
    stop_grace: Duration,
}

impl SyncScheduler {
    pub fn new(backend: Arc<dyn OutputBackend>) -> Self {
        Self {
            backend,
            channels: HashMap::new(),
            stop_grace: STOP_GRACE,
        }
    }

    /// Output channel count to open each device with
    pub fn with_channels(mut self, channels: HashMap<DeviceId, u16>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn channels_for(&self, device: DeviceId) -> u16 {
        self.channels.get(&device).copied().unwrap_or(DEFAULT_CHANNELS)
    }

    /// Play `buffer` through every group of `plan`.
    ///
    /// `duration` of `Some(d)` emits exactly `d * sample_rate` frames per
    /// stream (silence past the buffer end); `None` emits the whole buffer.
    /// Each group gates on `t0 + wait`, where `t0` is the previous group's
    /// completion (the caller's `t0` for the first group).
    ///
    /// # Errors
    /// `Error::InvalidTiming` for a negative, non-finite or out-of-range
    /// `duration`/`wait` or a zero `sample_rate`. Device failures do not fail
    /// the run; they are reported per group.
    pub async fn run(
        &self,
        plan: &GroupPlan,
        buffer: &SampleBuffer,
        duration: Option<f64>,
        wait: f64,
        sample_rate: u32,
        t0: Instant,
    ) -> Result<RunReport> {
        self.run_with(plan, |_| Some(buffer), duration, wait, sample_rate, t0)
            .await
    }

    /// Like [`run`](Self::run), but every device plays its own buffer.
    ///
    /// With `duration` of `None` each stream emits its whole buffer, so
    /// devices in one group may finish at different times; the group still
    /// completes when the last of them does.
    ///
    /// # Errors
    /// `Error::InvalidBuffer` when a device of `plan` has no buffer in
    /// `buffers`, plus the timing errors of [`run`](Self::run).
    pub async fn run_per_device(
        &self,
        plan: &GroupPlan,
        buffers: &HashMap<DeviceId, SampleBuffer>,
        duration: Option<f64>,
        wait: f64,
        sample_rate: u32,
        t0: Instant,
    ) -> Result<RunReport> {
        if let Some(missing) = plan.unique_devices().into_iter().find(|d| !buffers.contains_key(d)) {
            return Err(Error::InvalidBuffer(format!("no buffer assigned to device {}", missing)));
        }
        self.run_with(plan, |device| buffers.get(&device), duration, wait, sample_rate, t0)
            .await
    }

    async fn run_with<'b, F>(
        &self,
        plan: &GroupPlan,
        buffer_for: F,
        duration: Option<f64>,
        wait: f64,
        sample_rate: u32,
        t0: Instant,
    ) -> Result<RunReport>
    where
        F: Fn(DeviceId) -> Option<&'b SampleBuffer>,
    {
        if sample_rate == 0 {
            return Err(Error::InvalidTiming("sample rate must be greater than zero".to_string()));
        }
        let wait = try_seconds_to_duration(wait)
            .ok_or_else(|| Error::InvalidTiming(format!("wait must be >= 0, got {}", wait)))?;
        if let Some(d) = duration {
            if try_seconds_to_duration(d).is_none() {
                return Err(Error::InvalidTiming(format!("duration must be >= 0, got {}", d)));
            }
        }

        debug!(
            "Run: {} groups at {} Hz, duration={}, wait={}",
            plan.len(),
            sample_rate,
            duration.map_or_else(|| "buffer length".to_string(), |d| format!("{:.3}s", d)),
            format_duration(wait)
        );

        let mut clock = t0;
        let mut groups = Vec::with_capacity(plan.len());

        for (index, group) in plan.groups().iter().enumerate() {
            let commands = group
                .devices()
                .iter()
                .map(|&device| {
                    let buffer = buffer_for(device).ok_or_else(|| {
                        Error::InvalidBuffer(format!("no buffer assigned to device {}", device))
                    })?;
                    self.start_command(buffer, duration, sample_rate)
                })
                .collect::<Result<Vec<_>>>()?;

            let report = self
                .run_group(index, plan.len(), group, commands, sample_rate, clock + wait)
                .await;
            clock = report.finished_at;
            groups.push(report);
        }

        Ok(RunReport {
            groups,
            finished_at: clock,
        })
    }

    fn start_command(
        &self,
        buffer: &SampleBuffer,
        duration: Option<f64>,
        sample_rate: u32,
    ) -> Result<StartCommand> {
        let frames = match duration {
            Some(d) => seconds_to_frames(d, sample_rate),
            None => buffer.frames(),
        };
        let guard = try_seconds_to_duration(frames as f64 / sample_rate as f64)
            .and_then(|length| length.checked_add(self.stop_grace))
            .ok_or_else(|| Error::InvalidTiming(format!("{} frames is too long to schedule", frames)))?;

        Ok(StartCommand {
            buffer: buffer.clone(),
            frames,
            guard,
        })
    }

    async fn run_group(
        &self,
        index: usize,
        total: usize,
        group: &DeviceGroup,
        commands: Vec<StartCommand>,
        sample_rate: u32,
        gate: Instant,
    ) -> GroupReport {
        let mut open_signals = Vec::with_capacity(group.len());
        let mut start_senders = Vec::with_capacity(group.len());
        let mut workers = Vec::with_capacity(group.len());

        for &device in group.devices() {
            let (open_tx, open_rx) = oneshot::channel();
            let (start_tx, start_rx) = oneshot::channel();
            let backend = Arc::clone(&self.backend);
            let channels = self.channels_for(device);

            workers.push(tokio::task::spawn_blocking(move || {
                device_worker(backend.as_ref(), device, sample_rate, channels, open_tx, start_rx)
            }));
            open_signals.push(open_rx);
            start_senders.push(start_tx);
        }

        // Every open has either succeeded or failed before the gate
        let opened = join_all(open_signals)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();
        debug!("Group {}: {}/{} streams open", group, opened, group.len());

        wait_until(gate).await;
        let started_at = Instant::now();
        let late = started_at.saturating_duration_since(gate);
        info!(
            "Group {}/{} {}: playing on {} device(s){}",
            index + 1,
            total,
            group,
            opened,
            if late > Duration::from_millis(10) {
                format!(" ({} after gate)", format_duration(late))
            } else {
                String::new()
            }
        );

        for (sender, command) in start_senders.into_iter().zip(commands) {
            // Workers whose open failed have already dropped their receiver
            let _ = sender.send(command);
        }

        let outcomes: Vec<DeviceOutcome> = join_all(workers)
            .await
            .into_iter()
            .zip(group.devices())
            .map(|(joined, &device)| {
                joined.unwrap_or_else(|e| {
                    DeviceOutcome::without_playback(
                        device,
                        DeviceStatus::Failed(Error::AudioOutput(format!("device worker failed: {}", e))),
                    )
                })
            })
            .collect();

        let finished_at = Instant::now();
        for outcome in &outcomes {
            match &outcome.status {
                DeviceStatus::Completed => {}
                DeviceStatus::ForceStopped => {
                    warn!("Device {} force-stopped after {} frames", outcome.device, outcome.frames_emitted)
                }
                DeviceStatus::OpenFailed(e) | DeviceStatus::Failed(e) => {
                    warn!("Device {} skipped: {}", outcome.device, e)
                }
                DeviceStatus::Aborted => warn!("Device {} aborted before start", outcome.device),
            }
        }

        GroupReport {
            index,
            group: group.clone(),
            gate,
            started_at,
            finished_at,
            outcomes,
        }
    }
}

/// Body of one device's blocking worker: open, report, wait for the start
/// command, stream, stop.
fn device_worker(
    backend: &dyn OutputBackend,
    device: DeviceId,
    sample_rate: u32,
    channels: u16,
    open_tx: oneshot::Sender<bool>,
    start_rx: oneshot::Receiver<StartCommand>,
) -> DeviceOutcome {
    let mut stream = match backend.open_output(device, sample_rate, channels) {
        Ok(stream) => {
            let _ = open_tx.send(true);
            stream
        }
        Err(e) => {
            let _ = open_tx.send(false);
            return DeviceOutcome::without_playback(device, DeviceStatus::OpenFailed(e));
        }
    };

    let Ok(command) = start_rx.blocking_recv() else {
        let _ = stream.stop();
        return DeviceOutcome::without_playback(device, DeviceStatus::Aborted);
    };

    let started_at = Instant::now();
    let end_of_stream = match stream.start(command.buffer, command.frames) {
        Ok(eos) => eos,
        Err(e) => {
            let _ = stream.stop();
            return DeviceOutcome::without_playback(device, DeviceStatus::Failed(e));
        }
    };

    let status = match end_of_stream.wait_timeout(command.guard) {
        EndOfStreamWait::Finished if stream.has_error() => DeviceStatus::Failed(Error::AudioOutput(
            format!("transport reported an error on device {}", device),
        )),
        EndOfStreamWait::Finished => DeviceStatus::Completed,
        EndOfStreamWait::TimedOut => DeviceStatus::ForceStopped,
        EndOfStreamWait::Closed => DeviceStatus::Failed(Error::AudioOutput(format!(
            "stream on device {} closed before finishing",
            device
        ))),
    };

    if let Err(e) = stream.stop() {
        warn!("Failed to stop device {}: {}", device, e);
    }
    let frames_emitted = stream.frames_emitted();
    drop(stream);

    DeviceOutcome {
        device,
        status,
        frames_emitted,
        started_at: Some(started_at),
        finished_at: Instant::now(),
    }
}

/// Sleep until shortly before `deadline`, then spin the rest of the way.
pub async fn wait_until(deadline: Instant) {
    let now = Instant::now();
    if deadline <= now {
        return;
    }

    let remaining = deadline - now;
    if remaining > SPIN_WINDOW {
        tokio::time::sleep(remaining - SPIN_WINDOW).await;
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
