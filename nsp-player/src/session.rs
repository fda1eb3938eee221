//! Reproduction session
//!
//! Runs an ordered list of signals through one plan, threading a single
//! clock from signal to signal so the wait gap also separates the last group
//! of one signal from the first group of the next.
//!
//! Device checks happen once, in [`ReproductionSession::prepare`]: an unknown
//! device fails the whole session before anything plays. After that, the
//! only per-signal failure is a decode error, which skips that signal.

use crate::audio::{AudioDecoder, OutputBackend, SampleBuffer, TestTone};
use crate::catalog::{target_sample_rate, DeviceCatalog, DeviceInfo};
use crate::error::{Error, Result};
use crate::plan::{DeviceId, GroupPlan};
use crate::scheduler::{RunReport, SyncScheduler};
use nsp_common::config::{DEFAULT_TEST_SECONDS, DEFAULT_WAIT_SECONDS};
use nsp_common::human_time::{format_duration, format_seconds, format_seconds_or};
use nsp_common::time::{seconds_to_frames, try_seconds_to_duration};
use nsp_common::ReproductionSettings;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Timing parameters for a session
#[derive(Debug, Clone, PartialEq)]
pub struct ReproductionConfig {
    /// Seconds per signal; `None` plays each buffer to its end
    pub duration: Option<f64>,
    /// Seconds between successive groups
    pub wait: f64,
    /// Output rate; `None` uses the slowest device's native rate
    pub sample_rate: Option<u32>,
    /// How long the test routine keeps cycling, in seconds
    pub test_duration: f64,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            duration: None,
            wait: DEFAULT_WAIT_SECONDS,
            sample_rate: None,
            test_duration: DEFAULT_TEST_SECONDS,
        }
    }
}

impl From<&ReproductionSettings> for ReproductionConfig {
    fn from(settings: &ReproductionSettings) -> Self {
        Self {
            duration: settings.audio_duration,
            wait: settings.wait_duration,
            sample_rate: settings.sampling_rate,
            test_duration: settings.test_duration,
        }
    }
}

/// One audio source
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    File(PathBuf),
    Tone(TestTone),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::File(path) => write!(f, "{}", path.display()),
            Signal::Tone(tone) => write!(f, "{}", tone),
        }
    }
}

/// How one signal went
#[derive(Debug)]
pub enum SignalOutcome {
    Played(RunReport),
    /// Decoding or synthesis failed; nothing was played for this signal
    Skipped(Error),
}

#[derive(Debug)]
pub struct SignalReport {
    /// What was played: the signal, or the clip assignment of a test pass
    pub source: String,
    /// Pass through the signal list (always 0 outside the test routine)
    pub pass: usize,
    pub outcome: SignalOutcome,
}

impl SignalReport {
    pub fn run(&self) -> Option<&RunReport> {
        match &self.outcome {
            SignalOutcome::Played(report) => Some(report),
            SignalOutcome::Skipped(_) => None,
        }
    }
}

/// Everything that happened in one session
#[derive(Debug)]
pub struct SessionReport {
    pub sample_rate: u32,
    pub signals: Vec<SignalReport>,
    pub started_at: Instant,
    /// Final value of the running clock
    pub finished_at: Instant,
    /// Completed passes through the signal list
    pub passes: usize,
}

impl SessionReport {
    pub fn played_count(&self) -> usize {
        self.signals.iter().filter(|s| s.run().is_some()).count()
    }

    pub fn skipped(&self) -> Vec<(&str, &Error)> {
        self.signals
            .iter()
            .filter_map(|s| match &s.outcome {
                SignalOutcome::Skipped(e) => Some((s.source.as_str(), e)),
                SignalOutcome::Played(_) => None,
            })
            .collect()
    }

    /// Every device failure across all signals and groups
    pub fn device_failures(&self) -> Vec<(DeviceId, &Error)> {
        self.signals
            .iter()
            .filter_map(SignalReport::run)
            .flat_map(RunReport::failures)
            .collect()
    }
}

/// A plan bound to validated devices and an output format
pub struct ReproductionSession {
    plan: GroupPlan,
    config: ReproductionConfig,
    devices: Vec<DeviceInfo>,
    sample_rate: u32,
    scheduler: SyncScheduler,
    decoder: Arc<dyn AudioDecoder>,
}

impl ReproductionSession {
    /// Validate every device in `plan` and fix the output format.
    ///
    /// # Errors
    /// `Error::UnknownDevice` for the first device the catalog does not know.
    pub fn prepare(
        plan: GroupPlan,
        config: ReproductionConfig,
        catalog: &dyn DeviceCatalog,
        backend: Arc<dyn OutputBackend>,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Result<Self> {
        let devices = plan
            .unique_devices()
            .into_iter()
            .map(|id| catalog.query_device(id))
            .collect::<Result<Vec<_>>>()?;

        let sample_rate = match config.sample_rate {
            Some(rate) => rate,
            None => target_sample_rate(&devices)
                .ok_or_else(|| Error::InvalidTiming("plan contains no devices".to_string()))?,
        };
        if sample_rate == 0 {
            return Err(Error::InvalidTiming("sample rate must be greater than zero".to_string()));
        }

        let channels: HashMap<DeviceId, u16> = devices
            .iter()
            .map(|d| (d.id, d.max_output_channels))
            .collect();
        let scheduler = SyncScheduler::new(backend).with_channels(channels);

        for device in &devices {
            info!(
                "Device {}: {} ({} Hz native, {} outputs)",
                device.id, device.name, device.native_sample_rate, device.max_output_channels
            );
        }
        info!(
            "Plan {} on {} output at {} Hz, wait {}",
            plan,
            scheduler.backend_name(),
            sample_rate,
            format_seconds(config.wait)
        );

        Ok(Self {
            plan,
            config,
            devices,
            sample_rate,
            scheduler,
            decoder,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    pub fn plan(&self) -> &GroupPlan {
        &self.plan
    }

    /// Play each signal once, in order. Every signal is decoded before the
    /// first plays, so decoding never eats into the wait gap; one that fails
    /// to decode is reported and skipped.
    pub async fn run(&self, signals: &[Signal]) -> Result<SessionReport> {
        let started_at = Instant::now();
        let loaded: Vec<Result<SampleBuffer>> = signals.iter().map(|s| self.load(s)).collect();
        let mut report = SessionReport {
            sample_rate: self.sample_rate,
            signals: Vec::with_capacity(signals.len()),
            started_at,
            finished_at: started_at,
            passes: 0,
        };

        for (index, (signal, buffer)) in signals.iter().zip(loaded).enumerate() {
            let outcome = match buffer {
                Ok(buffer) => {
                    let run = self
                        .play(index, signals.len(), signal, &buffer, report.finished_at)
                        .await?;
                    report.finished_at = run.finished_at;
                    SignalOutcome::Played(run)
                }
                Err(e) => {
                    error!("Signal {}/{}: {} skipped: {}", index + 1, signals.len(), signal, e);
                    SignalOutcome::Skipped(e)
                }
            };
            report.signals.push(SignalReport {
                source: signal.to_string(),
                pass: 0,
                outcome,
            });
        }
        report.passes = 1;

        self.log_summary(&report);
        Ok(report)
    }

    /// Identification routine: every device plays its own clip, group by
    /// group, and the whole plan repeats until `test_duration` has elapsed
    /// since the session started.
    ///
    /// The device at position `i` of the plan's device list plays
    /// `clips[device]`, or [`TestTone::identification(i)`](TestTone::identification)
    /// when it has no clip or its clip fails to decode. Decode failures are
    /// reported once. Always completes at least one pass; the elapsed time is
    /// checked between passes.
    ///
    /// # Errors
    /// `Error::InvalidTiming` when `test_duration` is not a usable number of
    /// seconds.
    pub async fn run_test_routine(&self, clips: &HashMap<DeviceId, Signal>) -> Result<SessionReport> {
        let started_at = Instant::now();
        let limit = try_seconds_to_duration(self.config.test_duration).ok_or_else(|| {
            Error::InvalidTiming(format!(
                "test duration must be >= 0, got {}",
                self.config.test_duration
            ))
        })?;
        let mut report = SessionReport {
            sample_rate: self.sample_rate,
            signals: Vec::new(),
            started_at,
            finished_at: started_at,
            passes: 0,
        };

        let mut buffers = HashMap::new();
        let mut assignment = Vec::new();
        for (position, device) in self.plan.unique_devices().into_iter().enumerate() {
            let fallback = Signal::Tone(TestTone::identification(position));
            let signal = clips.get(&device).cloned().unwrap_or_else(|| fallback.clone());

            let (signal, buffer) = match self.load(&signal) {
                Ok(buffer) => (signal, buffer),
                Err(e) => {
                    error!("Device {}: clip {} skipped: {}", device, signal, e);
                    report.signals.push(SignalReport {
                        source: signal.to_string(),
                        pass: 0,
                        outcome: SignalOutcome::Skipped(e),
                    });
                    let buffer = self.load(&fallback)?;
                    (fallback, buffer)
                }
            };

            self.warn_rate_mismatch(&signal, &buffer, None);
            info!("Device {} identified by {}", device, signal);
            assignment.push(format!("{}: {}", device, signal));
            buffers.insert(device, buffer);
        }
        let source = assignment.join(", ");

        info!("Test routine: cycling for {}", format_duration(limit));

        let mut pass = 0;
        loop {
            let run = self
                .scheduler
                .run_per_device(
                    &self.plan,
                    &buffers,
                    self.config.duration,
                    self.config.wait,
                    self.sample_rate,
                    report.finished_at,
                )
                .await?;

            report.finished_at = run.finished_at;
            report.signals.push(SignalReport {
                source: source.clone(),
                pass,
                outcome: SignalOutcome::Played(run),
            });
            pass += 1;
            report.passes = pass;

            if started_at.elapsed() >= limit {
                break;
            }
        }

        self.log_summary(&report);
        Ok(report)
    }

    fn load(&self, signal: &Signal) -> Result<SampleBuffer> {
        match signal {
            Signal::File(path) => self.decoder.decode(path),
            Signal::Tone(tone) => tone.with_sample_rate(self.sample_rate).render(),
        }
    }

    /// `frames` is how many frames of `buffer` the derived duration lets
    /// through, when that can fall short of the buffer.
    fn warn_rate_mismatch(&self, signal: &Signal, buffer: &SampleBuffer, frames: Option<usize>) {
        if buffer.sample_rate() == self.sample_rate {
            return;
        }
        match frames.filter(|&f| f < buffer.frames()) {
            Some(f) => warn!(
                "{} is {} Hz, output is {} Hz; playing without resampling, last {} of {} frames dropped",
                signal,
                buffer.sample_rate(),
                self.sample_rate,
                buffer.frames() - f,
                buffer.frames()
            ),
            None => warn!(
                "{} is {} Hz, output is {} Hz; playing without resampling",
                signal,
                buffer.sample_rate(),
                self.sample_rate
            ),
        }
    }

    /// Duration passed to the scheduler: the explicit value, or the buffer's
    /// own length at its native rate. Without resampling, a buffer whose
    /// native rate is above the output rate loses its tail to this length.
    fn resolve_duration(&self, buffer: &SampleBuffer) -> f64 {
        self.config.duration.unwrap_or_else(|| buffer.duration_seconds())
    }

    async fn play(
        &self,
        index: usize,
        total: usize,
        signal: &Signal,
        buffer: &SampleBuffer,
        t0: Instant,
    ) -> Result<RunReport> {
        let duration = self.resolve_duration(buffer);
        let derived = self.config.duration.is_none();
        self.warn_rate_mismatch(
            signal,
            buffer,
            derived.then(|| seconds_to_frames(duration, self.sample_rate)),
        );
        info!(
            "Signal {}/{}: {} ({}, {} ch, {} Hz, duration {})",
            index + 1,
            total,
            signal,
            format_seconds(buffer.duration_seconds()),
            buffer.channels(),
            buffer.sample_rate(),
            format_seconds_or(self.config.duration, "full length")
        );

        self.scheduler
            .run(
                &self.plan,
                buffer,
                Some(duration),
                self.config.wait,
                self.sample_rate,
                t0,
            )
            .await
    }

    fn log_summary(&self, report: &SessionReport) {
        let elapsed = report.finished_at.saturating_duration_since(report.started_at);
        info!(
            "Session finished: {} signal(s) played, {} skipped, {} pass(es) in {}",
            report.played_count(),
            report.skipped().len(),
            report.passes,
            format_duration(elapsed)
        );
        for (device, e) in report.device_failures() {
            warn!("Device {} failed: {}", device, e);
        }
    }
}
