//! Playback stream abstraction
//!
//! The scheduler drives hardware through two narrow traits:
//! - [`OutputBackend`] opens a stream on a device (`openOutput`)
//! - [`PlaybackStream`] is one open handle: `start`, then `stop`
//!
//! Streams are created, started, stopped and dropped on a single worker
//! thread, so `PlaybackStream` does not require `Send` (cpal streams are not
//! `Send` on every platform). Backends are shared across workers and must be
//! `Send + Sync`.

use crate::audio::SampleBuffer;
use crate::audio::StreamState;
use crate::error::Result;
use crate::plan::DeviceId;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

/// One open output channel bound to one device.
pub trait PlaybackStream {
    /// Device this handle is bound to
    fn device_id(&self) -> DeviceId;

    fn state(&self) -> StreamState;

    /// Begin emitting `frames` frames of `buffer` at the stream's rate.
    ///
    /// Returns the end-of-stream signal that fires once all frames have been
    /// handed to the transport. Frames beyond the buffer's end are silence.
    fn start(&mut self, buffer: SampleBuffer, frames: usize) -> Result<EndOfStream>;

    /// Stop output. Idempotent; safe after natural completion.
    fn stop(&mut self) -> Result<()>;

    /// Frames handed to the transport so far
    fn frames_emitted(&self) -> usize;

    /// True if the transport reported an error while streaming
    fn has_error(&self) -> bool {
        false
    }
}

/// Factory for playback streams.
pub trait OutputBackend: Send + Sync {
    /// Short name for the transcript ("cpal", "simulated")
    fn name(&self) -> &str;

    /// Open a stream on `device`.
    ///
    /// # Errors
    /// `Error::DeviceUnavailable` when the device cannot be opened with the
    /// requested rate and channel count.
    fn open_output(
        &self,
        device: DeviceId,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn PlaybackStream>>;
}

/// How waiting on an [`EndOfStream`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfStreamWait {
    /// All requested frames were emitted
    Finished,
    /// The timeout elapsed first
    TimedOut,
    /// The transport dropped its side without finishing (stream torn down)
    Closed,
}

/// Receiving side of a stream's completion signal
#[derive(Debug)]
pub struct EndOfStream {
    rx: Receiver<()>,
}

/// Sending side, held by the transport callback
#[derive(Debug)]
pub struct EndOfStreamSender {
    tx: SyncSender<()>,
    fired: bool,
}

impl EndOfStream {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (EndOfStreamSender, EndOfStream) {
        let (tx, rx) = mpsc::sync_channel(1);
        (EndOfStreamSender { tx, fired: false }, EndOfStream { rx })
    }

    /// Block until the stream finishes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> EndOfStreamWait {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => EndOfStreamWait::Finished,
            Err(RecvTimeoutError::Timeout) => EndOfStreamWait::TimedOut,
            Err(RecvTimeoutError::Disconnected) => EndOfStreamWait::Closed,
        }
    }
}

impl EndOfStreamSender {
    /// Signal completion. Only the first call has an effect.
    ///
    /// **REAL-TIME SAFE**: never blocks.
    pub fn signal(&mut self) {
        if !self.fired {
            self.fired = true;
            let _ = self.tx.try_send(());
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}
