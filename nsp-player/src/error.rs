//! Error types for nsp-player
//!
//! Scope of each variant, as enforced by the scheduler and session:
//! - `MalformedPlan`, `UnknownDevice`, `DirectoryNotFound`, `Config`: fatal,
//!   reported before any playback starts
//! - `DeviceUnavailable`: isolated to one device within one group
//! - `Decode`: aborts only the signal being processed

use crate::plan::DeviceId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for nsp-player
#[derive(Error, Debug)]
pub enum Error {
    /// Group-plan expression could not be parsed
    #[error("Malformed device plan at position {position}: {reason}")]
    MalformedPlan { position: usize, reason: String },

    /// Configuration references a device the driver does not know
    #[error("Unknown output device {0}")]
    UnknownDevice(DeviceId),

    /// Output stream could not be opened on a device
    #[error("Device {device} unavailable: {reason}")]
    DeviceUnavailable { device: DeviceId, reason: String },

    /// Audio file missing, unsupported or corrupt
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Required audio folder is missing
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Audio host or stream failure after a device was opened
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Sample data does not match its declared layout
    #[error("Invalid sample buffer: {0}")]
    InvalidBuffer(String),

    /// Operator input did not name valid library entries
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Invalid timing parameters
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Configuration loading errors
    #[error(transparent)]
    Config(#[from] nsp_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors scoped to a single device rather than the whole run.
    pub fn is_device_scoped(&self) -> bool {
        matches!(self, Error::DeviceUnavailable { .. })
    }
}

/// Convenience Result type using nsp-player Error
pub type Result<T> = std::result::Result<T, Error>;
