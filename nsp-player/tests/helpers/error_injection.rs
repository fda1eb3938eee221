//! Error injection test utilities
//!
//! Builds files the decoder must reject (missing, corrupt, unsupported,
//! empty) inside a temporary directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Result type for error injection operations
pub type InjectionResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Test file generator for error injection scenarios
pub struct ErrorInjectionBuilder {
    temp_dir: TempDir,
}

impl ErrorInjectionBuilder {
    /// Create a new error injection builder with temporary directory
    pub fn new() -> InjectionResult<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Get the path to the temporary directory
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file path in the temporary directory
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.temp_dir.path().join(filename)
    }

    /// Path that does not exist
    pub fn nonexistent_file(&self) -> PathBuf {
        self.file_path("nonexistent_file.wav")
    }

    /// FLAC magic bytes followed by garbage
    pub fn corrupted_audio_file(&self) -> InjectionResult<PathBuf> {
        let path = self.file_path("corrupted.flac");
        let mut file = fs::File::create(&path)?;

        file.write_all(b"fLaC")?;
        file.write_all(&[0xFF; 1024])?; // Garbage data

        Ok(path)
    }

    /// Arbitrary binary data with an unknown extension
    pub fn unsupported_format_file(&self) -> InjectionResult<PathBuf> {
        let path = self.file_path("unsupported.xyz");
        let mut file = fs::File::create(&path)?;

        file.write_all(b"UNKNOWN_FORMAT_HEADER")?;
        file.write_all(&[0xAB; 4096])?;

        Ok(path)
    }

    /// Valid WAV header with no sample data
    pub fn empty_wav_file(&self) -> InjectionResult<PathBuf> {
        let path = self.file_path("empty.wav");
        super::audio_generator::generate_silent_wav(
            &path,
            0,
            super::audio_generator::WavLayout::default(),
        )?;
        Ok(path)
    }
}
