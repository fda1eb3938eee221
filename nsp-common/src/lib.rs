//! # nspeakers Common Library
//!
//! Shared code for the nspeakers workspace:
//! - Error type shared by configuration loading
//! - TOML configuration (device plan, reproduction timing, library paths)
//! - Configuration file resolution
//! - Human-readable time formatting for the operator transcript

pub mod config;
pub mod error;
pub mod human_time;
pub mod time;

pub use config::{LoggingConfig, PathsConfig, ReproductionSettings, TomlConfig};
pub use error::{Error, Result};
