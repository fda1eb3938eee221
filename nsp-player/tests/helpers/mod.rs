//! Test helper modules for nsp-player integration tests
//!
//! - `audio_generator`: deterministic WAV fixtures (hound)
//! - `error_injection`: missing, corrupt and unsupported files
//! - `devices`: simulated device sets and plan shortcuts

#![allow(dead_code)]

pub mod audio_generator;
pub mod devices;
pub mod error_injection;
