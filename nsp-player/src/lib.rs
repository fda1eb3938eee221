//! # nspeakers playback library (nsp-player)
//!
//! Plays audio through a set of output devices, one group of devices at a
//! time, for spatial-audio demonstrations and speaker checks.
//!
//! **Pipeline:** device plan ([`plan`]) + decoded or synthesized signal
//! ([`audio`]) → [`scheduler::SyncScheduler`] (groups sequential, devices in
//! a group started together) → one output stream per device.
//! [`session::ReproductionSession`] strings signals together on one clock.
//!
//! **Audio stack:** symphonia (decode) + cpal (output), with a simulated
//! backend for rehearsals and tests.

pub mod audio;
pub mod catalog;
pub mod error;
pub mod library;
pub mod plan;
pub mod scheduler;
pub mod session;

pub use error::{Error, Result};
pub use plan::{DeviceGroup, DeviceId, GroupPlan};
pub use session::{ReproductionConfig, ReproductionSession, SessionReport, Signal};
