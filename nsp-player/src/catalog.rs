//! Output device catalog
//!
//! Enumerates output devices with the two properties the session needs:
//! native sample rate (to pick a common output rate) and maximum output
//! channel count (to open each stream with all of the device's channels).

use crate::error::{Error, Result};
use crate::plan::DeviceId;
use serde::Serialize;
use std::fmt::Write as _;

/// Properties of one output device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub native_sample_rate: u32,
    pub max_output_channels: u16,
}

/// Source of device information.
pub trait DeviceCatalog {
    /// All output devices, in driver order
    fn list(&self) -> Result<Vec<DeviceInfo>>;

    /// One device by id.
    ///
    /// # Errors
    /// `Error::UnknownDevice` when the driver does not know `id`.
    fn query_device(&self, id: DeviceId) -> Result<DeviceInfo> {
        self.list()?
            .into_iter()
            .find(|info| info.id == id)
            .ok_or(Error::UnknownDevice(id))
    }
}

/// Minimum native rate across `devices`: never ask a device for more than
/// the weakest one supports. `None` for an empty slice.
pub fn target_sample_rate(devices: &[DeviceInfo]) -> Option<u32> {
    devices.iter().map(|d| d.native_sample_rate).min()
}

/// Operator-facing device table.
pub fn format_device_table(devices: &[DeviceInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>4}  {:<40} {:>9} {:>8}", "ID", "Device", "Rate(Hz)", "Outputs");
    for device in devices {
        let _ = writeln!(
            out,
            "{:>4}  {:<40} {:>9} {:>8}",
            device.id,
            truncate_name(&device.name, 40),
            device.native_sample_rate,
            device.max_output_channels
        );
    }
    out
}

fn truncate_name(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let mut short: String = name.chars().take(width.saturating_sub(3)).collect();
        short.push_str("...");
        short
    }
}
