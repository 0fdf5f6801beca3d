// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;

use serde::Serialize;
use tracing::{debug, error};

use crate::audio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    BuiltinSpeaker,
    WiredHeadset,
    BluetoothA2dp,
    BuiltinReceiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    Speaker,
    Wired,
    Bluetooth,
    Receiver,
}

/// A connected output device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDeviceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub category: DeviceCategory,
    /// Stable identifier for the device.
    pub uid: String,
}

impl OutputDeviceInfo {
    /// Reported when no output device can be found.
    pub fn receiver_fallback() -> OutputDeviceInfo {
        OutputDeviceInfo {
            name: "Phone".to_string(),
            device_type: DeviceType::BuiltinReceiver,
            category: DeviceCategory::Receiver,
            uid: "receiver_default".to_string(),
        }
    }
}

/// Source of output device names.
pub trait DeviceEnumerator: Send + Sync {
    fn device_names(&self) -> Result<Vec<String>, Box<dyn Error>>;
}

/// Enumerates output devices through cpal.
pub struct CpalDevices;

impl DeviceEnumerator for CpalDevices {
    fn device_names(&self) -> Result<Vec<String>, Box<dyn Error>> {
        Ok(audio::cpal::list_output_devices()?
            .into_iter()
            .map(|listing| listing.name)
            .collect())
    }
}

/// A fixed set of devices.
pub struct StaticDevices(pub Vec<String>);

impl DeviceEnumerator for StaticDevices {
    fn device_names(&self) -> Result<Vec<String>, Box<dyn Error>> {
        Ok(self.0.clone())
    }
}

/// Classifies a device by its name.
pub fn classify(name: &str) -> (DeviceType, DeviceCategory) {
    let lower = name.to_ascii_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if contains_any(&["bluetooth", "bluez", "a2dp", "airpods"]) {
        (DeviceType::BluetoothA2dp, DeviceCategory::Bluetooth)
    } else if contains_any(&["headphone", "headset", "earphone", "wired"]) {
        (DeviceType::WiredHeadset, DeviceCategory::Wired)
    } else {
        (DeviceType::BuiltinSpeaker, DeviceCategory::Speaker)
    }
}

/// Lists connected output devices. Never empty: enumeration failures and empty results
/// report the receiver fallback.
pub fn connected_devices(enumerator: &dyn DeviceEnumerator) -> Vec<OutputDeviceInfo> {
    let mut names = match enumerator.device_names() {
        Ok(names) => names,
        Err(e) => {
            error!(err = e.to_string(), "Unable to enumerate output devices.");
            Vec::new()
        }
    };
    names.sort();
    names.dedup();

    let mut devices: Vec<OutputDeviceInfo> = names
        .into_iter()
        .map(|name| {
            let (device_type, category) = classify(&name);
            OutputDeviceInfo {
                uid: name.clone(),
                name,
                device_type,
                category,
            }
        })
        .collect();
    debug!(count = devices.len(), "Enumerated output devices.");

    if devices.is_empty() {
        devices.push(OutputDeviceInfo::receiver_fallback());
    }
    devices
}
