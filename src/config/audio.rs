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
use std::str::FromStr;

use serde::Deserialize;

use crate::audio::{format::FormatError, SampleFormat, TargetFormat};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BITS_PER_SAMPLE: u16 = 32;
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Audio {
    /// The output device. "default" picks the host's default output.
    device: Option<String>,

    /// Target sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Target sample format (default: "float")
    sample_format: Option<String>,

    /// Target bits per sample (default: 32)
    bits_per_sample: Option<u16>,

    /// Buffer size for decoded audio samples (default: 1024 frames)
    buffer_size: Option<usize>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the buffer size for decoded audio samples.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1)
    }

    /// Returns the validated format the output device should run at.
    pub fn target_format(&self) -> Result<TargetFormat, FormatError> {
        let sample_format = match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format)?,
            None => SampleFormat::Float,
        };
        TargetFormat::new(
            self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            sample_format,
            self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE),
        )
    }
}
