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
use std::{fmt, str::FromStr};

/// Number of output channels every device renders. Clips are folded to stereo before routing.
pub const OUTPUT_CHANNELS: u16 = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Sample rate must be greater than 0")]
    ZeroSampleRate,

    #[error("Unsupported bit depth {0} for integer output")]
    UnsupportedBitDepth(u16),
}

/// How samples are represented on the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int,
    Float,
}

impl FromStr for SampleFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float" => Ok(SampleFormat::Float),
            "int" => Ok(SampleFormat::Int),
            _ => Err(FormatError::UnsupportedSampleFormat(s.to_string())),
        }
    }
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The format an output device expects. Every clip is resampled to `sample_rate` and
/// rendered as stereo before it reaches the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub bits_per_sample: u16,
}

impl TargetFormat {
    pub fn new(
        sample_rate: u32,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, FormatError> {
        if sample_rate == 0 {
            return Err(FormatError::ZeroSampleRate);
        }
        if sample_format == SampleFormat::Int && !matches!(bits_per_sample, 16 | 32) {
            return Err(FormatError::UnsupportedBitDepth(bits_per_sample));
        }

        Ok(TargetFormat {
            sample_rate,
            sample_format,
            bits_per_sample,
        })
    }
}

impl Default for TargetFormat {
    /// 44.1kHz, 32-bit float.
    fn default() -> Self {
        TargetFormat {
            sample_rate: 44100,
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}-bit {}",
            self.sample_rate, self.bits_per_sample, self.sample_format
        )
    }
}
