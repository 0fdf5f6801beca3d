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
use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The logical output a clip is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "ChannelSelector", rename_all = "lowercase")]
pub enum Channel {
    /// Left speaker only.
    Left,
    /// Right speaker only.
    Right,
    /// Both speakers, centered.
    #[default]
    Stereo,
}

/// The forms a channel selector can take on the wire: the plugin's numeric code or a name.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChannelSelector {
    Code(i64),
    Name(String),
}

impl From<ChannelSelector> for Channel {
    fn from(selector: ChannelSelector) -> Self {
        match selector {
            ChannelSelector::Code(code) => Channel::from_code(code),
            ChannelSelector::Name(name) => Channel::from_name(&name),
        }
    }
}

impl Channel {
    /// Converts the numeric selector used by the plugin surface (1 = left, 2 = right).
    /// Anything else is stereo.
    pub fn from_code(code: i64) -> Channel {
        match code {
            1 => Channel::Left,
            2 => Channel::Right,
            _ => Channel::Stereo,
        }
    }

    /// Converts a channel name or numeric string. Unrecognized input is stereo.
    pub fn from_name(name: &str) -> Channel {
        let name = name.trim();
        if let Ok(code) = name.parse::<i64>() {
            return Channel::from_code(code);
        }

        match name.to_ascii_lowercase().as_str() {
            "left" | "l" => Channel::Left,
            "right" | "r" => Channel::Right,
            _ => Channel::Stereo,
        }
    }

    /// The numeric selector for this channel.
    pub fn code(self) -> i64 {
        match self {
            Channel::Stereo => 0,
            Channel::Left => 1,
            Channel::Right => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Left => "left",
            Channel::Right => "right",
            Channel::Stereo => "stereo",
        }
    }
}

impl FromStr for Channel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Channel::from_name(s))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Gain and pan applied to the output stage for a single playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Routing {
    /// Linear gain, 1.0 is unity.
    pub gain: f32,
    /// Pan from -1.0 (fully left) through 0.0 (center) to 1.0 (fully right).
    pub pan: f32,
}

impl Routing {
    /// Per-side linear gains (left, right) for this routing. Panning attenuates the opposite
    /// side only, so a centered routing leaves both sides at full gain.
    pub fn gains(&self) -> (f32, f32) {
        let pan = self.pan.clamp(-1.0, 1.0);
        let left = self.gain * (1.0 - pan).min(1.0);
        let right = self.gain * (1.0 + pan).min(1.0);
        (left, right)
    }
}

impl Default for Routing {
    fn default() -> Self {
        apply(Channel::Stereo)
    }
}

/// Maps a channel to the gain and pan the output stage should use.
pub fn apply(channel: Channel) -> Routing {
    match channel {
        Channel::Left => Routing {
            gain: 1.0,
            pan: -1.0,
        },
        Channel::Right => Routing {
            gain: 1.0,
            pan: 1.0,
        },
        Channel::Stereo => Routing {
            gain: 1.0,
            pan: 0.0,
        },
    }
}
