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
use std::{error::Error, fmt, sync::Arc};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::config;

pub mod cpal;
pub mod format;
pub mod mock;
pub mod render;
pub mod sample_source;

pub use format::{SampleFormat, TargetFormat};
pub use render::StereoRenderer;

/// Sent by a device when a playback it was given has played to the end. Playbacks that are
/// halted never report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackDone {
    pub id: u64,
}

/// A single clip handed to an output device.
pub struct Playback {
    pub id: u64,
    pub renderer: StereoRenderer,
    done: Sender<PlaybackDone>,
}

impl Playback {
    pub fn new(id: u64, renderer: StereoRenderer, done: Sender<PlaybackDone>) -> Playback {
        Playback { id, renderer, done }
    }

    /// Reports completion. The receiver may already be gone during shutdown.
    pub fn complete(self) {
        debug!(id = self.id, "Playback complete.");
        let _ = self.done.send(PlaybackDone { id: self.id });
    }
}

/// An output stage that plays one stereo clip at a time.
pub trait Device: fmt::Display + Send + Sync {
    /// The format clips must be rendered in for this device.
    fn target_format(&self) -> TargetFormat;

    /// Starts playing the given clip. Completion is reported through the playback's channel.
    fn start(&self, playback: Playback) -> Result<(), Box<dyn Error>>;

    /// Stops the active playback immediately without reporting completion.
    fn halt(&self);
}

/// Gets the output device named in the configuration. Names starting with "mock" give a
/// device that plays nothing.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let target_format = config.target_format()?;
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, target_format)));
    }

    Ok(Arc::new(cpal::Device::get(device, target_format)?))
}
