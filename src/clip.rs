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
use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::router::Channel;

/// A finished, file-persisted synthesized utterance waiting to be played.
///
/// A clip is a temporary file: whoever holds the clip when playback finishes (or is
/// abandoned) removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipFile {
    path: PathBuf,
    channel: Channel,
}

impl ClipFile {
    pub fn new(path: impl Into<PathBuf>, channel: Channel) -> ClipFile {
        ClipFile {
            path: path.into(),
            channel,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Deletes the backing file. Failures are logged and otherwise ignored.
    pub fn remove(self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "Removed clip file."),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "Clip file already gone.")
            }
            Err(e) => warn!(path = ?self.path, err = %e, "Unable to remove clip file."),
        }
    }
}

impl fmt::Display for ClipFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.channel)
    }
}
