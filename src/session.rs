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
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to set audio route: {0}")]
    Route(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCategory {
    Playback,
    PlayAndRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOption {
    /// Lower other audio while speaking.
    DuckOthers,
    /// Route to the built-in speaker instead of the receiver.
    DefaultToSpeaker,
    AllowBluetoothA2dp,
    /// Play alongside other audio instead of interrupting it.
    MixWithOthers,
}

/// A session category together with its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteCategory {
    pub category: SessionCategory,
    pub options: Vec<SessionOption>,
}

/// The route requested for speech. Forcing the speaker trades bluetooth and mixing for a
/// guaranteed loudspeaker.
pub fn route_for(force_speaker: bool) -> RouteCategory {
    let options = if force_speaker {
        vec![SessionOption::DuckOthers, SessionOption::DefaultToSpeaker]
    } else {
        vec![
            SessionOption::DuckOthers,
            SessionOption::AllowBluetoothA2dp,
            SessionOption::MixWithOthers,
        ]
    };
    RouteCategory {
        category: SessionCategory::PlayAndRecord,
        options,
    }
}

/// Applies routes to the platform's audio session.
pub trait AudioSession: Send + Sync {
    fn set_route(&self, force_speaker: bool) -> Result<RouteCategory, SessionError>;

    /// The last route successfully applied.
    fn current_route(&self) -> Option<RouteCategory>;
}

/// A session with no platform policy behind it. Records and logs the requested route.
#[derive(Default)]
pub struct RecordingSession {
    current: Mutex<Option<RouteCategory>>,
}

impl RecordingSession {
    pub fn new() -> RecordingSession {
        RecordingSession::default()
    }
}

impl AudioSession for RecordingSession {
    fn set_route(&self, force_speaker: bool) -> Result<RouteCategory, SessionError> {
        let route = route_for(force_speaker);
        info!(force_speaker, route = ?route, "Audio route applied.");
        *self.current.lock() = Some(route.clone());
        Ok(route)
    }

    fn current_route(&self) -> Option<RouteCategory> {
        self.current.lock().clone()
    }
}
