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
use std::{error::Error, fmt, sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::{
    audio::{Playback, TargetFormat},
    playsync::CancelHandle,
    router::Routing,
};

/// A record of a playback the mock device was asked to start.
#[derive(Debug, Clone, PartialEq)]
pub struct Started {
    pub id: u64,
    pub routing: Routing,
}

struct Active {
    playback: Playback,
    cancel_handle: CancelHandle,
}

#[derive(Default)]
struct State {
    active: Option<Active>,
    started: Vec<Started>,
    halts: usize,
    fail_next_start: bool,
}

/// A mock device. Doesn't actually play anything.
///
/// In automatic mode each playback completes after the clip's duration. In manual mode
/// playbacks only complete when [Device::finish_current] is called.
#[derive(Clone)]
pub struct Device {
    name: String,
    target_format: TargetFormat,
    automatic: bool,
    state: Arc<Mutex<State>>,
}

impl Device {
    /// Gets the given mock device. Names containing "manual" complete only on request.
    pub fn get(name: &str, target_format: TargetFormat) -> Device {
        Device {
            name: name.to_string(),
            target_format,
            automatic: !name.contains("manual"),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A device whose playbacks complete only through [Device::finish_current].
    pub fn manual() -> Device {
        Device::get("mock-manual", TargetFormat::default())
    }

    /// Completes the active playback as if it had played to the end. Returns its id.
    pub fn finish_current(&self) -> Option<u64> {
        let active = self.state.lock().active.take()?;
        let id = active.playback.id;
        active.playback.complete();
        Some(id)
    }

    /// Returns true if the device is currently playing.
    pub fn is_playing(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// The id of the active playback, if any.
    pub fn current_id(&self) -> Option<u64> {
        self.state.lock().active.as_ref().map(|active| active.playback.id)
    }

    /// Every playback started so far, in order.
    pub fn started(&self) -> Vec<Started> {
        self.state.lock().started.clone()
    }

    /// How many times the device was halted while playing.
    pub fn halts(&self) -> usize {
        self.state.lock().halts
    }

    /// Makes the next call to start fail.
    pub fn fail_next_start(&self) {
        self.state.lock().fail_next_start = true;
    }

    /// Completes playback `id` after `duration` unless it is halted first.
    fn complete_after(&self, id: u64, duration: Duration, cancel_handle: CancelHandle) {
        let state = self.state.clone();
        thread::spawn(move || {
            if cancel_handle.wait_for(duration) {
                return;
            }
            let mut state = state.lock();
            if state.active.as_ref().is_some_and(|a| a.playback.id == id) {
                if let Some(active) = state.active.take() {
                    active.playback.complete();
                }
            }
        });
    }
}

impl crate::audio::Device for Device {
    fn target_format(&self) -> TargetFormat {
        self.target_format.clone()
    }

    fn start(&self, playback: Playback) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "start playback (mock)");
        let _enter = span.enter();

        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_start) {
            return Err(format!("{} refused to start playback {}", self.name, playback.id).into());
        }
        if let Some(active) = &state.active {
            return Err(format!(
                "{} is already playing {}, refusing {}",
                self.name, active.playback.id, playback.id
            )
            .into());
        }

        let id = playback.id;
        let duration = playback.renderer.duration().unwrap_or_default();
        info!(
            device = self.name,
            id,
            routing = ?playback.renderer.routing(),
            duration = ?duration,
            "Playing clip."
        );
        state.started.push(Started {
            id,
            routing: playback.renderer.routing(),
        });

        let cancel_handle = CancelHandle::new();
        state.active = Some(Active {
            playback,
            cancel_handle: cancel_handle.clone(),
        });
        drop(state);

        if self.automatic {
            self.complete_after(id, duration, cancel_handle);
        }
        Ok(())
    }

    fn halt(&self) {
        let mut state = self.state.lock();
        if let Some(active) = state.active.take() {
            info!(device = self.name, id = active.playback.id, "Halting clip.");
            active.cancel_handle.cancel();
            state.halts += 1;
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
