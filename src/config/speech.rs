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
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::tickets::TicketPolicy;

const DEFAULT_SYNTHESIZER: &str = "espeak-ng";
const DEFAULT_ESPEAK_BIN: &str = "espeak-ng";
const DEFAULT_LANG: &str = "en-US";

/// A YAML representation of the speech configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Speech {
    /// The synthesizer backend: "espeak-ng" or a name starting with "mock".
    synthesizer: Option<String>,

    /// Path to the espeak-ng binary (default: looked up on PATH)
    espeak_bin: Option<PathBuf>,

    /// Where synthesized clips are written (default: a speakq directory under the system
    /// temp dir)
    clip_dir: Option<PathBuf>,

    /// How synthesis signals are matched to outstanding speak requests (default: fifo)
    ticket_policy: Option<TicketPolicy>,

    /// Whether clips abandoned by a stop are deleted (default: true)
    cleanup_on_stop: Option<bool>,

    /// Language used when a request doesn't name one (default: en-US)
    default_lang: Option<String>,
}

impl Speech {
    pub fn new(synthesizer: &str) -> Speech {
        Speech {
            synthesizer: Some(synthesizer.to_string()),
            ..Default::default()
        }
    }

    /// Sets the clip directory.
    pub fn with_clip_dir(mut self, clip_dir: impl Into<PathBuf>) -> Speech {
        self.clip_dir = Some(clip_dir.into());
        self
    }

    /// Sets the ticket policy.
    pub fn with_ticket_policy(mut self, ticket_policy: TicketPolicy) -> Speech {
        self.ticket_policy = Some(ticket_policy);
        self
    }

    pub fn synthesizer(&self) -> &str {
        self.synthesizer.as_deref().unwrap_or(DEFAULT_SYNTHESIZER)
    }

    pub fn espeak_bin(&self) -> &Path {
        self.espeak_bin
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_ESPEAK_BIN))
    }

    pub fn clip_dir(&self) -> PathBuf {
        self.clip_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("speakq"))
    }

    pub fn ticket_policy(&self) -> TicketPolicy {
        self.ticket_policy.unwrap_or_default()
    }

    pub fn cleanup_on_stop(&self) -> bool {
        self.cleanup_on_stop.unwrap_or(true)
    }

    pub fn default_lang(&self) -> &str {
        self.default_lang.as_deref().unwrap_or(DEFAULT_LANG)
    }
}
