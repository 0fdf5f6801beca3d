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
pub mod audio;
pub mod clip;
pub mod config;
mod control;
pub mod devices;
pub mod engine;
pub mod playsync;
pub mod queue;
pub mod router;
pub mod session;
pub mod speech;
pub mod synth;
#[cfg(test)]
mod testutil;
pub mod tickets;

pub use speech::{QueueStrategy, SpeakOptions, SpeechError, TextToSpeech, UtteranceOutcome};
