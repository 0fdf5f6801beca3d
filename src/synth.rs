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

//! Speech synthesis: the synthesizer seam, the background worker that runs it, and the
//! writer that persists synthesized audio as clips.

use std::{error::Error, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{config, router::Channel};

pub mod clip_writer;
pub mod espeak;
pub mod mock;
pub mod worker;

pub use clip_writer::ClipWriter;
pub use worker::{SynthesisEvent, SynthesisWorker};

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Synthesis cancelled")]
    Cancelled,

    #[error("Speech engine failed: {0}")]
    Engine(String),

    #[error("Speech engine unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

/// A voice offered by a synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    /// Identifier handed back to the synthesizer to select this voice.
    #[serde(rename = "voiceURI")]
    pub voice_uri: String,
    pub name: String,
    /// BCP 47 language tag.
    pub lang: String,
    pub local_service: bool,
    pub default: bool,
}

/// One request to synthesize text.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub lang: String,
    /// 1.0 is the engine's normal speaking rate.
    pub rate: f32,
    /// 1.0 is the engine's normal pitch.
    pub pitch: f32,
    /// 0.0 to 1.0.
    pub volume: f32,
    pub voice: Option<Voice>,
    pub channel: Channel,
}

/// A chunk of synthesized audio. Samples are interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    /// The zero-length buffer that ends an utterance.
    pub fn terminal(sample_rate: u32, channels: u16) -> PcmBuffer {
        PcmBuffer {
            sample_rate,
            channels,
            samples: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Receives synthesized audio as it is produced. An error tells the synthesizer to stop.
pub trait BufferSink {
    fn write(&mut self, buffer: PcmBuffer) -> Result<(), SynthesisError>;
}

/// A text-to-speech engine.
pub trait Synthesizer: fmt::Display + Send + Sync {
    /// Synthesizes the utterance into `sink`, ending with a terminal buffer.
    fn synthesize(
        &self,
        utterance: &Utterance,
        sink: &mut dyn BufferSink,
    ) -> Result<(), SynthesisError>;

    /// BCP 47 tags of every language the engine can speak.
    fn languages(&self) -> Result<Vec<String>, SynthesisError>;

    fn voices(&self) -> Result<Vec<Voice>, SynthesisError>;

    fn is_language_supported(&self, lang: &str) -> bool {
        self.languages()
            .map(|languages| languages.iter().any(|l| language_matches(l, lang)))
            .unwrap_or(false)
    }
}

/// Compares language tags case-insensitively, treating `_` and `-` alike. A bare language
/// such as `en` matches any regional variant of it, in either direction.
pub fn language_matches(available: &str, requested: &str) -> bool {
    let normalize = |tag: &str| tag.trim().replace('_', "-").to_ascii_lowercase();
    let available = normalize(available);
    let requested = normalize(requested);
    if available.is_empty() || requested.is_empty() {
        return false;
    }
    if available == requested {
        return true;
    }

    let primary = |tag: &str| tag.split('-').next().unwrap_or_default().to_string();
    (!requested.contains('-') && primary(&available) == requested)
        || (!available.contains('-') && primary(&requested) == available)
}

/// Gets the synthesizer named in the configuration.
pub fn get_synthesizer(config: &config::Speech) -> Result<Arc<dyn Synthesizer>, Box<dyn Error>> {
    let name = config.synthesizer();
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Synthesizer::new()));
    }
    match name {
        "espeak-ng" | "espeak" => Ok(Arc::new(espeak::Synthesizer::new(config.espeak_bin()))),
        _ => Err(format!("unknown synthesizer {}", name).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_matches() {
        assert!(language_matches("en-US", "en-us"));
        assert!(language_matches("en_US", "EN-us"));
        assert!(language_matches("en-US", "en"));
        assert!(language_matches("en", "en-GB"));
        assert!(!language_matches("en-US", "en-GB"));
        assert!(!language_matches("en-US", "fr"));
        assert!(!language_matches("eng", "en"));
        assert!(!language_matches("en-US", ""));
    }

    #[test]
    fn test_pcm_buffer() {
        let buffer = PcmBuffer {
            sample_rate: 22050,
            channels: 2,
            samples: vec![0.0; 10],
        };
        assert_eq!(buffer.frames(), 5);
        assert!(!buffer.is_terminal());
        assert!(PcmBuffer::terminal(22050, 1).is_terminal());
    }

    #[test]
    fn test_voice_serializes_camel_case() {
        let voice = Voice {
            voice_uri: "en-us".into(),
            name: "English (America)".into(),
            lang: "en-US".into(),
            local_service: true,
            default: true,
        };
        let json = serde_json::to_value(&voice).unwrap();
        assert_eq!(json["voiceURI"], "en-us");
        assert_eq!(json["localService"], true);
    }
}
