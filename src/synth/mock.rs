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
use std::{collections::HashSet, fmt, thread, time::Duration};

use parking_lot::Mutex;
use tracing::debug;

use super::{BufferSink, PcmBuffer, SynthesisError, Utterance, Voice};

const SAMPLE_RATE: u32 = 16000;
/// Frames of tone produced per character of text.
const FRAMES_PER_CHAR: usize = 40;
const CHUNK_FRAMES: usize = 256;

/// A synthesizer that speaks every utterance as a short deterministic tone. Doesn't need any
/// speech engine installed.
pub struct Synthesizer {
    languages: Vec<String>,
    fail_on: HashSet<String>,
    chunk_delay: Duration,
    spoken: Mutex<Vec<Utterance>>,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    pub fn new() -> Synthesizer {
        Synthesizer {
            languages: vec!["en-US".to_string(), "en-GB".to_string(), "fr-FR".to_string()],
            fail_on: HashSet::new(),
            chunk_delay: Duration::ZERO,
            spoken: Mutex::new(Vec::new()),
        }
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Synthesizer {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Makes synthesis of exactly this text fail.
    pub fn failing_on(mut self, text: &str) -> Synthesizer {
        self.fail_on.insert(text.to_string());
        self
    }

    /// Sleeps before every chunk, making synthesis slow enough to interrupt.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Synthesizer {
        self.chunk_delay = delay;
        self
    }

    /// Every utterance synthesis was attempted for, in order.
    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().clone()
    }
}

impl super::Synthesizer for Synthesizer {
    fn synthesize(
        &self,
        utterance: &Utterance,
        sink: &mut dyn BufferSink,
    ) -> Result<(), SynthesisError> {
        self.spoken.lock().push(utterance.clone());
        if self.fail_on.contains(&utterance.text) {
            return Err(SynthesisError::Engine(format!(
                "refusing to say {:?}",
                utterance.text
            )));
        }

        let frames = utterance.text.chars().count() * FRAMES_PER_CHAR;
        let frequency = 220.0 * utterance.pitch.max(0.1);
        let amplitude = 0.5 * utterance.volume.clamp(0.0, 1.0);
        debug!(utterance_id = utterance.id, frames, "Synthesizing tone.");

        let tone: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                (t * frequency * std::f32::consts::TAU).sin() * amplitude
            })
            .collect();
        for chunk in tone.chunks(CHUNK_FRAMES) {
            if !self.chunk_delay.is_zero() {
                thread::sleep(self.chunk_delay);
            }
            sink.write(PcmBuffer {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                samples: chunk.to_vec(),
            })?;
        }
        sink.write(PcmBuffer::terminal(SAMPLE_RATE, 1))
    }

    fn languages(&self) -> Result<Vec<String>, SynthesisError> {
        Ok(self.languages.clone())
    }

    fn voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        Ok(self
            .languages
            .iter()
            .enumerate()
            .map(|(index, lang)| Voice {
                voice_uri: format!("mock-{}", lang.to_ascii_lowercase()),
                name: format!("Mock {}", lang),
                lang: lang.clone(),
                local_service: true,
                default: index == 0,
            })
            .collect())
    }
}

impl fmt::Display for Synthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock")
    }
}
