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
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use hound::{SampleFormat, WavReader};
use tracing::{debug, span, Level};

use super::{BufferSink, PcmBuffer, SynthesisError, Utterance, Voice};

/// Frames handed to the sink per buffer.
const CHUNK_FRAMES: usize = 1024;

/// Words per minute at rate 1.0, and the range espeak-ng accepts.
const BASE_WPM: f32 = 175.0;
const WPM_RANGE: (f32, f32) = (80.0, 450.0);

/// Speaks through the espeak-ng command line tool.
pub struct Synthesizer {
    binary: PathBuf,
}

impl Synthesizer {
    pub fn new(binary: &Path) -> Synthesizer {
        Synthesizer {
            binary: binary.to_path_buf(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        command
    }

    /// Renders the utterance to `output` as a WAV file.
    fn render(&self, utterance: &Utterance, output: &Path) -> Result<(), SynthesisError> {
        let mut child = self
            .command()
            .args(espeak_args(utterance))
            .arg("-w")
            .arg(output)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(utterance.text.as_bytes())?;
        }
        let result = child.wait_with_output()?;
        if !result.status.success() {
            return Err(SynthesisError::Engine(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }

    fn unavailable(&self, e: std::io::Error) -> SynthesisError {
        SynthesisError::Unavailable(format!("{}: {}", self.binary.display(), e))
    }
}

impl super::Synthesizer for Synthesizer {
    fn synthesize(
        &self,
        utterance: &Utterance,
        sink: &mut dyn BufferSink,
    ) -> Result<(), SynthesisError> {
        let span = span!(Level::INFO, "synthesize (espeak-ng)");
        let _enter = span.enter();

        let scratch = tempfile::Builder::new()
            .prefix("espeak-")
            .suffix(".wav")
            .tempfile()?;
        self.render(utterance, scratch.path())?;

        let mut reader = WavReader::open(scratch.path())?;
        let spec = reader.spec();
        debug!(
            utterance_id = utterance.id,
            rate = spec.sample_rate,
            frames = reader.duration(),
            "Rendered utterance."
        );

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let chunk = CHUNK_FRAMES * spec.channels.max(1) as usize;
        for samples in samples.chunks(chunk) {
            sink.write(PcmBuffer {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                samples: samples.to_vec(),
            })?;
        }
        sink.write(PcmBuffer::terminal(spec.sample_rate, spec.channels))
    }

    fn languages(&self) -> Result<Vec<String>, SynthesisError> {
        let mut languages: Vec<String> = self.voices()?.into_iter().map(|v| v.lang).collect();
        languages.sort();
        languages.dedup();
        Ok(languages)
    }

    fn voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        let output = self
            .command()
            .arg("--voices")
            .output()
            .map_err(|e| self.unavailable(e))?;
        if !output.status.success() {
            return Err(SynthesisError::Engine(format!(
                "{} --voices exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        Ok(parse_voices(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl fmt::Display for Synthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "espeak-ng ({})", self.binary.display())
    }
}

/// Maps utterance parameters onto espeak-ng flags.
fn espeak_args(utterance: &Utterance) -> Vec<String> {
    let voice = match &utterance.voice {
        Some(voice) => voice.voice_uri.clone(),
        None => utterance.lang.to_ascii_lowercase(),
    };
    let wpm = (BASE_WPM * utterance.rate).clamp(WPM_RANGE.0, WPM_RANGE.1);
    let pitch = (50.0 * utterance.pitch).clamp(0.0, 99.0);
    let amplitude = (100.0 * utterance.volume).clamp(0.0, 200.0);

    vec![
        "-v".to_string(),
        voice,
        "-s".to_string(),
        (wpm.round() as u32).to_string(),
        "-p".to_string(),
        (pitch.round() as u32).to_string(),
        "-a".to_string(),
        (amplitude.round() as u32).to_string(),
    ]
}

/// Parses the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
/// ```
///
/// The first voice listed for a language is marked as its default. Voices are identified by
/// their file, since several voices can share a language.
fn parse_voices(table: &str) -> Vec<Voice> {
    let mut voices: Vec<Voice> = Vec::new();
    for line in table.lines().skip(1) {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let [_, lang, _, name, rest @ ..] = columns.as_slice() else {
            continue;
        };
        // The voice file uniquely identifies a voice and is accepted by -v.
        let voice_uri = rest
            .first()
            .map(|file| file.to_string())
            .unwrap_or_else(|| lang.to_ascii_lowercase());
        let lang = to_bcp47(lang);
        let default = !voices.iter().any(|v| v.lang == lang);
        voices.push(Voice {
            voice_uri,
            name: name.replace('_', " "),
            lang,
            local_service: true,
            default,
        });
    }
    voices.sort_by(|a, b| a.name.cmp(&b.name));
    voices
}

/// espeak-ng lists tags in lower case (`en-us`); region subtags are conventionally upper.
fn to_bcp47(tag: &str) -> String {
    tag.split('-')
        .enumerate()
        .map(|(index, part)| {
            if index > 0 && part.len() == 2 {
                part.to_ascii_uppercase()
            } else {
                part.to_ascii_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
