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
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, warn};

use super::{BufferSink, PcmBuffer, SynthesisError};
use crate::{clip::ClipFile, playsync::CancelHandle, router::Channel};

enum State {
    /// Nothing written yet; no file exists.
    Empty,
    Writing {
        path: PathBuf,
        spec: WavSpec,
        writer: WavWriter<BufWriter<File>>,
    },
    /// The terminal buffer arrived. `None` if the utterance produced no audio.
    Finished(Option<ClipFile>),
}

/// Persists one utterance's audio as a 32-bit float WAV clip.
///
/// The file is created in the clip directory on the first non-empty buffer, using that
/// buffer's format. A writer dropped before it is finished removes its partial file.
pub struct ClipWriter {
    dir: PathBuf,
    channel: Channel,
    cancel_handle: CancelHandle,
    state: State,
}

impl ClipWriter {
    pub fn new(dir: &Path, channel: Channel, cancel_handle: CancelHandle) -> ClipWriter {
        ClipWriter {
            dir: dir.to_path_buf(),
            channel,
            cancel_handle,
            state: State::Empty,
        }
    }

    /// Completes the clip and hands it over. Finalizes the file even if the synthesizer
    /// never sent a terminal buffer.
    pub fn finish(mut self) -> Result<Option<ClipFile>, SynthesisError> {
        if matches!(self.state, State::Writing { .. }) {
            self.finalize()?;
        }
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Finished(clip) => Ok(clip),
            _ => Ok(None),
        }
    }

    fn create(&self, buffer: &PcmBuffer) -> Result<State, SynthesisError> {
        let spec = WavSpec {
            channels: buffer.channels,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let (file, path) = tempfile::Builder::new()
            .prefix("utterance-")
            .suffix(".wav")
            .tempfile_in(&self.dir)?
            .keep()
            .map_err(std::io::Error::from)?;
        debug!(path = ?path, rate = spec.sample_rate, channels = spec.channels, "Creating clip.");

        Ok(State::Writing {
            path,
            spec,
            writer: WavWriter::new(BufWriter::new(file), spec)?,
        })
    }

    fn finalize(&mut self) -> Result<(), SynthesisError> {
        match std::mem::replace(&mut self.state, State::Finished(None)) {
            State::Writing { path, writer, .. } => {
                if let Err(e) = writer.finalize() {
                    remove_partial(&path);
                    return Err(e.into());
                }
                self.state = State::Finished(Some(ClipFile::new(path, self.channel)));
            }
            other => self.state = other,
        }
        Ok(())
    }
}

impl BufferSink for ClipWriter {
    fn write(&mut self, buffer: PcmBuffer) -> Result<(), SynthesisError> {
        if self.cancel_handle.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        if matches!(self.state, State::Finished(_)) {
            return Err(SynthesisError::Engine(
                "audio received after the end of the utterance".to_string(),
            ));
        }
        if buffer.is_terminal() {
            if matches!(self.state, State::Empty) {
                self.state = State::Finished(None);
                return Ok(());
            }
            return self.finalize();
        }

        if matches!(self.state, State::Empty) {
            self.state = self.create(&buffer)?;
        }
        let State::Writing { spec, writer, .. } = &mut self.state else {
            return Ok(());
        };
        if spec.sample_rate != buffer.sample_rate || spec.channels != buffer.channels {
            return Err(SynthesisError::Engine(format!(
                "format changed mid-utterance from {}Hz/{} to {}Hz/{}",
                spec.sample_rate, spec.channels, buffer.sample_rate, buffer.channels
            )));
        }
        for sample in buffer.samples {
            writer.write_sample(sample)?;
        }
        Ok(())
    }
}

impl Drop for ClipWriter {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.state, State::Empty) {
            State::Writing { path, writer, .. } => {
                drop(writer);
                remove_partial(&path);
            }
            State::Finished(Some(clip)) => clip.remove(),
            _ => {}
        }
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = ?path, err = %e, "Unable to remove partial clip.");
    }
}
