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
use std::path::Path;

use super::audio::AudioSampleSource;
use super::error::SampleSourceError;
use super::traits::SampleSource;
use super::transcoder::AudioTranscoder;

/// Opens an audio file and, when its rate differs from `target_rate`, wraps it in a
/// resampling transcoder.
pub fn create_sample_source_from_file<P: AsRef<Path>>(
    path: P,
    target_rate: u32,
    buffer_size: usize,
) -> Result<Box<dyn SampleSource>, SampleSourceError> {
    let source = AudioSampleSource::from_file(path, buffer_size)?;
    if source.sample_rate() == target_rate {
        return Ok(Box::new(source));
    }
    Ok(Box::new(AudioTranscoder::new(source, target_rate)?))
}
