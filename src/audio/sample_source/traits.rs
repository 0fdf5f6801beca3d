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
use std::time::Duration;

use super::error::SampleSourceError;

/// A source of decoded audio in planar form: one `Vec<f32>` per channel.
pub trait SampleSource: Send {
    /// Fills `output` with up to `max_frames` frames and returns the number of frames written.
    /// Zero means the source is exhausted.
    ///
    /// `output` must have exactly `channel_count()` entries. Each entry is cleared first.
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError>;

    fn channel_count(&self) -> u16;

    fn sample_rate(&self) -> u32;

    /// The length of the source, if the container reports one.
    fn duration(&self) -> Option<Duration>;
}

impl SampleSource for Box<dyn SampleSource> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        (**self).next_chunk(output, max_frames)
    }

    fn channel_count(&self) -> u16 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn duration(&self) -> Option<Duration> {
        (**self).duration()
    }
}

/// Checks that a caller handed us one output buffer per channel and clears them.
pub(super) fn prepare_output(
    output: &mut [Vec<f32>],
    channels: u16,
) -> Result<(), SampleSourceError> {
    if output.len() != channels as usize {
        return Err(SampleSourceError::ChannelMismatch {
            expected: channels as usize,
            actual: output.len(),
        });
    }
    output.iter_mut().for_each(Vec::clear);
    Ok(())
}
