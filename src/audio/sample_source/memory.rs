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
use super::traits::{prepare_output, SampleSource};

/// A sample source backed by samples held in memory. Input is interleaved, storage is planar.
pub struct MemorySampleSource {
    planes: Vec<Vec<f32>>,
    position: usize,
    channel_count: u16,
    sample_rate: u32,
}

impl MemorySampleSource {
    pub fn new(interleaved: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        let channels = channel_count.max(1) as usize;
        let mut planes = vec![Vec::with_capacity(interleaved.len() / channels); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (plane, sample) in planes.iter_mut().zip(frame) {
                plane.push(*sample);
            }
        }

        Self {
            planes,
            position: 0,
            channel_count: channels as u16,
            sample_rate,
        }
    }

    fn total_frames(&self) -> usize {
        self.planes.first().map(Vec::len).unwrap_or(0)
    }
}

impl SampleSource for MemorySampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        prepare_output(output, self.channel_count)?;

        let to_copy = self
            .total_frames()
            .saturating_sub(self.position)
            .min(max_frames);
        for (out, plane) in output.iter_mut().zip(&self.planes) {
            out.extend_from_slice(&plane[self.position..self.position + to_copy]);
        }
        self.position += to_copy;

        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.total_frames() as f64 / self.sample_rate as f64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_chunks() {
        let mut source = MemorySampleSource::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 2, 10);
        assert_eq!(source.duration(), Some(Duration::from_millis(300)));

        let mut output = vec![Vec::new(), Vec::new()];
        assert_eq!(source.next_chunk(&mut output, 2).unwrap(), 2);
        assert_eq!(output, vec![vec![0.1, 0.3], vec![0.2, 0.4]]);

        assert_eq!(source.next_chunk(&mut output, 2).unwrap(), 1);
        assert_eq!(output, vec![vec![0.5], vec![0.6]]);

        assert_eq!(source.next_chunk(&mut output, 2).unwrap(), 0);
        assert!(output.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_channel_mismatch() {
        let mut source = MemorySampleSource::new(vec![0.0; 4], 2, 10);
        let mut output = vec![Vec::new()];
        assert!(matches!(
            source.next_chunk(&mut output, 2),
            Err(SampleSourceError::ChannelMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
