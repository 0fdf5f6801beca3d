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
use std::{path::Path, time::Duration};

use super::{
    format::{TargetFormat, OUTPUT_CHANNELS},
    sample_source::{create_sample_source_from_file, SampleSource, SampleSourceError},
};
use crate::router::Routing;

/// Turns a decoded clip into interleaved stereo at the device rate with routing applied.
///
/// Mono clips are duplicated onto both sides; clips with more than two channels keep the
/// first two.
pub struct StereoRenderer {
    source: Box<dyn SampleSource>,
    routing: Routing,
    planes: Vec<Vec<f32>>,
}

impl StereoRenderer {
    pub fn new(source: Box<dyn SampleSource>, routing: Routing) -> StereoRenderer {
        let planes = vec![Vec::new(); source.channel_count() as usize];
        StereoRenderer {
            source,
            routing,
            planes,
        }
    }

    /// Opens the clip at `path` and prepares it for a device with the given format.
    pub fn open(
        path: &Path,
        target_format: &TargetFormat,
        routing: Routing,
        buffer_size: usize,
    ) -> Result<StereoRenderer, SampleSourceError> {
        let source =
            create_sample_source_from_file(path, target_format.sample_rate, buffer_size)?;
        Ok(StereoRenderer::new(source, routing))
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.source.duration()
    }

    /// Fills `out` with interleaved stereo frames and returns how many frames were written.
    /// Zero means the clip is finished.
    pub fn render(&mut self, out: &mut [f32]) -> Result<usize, SampleSourceError> {
        let max_frames = out.len() / OUTPUT_CHANNELS as usize;
        if max_frames == 0 || self.planes.is_empty() {
            return Ok(0);
        }

        let frames = self.source.next_chunk(&mut self.planes, max_frames)?;
        let (left_gain, right_gain) = self.routing.gains();
        let left = &self.planes[0];
        let right = self.planes.get(1).unwrap_or(left);

        for (frame, out) in out.chunks_exact_mut(2).take(frames).enumerate() {
            out[0] = left[frame] * left_gain;
            out[1] = right[frame] * right_gain;
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::sample_source::MemorySampleSource,
        router::{apply, Channel},
        testutil::write_wav,
    };

    fn renderer(samples: Vec<f32>, channels: u16, channel: Channel) -> StereoRenderer {
        StereoRenderer::new(
            Box::new(MemorySampleSource::new(samples, channels, 8000)),
            apply(channel),
        )
    }

    #[test]
    fn test_mono_routed_left() {
        let mut renderer = renderer(vec![0.5, -0.5, 0.25], 1, Channel::Left);
        let mut out = vec![9.0; 8];

        assert_eq!(renderer.render(&mut out).unwrap(), 3);
        assert_eq!(&out[..6], &[0.5, 0.0, -0.5, 0.0, 0.25, 0.0]);
        assert_eq!(renderer.render(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_mono_routed_right() {
        let mut renderer = renderer(vec![0.5, -0.5], 1, Channel::Right);
        let mut out = vec![0.0; 4];

        assert_eq!(renderer.render(&mut out).unwrap(), 2);
        assert_eq!(out, vec![0.0, 0.5, 0.0, -0.5]);
    }

    #[test]
    fn test_stereo_passthrough() {
        let mut renderer = renderer(vec![0.1, 0.2, 0.3, 0.4], 2, Channel::Stereo);
        let mut out = vec![0.0; 4];

        assert_eq!(renderer.render(&mut out).unwrap(), 2);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_extra_channels_dropped() {
        let mut renderer = renderer(vec![0.1, 0.2, 0.9, 0.3, 0.4, 0.9], 3, Channel::Stereo);
        let mut out = vec![0.0; 4];

        assert_eq!(renderer.render(&mut out).unwrap(), 2);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_partial_gain() {
        let mut renderer = StereoRenderer::new(
            Box::new(MemorySampleSource::new(vec![1.0], 1, 8000)),
            Routing {
                gain: 0.5,
                pan: 0.5,
            },
        );
        let mut out = vec![0.0; 2];

        assert_eq!(renderer.render(&mut out).unwrap(), 1);
        assert_eq!(out, vec![0.25, 0.5]);
    }

    #[test]
    fn test_open_resamples_to_device_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, &vec![0.1; 2205], 1, 22050).unwrap();

        let target = TargetFormat::default();
        let renderer = StereoRenderer::open(&path, &target, apply(Channel::Left), 256).unwrap();
        assert_eq!(renderer.sample_rate(), 44100);
        assert_eq!(renderer.routing(), apply(Channel::Left));
        assert_eq!(renderer.duration(), Some(Duration::from_millis(100)));
    }
}
