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
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::error::SampleSourceError;
use super::traits::{prepare_output, SampleSource};

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Number of frames `frames` source frames occupy at the target rate, rounded up.
fn expected_frames(frames: usize, source_rate: u32, target_rate: u32) -> usize {
    let scaled = frames as u64 * target_rate as u64;
    scaled.div_ceil(source_rate as u64) as usize
}

/// Planar sample storage that is consumed from the front.
struct PlanarFifo {
    channels: Vec<Vec<f32>>,
    read_pos: usize,
}

impl PlanarFifo {
    fn new(num_channels: usize) -> Self {
        Self {
            channels: vec![Vec::new(); num_channels],
            read_pos: 0,
        }
    }

    fn len(&self) -> usize {
        self.channels
            .first()
            .map(|c| c.len() - self.read_pos)
            .unwrap_or(0)
    }

    /// Appends `frames` frames of each plane, starting at frame `start`.
    fn push(&mut self, planes: &[Vec<f32>], start: usize, frames: usize) {
        for (ch, plane) in self.channels.iter_mut().zip(planes) {
            let end = (start + frames).min(plane.len());
            ch.extend_from_slice(&plane[start.min(end)..end]);
        }
    }

    /// Unread frames of every channel.
    fn unread(&self) -> Vec<&[f32]> {
        self.channels.iter().map(|c| &c[self.read_pos..]).collect()
    }

    fn consume(&mut self, frames: usize) {
        let total = self.channels.first().map_or(0, Vec::len);
        self.read_pos = (self.read_pos + frames).min(total);
        if self.read_pos > 4096 || self.read_pos == total {
            for ch in self.channels.iter_mut() {
                ch.drain(..self.read_pos);
            }
            self.read_pos = 0;
        }
    }

    /// Moves up to `max_frames` frames into `output`, returning the number moved.
    fn drain_into(&mut self, output: &mut [Vec<f32>], max_frames: usize) -> usize {
        let frames = self.len().min(max_frames);
        for (out, ch) in output.iter_mut().zip(&self.channels) {
            out.extend_from_slice(&ch[self.read_pos..self.read_pos + frames]);
        }
        self.consume(frames);
        frames
    }
}

/// Converts a sample source to a different sample rate with a rubato sinc resampler.
/// Sources already at the target rate pass through untouched.
pub struct AudioTranscoder<S: SampleSource> {
    source: S,
    resampler: Option<SincFixedIn<f32>>,
    source_rate: u32,
    target_rate: u32,
    channels: u16,
    source_finished: bool,
    /// Frames read from the source so far.
    frames_in: usize,
    /// Frames handed to the output so far.
    frames_out: usize,
    /// Leading resampler output still to be skipped.
    delay_remaining: usize,
    /// Input waiting for the resampler.
    input: PlanarFifo,
    /// Resampled output waiting for the caller.
    output: PlanarFifo,
    /// Scratch buffers reused across calls.
    read_scratch: Vec<Vec<f32>>,
    resample_scratch: Vec<Vec<f32>>,
}

impl<S: SampleSource> AudioTranscoder<S> {
    pub fn new(source: S, target_rate: u32) -> Result<Self, SampleSourceError> {
        let source_rate = source.sample_rate();
        let channels = source.channel_count();

        let resampler = if source_rate != target_rate {
            let sinc_params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                oversampling_factor: 128,
                interpolation: SincInterpolationType::Linear,
                window: WindowFunction::BlackmanHarris2,
            };
            let ratio = target_rate as f64 / source_rate as f64;
            Some(
                SincFixedIn::<f32>::new(
                    ratio,
                    1.0,
                    sinc_params,
                    INPUT_BLOCK_SIZE,
                    channels as usize,
                )
                .map_err(|_| SampleSourceError::ResamplingFailed(source_rate, target_rate))?,
            )
        } else {
            None
        };
        let resample_scratch = resampler
            .as_ref()
            .map(|r| r.output_buffer_allocate(true))
            .unwrap_or_default();
        let delay_remaining = resampler.as_ref().map_or(0, |r| r.output_delay());

        Ok(AudioTranscoder {
            source,
            resampler,
            source_rate,
            target_rate,
            channels,
            source_finished: false,
            frames_in: 0,
            frames_out: 0,
            delay_remaining,
            input: PlanarFifo::new(channels as usize),
            output: PlanarFifo::new(channels as usize),
            read_scratch: vec![Vec::with_capacity(INPUT_BLOCK_SIZE); channels as usize],
            resample_scratch,
        })
    }

    /// Runs one resampler step. Returns false once the source and all buffered input are spent.
    ///
    /// The resampler's leading delay is skipped and the output is cut to the length of the
    /// source at the target rate, so the zero padding of the final block never reaches the
    /// caller.
    fn resample_block(&mut self) -> Result<bool, SampleSourceError> {
        let (source_rate, target_rate) = (self.source_rate, self.target_rate);
        let failed = move |_| SampleSourceError::ResamplingFailed(source_rate, target_rate);
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(false);
        };

        let needed = resampler.input_frames_next();
        while !self.source_finished && self.input.len() < needed {
            let frames = self
                .source
                .next_chunk(&mut self.read_scratch, needed - self.input.len())?;
            if frames == 0 {
                self.source_finished = true;
            } else {
                self.input.push(&self.read_scratch, 0, frames);
                self.frames_in += frames;
            }
        }

        let expected = expected_frames(self.frames_in, source_rate, target_rate);
        let (consumed, produced) = if self.input.len() >= needed {
            resampler
                .process_into_buffer(&self.input.unread()[..], &mut self.resample_scratch, None)
                .map_err(failed)?
        } else if self.input.len() > 0 {
            let (_, produced) = resampler
                .process_partial_into_buffer(
                    Some(&self.input.unread()[..]),
                    &mut self.resample_scratch,
                    None,
                )
                .map_err(failed)?;
            (self.input.len(), produced)
        } else if self.frames_out < expected {
            // Flushes the tail still held in the resampler's delay line.
            let (_, produced) = resampler
                .process_partial_into_buffer(None::<&[Vec<f32>]>, &mut self.resample_scratch, None)
                .map_err(failed)?;
            (0, produced)
        } else {
            return Ok(false);
        };

        self.input.consume(consumed);
        self.emit(produced);
        Ok(true)
    }

    /// Moves freshly resampled frames to the output, minus delay and padding.
    fn emit(&mut self, produced: usize) {
        let skip = self.delay_remaining.min(produced);
        self.delay_remaining -= skip;
        let mut frames = produced - skip;
        if self.source_finished {
            let expected = expected_frames(self.frames_in, self.source_rate, self.target_rate);
            frames = frames.min(expected.saturating_sub(self.frames_out));
        }
        self.output.push(&self.resample_scratch, skip, frames);
        self.frames_out += frames;
    }
}

impl<S: SampleSource> SampleSource for AudioTranscoder<S> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        if self.resampler.is_none() {
            return self.source.next_chunk(output, max_frames);
        }
        prepare_output(output, self.channels)?;

        let mut written = 0;
        while written < max_frames {
            written += self.output.drain_into(output, max_frames - written);
            if written < max_frames && !self.resample_block()? {
                break;
            }
        }
        Ok(written)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    fn duration(&self) -> Option<std::time::Duration> {
        self.source.duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_source::MemorySampleSource;

    fn drain<S: SampleSource>(source: &mut S) -> Vec<Vec<f32>> {
        let channels = source.channel_count() as usize;
        let mut planes = vec![Vec::new(); channels];
        let mut chunk = vec![Vec::new(); channels];
        loop {
            let frames = source.next_chunk(&mut chunk, 500).unwrap();
            if frames == 0 {
                return planes;
            }
            for (plane, out) in planes.iter_mut().zip(&chunk) {
                plane.extend_from_slice(out);
            }
        }
    }

    #[test]
    fn test_passthrough_at_same_rate() {
        let samples: Vec<f32> = (0..64).map(|i| i as f32 / 64.0).collect();
        let source = MemorySampleSource::new(samples.clone(), 1, 44100);
        let mut transcoder = AudioTranscoder::new(source, 44100).unwrap();

        assert_eq!(transcoder.sample_rate(), 44100);
        assert_eq!(drain(&mut transcoder), vec![samples]);
    }

    #[test]
    fn test_upsample_length() {
        // One second of a 440Hz stereo tone at 22050Hz.
        let frames = 22050;
        let samples: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 440.0 * std::f32::consts::TAU / 22050.0).sin() * 0.5;
                [s, -s]
            })
            .collect();
        let source = MemorySampleSource::new(samples, 2, 22050);
        let mut transcoder = AudioTranscoder::new(source, 44100).unwrap();
        assert_eq!(transcoder.sample_rate(), 44100);
        assert_eq!(transcoder.channel_count(), 2);

        let planes = drain(&mut transcoder);
        assert_eq!(planes[0].len(), planes[1].len());

        assert_eq!(planes[0].len(), 44100);
        assert!(planes[0].iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_short_clip_has_no_padding() {
        // 100ms at 22050Hz ending in a loud tail.
        let mut samples = vec![0.0; 1805];
        samples.extend(std::iter::repeat(0.8).take(400));
        let source = MemorySampleSource::new(samples, 1, 22050);
        let mut transcoder = AudioTranscoder::new(source, 44100).unwrap();

        let planes = drain(&mut transcoder);
        assert_eq!(planes[0].len(), 4410);

        // The tail is still there, aligned with the end of the clip.
        let loud = planes[0][4410 - 700..4410 - 100]
            .iter()
            .filter(|s| (**s - 0.8).abs() < 0.1)
            .count();
        assert!(loud > 500, "only {loud} loud frames at the end");
    }

    #[test]
    fn test_downsample_length() {
        let source = MemorySampleSource::new(vec![0.25; 4800], 1, 48000);
        let mut transcoder = AudioTranscoder::new(source, 44100).unwrap();
        assert_eq!(drain(&mut transcoder)[0].len(), 4410);
    }
}
