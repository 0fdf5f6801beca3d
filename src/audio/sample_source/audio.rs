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
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

use super::error::SampleSourceError;
use super::traits::{prepare_output, SampleSource};

/// Decodes an audio file (WAV, MP3, FLAC, Ogg, ...) with symphonia into planar f32 samples.
pub struct AudioSampleSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    duration: Option<Duration>,
    /// Decoded frames not yet handed out, one plane per channel.
    pending: Vec<Vec<f32>>,
    pending_pos: usize,
    finished: bool,
}

impl AudioSampleSource {
    pub fn from_file<P: AsRef<Path>>(path: P, buffer_size: usize) -> Result<Self, SampleSourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SampleSourceError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let undecodable = |e: SymphoniaError| {
            SampleSourceError::Undecodable(format!("'{}': {}", path.display(), e))
        };
        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(undecodable)?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                SampleSourceError::Undecodable(format!("'{}': no audio track", path.display()))
            })?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params.sample_rate.ok_or_else(|| {
            SampleSourceError::Undecodable(format!("'{}': no sample rate", path.display()))
        })?;
        let duration = params
            .n_frames
            .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate as f64));
        let decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(undecodable)?;

        let declared_channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
        let mut source = AudioSampleSource {
            format_reader,
            decoder,
            track_id,
            channels: declared_channels,
            sample_rate,
            duration,
            pending: vec![Vec::with_capacity(buffer_size); declared_channels as usize],
            pending_pos: 0,
            finished: false,
        };

        // Some containers only reveal the channel layout once the first packet is decoded.
        if declared_channels == 0 {
            source.decode_next()?;
            source.channels = source.pending.len() as u16;
            if source.channels == 0 {
                return Err(SampleSourceError::Undecodable(format!(
                    "'{}': channels not specified",
                    path.display()
                )));
            }
        }

        Ok(source)
    }

    fn pending_frames(&self) -> usize {
        self.pending
            .first()
            .map(|plane| plane.len() - self.pending_pos)
            .unwrap_or(0)
    }

    /// Reads the next packet for our track. `None` at end of stream.
    fn next_packet(&mut self) -> Result<Option<Packet>, SampleSourceError> {
        loop {
            match self.format_reader.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => return Ok(Some(packet)),
                Ok(_) => continue,
                Err(SymphoniaError::ResetRequired) => self.decoder.reset(),
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decodes packets until at least one frame is pending. Returns false at end of stream.
    fn decode_next(&mut self) -> Result<bool, SampleSourceError> {
        self.pending.iter_mut().for_each(Vec::clear);
        self.pending_pos = 0;

        while let Some(packet) = self.next_packet()? {
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(err = e, "Skipping undecodable packet.");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if append_decoded(&mut self.pending, decoded) > 0 {
                return Ok(true);
            }
        }

        self.finished = true;
        Ok(false)
    }
}

/// Appends a decoded buffer to the planar pending storage and returns the frame count.
/// If no planes exist yet they are sized from the buffer; otherwise extra channels are
/// dropped and missing ones are padded with silence so every plane stays the same length.
fn append_decoded(pending: &mut Vec<Vec<f32>>, decoded: AudioBufferRef<'_>) -> usize {
    let spec = *decoded.spec();
    let frames = decoded.frames();
    let channels = spec.channels.count();
    if frames == 0 || channels == 0 {
        return 0;
    }
    if pending.is_empty() {
        pending.resize(channels, Vec::with_capacity(frames));
    }

    let mut buffer = SampleBuffer::<f32>::new(frames as u64, spec);
    buffer.copy_interleaved_ref(decoded);
    for frame in buffer.samples().chunks_exact(channels) {
        for (index, plane) in pending.iter_mut().enumerate() {
            plane.push(frame.get(index).copied().unwrap_or(0.0));
        }
    }
    frames
}

impl SampleSource for AudioSampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        prepare_output(output, self.channels)?;

        let mut written = 0;
        while written < max_frames {
            let available = self.pending_frames();
            if available == 0 {
                if self.finished || !self.decode_next()? {
                    break;
                }
                continue;
            }

            let take = available.min(max_frames - written);
            let range = self.pending_pos..self.pending_pos + take;
            for (out, plane) in output.iter_mut().zip(&self.pending) {
                out.extend_from_slice(&plane[range.clone()]);
            }
            self.pending_pos += take;
            written += take;
        }

        Ok(written)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}
