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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{error, info, span, warn, Level};

use crate::audio::{format::OUTPUT_CHANNELS, Playback, SampleFormat, TargetFormat};

/// Frames rendered per producer iteration.
const BLOCK_FRAMES: usize = 512;

/// How long the producer waits for work when nothing is playing.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Lock-free single-producer single-consumer ring of f32 samples. Samples are stored as
/// their bit patterns so both sides can touch the storage without locking.
struct CircularBuffer {
    buffer: Box<[AtomicU32]>,
    /// Capacity (power of 2)
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
    /// Set by the producer when everything buffered should be discarded. Cleared by the
    /// consumer once it has skipped ahead.
    flush: AtomicBool,
}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        Self {
            buffer: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            flush: AtomicBool::new(false),
        }
    }

    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & (self.capacity - 1)
    }

    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    fn request_flush(&self) {
        self.flush.store(true, Ordering::Release);
    }

    fn flush_pending(&self) -> bool {
        self.flush.load(Ordering::Acquire)
    }

    /// Producer side. Returns the number of samples written.
    fn write(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let write = self.write_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;
        for (offset, sample) in samples[..to_write].iter().enumerate() {
            self.buffer[(write + offset) & mask].store(sample.to_bits(), Ordering::Relaxed);
        }
        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Consumer side. Returns the number of samples read.
    fn read(&self, output: &mut [f32]) -> usize {
        if self.flush.swap(false, Ordering::AcqRel) {
            self.read_pos
                .store(self.write_pos.load(Ordering::Acquire), Ordering::Release);
            return 0;
        }

        let to_read = self.available().min(output.len());
        let read = self.read_pos.load(Ordering::Acquire);
        let mask = self.capacity - 1;
        for (offset, out) in output[..to_read].iter_mut().enumerate() {
            *out = f32::from_bits(self.buffer[(read + offset) & mask].load(Ordering::Relaxed));
        }
        self.read_pos.store((read + to_read) & mask, Ordering::Release);
        to_read
    }
}

enum Command {
    Start(Playback),
    Halt,
}

/// An output device known to cpal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

/// Lists every output-capable device on every available host.
pub fn list_output_devices() -> Result<Vec<DeviceListing>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut listings = Vec::new();
    for host_id in cpal::available_hosts() {
        let devices = match cpal::host_from_id(host_id)?.output_devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in devices {
            let Ok(configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = configs.map(|config| config.channels()).max().unwrap_or(0);
            if max_channels == 0 {
                continue;
            }
            listings.push(DeviceListing {
                name: device.name()?,
                host: host_id.name().to_string(),
                max_channels,
            });
        }
    }

    listings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listings)
}

/// Finds a cpal output device by name. "default" is the default host's default output.
fn find_output_device(name: &str) -> Result<(cpal::HostId, cpal::Device), Box<dyn Error>> {
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    if name == "default" {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("no default output device")?;
        return Ok((host.id(), device));
    }

    for host_id in cpal::available_hosts() {
        let Ok(devices) = cpal::host_from_id(host_id)?.output_devices() else {
            continue;
        };
        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok((host_id, device));
            }
        }
    }

    Err(format!("no device found with name {}", name).into())
}

/// A cpal output device. A producer thread renders the active playback into a ring buffer
/// and an output thread owns the cpal stream that drains it.
pub struct Device {
    name: String,
    host_id: cpal::HostId,
    target_format: TargetFormat,
    commands: Sender<Command>,
    running: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Device {
    /// Opens the named device and starts its output stream.
    pub fn get(name: &str, target_format: TargetFormat) -> Result<Device, Box<dyn Error>> {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let (host_id, device) = find_output_device(name)?;

        // Create shared circular buffer (~100ms of audio)
        let capacity = (target_format.sample_rate as usize * OUTPUT_CHANNELS as usize) / 10;
        let ring = Arc::new(CircularBuffer::new(capacity.max(BLOCK_FRAMES * 4)));
        let running = Arc::new(AtomicBool::new(true));
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let output_thread = {
            let ring = ring.clone();
            let running = running.clone();
            let target_format = target_format.clone();
            thread::spawn(move || run_output(device, target_format, ring, running, ready_tx))
        };

        if let Err(e) = ready_rx.recv()? {
            running.store(false, Ordering::Relaxed);
            let _ = output_thread.join();
            return Err(e.into());
        }

        let producer_thread = {
            let running = running.clone();
            thread::spawn(move || run_producer(ring, command_rx, running))
        };

        info!(
            device = name,
            host = host_id.name(),
            format = target_format.to_string(),
            "Output stream started."
        );

        Ok(Device {
            name: name.to_string(),
            host_id,
            target_format,
            commands,
            running,
            threads: vec![output_thread, producer_thread],
        })
    }
}

impl crate::audio::Device for Device {
    fn target_format(&self) -> TargetFormat {
        self.target_format.clone()
    }

    fn start(&self, playback: Playback) -> Result<(), Box<dyn Error>> {
        info!(
            device = self.name,
            id = playback.id,
            routing = ?playback.renderer.routing(),
            "Playing clip."
        );
        self.commands
            .send(Command::Start(playback))
            .map_err(|_| format!("output for {} has shut down", self.name).into())
    }

    fn halt(&self) {
        if self.commands.send(Command::Halt).is_err() {
            warn!(device = self.name, "Output has shut down, nothing to halt.");
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.host_id.name())
    }
}

/// Renders the active playback into the ring until the device is dropped.
fn run_producer(ring: Arc<CircularBuffer>, commands: Receiver<Command>, running: Arc<AtomicBool>) {
    let mut scratch = vec![0.0f32; BLOCK_FRAMES * OUTPUT_CHANNELS as usize];
    let mut active: Option<Playback> = None;
    // Set once the active playback has rendered everything; completion waits for the ring
    // to drain.
    let mut rendered_all = false;

    while running.load(Ordering::Relaxed) {
        let command = if active.is_none() {
            match commands.recv_timeout(IDLE_POLL) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        } else {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return,
            }
        };

        match command {
            Some(Command::Start(playback)) => {
                if let Some(replaced) = active.replace(playback) {
                    warn!(id = replaced.id, "Replacing unfinished playback.");
                }
                rendered_all = false;
                continue;
            }
            Some(Command::Halt) => {
                if active.take().is_some() {
                    ring.request_flush();
                }
                continue;
            }
            None => {}
        }

        let Some(playback) = active.as_mut() else {
            continue;
        };

        if rendered_all {
            if ring.available() == 0 {
                if let Some(playback) = active.take() {
                    playback.complete();
                }
            } else {
                thread::sleep(Duration::from_micros(500));
            }
            continue;
        }

        if ring.flush_pending() || ring.space() < scratch.len() {
            thread::sleep(Duration::from_micros(500));
            continue;
        }

        match playback.renderer.render(&mut scratch) {
            Ok(0) => rendered_all = true,
            Ok(frames) => {
                ring.write(&scratch[..frames * OUTPUT_CHANNELS as usize]);
            }
            Err(e) => {
                error!(id = playback.id, err = e.to_string(), "Unable to render clip.");
                if let Some(playback) = active.take() {
                    playback.complete();
                }
            }
        }
    }
}

/// Creates the cpal stream and keeps it alive until the device is dropped.
fn run_output(
    device: cpal::Device,
    target_format: TargetFormat,
    ring: Arc<CircularBuffer>,
    running: Arc<AtomicBool>,
    ready: Sender<Result<(), String>>,
) {
    let stream = match build_stream(&device, &target_format, ring) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(format!("failed to start cpal stream: {}", e)));
        return;
    }
    let _ = ready.send(Ok(()));

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }
}

fn build_stream(
    device: &cpal::Device,
    target_format: &TargetFormat,
    ring: Arc<CircularBuffer>,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let config = cpal::StreamConfig {
        channels: OUTPUT_CHANNELS,
        sample_rate: cpal::SampleRate(target_format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let on_error = |err: cpal::StreamError| error!("CPAL output stream error: {}", err);

    let stream = match (target_format.sample_format, target_format.bits_per_sample) {
        (SampleFormat::Float, _) => {
            device.build_output_stream(&config, create_f32_callback(ring), on_error, None)?
        }
        (SampleFormat::Int, 16) => device.build_output_stream(
            &config,
            create_int_callback::<i16>(ring),
            on_error,
            None,
        )?,
        (SampleFormat::Int, 32) => device.build_output_stream(
            &config,
            create_int_callback::<i32>(ring),
            on_error,
            None,
        )?,
        (SampleFormat::Int, bits) => {
            return Err(format!("unsupported bit depth {} for integer output", bits).into())
        }
    };
    Ok(stream)
}

/// f32 callback: read directly into the cpal buffer.
fn create_f32_callback(
    ring: Arc<CircularBuffer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let read = ring.read(data);
        data[read..].fill(0.0);
    }
}

/// Integer callback: read from the ring into scratch and convert.
fn create_int_callback<T: cpal::SizedSample + cpal::FromSample<f32>>(
    ring: Arc<CircularBuffer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        let read = ring.read(&mut scratch);
        scratch[read..].fill(0.0);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        audio::{
            sample_source::{MemorySampleSource, SampleSource, SampleSourceError},
            PlaybackDone, StereoRenderer,
        },
        router::{apply, Channel},
        testutil::eventually,
    };

    /// A source that fails on the first read.
    struct Broken;

    impl SampleSource for Broken {
        fn next_chunk(
            &mut self,
            _output: &mut [Vec<f32>],
            _max_frames: usize,
        ) -> Result<usize, SampleSourceError> {
            Err(SampleSourceError::Undecodable("broken".to_string()))
        }

        fn channel_count(&self) -> u16 {
            1
        }

        fn sample_rate(&self) -> u32 {
            44100
        }

        fn duration(&self) -> Option<Duration> {
            None
        }
    }

    /// A producer thread plus a consumer standing in for the cpal callback. The consumer
    /// only drains the ring once `consume` is called.
    struct Producer {
        ring: Arc<CircularBuffer>,
        commands: Sender<Command>,
        done_tx: Sender<PlaybackDone>,
        done: Receiver<PlaybackDone>,
        running: Arc<AtomicBool>,
        consuming: Arc<AtomicBool>,
        consumed: Arc<AtomicUsize>,
        threads: Vec<thread::JoinHandle<()>>,
    }

    impl Producer {
        fn spawn() -> Producer {
            let ring = Arc::new(CircularBuffer::new(4096));
            let running = Arc::new(AtomicBool::new(true));
            let consuming = Arc::new(AtomicBool::new(false));
            let consumed = Arc::new(AtomicUsize::new(0));
            let (commands, command_rx) = crossbeam_channel::unbounded();
            let (done_tx, done) = crossbeam_channel::unbounded();

            let producer = {
                let ring = ring.clone();
                let running = running.clone();
                thread::spawn(move || run_producer(ring, command_rx, running))
            };
            let consumer = {
                let ring = ring.clone();
                let running = running.clone();
                let consuming = consuming.clone();
                let consumed = consumed.clone();
                thread::spawn(move || {
                    let mut out = [0.0f32; 256];
                    while running.load(Ordering::Relaxed) {
                        if consuming.load(Ordering::Relaxed) {
                            consumed.fetch_add(ring.read(&mut out), Ordering::Relaxed);
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                })
            };

            Producer {
                ring,
                commands,
                done_tx,
                done,
                running,
                consuming,
                consumed,
                threads: vec![producer, consumer],
            }
        }

        fn start(&self, id: u64, source: Box<dyn SampleSource>) {
            let renderer = StereoRenderer::new(source, apply(Channel::Stereo));
            self.commands
                .send(Command::Start(Playback::new(id, renderer, self.done_tx.clone())))
                .unwrap();
        }

        fn start_frames(&self, id: u64, frames: usize) {
            self.start(
                id,
                Box::new(MemorySampleSource::new(vec![0.5; frames], 1, 44100)),
            );
        }

        fn halt(&self) {
            self.commands.send(Command::Halt).unwrap();
        }

        fn consume(&self) {
            self.consuming.store(true, Ordering::Relaxed);
        }

        fn assert_no_completion(&self) {
            assert_eq!(
                self.done.recv_timeout(Duration::from_millis(200)),
                Err(RecvTimeoutError::Timeout)
            );
        }

        fn next_completion(&self) -> u64 {
            self.done.recv_timeout(Duration::from_secs(3)).unwrap().id
        }
    }

    impl Drop for Producer {
        fn drop(&mut self) {
            self.running.store(false, Ordering::Relaxed);
            for thread in self.threads.drain(..) {
                let _ = thread.join();
            }
        }
    }

    #[test]
    fn test_completes_once_ring_drains() {
        let producer = Producer::spawn();
        producer.start_frames(1, 300);

        eventually(|| producer.ring.available() == 600, "clip never rendered");
        producer.assert_no_completion();

        producer.consume();
        assert_eq!(producer.next_completion(), 1);
        assert_eq!(producer.ring.available(), 0);
        eventually(
            || producer.consumed.load(Ordering::Relaxed) == 600,
            "consumer never saw the whole clip",
        );
        producer.assert_no_completion();
    }

    #[test]
    fn test_halt_while_draining_never_completes() {
        let producer = Producer::spawn();
        producer.start_frames(1, 300);
        eventually(|| producer.ring.available() == 600, "clip never rendered");

        producer.halt();
        eventually(|| producer.ring.flush_pending(), "halt never flushed the ring");

        producer.consume();
        eventually(
            || !producer.ring.flush_pending() && producer.ring.available() == 0,
            "flush never cleared",
        );
        producer.assert_no_completion();
        assert_eq!(producer.consumed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_halt_while_rendering_never_completes() {
        let producer = Producer::spawn();
        producer.consume();
        producer.start_frames(1, 44100 * 30);
        eventually(
            || producer.consumed.load(Ordering::Relaxed) > 0,
            "clip never played",
        );

        producer.halt();
        producer.assert_no_completion();
    }

    #[test]
    fn test_start_after_halt_waits_for_flush() {
        let producer = Producer::spawn();
        producer.start_frames(1, 300);
        eventually(|| producer.ring.available() == 600, "clip never rendered");
        producer.halt();
        eventually(|| producer.ring.flush_pending(), "halt never flushed the ring");

        producer.start_frames(2, 100);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(producer.ring.available(), 600);
        producer.assert_no_completion();

        // Only the second clip reaches the output.
        producer.consume();
        assert_eq!(producer.next_completion(), 2);
        eventually(
            || producer.consumed.load(Ordering::Relaxed) == 200,
            "consumer never saw the whole clip",
        );
        producer.assert_no_completion();
    }

    #[test]
    fn test_render_error_completes() {
        let producer = Producer::spawn();
        producer.start(1, Box::new(Broken));
        assert_eq!(producer.next_completion(), 1);

        // The device keeps going.
        producer.consume();
        producer.start_frames(2, 100);
        assert_eq!(producer.next_completion(), 2);
    }

    #[test]
    fn test_ring_write_read_wraps() {
        let ring = CircularBuffer::new(8);
        assert_eq!(ring.space(), 7);

        assert_eq!(ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]), 5);
        let mut out = [0.0; 3];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);

        // Wraps around the end of the backing storage.
        assert_eq!(ring.write(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]), 5);
        assert_eq!(ring.available(), 7);
        let mut out = [0.0; 8];
        assert_eq!(ring.read(&mut out), 7);
        assert_eq!(&out[..7], &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_ring_flush() {
        let ring = CircularBuffer::new(16);
        ring.write(&[1.0; 10]);
        ring.request_flush();
        assert!(ring.flush_pending());

        let mut out = [0.0; 16];
        assert_eq!(ring.read(&mut out), 0);
        assert!(!ring.flush_pending());
        assert_eq!(ring.available(), 0);

        ring.write(&[2.0; 4]);
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(&out[..4], &[2.0; 4]);
    }
}
