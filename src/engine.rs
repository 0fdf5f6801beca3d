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
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, error, info};

use crate::{
    audio::{Device, Playback, PlaybackDone, StereoRenderer},
    clip::ClipFile,
    queue::PlaybackQueue,
    router,
};

/// Sequences clip playback on one output device.
///
/// `is_playing()` is true exactly when a current playback is assigned, and at most one clip
/// is ever started on the device at a time.
pub struct PlaybackEngine {
    device: Arc<dyn Device>,
    queue: PlaybackQueue,
    /// The playback id and clip currently on the device.
    current: Option<(u64, ClipFile)>,
    done: Sender<PlaybackDone>,
    next_id: u64,
    buffer_size: usize,
    cleanup_on_stop: bool,
}

impl PlaybackEngine {
    /// Creates an idle engine. Completions for playbacks it starts are sent on `done` and
    /// must be handed back through [PlaybackEngine::on_finished].
    pub fn new(
        device: Arc<dyn Device>,
        done: Sender<PlaybackDone>,
        buffer_size: usize,
        cleanup_on_stop: bool,
    ) -> PlaybackEngine {
        PlaybackEngine {
            device,
            queue: PlaybackQueue::new(),
            current: None,
            done,
            next_id: 1,
            buffer_size,
            cleanup_on_stop,
        }
    }

    /// Plays the clip now if idle, otherwise queues it behind everything already waiting.
    pub fn submit(&mut self, clip: ClipFile) {
        if self.is_playing() {
            debug!(clip = %clip, queued = self.queue.len() + 1, "Player busy, queueing clip.");
            self.queue.enqueue(clip);
            return;
        }

        if !self.try_start(clip) {
            self.play_next();
        }
    }

    /// Handles a completion from the device. Completions for anything but the current
    /// playback are stale and ignored.
    pub fn on_finished(&mut self, done: PlaybackDone) {
        match &self.current {
            Some((id, _)) if *id == done.id => {}
            _ => {
                debug!(id = done.id, "Ignoring stale completion.");
                return;
            }
        }

        if let Some((id, clip)) = self.current.take() {
            info!(id, clip = %clip, "Clip finished.");
            clip.remove();
        }
        self.play_next();
    }

    /// Halts the device and abandons the current and queued clips. Returns how many clips
    /// were abandoned.
    pub fn stop(&mut self) -> usize {
        self.device.halt();

        let current = self.current.take().map(|(_, clip)| clip);
        let queued = self.queue.drain();
        let abandoned = queued.len() + usize::from(current.is_some());
        info!(abandoned, "Playback stopped.");

        if self.cleanup_on_stop {
            current.into_iter().chain(queued).for_each(ClipFile::remove);
        }
        abandoned
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Number of clips waiting behind the current one.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn current_clip(&self) -> Option<&ClipFile> {
        self.current.as_ref().map(|(_, clip)| clip)
    }

    /// Starts queued clips until one plays or the queue is empty. Clips that fail to start
    /// are skipped.
    fn play_next(&mut self) {
        while let Some(clip) = self.queue.dequeue_next() {
            if self.try_start(clip) {
                return;
            }
        }
        debug!("Queue empty, player idle.");
    }

    /// Opens the clip and starts it on the device. A clip that can't be opened or started is
    /// abandoned and its file removed.
    fn try_start(&mut self, clip: ClipFile) -> bool {
        let routing = router::apply(clip.channel());
        let renderer = match StereoRenderer::open(
            clip.path(),
            &self.device.target_format(),
            routing,
            self.buffer_size,
        ) {
            Ok(renderer) => renderer,
            Err(e) => {
                error!(clip = %clip, err = %e, "Unable to open clip, skipping.");
                clip.remove();
                return false;
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        match self
            .device
            .start(Playback::new(id, renderer, self.done.clone()))
        {
            Ok(()) => {
                info!(id, clip = %clip, gain = routing.gain, pan = routing.pan, "Playing clip.");
                self.current = Some((id, clip));
                true
            }
            Err(e) => {
                error!(clip = %clip, err = %e, "Unable to start clip, skipping.");
                clip.remove();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::Receiver;

    use super::*;
    use crate::{
        audio::mock,
        router::{apply, Channel},
        testutil::write_clip,
    };

    struct Harness {
        engine: PlaybackEngine,
        device: Arc<mock::Device>,
        done: Receiver<PlaybackDone>,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(cleanup_on_stop: bool) -> Harness {
            let device = Arc::new(mock::Device::manual());
            let (done_tx, done) = crossbeam_channel::unbounded();
            let engine = PlaybackEngine::new(device.clone(), done_tx, 256, cleanup_on_stop);
            Harness {
                engine,
                device,
                done,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn clip(&self, name: &str, channel: Channel) -> ClipFile {
            write_clip(self.dir.path(), name, channel)
        }

        fn corrupt_clip(&self, name: &str) -> ClipFile {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"not a wav file at all").unwrap();
            ClipFile::new(path, Channel::Stereo)
        }

        /// Lets the current playback run to the end and feeds the completion back.
        fn finish(&mut self) {
            assert!(self.device.finish_current().is_some());
            let done = self.done.try_recv().unwrap();
            self.engine.on_finished(done);
        }

        fn current_name(&self) -> Option<String> {
            self.engine
                .current_clip()
                .and_then(|clip| clip.path().file_name())
                .map(|name| name.to_string_lossy().to_string())
        }

        fn routings(&self) -> Vec<router::Routing> {
            self.device.started().into_iter().map(|s| s.routing).collect()
        }

        fn exists(&self, name: &str) -> bool {
            self.dir.path().join(name).exists()
        }
    }

    fn assert_consistent(harness: &Harness) {
        assert_eq!(harness.engine.is_playing(), harness.engine.current_clip().is_some());
        assert_eq!(harness.engine.is_playing(), harness.device.is_playing());
    }

    #[test]
    fn test_idle_submit_plays_immediately() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("a.wav", Channel::Left));

        assert!(harness.engine.is_playing());
        assert_eq!(harness.engine.queued(), 0);
        assert_eq!(harness.current_name().as_deref(), Some("a.wav"));
        assert_eq!(harness.routings(), vec![apply(Channel::Left)]);
        assert_consistent(&harness);
    }

    #[test]
    fn test_fifo_order_without_overlap() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("a.wav", Channel::Left));
        harness.engine.submit(harness.clip("b.wav", Channel::Right));
        harness.engine.submit(harness.clip("c.wav", Channel::Stereo));
        assert_eq!(harness.engine.queued(), 2);
        assert_eq!(harness.device.started().len(), 1);

        let mut played = Vec::new();
        while let Some(name) = harness.current_name() {
            played.push(name.clone());
            assert_consistent(&harness);
            harness.finish();
            assert!(!harness.exists(&name), "{name} should be removed after playing");
        }

        assert_eq!(played, vec!["a.wav", "b.wav", "c.wav"]);
        assert_eq!(
            harness.routings(),
            vec![apply(Channel::Left), apply(Channel::Right), apply(Channel::Stereo)]
        );
        assert!(!harness.engine.is_playing());
        assert_consistent(&harness);
    }

    #[test]
    fn test_right_then_stereo_while_busy() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("a.wav", Channel::Right));
        harness.engine.submit(harness.clip("b.wav", Channel::Stereo));

        assert_eq!(harness.routings(), vec![apply(Channel::Right)]);
        harness.finish();
        assert_eq!(harness.current_name().as_deref(), Some("b.wav"));
        assert_eq!(
            harness.routings(),
            vec![apply(Channel::Right), apply(Channel::Stereo)]
        );
    }

    #[test]
    fn test_corrupt_clip_is_skipped() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("a.wav", Channel::Left));
        harness.engine.submit(harness.corrupt_clip("broken.wav"));
        harness.engine.submit(harness.clip("c.wav", Channel::Right));

        harness.finish();
        assert_eq!(harness.current_name().as_deref(), Some("c.wav"));
        assert!(!harness.exists("broken.wav"));
        assert_eq!(harness.device.started().len(), 2);
        assert_consistent(&harness);
    }

    #[test]
    fn test_corrupt_clip_while_idle_stays_idle() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.corrupt_clip("broken.wav"));

        assert!(!harness.engine.is_playing());
        assert!(harness.device.started().is_empty());
        assert_consistent(&harness);

        harness.engine.submit(harness.clip("b.wav", Channel::Stereo));
        assert_eq!(harness.current_name().as_deref(), Some("b.wav"));
    }

    #[test]
    fn test_missing_clip_is_skipped() {
        let mut harness = Harness::new(true);
        harness
            .engine
            .submit(ClipFile::new(harness.dir.path().join("gone.wav"), Channel::Left));
        assert!(!harness.engine.is_playing());
    }

    #[test]
    fn test_device_start_failure_is_skipped() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("a.wav", Channel::Left));
        harness.engine.submit(harness.clip("b.wav", Channel::Left));
        harness.engine.submit(harness.clip("c.wav", Channel::Left));

        harness.device.fail_next_start();
        harness.finish();

        assert_eq!(harness.current_name().as_deref(), Some("c.wav"));
        assert!(!harness.exists("b.wav"));
        assert_consistent(&harness);
    }

    #[test]
    fn test_stop_discards_everything() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("d.wav", Channel::Left));
        harness.engine.submit(harness.clip("e.wav", Channel::Right));
        harness.engine.submit(harness.clip("f.wav", Channel::Stereo));

        assert_eq!(harness.engine.stop(), 3);
        assert!(!harness.engine.is_playing());
        assert_eq!(harness.engine.queued(), 0);
        assert_eq!(harness.device.halts(), 1);
        for name in ["d.wav", "e.wav", "f.wav"] {
            assert!(!harness.exists(name));
        }
        assert_consistent(&harness);

        // The next clip plays straight away.
        harness.engine.submit(harness.clip("g.wav", Channel::Right));
        assert_eq!(harness.current_name().as_deref(), Some("g.wav"));
        assert_eq!(harness.engine.queued(), 0);
        assert_eq!(harness.routings().last(), Some(&apply(Channel::Right)));
    }

    #[test]
    fn test_stop_without_cleanup_keeps_files() {
        let mut harness = Harness::new(false);
        harness.engine.submit(harness.clip("d.wav", Channel::Left));
        harness.engine.submit(harness.clip("e.wav", Channel::Left));

        assert_eq!(harness.engine.stop(), 2);
        assert!(harness.exists("d.wav"));
        assert!(harness.exists("e.wav"));
    }

    #[test]
    fn test_stop_when_idle() {
        let mut harness = Harness::new(true);
        assert_eq!(harness.engine.stop(), 0);
        assert!(!harness.engine.is_playing());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("a.wav", Channel::Left));
        let stale = harness.device.current_id().unwrap();
        harness.engine.stop();

        harness.engine.submit(harness.clip("b.wav", Channel::Left));
        harness.engine.submit(harness.clip("c.wav", Channel::Left));
        harness.engine.on_finished(PlaybackDone { id: stale });

        assert_eq!(harness.current_name().as_deref(), Some("b.wav"));
        assert_eq!(harness.engine.queued(), 1);
        assert!(harness.exists("b.wav"));
    }

    #[test]
    fn test_long_run_of_corrupt_clips() {
        let mut harness = Harness::new(true);
        harness.engine.submit(harness.clip("first.wav", Channel::Left));
        for i in 0..500 {
            harness.engine.submit(harness.corrupt_clip(&format!("broken-{i}.wav")));
        }
        harness.engine.submit(harness.clip("last.wav", Channel::Right));

        harness.finish();
        assert_eq!(harness.current_name().as_deref(), Some("last.wav"));
        assert!(!harness.exists("broken-0.wav"));
    }
}
