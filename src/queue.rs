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
use std::collections::VecDeque;

use crate::clip::ClipFile;

/// Clips waiting for the player, in playback order. Never holds the clip that is playing.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    clips: VecDeque<ClipFile>,
}

impl PlaybackQueue {
    pub fn new() -> PlaybackQueue {
        PlaybackQueue::default()
    }

    /// Appends the clip to the tail of the queue.
    pub fn enqueue(&mut self, clip: ClipFile) {
        self.clips.push_back(clip);
    }

    /// Removes and returns the clip at the head of the queue.
    pub fn dequeue_next(&mut self) -> Option<ClipFile> {
        self.clips.pop_front()
    }

    /// Empties the queue, returning the abandoned clips in playback order.
    pub fn drain(&mut self) -> Vec<ClipFile> {
        self.clips.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Channel;

    #[test]
    fn test_fifo_order() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(ClipFile::new("a.wav", Channel::Left));
        queue.enqueue(ClipFile::new("b.wav", Channel::Right));
        queue.enqueue(ClipFile::new("c.wav", Channel::Stereo));
        assert_eq!(queue.len(), 3);

        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue_next())
            .map(|clip| (clip.path().to_path_buf(), clip.channel()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.wav".into(), Channel::Left),
                ("b.wav".into(), Channel::Right),
                ("c.wav".into(), Channel::Stereo),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dequeue_empty() {
        let mut queue = PlaybackQueue::new();
        assert_eq!(queue.dequeue_next(), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_drain() {
        let mut queue = PlaybackQueue::new();
        queue.enqueue(ClipFile::new("a.wav", Channel::Left));
        queue.enqueue(ClipFile::new("b.wav", Channel::Left));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].path(), std::path::Path::new("a.wav"));
        assert!(queue.is_empty());
    }
}
