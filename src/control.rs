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

//! The control thread. It owns the playback engine and the outstanding tickets, and every
//! change to either arrives as a message.

use std::{
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{select, Receiver, Sender};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, span, warn, Level};

use crate::{
    audio::{Device, PlaybackDone},
    clip::ClipFile,
    engine::PlaybackEngine,
    playsync::CancelHandle,
    speech::{QueueStrategy, SpeechError, UtteranceOutcome},
    synth::{SynthesisEvent, SynthesisWorker, Synthesizer, Utterance},
    tickets::{TicketBook, TicketPolicy, TicketResult},
};

/// A snapshot of the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub playing: bool,
    pub current_clip: Option<PathBuf>,
    pub queued: usize,
    pub pending_tickets: usize,
}

/// Messages handled by the control thread.
pub(crate) enum Command {
    /// Synthesize and play an utterance. Its id is assigned by the control thread.
    Speak {
        utterance: Utterance,
        strategy: QueueStrategy,
        reply: oneshot::Sender<TicketResult>,
    },
    /// Play an existing clip.
    Play { clip: ClipFile },
    /// A report from the synthesis worker.
    Synthesis(SynthesisEvent),
    /// Cancel synthesis and stop playback.
    Stop { reply: oneshot::Sender<()> },
    Status { reply: oneshot::Sender<Status> },
    Shutdown,
}

/// Settings for the control thread.
pub(crate) struct ControlSettings {
    pub clip_dir: PathBuf,
    pub buffer_size: usize,
    pub cleanup_on_stop: bool,
    pub ticket_policy: TicketPolicy,
}

struct Control {
    engine: PlaybackEngine,
    tickets: TicketBook,
    worker: SynthesisWorker,
    /// Cancels every synthesis job submitted since the last flush or stop.
    generation: CancelHandle,
    next_utterance_id: u64,
    /// Utterances with lower ids were requested before the last flush or stop.
    live_from: u64,
}

/// Spawns the control thread. It runs until it receives [Command::Shutdown].
pub(crate) fn spawn(
    device: Arc<dyn Device>,
    synthesizer: Arc<dyn Synthesizer>,
    settings: ControlSettings,
) -> (Sender<Command>, JoinHandle<()>) {
    let (commands, command_rx) = crossbeam_channel::unbounded::<Command>();
    let (control, done_rx) = Control::new(device, synthesizer, settings, commands.clone());
    let join = thread::spawn(move || control.run(command_rx, done_rx));
    (commands, join)
}

impl Control {
    /// Creates the control state. Synthesis reports are sent back on `commands`.
    fn new(
        device: Arc<dyn Device>,
        synthesizer: Arc<dyn Synthesizer>,
        settings: ControlSettings,
        commands: Sender<Command>,
    ) -> (Control, Receiver<PlaybackDone>) {
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<PlaybackDone>();
        let worker = SynthesisWorker::spawn(synthesizer, settings.clip_dir, move |event| {
            // The control thread is gone only during shutdown, when reports no longer matter.
            let _ = commands.send(Command::Synthesis(event));
        });

        let control = Control {
            engine: PlaybackEngine::new(
                device,
                done_tx,
                settings.buffer_size,
                settings.cleanup_on_stop,
            ),
            tickets: TicketBook::new(settings.ticket_policy),
            worker,
            generation: CancelHandle::new(),
            next_utterance_id: 1,
            live_from: 1,
        };
        (control, done_rx)
    }

    fn run(mut self, commands: Receiver<Command>, done: Receiver<PlaybackDone>) {
        let span = span!(Level::INFO, "control");
        let _enter = span.enter();

        loop {
            select! {
                recv(commands) -> command => match command {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => self.handle(command),
                },
                recv(done) -> done => {
                    if let Ok(done) = done {
                        self.engine.on_finished(done);
                    }
                },
            }
        }

        self.cancel_all();
        // Dropping the worker waits for its current job, which is cancelled.
        drop(self.worker);
        info!(
            unresolved = self.tickets.len(),
            "Control thread shutting down."
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Speak {
                utterance,
                strategy,
                reply,
            } => self.speak(utterance, strategy, reply),
            Command::Play { clip } => self.engine.submit(clip),
            Command::Synthesis(event) => self.on_synthesis(event),
            Command::Stop { reply } => {
                self.cancel_all();
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {}
        }
    }

    fn speak(
        &mut self,
        mut utterance: Utterance,
        strategy: QueueStrategy,
        reply: oneshot::Sender<TicketResult>,
    ) {
        if strategy == QueueStrategy::Flush {
            debug!("Flushing before utterance.");
            self.cancel_all();
        }
        utterance.id = self.next_utterance_id;
        self.next_utterance_id += 1;

        let utterance_id = utterance.id;
        self.tickets.register(utterance_id, reply);
        if let Err(e) = self.worker.submit(utterance, self.generation.clone()) {
            warn!(utterance_id, err = %e, "Unable to queue utterance.");
            self.tickets.resolve(utterance_id, Err(SpeechError::Synthesis(e)));
        }
    }

    fn on_synthesis(&mut self, event: SynthesisEvent) {
        let utterance_id = event.utterance_id();
        match event {
            SynthesisEvent::Finished { clip, .. } if utterance_id < self.live_from => {
                // Finished before the flush reached the worker.
                debug!(utterance_id, "Discarding utterance synthesized before a stop.");
                if let Some(clip) = clip {
                    clip.remove();
                }
                self.tickets
                    .resolve(utterance_id, Ok(UtteranceOutcome::Cancelled));
            }
            SynthesisEvent::Finished { clip, .. } => {
                self.tickets
                    .resolve(utterance_id, Ok(UtteranceOutcome::Finished));
                if let Some(clip) = clip {
                    self.engine.submit(clip);
                }
            }
            SynthesisEvent::Cancelled { .. } => {
                self.tickets
                    .resolve(utterance_id, Ok(UtteranceOutcome::Cancelled));
            }
            SynthesisEvent::Failed { error, .. } => {
                self.tickets
                    .resolve(utterance_id, Err(SpeechError::Utterance(error)));
            }
        }
    }

    /// Cancels all pending synthesis and stops playback.
    fn cancel_all(&mut self) {
        self.generation.cancel();
        self.generation = CancelHandle::new();
        self.live_from = self.next_utterance_id;
        self.engine.stop();
    }

    fn status(&self) -> Status {
        Status {
            playing: self.engine.is_playing(),
            current_clip: self
                .engine
                .current_clip()
                .map(|clip| clip.path().to_path_buf()),
            queued: self.engine.queued(),
            pending_tickets: self.tickets.len(),
        }
    }
}
