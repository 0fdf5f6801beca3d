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
use std::{path::PathBuf, sync::Arc, thread};

use crossbeam_channel::Sender;
use tracing::{debug, error, info, span, Level};

use super::{ClipWriter, SynthesisError, Synthesizer, Utterance};
use crate::{clip::ClipFile, playsync::CancelHandle};

/// What became of a synthesis job.
#[derive(Debug)]
pub enum SynthesisEvent {
    /// Synthesis completed. `clip` is `None` if the utterance produced no audio.
    Finished {
        utterance_id: u64,
        clip: Option<ClipFile>,
    },
    Cancelled {
        utterance_id: u64,
    },
    Failed {
        utterance_id: u64,
        error: String,
    },
}

impl SynthesisEvent {
    pub fn utterance_id(&self) -> u64 {
        match self {
            SynthesisEvent::Finished { utterance_id, .. }
            | SynthesisEvent::Cancelled { utterance_id }
            | SynthesisEvent::Failed { utterance_id, .. } => *utterance_id,
        }
    }
}

struct Job {
    utterance: Utterance,
    cancel_handle: CancelHandle,
}

/// Runs synthesis on a dedicated thread, one job at a time in submission order, and reports
/// every job's outcome exactly once.
pub struct SynthesisWorker {
    jobs: Option<Sender<Job>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SynthesisWorker {
    pub fn spawn<F>(synthesizer: Arc<dyn Synthesizer>, clip_dir: PathBuf, report: F) -> Self
    where
        F: Fn(SynthesisEvent) + Send + 'static,
    {
        let (jobs, job_rx) = crossbeam_channel::unbounded::<Job>();
        let thread = thread::spawn(move || {
            let span = span!(Level::INFO, "synthesis worker");
            let _enter = span.enter();

            for job in job_rx {
                report(run_job(synthesizer.as_ref(), &clip_dir, job));
            }
            debug!("Synthesis worker exiting.");
        });

        SynthesisWorker {
            jobs: Some(jobs),
            thread: Some(thread),
        }
    }

    /// Queues an utterance. Cancelling `cancel_handle` abandons it whether it is waiting or
    /// in progress.
    pub fn submit(
        &self,
        utterance: Utterance,
        cancel_handle: CancelHandle,
    ) -> Result<(), SynthesisError> {
        let id = utterance.id;
        self.jobs
            .as_ref()
            .ok_or_else(|| SynthesisError::Unavailable("worker stopped".to_string()))?
            .send(Job {
                utterance,
                cancel_handle,
            })
            .map_err(|_| SynthesisError::Unavailable("worker stopped".to_string()))?;
        debug!(utterance_id = id, "Queued utterance for synthesis.");
        Ok(())
    }
}

impl Drop for SynthesisWorker {
    fn drop(&mut self) {
        // Closing the job channel lets the thread finish what's queued and exit.
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Synthesis worker panicked.");
            }
        }
    }
}

fn run_job(synthesizer: &dyn Synthesizer, clip_dir: &std::path::Path, job: Job) -> SynthesisEvent {
    let utterance_id = job.utterance.id;
    if job.cancel_handle.is_cancelled() {
        debug!(utterance_id, "Skipping cancelled utterance.");
        return SynthesisEvent::Cancelled { utterance_id };
    }

    let mut writer = ClipWriter::new(clip_dir, job.utterance.channel, job.cancel_handle.clone());
    let result = synthesizer
        .synthesize(&job.utterance, &mut writer)
        .and_then(|()| writer.finish());

    match result {
        Ok(clip) if job.cancel_handle.is_cancelled() => {
            if let Some(clip) = clip {
                clip.remove();
            }
            SynthesisEvent::Cancelled { utterance_id }
        }
        Ok(clip) => {
            info!(
                utterance_id,
                synthesizer = %synthesizer,
                clip = ?clip,
                "Synthesized utterance."
            );
            SynthesisEvent::Finished { utterance_id, clip }
        }
        Err(SynthesisError::Cancelled) => SynthesisEvent::Cancelled { utterance_id },
        Err(e) => {
            error!(utterance_id, err = %e, "Synthesis failed.");
            SynthesisEvent::Failed {
                utterance_id,
                error: e.to_string(),
            }
        }
    }
}
