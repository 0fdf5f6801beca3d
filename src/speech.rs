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
    future::Future,
    path::PathBuf,
    pin::Pin,
    str::FromStr,
    sync::Arc,
    task::{Context, Poll},
    thread::JoinHandle,
};

use crossbeam_channel::Sender;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::{
    audio::{self, Device},
    clip::ClipFile,
    config::Config,
    control::{self, Command, ControlSettings},
    devices::{self, CpalDevices, DeviceEnumerator, OutputDeviceInfo},
    router::Channel,
    session::{AudioSession, RecordingSession, RouteCategory, SessionError},
    synth::{self, SynthesisError, Synthesizer, Utterance, Voice},
    tickets::TicketResult,
};

pub use crate::control::Status;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech service unavailable")]
    Unavailable,

    #[error("This language is not supported.")]
    UnsupportedLanguage,

    #[error("Failed to read text: {0}")]
    Utterance(String),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a finished speak request ended. Both are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceOutcome {
    Finished,
    Cancelled,
}

/// What happens to speech already in progress when a new utterance arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "i64")]
pub enum QueueStrategy {
    /// Cancel pending synthesis and stop playback first.
    #[default]
    Flush,
    /// Wait behind whatever is already queued.
    Add,
}

impl From<i64> for QueueStrategy {
    fn from(code: i64) -> Self {
        match code {
            1 => QueueStrategy::Add,
            _ => QueueStrategy::Flush,
        }
    }
}

impl FromStr for QueueStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flush" | "0" => Ok(QueueStrategy::Flush),
            "add" | "1" => Ok(QueueStrategy::Add),
            _ => Err(format!("unknown queue strategy {}", s)),
        }
    }
}

/// Options for a speak request, with the plugin's defaults for anything omitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeakOptions {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Index into the name-ordered voice list. Negative means pick by language.
    pub voice: i64,
    pub audio_channel: Channel,
    pub queue_strategy: QueueStrategy,
    pub force_speaker: bool,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        SpeakOptions {
            text: String::new(),
            lang: "en-US".to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice: -1,
            audio_channel: Channel::Stereo,
            queue_strategy: QueueStrategy::Flush,
            force_speaker: false,
        }
    }
}

/// Resolves once the synthesizer has finished with, cancelled, or failed the utterance.
pub struct Ticket {
    rx: oneshot::Receiver<TicketResult>,
}

impl Future for Ticket {
    type Output = TicketResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SpeechError::Unavailable)))
    }
}

/// Text-to-speech with sequential, channel-routed playback.
pub struct TextToSpeech {
    commands: Sender<Command>,
    control: Option<JoinHandle<()>>,
    synthesizer: Arc<dyn Synthesizer>,
    session: Arc<dyn AudioSession>,
    devices: Arc<dyn DeviceEnumerator>,
    default_lang: String,
}

impl TextToSpeech {
    /// Starts the service on the given device and synthesizer.
    pub fn new(
        device: Arc<dyn Device>,
        synthesizer: Arc<dyn Synthesizer>,
        config: &Config,
    ) -> Result<TextToSpeech, SpeechError> {
        let speech = config.speech();
        let clip_dir: PathBuf = speech.clip_dir();
        std::fs::create_dir_all(&clip_dir)?;
        info!(
            device = %device,
            synthesizer = %synthesizer,
            clip_dir = ?clip_dir,
            "Starting text to speech."
        );

        let (commands, control) = control::spawn(
            device,
            synthesizer.clone(),
            ControlSettings {
                clip_dir,
                buffer_size: config.audio().buffer_size(),
                cleanup_on_stop: speech.cleanup_on_stop(),
                ticket_policy: speech.ticket_policy(),
            },
        );

        Ok(TextToSpeech {
            commands,
            control: Some(control),
            synthesizer,
            session: Arc::new(RecordingSession::new()),
            devices: Arc::new(CpalDevices),
            default_lang: speech.default_lang().to_string(),
        })
    }

    /// Starts the service with the device and synthesizer named in the configuration.
    pub fn from_config(config: &Config) -> Result<TextToSpeech, Box<dyn std::error::Error>> {
        let device = audio::get_device(config.audio())?;
        let synthesizer = synth::get_synthesizer(config.speech())?;
        Ok(TextToSpeech::new(device, synthesizer, config)?)
    }

    /// Replaces the audio session.
    pub fn with_session(mut self, session: Arc<dyn AudioSession>) -> TextToSpeech {
        self.session = session;
        self
    }

    /// Replaces the device enumerator.
    pub fn with_devices(mut self, devices: Arc<dyn DeviceEnumerator>) -> TextToSpeech {
        self.devices = devices;
        self
    }

    /// Requests that the text be spoken. Never waits for playback; the returned ticket
    /// resolves once synthesis of the utterance has finished or been abandoned.
    pub fn speak(&self, options: SpeakOptions) -> Result<Ticket, SpeechError> {
        let lang = if options.lang.trim().is_empty() {
            self.default_lang.clone()
        } else {
            options.lang
        };
        if !self.synthesizer.is_language_supported(&lang) {
            return Err(SpeechError::UnsupportedLanguage);
        }

        let voice = self.select_voice(options.voice);
        if let Err(e) = self.session.set_route(options.force_speaker) {
            warn!(err = %e, "Continuing with the current audio route.");
        }

        let (reply, rx) = oneshot::channel();
        self.send(Command::Speak {
            utterance: Utterance {
                id: 0,
                text: options.text,
                lang,
                rate: options.rate,
                pitch: options.pitch,
                volume: options.volume,
                voice,
                channel: options.audio_channel,
            },
            strategy: options.queue_strategy,
            reply,
        })?;
        Ok(Ticket { rx })
    }

    /// Cancels pending synthesis and stops playback. Returns once the player has stopped.
    pub async fn stop(&self) -> Result<(), SpeechError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.map_err(|_| SpeechError::Unavailable)
    }

    pub async fn status(&self) -> Result<Status, SpeechError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply })?;
        rx.await.map_err(|_| SpeechError::Unavailable)
    }

    /// Queues an existing clip for playback. The clip file is deleted once played.
    pub fn play_clip(&self, clip: ClipFile) -> Result<(), SpeechError> {
        self.send(Command::Play { clip })
    }

    pub fn get_supported_languages(&self) -> Result<Vec<String>, SpeechError> {
        Ok(self.synthesizer.languages()?)
    }

    /// The synthesizer's voices ordered by name. Speak requests index into this list.
    pub fn get_supported_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        let mut voices = self.synthesizer.voices()?;
        voices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(voices)
    }

    pub fn is_language_supported(&self, lang: &str) -> bool {
        self.synthesizer.is_language_supported(lang)
    }

    pub fn get_connected_audio_devices(&self) -> Vec<OutputDeviceInfo> {
        devices::connected_devices(self.devices.as_ref())
    }

    pub fn set_audio_route(&self, force_speaker: bool) -> Result<RouteCategory, SessionError> {
        self.session.set_route(force_speaker)
    }

    fn select_voice(&self, index: i64) -> Option<Voice> {
        let index = usize::try_from(index).ok()?;
        match self.get_supported_voices() {
            Ok(voices) => voices.into_iter().nth(index),
            Err(e) => {
                warn!(err = %e, "Unable to list voices, using language instead.");
                None
            }
        }
    }

    fn send(&self, command: Command) -> Result<(), SpeechError> {
        self.commands
            .send(command)
            .map_err(|_| SpeechError::Unavailable)
    }
}

impl Drop for TextToSpeech {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(control) = self.control.take() {
            if control.join().is_err() {
                error!("Control thread panicked.");
            }
        }
    }
}
