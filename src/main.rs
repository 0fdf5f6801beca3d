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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;

use speakq::clip::ClipFile;
use speakq::config::Config;
use speakq::devices::{self, CpalDevices};
use speakq::router::Channel;
use speakq::synth::{self, Synthesizer as _};
use speakq::{QueueStrategy, SpeakOptions, TextToSpeech};

const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A queued text-to-speech player."
)]
struct Cli {
    /// The path to the YAML config. Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Speaks the given text and waits for playback to finish.
    Speak {
        /// The text to speak.
        text: String,
        /// The BCP 47 language tag. Defaults to the configured language.
        #[arg(short, long)]
        lang: Option<String>,
        #[arg(short, long, default_value_t = 1.0)]
        rate: f32,
        #[arg(short, long, default_value_t = 1.0)]
        pitch: f32,
        #[arg(long, default_value_t = 1.0)]
        volume: f32,
        /// Index into the voice list printed by the voices command.
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        voice: i64,
        /// left, right, stereo, or the numeric codes 1, 2, 0.
        #[arg(long, default_value = "stereo")]
        channel: Channel,
        /// add or flush.
        #[arg(long, default_value = "flush")]
        queue: QueueStrategy,
        /// Route output to the built-in speaker.
        #[arg(long)]
        force_speaker: bool,
    },
    /// Plays audio files in order and waits for them to finish.
    Play {
        /// The audio files to play.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// left, right, stereo, or the numeric codes 1, 2, 0.
        #[arg(long, default_value = "stereo")]
        channel: Channel,
    },
    /// Lists the connected audio output devices.
    Devices {},
    /// Lists the languages the synthesizer supports.
    Languages {},
    /// Lists the synthesizer's voices.
    Voices {},
    /// Checks whether a language is supported.
    Supports {
        /// The BCP 47 language tag.
        lang: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Speak {
            text,
            lang,
            rate,
            pitch,
            volume,
            voice,
            channel,
            queue,
            force_speaker,
        } => {
            let tts = TextToSpeech::from_config(&config)?;
            let outcome = tts
                .speak(SpeakOptions {
                    text,
                    lang: lang.unwrap_or_else(|| config.speech().default_lang().to_string()),
                    rate,
                    pitch,
                    volume,
                    voice,
                    audio_channel: channel,
                    queue_strategy: queue,
                    force_speaker,
                })?
                .await?;
            info!(outcome = ?outcome, "Synthesis complete.");
            wait_until_idle(&tts).await?;
        }
        Commands::Play { files, channel } => {
            let tts = TextToSpeech::from_config(&config)?;
            let clip_dir = config.speech().clip_dir();
            for (index, file) in files.iter().enumerate() {
                tts.play_clip(copy_to_clip_dir(file, &clip_dir, index, channel)?)?;
            }
            wait_until_idle(&tts).await?;
        }
        Commands::Devices {} => {
            let devices = devices::connected_devices(&CpalDevices);
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
        Commands::Languages {} => {
            let synthesizer = synth::get_synthesizer(config.speech())?;
            let languages = synthesizer.languages()?;
            if languages.is_empty() {
                println!("No languages found.");
                return Ok(());
            }

            println!("Languages (count: {}):", languages.len());
            for language in languages {
                println!("- {}", language);
            }
        }
        Commands::Voices {} => {
            let synthesizer = synth::get_synthesizer(config.speech())?;
            let mut voices = synthesizer.voices()?;
            voices.sort_by(|a, b| a.name.cmp(&b.name));
            println!("{}", serde_json::to_string_pretty(&voices)?);
        }
        Commands::Supports { lang } => {
            let synthesizer = synth::get_synthesizer(config.speech())?;
            println!("{}", synthesizer.is_language_supported(&lang));
        }
    }

    Ok(())
}

/// Played clips are deleted, so files are copied into the clip directory first.
fn copy_to_clip_dir(
    file: &Path,
    clip_dir: &Path,
    index: usize,
    channel: Channel,
) -> Result<ClipFile, Box<dyn Error>> {
    std::fs::create_dir_all(clip_dir)?;
    let name = file
        .file_name()
        .ok_or_else(|| format!("{} is not a file", file.display()))?;
    let dest = clip_dir.join(format!(
        "play-{}-{}-{}",
        std::process::id(),
        index,
        name.to_string_lossy()
    ));
    std::fs::copy(file, &dest)?;
    Ok(ClipFile::new(dest, channel))
}

async fn wait_until_idle(tts: &TextToSpeech) -> Result<(), Box<dyn Error>> {
    loop {
        let status = tts.status().await?;
        if !status.playing && status.queued == 0 {
            return Ok(());
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
}
