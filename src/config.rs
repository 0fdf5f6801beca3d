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
use std::path::Path;

use ::config::{File, FileFormat};
use serde::Deserialize;

mod audio;
mod error;
mod speech;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::speech::Speech;

/// A YAML representation of the whole configuration. Missing sections take their defaults.
#[derive(Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    audio: Audio,

    #[serde(default)]
    speech: Speech,
}

impl Config {
    pub fn new(audio: Audio, speech: Speech) -> Config {
        Config { audio, speech }
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        Ok(::config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?
            .try_deserialize()?)
    }

    /// Parses the configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
        Ok(::config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn speech(&self) -> &Speech {
        &self.speech
    }
}
