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

use config::{Config, File};
use serde::Deserialize;

mod audio;
mod error;

pub use audio::Audio;
pub use error::ConfigError;

/// The sample played when no asset is configured.
pub const DEFAULT_ASSET: &str = "static/audio/pads/Pad_02.mp3";

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The location of the sample: a local path or an http(s) URL.
    asset: Option<String>,

    /// The audio output configuration.
    audio: Option<Audio>,
}

impl Engine {
    /// Creates a new engine configuration.
    pub fn new(asset: Option<String>, audio: Option<Audio>) -> Engine {
        Engine { asset, audio }
    }

    /// Parse an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Engine, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?)
    }

    /// Returns the asset location (default: static/audio/pads/Pad_02.mp3).
    pub fn asset(&self) -> &str {
        self.asset.as_deref().unwrap_or(DEFAULT_ASSET)
    }

    /// Returns the audio configuration, if any.
    pub fn audio(&self) -> Option<&Audio> {
        self.audio.as_ref()
    }

    /// Overrides the asset location.
    pub fn with_asset(mut self, asset: Option<String>) -> Engine {
        if asset.is_some() {
            self.asset = asset;
        }
        self
    }

    /// Overrides the audio device.
    pub fn with_device(mut self, device: Option<String>) -> Engine {
        if let Some(device) = device {
            self.audio = Some(self.audio.unwrap_or_default().with_device(&device));
        }
        self
    }
}
