// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::{collections::HashSet, path::Path};

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::instrument::{Adsr, FilterSettings};

/// A YAML drum kit.
#[derive(Deserialize, Clone, Debug)]
pub struct KitConfig {
    name: Option<String>,

    #[serde(default)]
    instruments: Vec<InstrumentDefinition>,
}

impl KitConfig {
    /// Parse a kit from a YAML file.
    pub fn deserialize(path: &Path) -> Result<KitConfig, ConfigError> {
        let kit = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<KitConfig>()?;
        kit.validate()?;
        Ok(kit)
    }

    /// Instrument IDs must be unique within a kit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, instrument) in self.instruments.iter().enumerate() {
            if !seen.insert(instrument.id(index)) {
                return Err(ConfigError::Invalid(format!(
                    "instrument {} reuses ID {}",
                    instrument.name(),
                    instrument.id(index)
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn instruments(&self) -> &[InstrumentDefinition] {
        &self.instruments
    }
}

/// One instrument of a kit.
#[derive(Deserialize, Clone, Debug)]
pub struct InstrumentDefinition {
    /// Defaults to the position of the instrument in the kit.
    id: Option<u32>,
    name: String,
    gain: Option<f32>,
    pan: Option<[f32; 2]>,
    mute_group: Option<i32>,
    #[serde(default)]
    muted: bool,

    /// Random pitch variation in half steps.
    random_pitch: Option<f32>,
    adsr: Option<AdsrConfig>,
    filter: Option<FilterConfig>,

    #[serde(default)]
    layers: Vec<LayerDefinition>,
}

impl InstrumentDefinition {
    pub fn id(&self, index: usize) -> u32 {
        self.id
            .unwrap_or_else(|| u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gain(&self) -> f32 {
        self.gain.unwrap_or(1.0)
    }

    pub fn pan(&self) -> [f32; 2] {
        self.pan.unwrap_or([1.0, 1.0])
    }

    pub fn mute_group(&self) -> i32 {
        self.mute_group.unwrap_or(-1)
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn random_pitch(&self) -> f32 {
        self.random_pitch.unwrap_or(0.0)
    }

    pub fn adsr(&self) -> Adsr {
        self.adsr.clone().unwrap_or_default().to_adsr()
    }

    pub fn filter(&self) -> FilterSettings {
        match &self.filter {
            Some(filter) => FilterSettings {
                active: filter.active,
                cutoff: filter.cutoff.clamp(0.0, 1.0),
                resonance: filter.resonance.clamp(0.0, 0.99),
            },
            None => FilterSettings::default(),
        }
    }

    pub fn layers(&self) -> &[LayerDefinition] {
        &self.layers
    }
}

/// Envelope times in frames.
#[derive(Deserialize, Clone, Debug)]
pub struct AdsrConfig {
    #[serde(default)]
    attack: f32,
    #[serde(default)]
    decay: f32,
    #[serde(default = "default_sustain")]
    sustain: f32,
    #[serde(default = "default_release")]
    release: f32,
}

fn default_sustain() -> f32 {
    1.0
}

fn default_release() -> f32 {
    1000.0
}

impl Default for AdsrConfig {
    fn default() -> Self {
        AdsrConfig {
            attack: 0.0,
            decay: 0.0,
            sustain: default_sustain(),
            release: default_release(),
        }
    }
}

impl AdsrConfig {
    pub fn to_adsr(&self) -> Adsr {
        Adsr::new(self.attack, self.decay, self.sustain, self.release)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct FilterConfig {
    #[serde(default = "default_filter_active")]
    active: bool,
    cutoff: f32,
    #[serde(default)]
    resonance: f32,
}

fn default_filter_active() -> bool {
    true
}

/// One velocity layer of an instrument.
#[derive(Deserialize, Clone, Debug)]
pub struct LayerDefinition {
    /// A WAV file, relative to the kit file unless absolute.
    file: String,
    velocity: Option<[f32; 2]>,
    gain: Option<f32>,
    pitch: Option<f32>,
}

impl LayerDefinition {
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The inclusive velocity range, defaulting to every velocity.
    pub fn velocity(&self) -> [f32; 2] {
        self.velocity.unwrap_or([0.0, 1.0])
    }

    pub fn gain(&self) -> f32 {
        self.gain.unwrap_or(1.0)
    }

    pub fn pitch(&self) -> f32 {
        self.pitch.unwrap_or(0.0)
    }
}
