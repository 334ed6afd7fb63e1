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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;
use crate::{
    events::QuantizeGrid,
    midi::{ChannelFilter, DEFAULT_NOTE_BASE},
    time::{DEFAULT_BEATS_PER_MINUTE, DEFAULT_FRAME_RATE, DEFAULT_TICKS_PER_BEAT},
};

pub const DEFAULT_BUFFER_SIZE: u32 = 512;
pub const DEFAULT_MAX_NOTES: i32 = 64;

/// What an all notes off event does to sounding notes.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllOffPolicy {
    /// Notes fade out through their release.
    #[default]
    Release,
    /// Notes stop immediately.
    Purge,
}

/// MIDI input settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct MidiConfig {
    /// The channel to listen on, 1 to 16. Omitted means every channel.
    channel: Option<u8>,

    /// The note number that plays the first instrument of the kit.
    note_base: Option<u8>,
}

impl MidiConfig {
    pub fn channel_filter(&self) -> ChannelFilter {
        match self.channel {
            Some(channel) => ChannelFilter::Channel(channel.saturating_sub(1)),
            None => ChannelFilter::All,
        }
    }

    pub fn note_base(&self) -> u8 {
        self.note_base.unwrap_or(DEFAULT_NOTE_BASE)
    }
}

/// The engine configuration file.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    sample_rate: Option<u32>,
    buffer_size: Option<u32>,

    /// The most notes that may sound at once. Negative means no limit.
    max_notes: Option<i32>,

    ticks_per_beat: Option<u32>,
    bpm: Option<f64>,
    time_signature: Option<[u32; 2]>,
    quantize: Option<QuantizeGrid>,
    midi: Option<MidiConfig>,
    all_off: Option<AllOffPolicy>,
}

impl EngineConfig {
    /// Parse an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == Some(0) {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if self.buffer_size == Some(0) {
            return Err(ConfigError::Invalid("buffer_size must be positive".to_string()));
        }
        if self.ticks_per_beat == Some(0) {
            return Err(ConfigError::Invalid("ticks_per_beat must be positive".to_string()));
        }
        if let Some(bpm) = self.bpm {
            if !bpm.is_finite() || bpm <= 0.0 {
                return Err(ConfigError::Invalid(format!("bpm {bpm} must be positive")));
            }
        }
        if let Some([beats, beat_type]) = self.time_signature {
            if beats == 0 || beat_type == 0 {
                return Err(ConfigError::Invalid(format!(
                    "time signature {beats}/{beat_type} is not valid"
                )));
            }
        }
        if let Some(channel) = self.midi.as_ref().and_then(|midi| midi.channel) {
            if !(1..=16).contains(&channel) {
                return Err(ConfigError::Invalid(format!(
                    "MIDI channel {channel} is not between 1 and 16"
                )));
            }
        }
        if self.quantize.is_some_and(|grid| grid.resolution == 0) {
            return Err(ConfigError::Invalid("quantize resolution must be positive".to_string()));
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_FRAME_RATE)
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    pub fn max_notes(&self) -> i32 {
        self.max_notes.unwrap_or(DEFAULT_MAX_NOTES)
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat.unwrap_or(DEFAULT_TICKS_PER_BEAT)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm.unwrap_or(DEFAULT_BEATS_PER_MINUTE)
    }

    /// Beats per bar and beat type.
    pub fn time_signature(&self) -> (u32, u32) {
        let [beats, beat_type] = self.time_signature.unwrap_or([4, 4]);
        (beats, beat_type)
    }

    pub fn quantize(&self) -> QuantizeGrid {
        self.quantize.unwrap_or_default()
    }

    pub fn midi(&self) -> MidiConfig {
        self.midi.clone().unwrap_or_default()
    }

    pub fn all_off(&self) -> AllOffPolicy {
        self.all_off.unwrap_or_default()
    }

    pub fn with_bpm(mut self, bpm: f64) -> EngineConfig {
        self.bpm = Some(bpm);
        self
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Result<EngineConfig, Box<dyn Error>> {
        let config: EngineConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let config = parse("{}")?;
        assert_eq!(48000, config.sample_rate());
        assert_eq!(512, config.buffer_size());
        assert_eq!(64, config.max_notes());
        assert_eq!(192, config.ticks_per_beat());
        assert_eq!(120.0, config.bpm());
        assert_eq!((4, 4), config.time_signature());
        assert_eq!(QuantizeGrid::default(), config.quantize());
        assert_eq!(ChannelFilter::All, config.midi().channel_filter());
        assert_eq!(36, config.midi().note_base());
        assert_eq!(AllOffPolicy::Release, config.all_off());
        Ok(())
    }

    #[test]
    fn full_config() -> Result<(), Box<dyn Error>> {
        let config = parse(
            r#"
            sample_rate: 44100
            buffer_size: 256
            max_notes: -1
            ticks_per_beat: 48
            bpm: 93.5
            time_signature: [7, 8]
            quantize:
              resolution: 8
              triplets: true
            midi:
              channel: 10
              note_base: 60
            all_off: purge
            "#,
        )?;

        assert_eq!(44100, config.sample_rate());
        assert_eq!(256, config.buffer_size());
        assert_eq!(-1, config.max_notes());
        assert_eq!(48, config.ticks_per_beat());
        assert_eq!(93.5, config.bpm());
        assert_eq!((7, 8), config.time_signature());
        assert_eq!(
            QuantizeGrid {
                resolution: 8,
                triplets: true
            },
            config.quantize()
        );
        assert_eq!(ChannelFilter::Channel(9), config.midi().channel_filter());
        assert_eq!(60, config.midi().note_base());
        assert_eq!(AllOffPolicy::Purge, config.all_off());
        Ok(())
    }

    #[test]
    fn invalid_values() {
        assert!(parse("sample_rate: 0").is_err());
        assert!(parse("bpm: -10.0").is_err());
        assert!(parse("time_signature: [0, 4]").is_err());
        assert!(parse("midi:\n  channel: 17").is_err());
        assert!(parse("all_off: sometimes").is_err());
    }

    #[test]
    fn missing_file() {
        assert!(EngineConfig::deserialize(Path::new("/nonexistent/beatcore.yaml")).is_err());
    }
}
