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

//! Kit loading and sample caching.
//!
//! Samples are loaded entirely into memory before a kit is handed to the engine,
//! so the audio thread never touches the disk.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::{error::SampleError, Instrument, InstrumentLayer, Sample};
use crate::config::{error::ConfigError, KitConfig};

/// Loads samples from disk, caching them by path.
#[derive(Debug, Default)]
pub struct SampleLoader {
    cache: HashMap<PathBuf, Arc<Sample>>,
}

impl SampleLoader {
    pub fn new() -> SampleLoader {
        SampleLoader::default()
    }

    /// Loads a sample, or returns the cached copy if it was loaded before.
    pub fn load(&mut self, path: &Path) -> Result<Arc<Sample>, SampleError> {
        if let Some(sample) = self.cache.get(path) {
            debug!(path = ?path, "Using cached sample");
            return Ok(sample.clone());
        }

        let sample = Arc::new(Sample::load(path)?);
        info!(
            path = ?path,
            sample_rate = sample.sample_rate(),
            frames = sample.frames(),
            memory_kb = sample.memory_size() / 1024,
            "Sample loaded"
        );
        self.cache.insert(path.to_path_buf(), sample.clone());
        Ok(sample)
    }

    /// Returns the total memory used by cached samples.
    pub fn total_memory_usage(&self) -> usize {
        self.cache.values().map(|sample| sample.memory_size()).sum()
    }
}

/// A named set of instruments, ready to hand to the engine.
#[derive(Debug)]
pub struct Kit {
    name: String,
    instruments: Vec<Arc<Instrument>>,
}

impl Kit {
    pub fn new(name: &str, instruments: Vec<Arc<Instrument>>) -> Kit {
        Kit {
            name: name.to_string(),
            instruments,
        }
    }

    /// Loads a kit file and its samples.
    pub fn load(path: &Path) -> Result<Kit, ConfigError> {
        Kit::load_with(path, &mut SampleLoader::new())
    }

    /// Loads a kit file, sharing samples through the given loader.
    pub fn load_with(path: &Path, loader: &mut SampleLoader) -> Result<Kit, ConfigError> {
        let config = KitConfig::deserialize(path)?;
        let base_path = path.parent().unwrap_or_else(|| Path::new("."));
        let default_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Kit::from_config(&config, &default_name, base_path, loader))
    }

    /// Builds the instruments of a kit. An instrument with a layer that fails to
    /// load is muted rather than failing the whole kit.
    pub fn from_config(
        config: &KitConfig,
        default_name: &str,
        base_path: &Path,
        loader: &mut SampleLoader,
    ) -> Kit {
        let mut instruments = Vec::with_capacity(config.instruments().len());

        for (index, definition) in config.instruments().iter().enumerate() {
            let mut instrument = Instrument::new(definition.id(index), definition.name())
                .with_gain(definition.gain())
                .with_pan(definition.pan()[0], definition.pan()[1])
                .with_adsr(definition.adsr())
                .with_filter(definition.filter())
                .with_mute_group(definition.mute_group())
                .with_random_pitch(definition.random_pitch());

            let mut failed = false;
            for layer in definition.layers() {
                let path = if Path::new(layer.file()).is_absolute() {
                    PathBuf::from(layer.file())
                } else {
                    base_path.join(layer.file())
                };

                match loader.load(&path) {
                    Ok(sample) => {
                        let velocity = layer.velocity();
                        instrument = instrument.with_layer(
                            InstrumentLayer::new(sample)
                                .with_velocity_range(velocity[0], velocity[1])
                                .with_gain(layer.gain())
                                .with_pitch(layer.pitch()),
                        );
                    }
                    Err(e) => {
                        warn!(
                            instrument = definition.name(),
                            path = ?path,
                            err = %e,
                            "Failed to load layer, muting instrument"
                        );
                        failed = true;
                    }
                }
            }

            instruments.push(Arc::new(instrument.with_muted(definition.muted() || failed)));
        }

        let name = config.name().unwrap_or(default_name);
        info!(
            kit = name,
            instruments = instruments.len(),
            memory_kb = loader.total_memory_usage() / 1024,
            "Kit loaded"
        );
        Kit::new(name, instruments)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruments(&self) -> &[Arc<Instrument>] {
        &self.instruments
    }

    pub fn into_instruments(self) -> Vec<Arc<Instrument>> {
        self.instruments
    }
}

struct LoadRequest {
    path: PathBuf,
    reply: Sender<Result<Kit, ConfigError>>,
}

/// Loads kits on a background thread so control threads never block on disk.
/// Every request gets its own reply channel.
pub struct KitLoader {
    requests: Option<Sender<LoadRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl KitLoader {
    pub fn spawn() -> io::Result<KitLoader> {
        let (requests, receiver) = crossbeam_channel::unbounded::<LoadRequest>();
        let worker = thread::Builder::new()
            .name("kit-loader".to_string())
            .spawn(move || {
                let mut samples = SampleLoader::new();
                for request in receiver {
                    info!(path = ?request.path, "Loading kit");
                    let result = Kit::load_with(&request.path, &mut samples);
                    if let Err(e) = &result {
                        error!(path = ?request.path, err = %e, "Kit failed to load");
                    }
                    if request.reply.send(result).is_err() {
                        debug!(path = ?request.path, "Kit requester went away");
                    }
                }
                debug!("Kit loader stopped");
            })?;

        Ok(KitLoader {
            requests: Some(requests),
            worker: Some(worker),
        })
    }

    /// Queues a kit for loading. The result arrives on the returned channel. If
    /// the loader has stopped the channel is disconnected.
    pub fn request(&self, path: &Path) -> Receiver<Result<Kit, ConfigError>> {
        let (reply, result) = crossbeam_channel::bounded(1);
        let request = LoadRequest {
            path: path.to_path_buf(),
            reply,
        };
        match &self.requests {
            Some(requests) if requests.send(request).is_ok() => {}
            _ => error!(path = ?path, "Kit loader is not running"),
        }
        result
    }
}

impl Drop for KitLoader {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Kit loader thread panicked");
            }
        }
    }
}
