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

//! Instruments: velocity layered samples with an envelope, a filter and the
//! bookkeeping the renderer needs while notes of the instrument are sounding.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc,
};

use tracing::warn;

mod adsr;
pub mod error;
mod list;
mod loader;
mod sample;

pub use adsr::{Adsr, AdsrPhase, MIN_RELEASE_FRAMES};
pub use list::InstrumentList;
pub use loader::{Kit, KitLoader, SampleLoader};
pub use sample::Sample;

/// The number of velocity layers an instrument can hold.
pub const MAX_LAYERS: usize = 16;

pub type InstrumentId = u32;

/// One sample of an instrument, played for velocities in an inclusive range.
#[derive(Debug, Clone)]
pub struct InstrumentLayer {
    min_velocity: f32,
    max_velocity: f32,
    gain: f32,
    pitch: f32,
    sample: Arc<Sample>,
}

impl InstrumentLayer {
    /// A layer covering every velocity.
    pub fn new(sample: Arc<Sample>) -> InstrumentLayer {
        InstrumentLayer {
            min_velocity: 0.0,
            max_velocity: 1.0,
            gain: 1.0,
            pitch: 0.0,
            sample,
        }
    }

    pub fn with_velocity_range(mut self, min: f32, max: f32) -> InstrumentLayer {
        self.min_velocity = min.clamp(0.0, 1.0);
        self.max_velocity = max.clamp(0.0, 1.0);
        self
    }

    pub fn with_gain(mut self, gain: f32) -> InstrumentLayer {
        self.gain = gain.max(0.0);
        self
    }

    /// Pitch offset in half steps.
    pub fn with_pitch(mut self, pitch: f32) -> InstrumentLayer {
        self.pitch = pitch;
        self
    }

    pub fn contains(&self, velocity: f32) -> bool {
        velocity >= self.min_velocity && velocity <= self.max_velocity
    }

    pub fn min_velocity(&self) -> f32 {
        self.min_velocity
    }

    pub fn max_velocity(&self) -> f32 {
        self.max_velocity
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }
}

/// Resonant low pass filter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub active: bool,
    /// Cutoff coefficient in [0, 1].
    pub cutoff: f32,
    /// Resonance coefficient in [0, 1).
    pub resonance: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            active: false,
            cutoff: 1.0,
            resonance: 0.0,
        }
    }
}

/// The two stage band pass/low pass state of one channel of one note.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    band_pass: f32,
    low_pass: f32,
}

impl FilterState {
    pub fn process(&mut self, input: f32, settings: &FilterSettings) -> f32 {
        self.band_pass = settings.resonance * self.band_pass + settings.cutoff * (input - self.low_pass);
        self.low_pass += settings.cutoff * self.band_pass;
        self.low_pass
    }
}

/// A drum kit instrument.
///
/// Instruments are shared between the kit and the notes playing them. The
/// atomic fields are written by the audio thread while the rest of the
/// instrument is read only once it is shared.
#[derive(Debug)]
pub struct Instrument {
    id: InstrumentId,
    name: String,
    gain: f32,
    pan_l: f32,
    pan_r: f32,
    layers: [Option<InstrumentLayer>; MAX_LAYERS],
    adsr: Adsr,
    filter: FilterSettings,
    mute_group: i32,
    random_pitch_factor: f32,
    muted: AtomicBool,
    in_flight: AtomicUsize,
    peak_l: AtomicU32,
    peak_r: AtomicU32,
}

impl Instrument {
    pub fn new(id: InstrumentId, name: &str) -> Instrument {
        Instrument {
            id,
            name: name.to_string(),
            gain: 1.0,
            pan_l: 1.0,
            pan_r: 1.0,
            layers: std::array::from_fn(|_| None),
            adsr: Adsr::default(),
            filter: FilterSettings::default(),
            mute_group: -1,
            random_pitch_factor: 0.0,
            muted: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak_l: AtomicU32::new(0),
            peak_r: AtomicU32::new(0),
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Instrument {
        self.gain = gain.max(0.0);
        self
    }

    pub fn with_pan(mut self, pan_l: f32, pan_r: f32) -> Instrument {
        self.pan_l = pan_l.clamp(0.0, 1.0);
        self.pan_r = pan_r.clamp(0.0, 1.0);
        self
    }

    /// Adds a layer in the first free slot. Layers past the limit are dropped.
    pub fn with_layer(mut self, layer: InstrumentLayer) -> Instrument {
        match self.layers.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(layer),
            None => warn!(
                instrument = %self.name,
                max_layers = MAX_LAYERS,
                "Too many layers, dropping layer"
            ),
        }
        self
    }

    pub fn with_adsr(mut self, adsr: Adsr) -> Instrument {
        self.adsr = adsr;
        self
    }

    pub fn with_filter(mut self, filter: FilterSettings) -> Instrument {
        self.filter = filter;
        self
    }

    /// Instruments sharing a non-negative mute group silence each other.
    pub fn with_mute_group(mut self, mute_group: i32) -> Instrument {
        self.mute_group = mute_group.max(-1);
        self
    }

    /// Random pitch variation per note, in half steps either way.
    pub fn with_random_pitch(mut self, factor: f32) -> Instrument {
        self.random_pitch_factor = factor.max(0.0);
        self
    }

    pub fn with_muted(self, muted: bool) -> Instrument {
        self.muted.store(muted, Ordering::Relaxed);
        self
    }

    pub fn id(&self) -> InstrumentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pan_l(&self) -> f32 {
        self.pan_l
    }

    pub fn pan_r(&self) -> f32 {
        self.pan_r
    }

    pub fn adsr(&self) -> &Adsr {
        &self.adsr
    }

    pub fn filter(&self) -> &FilterSettings {
        &self.filter
    }

    pub fn mute_group(&self) -> Option<i32> {
        (self.mute_group >= 0).then_some(self.mute_group)
    }

    pub fn random_pitch_factor(&self) -> f32 {
        self.random_pitch_factor
    }

    pub fn layers(&self) -> impl Iterator<Item = &InstrumentLayer> {
        self.layers.iter().flatten()
    }

    /// The first layer, in declaration order, whose range holds the velocity.
    pub fn layer_for_velocity(&self, velocity: f32) -> Option<&InstrumentLayer> {
        self.layers().find(|layer| layer.contains(velocity))
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// The number of notes of this instrument currently held by the renderer.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn note_started(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn note_finished(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1));
    }

    /// Raises the stored peaks to the given levels.
    pub fn record_peaks(&self, left: f32, right: f32) {
        raise_peak(&self.peak_l, left);
        raise_peak(&self.peak_r, right);
    }

    pub fn peaks(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peak_l.load(Ordering::Relaxed)),
            f32::from_bits(self.peak_r.load(Ordering::Relaxed)),
        )
    }

    /// Returns the peaks and resets them for the next metering period.
    pub fn take_peaks(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peak_l.swap(0, Ordering::Relaxed)),
            f32::from_bits(self.peak_r.swap(0, Ordering::Relaxed)),
        )
    }
}

fn raise_peak(peak: &AtomicU32, level: f32) {
    // Non-negative floats order the same as their bit patterns.
    let _ = peak.fetch_max(level.abs().to_bits(), Ordering::Relaxed);
}
