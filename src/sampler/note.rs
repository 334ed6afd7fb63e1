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
use std::sync::Arc;

use crate::instrument::{Adsr, FilterState, Instrument};

/// Marks a note that has not been released.
pub const RELEASE_NEVER: u32 = u32::MAX;

/// A pitch offset given as octave and key, as a keyboard would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoteKey {
    pub octave: i8,
    pub key: u8,
}

impl NoteKey {
    pub fn semitones(&self) -> i32 {
        i32::from(self.octave) * 12 + i32::from(self.key)
    }
}

/// A note of an instrument, both as scheduled and while it is sounding.
#[derive(Debug, Clone)]
pub struct Note {
    instrument: Arc<Instrument>,
    velocity: f32,
    pan_l: f32,
    pan_r: f32,
    length: i32,
    pitch: f32,
    key: NoteKey,
    lead_lag: f32,
    is_preview: bool,

    // Render state, owned by the sampler once the note starts.
    pub(super) sample_position: f64,
    pub(super) silence_offset: u32,
    pub(super) release_offset: u32,
    pub(super) adsr: Adsr,
    pub(super) filter_l: FilterState,
    pub(super) filter_r: FilterState,
}

impl Note {
    /// A centered note with no length limit.
    pub fn new(instrument: Arc<Instrument>, velocity: f32) -> Note {
        let adsr = instrument.adsr().clone();
        Note {
            instrument,
            velocity: velocity.clamp(0.0, 1.0),
            pan_l: 0.5,
            pan_r: 0.5,
            length: -1,
            pitch: 0.0,
            key: NoteKey::default(),
            lead_lag: 0.0,
            is_preview: false,
            sample_position: 0.0,
            silence_offset: 0,
            release_offset: RELEASE_NEVER,
            adsr,
            filter_l: FilterState::default(),
            filter_r: FilterState::default(),
        }
    }

    pub fn with_pan(mut self, pan_l: f32, pan_r: f32) -> Note {
        self.pan_l = pan_l.clamp(0.0, 0.5);
        self.pan_r = pan_r.clamp(0.0, 0.5);
        self
    }

    /// Length in ticks. Negative plays until the sample ends.
    pub fn with_length(mut self, length: i32) -> Note {
        self.length = length.max(-1);
        self
    }

    /// Pitch offset in half steps.
    pub fn with_pitch(mut self, pitch: f32) -> Note {
        self.pitch = pitch;
        self
    }

    pub fn with_key(mut self, key: NoteKey) -> Note {
        self.key = key;
        self
    }

    /// Moves the note ahead of (negative) or behind (positive) its position.
    pub fn with_lead_lag(mut self, lead_lag: f32) -> Note {
        self.lead_lag = lead_lag.clamp(-1.0, 1.0);
        self
    }

    pub(super) fn into_preview(mut self) -> Note {
        self.is_preview = true;
        self
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn pan(&self) -> (f32, f32) {
        (self.pan_l, self.pan_r)
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn key(&self) -> NoteKey {
        self.key
    }

    pub fn lead_lag(&self) -> f32 {
        self.lead_lag
    }

    pub fn is_preview(&self) -> bool {
        self.is_preview
    }

    pub fn is_releasing(&self) -> bool {
        self.release_offset != RELEASE_NEVER
    }

    /// Total pitch offset in half steps before the layer's own pitch.
    pub(super) fn total_pitch(&self) -> f32 {
        self.key.semitones() as f32 + self.pitch
    }

    /// Resets the render state for a note starting at the given cycle frame.
    pub(super) fn begin(&mut self, frame: u32) {
        self.sample_position = 0.0;
        self.silence_offset = frame;
        self.release_offset = RELEASE_NEVER;
        self.adsr = self.instrument.adsr().clone();
        self.adsr.reset();
        self.filter_l = FilterState::default();
        self.filter_r = FilterState::default();

        let factor = self.instrument.random_pitch_factor();
        if factor > 0.0 {
            self.pitch += (rand::random::<f32>() * 2.0 - 1.0) * factor;
        }
    }

    /// Releases the note at the given cycle frame unless it releases earlier.
    pub(super) fn release_at(&mut self, frame: u32) {
        self.release_offset = self.release_offset.min(frame);
    }
}
