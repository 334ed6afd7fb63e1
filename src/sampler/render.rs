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

use tracing::trace;

use super::note::{Note, RELEASE_NEVER};
use crate::{audio::AudioPort, time::MusicalTime};

/// The source frames to advance per output frame, or None when the sample can
/// be copied frame for frame.
pub(super) fn resample_step(pitch: f32, sample_rate: u32, frame_rate: u32) -> Option<f64> {
    if pitch == 0.0 && sample_rate == frame_rate {
        None
    } else {
        Some(2f64.powf(f64::from(pitch) / 12.0) * f64::from(sample_rate) / f64::from(frame_rate))
    }
}

/// Renders one cycle of a note into its port. Returns true when the note has
/// finished and should be dropped.
pub(super) fn render_note(
    note: &mut Note,
    port: Option<&AudioPort>,
    position: &MusicalTime,
    frames: u32,
) -> bool {
    let instrument = Arc::clone(note.instrument());
    let Some(layer) = instrument.layer_for_velocity(note.velocity()) else {
        trace!(
            instrument = %instrument.name(),
            velocity = note.velocity(),
            "No layer for velocity"
        );
        return true;
    };

    let pitch = note.total_pitch() + layer.pitch();
    let step = resample_step(pitch, layer.sample().sample_rate(), position.frame_rate());
    render_with_step(note, port, position, frames, step)
}

pub(super) fn render_with_step(
    note: &mut Note,
    port: Option<&AudioPort>,
    position: &MusicalTime,
    frames: u32,
    step: Option<f64>,
) -> bool {
    if note.silence_offset >= frames {
        note.silence_offset -= frames;
        return false;
    }

    let instrument = Arc::clone(note.instrument());
    let Some(layer) = instrument.layer_for_velocity(note.velocity()) else {
        return true;
    };
    let sample = layer.sample();
    if sample.is_empty() {
        return true;
    }

    let (cost_l, cost_r) = if instrument.is_muted() {
        (0.0, 0.0)
    } else {
        let (pan_l, pan_r) = note.pan();
        let velocity = note.velocity();
        (
            velocity * pan_l * layer.gain() * instrument.pan_l() * instrument.gain() * 2.0,
            velocity * pan_r * layer.gain() * instrument.pan_r() * instrument.gain() * 2.0,
        )
    };

    let increment = step.unwrap_or(1.0);
    let start = note.silence_offset as usize;
    let available = frames as usize - start;
    let remaining = sample.frames() as f64 - note.sample_position;
    let needed = if remaining > 0.0 {
        (remaining / increment).ceil() as usize
    } else {
        0
    };
    let exhausted = needed <= available;
    let length_limit = (note.length() >= 0)
        .then(|| f64::from(note.length()) * position.frames_per_tick() * increment);
    let filter = *instrument.filter();
    let envelope_step = increment as f32;

    let mut buffers = port.map(AudioPort::lock);
    let mut peak_l = 0.0f32;
    let mut peak_r = 0.0f32;
    let mut rendered = 0usize;
    let mut released = false;

    for i in 0..needed.min(available) {
        let source = note.sample_position + i as f64 * increment;
        let past_release = start + i >= note.release_offset as usize;
        let past_length = length_limit.is_some_and(|limit| source >= limit);
        if (past_release || past_length) && !note.adsr.release() {
            released = true;
            break;
        }

        let (left, right) = match step {
            None => {
                let index = source as usize;
                (sample.left()[index], sample.right()[index])
            }
            Some(_) => (
                interpolate(sample.left(), source),
                interpolate(sample.right(), source),
            ),
        };

        let envelope = note.adsr.get_value(envelope_step);
        let mut out_l = left * cost_l * envelope;
        let mut out_r = right * cost_r * envelope;
        if filter.active {
            out_l = note.filter_l.process(out_l, &filter);
            out_r = note.filter_r.process(out_r, &filter);
        }

        peak_l = peak_l.max(out_l.abs());
        peak_r = peak_r.max(out_r.abs());
        if let Some(buffers) = buffers.as_mut() {
            buffers.mix(start + i, out_l, out_r);
        }
        rendered += 1;
    }
    drop(buffers);

    note.sample_position += rendered as f64 * increment;
    if rendered > 0 {
        if let Some(port) = port {
            port.set_silent(false);
        }
        instrument.record_peaks(peak_l, peak_r);
    }

    let ended = exhausted || released;
    if !ended {
        note.silence_offset = 0;
        if note.release_offset != RELEASE_NEVER {
            note.release_offset = 0;
        }
    }
    ended
}

// Linear interpolation between neighbouring frames. The frame after the last
// one is silence.
fn interpolate(data: &[f32], position: f64) -> f32 {
    let index = position.floor();
    let fraction = (position - index) as f32;
    let index = index as usize;
    let current = data.get(index).copied().unwrap_or(0.0);
    if fraction == 0.0 {
        return current;
    }
    let next = data.get(index + 1).copied().unwrap_or(0.0);
    current + (next - current) * fraction
}
