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
//! Helpers shared by the unit tests.

use std::{
    path::Path,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::instrument::{Instrument, InstrumentLayer, Sample};

/// A stereo sample at 48kHz holding one value throughout.
pub fn constant_sample(frames: usize, value: f32) -> Arc<Sample> {
    Arc::new(Sample::mono("constant", vec![value; frames], 48000))
}

/// A stereo sample at 48kHz rising from 0 towards 1, with the right channel
/// inverted.
pub fn ramp_sample(frames: usize) -> Arc<Sample> {
    let left: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
    let right = left.iter().map(|value| -value).collect();
    Arc::new(Sample::new("ramp", left, right, 48000))
}

/// An instrument with a single layer covering every velocity.
pub fn instrument(id: u32, name: &str, sample: Arc<Sample>) -> Arc<Instrument> {
    Arc::new(Instrument::new(id, name).with_layer(InstrumentLayer::new(sample)))
}

/// Writes interleaved 16 bit samples to a WAV file.
pub fn write_wav(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()
}

/// Wait for the given predicate to return true or fail.
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}
