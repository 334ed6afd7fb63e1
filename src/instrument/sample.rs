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
use std::{fmt, path::Path};

use hound::{SampleFormat, WavReader};

use super::error::SampleError;

/// Audio held entirely in memory as planar stereo.
pub struct Sample {
    name: String,
    left: Vec<f32>,
    right: Vec<f32>,
    sample_rate: u32,
}

impl Sample {
    /// Creates a stereo sample. The longer channel is cut to the length of the
    /// shorter one.
    pub fn new(name: &str, mut left: Vec<f32>, mut right: Vec<f32>, sample_rate: u32) -> Sample {
        let frames = left.len().min(right.len());
        left.truncate(frames);
        right.truncate(frames);
        Sample {
            name: name.to_string(),
            left,
            right,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Creates a sample that plays the same data on both channels.
    pub fn mono(name: &str, data: Vec<f32>, sample_rate: u32) -> Sample {
        Sample::new(name, data.clone(), data, sample_rate)
    }

    /// Loads a WAV file. Mono files are copied to both channels and any channels
    /// past the second are ignored.
    pub fn load(path: &Path) -> Result<Sample, SampleError> {
        let wav_error = |source| SampleError::Wav {
            path: path.to_path_buf(),
            source,
        };

        let reader = WavReader::open(path).map_err(wav_error)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels);
        if channels == 0 {
            return Err(SampleError::Unsupported {
                path: path.to_path_buf(),
                reason: "no channels".to_string(),
            });
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(wav_error)?,
            SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(SampleError::Unsupported {
                        path: path.to_path_buf(),
                        reason: format!("{} bits per sample", spec.bits_per_sample),
                    });
                }
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(wav_error)?
            }
        };

        if interleaved.len() < channels {
            return Err(SampleError::Empty(path.to_path_buf()));
        }

        let left: Vec<f32> = interleaved.iter().step_by(channels).copied().collect();
        let right: Vec<f32> = if channels == 1 {
            left.clone()
        } else {
            interleaved.iter().skip(1).step_by(channels).copied().collect()
        };

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Sample::new(&name, left, right, spec.sample_rate))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        (self.left.len() + self.right.len()) * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("name", &self.name)
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
