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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Mono,
    Stereo,
}

impl PortKind {
    pub fn channels(&self) -> usize {
        match self {
            PortKind::Mono => 1,
            PortKind::Stereo => 2,
        }
    }
}

/// The planar buffers of a port.
pub struct PortBuffers {
    channels: Vec<Vec<f32>>,
}

impl PortBuffers {
    pub fn channel(&self, channel: usize) -> &[f32] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        self.channels
            .get_mut(channel)
            .map(Vec::as_mut_slice)
            .unwrap_or(&mut [])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Adds a stereo frame. Mono buffers receive the sum of both sides.
    pub fn mix(&mut self, frame: usize, left: f32, right: f32) {
        match self.channels.as_mut_slice() {
            [mono] => {
                if let Some(sample) = mono.get_mut(frame) {
                    *sample += left + right;
                }
            }
            [l, r, ..] => {
                if let Some(sample) = l.get_mut(frame) {
                    *sample += left;
                }
                if let Some(sample) = r.get_mut(frame) {
                    *sample += right;
                }
            }
            [] => {}
        }
    }

    fn zero(&mut self, frames: usize) {
        for channel in self.channels.iter_mut() {
            let end = frames.min(channel.len());
            channel[..end].fill(0.0);
        }
    }
}

/// A port owned by the audio backend. The sampler writes into output ports
/// during the process cycle; the backend reads them afterwards.
pub struct AudioPort {
    name: String,
    direction: PortDirection,
    kind: PortKind,
    size: usize,
    buffers: Mutex<PortBuffers>,
    silent: AtomicBool,
}

pub type PortHandle = Arc<AudioPort>;

impl AudioPort {
    pub fn new(name: &str, direction: PortDirection, kind: PortKind, size: usize) -> AudioPort {
        AudioPort {
            name: name.to_string(),
            direction,
            kind,
            size,
            buffers: Mutex::new(PortBuffers {
                channels: vec![vec![0.0; size]; kind.channels()],
            }),
            silent: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    /// The number of frames each channel holds.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn lock(&self) -> MutexGuard<'_, PortBuffers> {
        self.buffers.lock()
    }

    /// True if the buffers are known to hold only zeros.
    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Acquire)
    }

    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Release);
    }

    /// Zeroes the first `frames` frames of every channel. The port only counts
    /// as silent once all of it has been zeroed.
    pub fn write_zeros(&self, frames: usize) {
        self.lock().zero(frames);
        if frames >= self.size {
            self.set_silent(true);
        }
    }
}

impl fmt::Debug for AudioPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPort")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("silent", &self.is_silent())
            .finish()
    }
}

/// Allocates and releases ports on the audio backend. Called from control
/// threads only.
pub trait AudioPortManager: Send + Sync {
    /// Returns None if the backend cannot provide another port.
    fn allocate_port(
        &self,
        name: &str,
        direction: PortDirection,
        kind: PortKind,
        size: usize,
    ) -> Option<PortHandle>;

    fn release_port(&self, port: &PortHandle);
}

/// An in-process port manager that keeps every port it hands out.
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: Mutex<Vec<PortHandle>>,
    limit: Option<usize>,
}

impl PortRegistry {
    pub fn new() -> PortRegistry {
        PortRegistry::default()
    }

    /// A registry that refuses to hand out more than `limit` ports at a time.
    pub fn with_limit(limit: usize) -> PortRegistry {
        PortRegistry {
            ports: Mutex::new(Vec::new()),
            limit: Some(limit),
        }
    }

    pub fn ports(&self) -> Vec<PortHandle> {
        self.ports.lock().clone()
    }

    pub fn find(&self, name: &str) -> Option<PortHandle> {
        self.ports.lock().iter().find(|port| port.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.ports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.lock().is_empty()
    }
}

impl AudioPortManager for PortRegistry {
    fn allocate_port(
        &self,
        name: &str,
        direction: PortDirection,
        kind: PortKind,
        size: usize,
    ) -> Option<PortHandle> {
        let mut ports = self.ports.lock();
        if self.limit.is_some_and(|limit| ports.len() >= limit) {
            warn!(port = name, "No ports left to allocate");
            return None;
        }

        let port = Arc::new(AudioPort::new(name, direction, kind, size));
        debug!(port = name, ?direction, ?kind, size, "Allocated port");
        ports.push(port.clone());
        Some(port)
    }

    fn release_port(&self, port: &PortHandle) {
        let mut ports = self.ports.lock();
        let before = ports.len();
        ports.retain(|held| !Arc::ptr_eq(held, port));
        if ports.len() < before {
            debug!(port = port.name(), "Released port");
        }
    }
}
