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
//! A sample-accurate drum machine and sampler engine.
//!
//! Events are scheduled against a musical timeline, ordered and quantized in
//! an event queue, and rendered by a polyphonic sampler into per-instrument
//! output ports once per process cycle.

pub mod audio;
pub mod config;
pub mod engine;
pub mod events;
pub mod instrument;
pub mod midi;
pub mod render;
pub mod sampler;
pub mod time;
pub mod transport;

#[cfg(test)]
mod testutil;
