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
//! Musical time: positions expressed both as bar:beat:tick and as an absolute
//! frame count, kept consistent with each other without accumulating drift.

mod position;
mod song;

#[cfg(test)]
mod tests;

pub use position::{
    Granularity, MusicalTime, TransportState, DEFAULT_BEATS_PER_MINUTE, DEFAULT_FRAME_RATE,
    DEFAULT_TICKS_PER_BEAT,
};
pub use song::{BarTable, FixedMeter, SongLayout, DEFAULT_BEATS_PER_BAR};
