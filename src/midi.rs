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
//! Raw MIDI input: byte-exact dispatch of single messages to handler hooks and
//! the default translation of those hooks into scheduled engine events.

mod dispatch;
mod translator;

pub use dispatch::{dispatch, ChannelFilter, MidiHandler};
pub use translator::{InstrumentLookup, MidiTranslator, DEFAULT_NOTE_BASE};
