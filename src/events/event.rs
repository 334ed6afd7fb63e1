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
use crate::sampler::Note;

/// What a scheduled event does when its frame is reached.
#[derive(Debug, Clone)]
pub enum EventKind {
    NoteOn(Note),
    /// Releases every sounding note of the note's instrument.
    NoteOff(Note),
    AllOff,
    /// Master volume in [0, 1].
    VolumeUpdate(f32),
    /// Bank and program packed as bank << 7 | program.
    PatchChange(u32),
}

/// An event at a frame offset within the upcoming process cycles.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub frame: u32,
    pub quantize: bool,
    pub kind: EventKind,
}

impl ScheduledEvent {
    pub fn new(frame: u32, kind: EventKind) -> ScheduledEvent {
        ScheduledEvent {
            frame,
            quantize: false,
            kind,
        }
    }

    pub fn note_on(frame: u32, note: Note) -> ScheduledEvent {
        ScheduledEvent::new(frame, EventKind::NoteOn(note))
    }

    pub fn note_off(frame: u32, note: Note) -> ScheduledEvent {
        ScheduledEvent::new(frame, EventKind::NoteOff(note))
    }

    pub fn all_off(frame: u32) -> ScheduledEvent {
        ScheduledEvent::new(frame, EventKind::AllOff)
    }

    pub fn volume(frame: u32, volume: f32) -> ScheduledEvent {
        ScheduledEvent::new(frame, EventKind::VolumeUpdate(volume.clamp(0.0, 1.0)))
    }

    pub fn patch_change(frame: u32, bank: u16, program: u8) -> ScheduledEvent {
        let packed = (u32::from(bank & 0x3FFF) << 7) | u32::from(program & 0x7F);
        ScheduledEvent::new(frame, EventKind::PatchChange(packed))
    }

    /// Marks the event to be moved onto the quantize grid when queued.
    pub fn quantized(mut self) -> ScheduledEvent {
        self.quantize = true;
        self
    }

    /// The note carried by note events.
    pub fn note(&self) -> Option<&Note> {
        match &self.kind {
            EventKind::NoteOn(note) | EventKind::NoteOff(note) => Some(note),
            _ => None,
        }
    }
}

/// How long a queued note lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteDuration {
    /// Sounds until released or the sample runs out.
    #[default]
    Indefinite,
    /// A note off follows the note on after this many frames.
    Frames(u32),
}
