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

//! The polyphonic note renderer.
//!
//! The sampler owns every sounding note. Once per process cycle it applies the
//! cycle's events to its notes and renders each note into the output port of
//! its instrument.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    audio::{AudioPortManager, PortDirection, PortHandle, PortKind},
    config::AllOffPolicy,
    events::{EventKind, ScheduledEvent},
    instrument::{Instrument, InstrumentId, InstrumentLayer, Sample},
    time::MusicalTime,
};

mod note;
mod render;


pub use note::{Note, NoteKey, RELEASE_NEVER};

/// The instrument ID reserved for previews.
pub const PREVIEW_INSTRUMENT_ID: InstrumentId = InstrumentId::MAX;

const PREVIEW_PORT_NAME: &str = "preview";

/// Note storage reserved up front when there is no note limit.
const DEFAULT_NOTE_CAPACITY: usize = 256;

/// The most notes that may sound at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteLimit {
    #[default]
    Unlimited,
    Max(usize),
}

impl From<i32> for NoteLimit {
    /// Negative values mean no limit.
    fn from(value: i32) -> Self {
        match usize::try_from(value) {
            Ok(max) => NoteLimit::Max(max),
            Err(_) => NoteLimit::Unlimited,
        }
    }
}

impl NoteLimit {
    fn to_raw(self) -> i64 {
        match self {
            NoteLimit::Unlimited => -1,
            NoteLimit::Max(max) => i64::try_from(max).unwrap_or(i64::MAX),
        }
    }

    fn from_raw(raw: i64) -> NoteLimit {
        match usize::try_from(raw) {
            Ok(max) => NoteLimit::Max(max),
            Err(_) => NoteLimit::Unlimited,
        }
    }
}

pub struct Sampler {
    notes: Mutex<Vec<Note>>,
    note_limit: AtomicI64,
    all_off: AllOffPolicy,
    buffer_size: usize,
    ports: RwLock<HashMap<InstrumentId, PortHandle>>,
    port_manager: Arc<dyn AudioPortManager>,
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("notes", &self.playing_notes_count())
            .field("note_limit", &self.note_limit())
            .field("all_off", &self.all_off)
            .field("ports", &self.ports.read().len())
            .finish()
    }
}

impl Sampler {
    /// Creates a sampler with its preview port allocated.
    pub fn new(
        port_manager: Arc<dyn AudioPortManager>,
        buffer_size: usize,
        note_limit: NoteLimit,
        all_off: AllOffPolicy,
    ) -> Sampler {
        let capacity = match note_limit {
            NoteLimit::Max(max) => max + 1,
            NoteLimit::Unlimited => DEFAULT_NOTE_CAPACITY,
        };

        let sampler = Sampler {
            notes: Mutex::new(Vec::with_capacity(capacity)),
            note_limit: AtomicI64::new(note_limit.to_raw()),
            all_off,
            buffer_size,
            ports: RwLock::new(HashMap::new()),
            port_manager,
        };

        match sampler.port_manager.allocate_port(
            PREVIEW_PORT_NAME,
            PortDirection::Output,
            PortKind::Stereo,
            buffer_size,
        ) {
            Some(port) => {
                sampler.ports.write().insert(PREVIEW_INSTRUMENT_ID, port);
            }
            None => warn!("Unable to allocate the preview port, previews will be silent"),
        }
        sampler
    }

    pub fn note_limit(&self) -> NoteLimit {
        NoteLimit::from_raw(self.note_limit.load(Ordering::Relaxed))
    }

    pub fn set_note_limit(&self, limit: NoteLimit) {
        self.note_limit.store(limit.to_raw(), Ordering::Relaxed);
        if let NoteLimit::Max(max) = limit {
            let mut notes = self.notes.lock();
            let additional = (max + 1).saturating_sub(notes.capacity());
            notes.reserve(additional);
        }
    }

    pub fn all_off_policy(&self) -> AllOffPolicy {
        self.all_off
    }

    /// The most frames a single cycle may render.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn playing_notes_count(&self) -> usize {
        self.notes.lock().len()
    }

    /// The port notes of the given instrument are rendered into.
    pub fn port(&self, id: InstrumentId) -> Option<PortHandle> {
        self.ports.read().get(&id).cloned()
    }

    /// Every port the sampler renders into, the preview port included.
    pub fn ports(&self) -> Vec<PortHandle> {
        self.ports.read().values().cloned().collect()
    }

    /// Renders one process cycle.
    ///
    /// The events must be ordered by frame and have frames below `frames`,
    /// which must not exceed the buffer size.
    pub fn process<'a, I>(&self, events: I, position: &MusicalTime, frames: u32)
    where
        I: IntoIterator<Item = &'a ScheduledEvent>,
    {
        debug_assert!(
            frames as usize <= self.buffer_size,
            "cycle of {frames} frames exceeds the buffer size {}",
            self.buffer_size
        );
        let frames = frames.min(u32::try_from(self.buffer_size).unwrap_or(u32::MAX));
        let ports = self.ports.read();
        for port in ports.values() {
            if !port.is_silent() {
                port.write_zeros(frames as usize);
            }
        }

        let mut notes = self.notes.lock();
        self.enforce_limit(&mut notes);

        for event in events {
            match &event.kind {
                EventKind::NoteOn(note) => self.start_note(&mut notes, note.clone(), event.frame),
                EventKind::NoteOff(off) => {
                    for note in notes
                        .iter_mut()
                        .filter(|note| Arc::ptr_eq(note.instrument(), off.instrument()))
                    {
                        note.release_at(event.frame);
                    }
                }
                EventKind::AllOff => match self.all_off {
                    AllOffPolicy::Release => {
                        for note in notes.iter_mut() {
                            note.release_at(event.frame);
                        }
                    }
                    AllOffPolicy::Purge => {
                        for note in notes.drain(..) {
                            note.instrument().note_finished();
                        }
                    }
                },
                EventKind::VolumeUpdate(_) | EventKind::PatchChange(_) => {}
            }
        }

        notes.retain_mut(|note| {
            let port = ports.get(&note.instrument().id()).or_else(|| {
                note.is_preview()
                    .then(|| ports.get(&PREVIEW_INSTRUMENT_ID))
                    .flatten()
            });
            let ended = render::render_note(note, port.map(Arc::as_ref), position, frames);
            if ended {
                note.instrument().note_finished();
            }
            !ended
        });
    }

    /// Zeroes every port without touching the notes. Used when a cycle has to
    /// be skipped.
    pub fn silence(&self, frames: u32) {
        for port in self.ports.read().values() {
            if !port.is_silent() {
                port.write_zeros(frames as usize);
            }
        }
    }

    /// Stops notes immediately, without a release. With no instrument every
    /// note stops.
    pub fn stop_playing_notes(&self, instrument: Option<&Arc<Instrument>>) {
        let mut notes = self.notes.lock();
        let before = notes.len();
        notes.retain(|note| {
            let matches =
                instrument.map_or(true, |wanted| Arc::ptr_eq(wanted, note.instrument()));
            if matches {
                note.instrument().note_finished();
            }
            !matches
        });
        debug!(stopped = before - notes.len(), "Stopped notes");
    }

    /// Plays a sample on its own through the preview port, replacing any
    /// preview already playing. A negative length plays the whole sample.
    pub fn preview_sample(&self, sample: Arc<Sample>, length: i32) {
        let instrument = Arc::new(
            Instrument::new(PREVIEW_INSTRUMENT_ID, PREVIEW_PORT_NAME)
                .with_layer(InstrumentLayer::new(sample)),
        );
        self.start_preview(Note::new(instrument, 1.0).with_length(length));
    }

    /// Plays a note of an instrument, replacing any preview already playing.
    pub fn preview_instrument(&self, instrument: &Arc<Instrument>, velocity: f32) {
        self.start_preview(Note::new(instrument.clone(), velocity));
    }

    /// Stops the preview note, if any.
    pub fn stop_preview(&self) {
        let mut notes = self.notes.lock();
        notes.retain(|note| {
            if note.is_preview() {
                note.instrument().note_finished();
            }
            !note.is_preview()
        });
    }

    /// Allocates the output port for an instrument. Returns false if the port
    /// manager has no port to give.
    pub fn add_instrument(&self, instrument: &Instrument) -> bool {
        if self.ports.read().contains_key(&instrument.id()) {
            return true;
        }

        let name = format!("{}-{}", instrument.id(), instrument.name());
        match self.port_manager.allocate_port(
            &name,
            PortDirection::Output,
            PortKind::Stereo,
            self.buffer_size,
        ) {
            Some(port) => {
                self.ports.write().insert(instrument.id(), port);
                true
            }
            None => {
                warn!(instrument = %instrument.name(), "Unable to allocate an output port");
                false
            }
        }
    }

    /// Releases the output port of an instrument.
    pub fn remove_instrument(&self, id: InstrumentId) {
        if id == PREVIEW_INSTRUMENT_ID {
            return;
        }
        let removed = self.ports.write().remove(&id);
        if let Some(port) = removed {
            self.port_manager.release_port(&port);
        }
    }

    /// Releases every instrument port, keeping the preview port.
    pub fn clear(&self) {
        let removed: Vec<PortHandle> = {
            let mut ports = self.ports.write();
            let ids: Vec<InstrumentId> = ports
                .keys()
                .copied()
                .filter(|id| *id != PREVIEW_INSTRUMENT_ID)
                .collect();
            ids.iter().filter_map(|id| ports.remove(id)).collect()
        };
        info!(ports = removed.len(), "Releasing instrument ports");
        for port in removed {
            self.port_manager.release_port(&port);
        }
    }

    fn start_preview(&self, note: Note) {
        let mut note = note.into_preview();
        note.begin(0);

        let mut notes = self.notes.lock();
        notes.retain(|playing| {
            if playing.is_preview() {
                playing.instrument().note_finished();
            }
            !playing.is_preview()
        });
        note.instrument().note_started();
        notes.push(note);
        self.enforce_limit(&mut notes);
    }

    fn start_note(&self, notes: &mut Vec<Note>, mut note: Note, frame: u32) {
        if let Some(group) = note.instrument().mute_group() {
            for playing in notes
                .iter_mut()
                .filter(|playing| playing.instrument().mute_group() == Some(group))
            {
                playing.release_at(frame);
            }
        }

        note.begin(frame);
        note.instrument().note_started();
        notes.push(note);
        self.enforce_limit(notes);
    }

    // Drops the oldest notes until the limit holds.
    fn enforce_limit(&self, notes: &mut Vec<Note>) {
        let NoteLimit::Max(max) = self.note_limit() else {
            return;
        };
        if notes.len() <= max {
            return;
        }

        let excess = notes.len() - max;
        for note in notes.drain(..excess) {
            note.instrument().note_finished();
        }
        debug!(evicted = excess, max, "Note limit reached, dropped oldest notes");
    }
}
