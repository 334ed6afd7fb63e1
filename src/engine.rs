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
//! The engine: one process cycle ties the transport, the event queue and the
//! sampler together. Control threads talk to it through the inbox and the
//! coarse engine lock; the audio thread calls `process_cycle`.

use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::{
    audio::AudioPortManager,
    config::EngineConfig,
    events::{EventInbox, EventKind, EventQueue, NoteDuration, ScheduledEvent},
    instrument::{Instrument, InstrumentId, InstrumentList, Kit},
    midi::MidiTranslator,
    sampler::{NoteLimit, Sampler},
    time::{MusicalTime, SongLayout},
    transport::Transport,
};

mod lock;

pub use lock::{EngineGuard, EngineLock};

const NO_PATCH_CHANGE: u64 = u64::MAX;

pub struct Engine {
    lock: EngineLock,
    transport: Mutex<Transport>,
    queue: Mutex<EventQueue>,
    inbox: EventInbox,
    sampler: Sampler,
    instruments: RwLock<InstrumentList>,
    translator: Mutex<MidiTranslator>,
    master_volume: AtomicU32,
    patch_change: AtomicU64,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        port_manager: Arc<dyn AudioPortManager>,
        song: Arc<dyn SongLayout>,
    ) -> Engine {
        let (beats_per_bar, beat_type) = config.time_signature();
        let position = MusicalTime::new(
            config.sample_rate(),
            config.bpm(),
            beats_per_bar,
            beat_type,
            config.ticks_per_beat(),
        );
        let midi = config.midi();

        info!(
            sample_rate = config.sample_rate(),
            buffer_size = config.buffer_size(),
            max_notes = config.max_notes(),
            bpm = config.bpm(),
            "Starting engine"
        );

        Engine {
            lock: EngineLock::new(),
            transport: Mutex::new(Transport::new(position, song)),
            queue: Mutex::new(EventQueue::new(config.quantize())),
            inbox: EventInbox::default(),
            sampler: Sampler::new(
                port_manager,
                config.buffer_size() as usize,
                NoteLimit::from(config.max_notes()),
                config.all_off(),
            ),
            instruments: RwLock::new(InstrumentList::default()),
            translator: Mutex::new(MidiTranslator::new(midi.channel_filter(), midi.note_base())),
            master_volume: AtomicU32::new(1.0f32.to_bits()),
            patch_change: AtomicU64::new(NO_PATCH_CHANGE),
        }
    }

    /// The coarse lock control threads hold while changing the engine.
    pub fn lock(&self) -> &EngineLock {
        &self.lock
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// The transport. Control threads should hold the engine lock while moving
    /// it so the audio thread skips rather than waits.
    pub fn transport(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock()
    }

    /// A copy of the current position.
    pub fn position(&self) -> MusicalTime {
        *self.transport.lock().position()
    }

    pub fn instruments(&self) -> Vec<Arc<Instrument>> {
        self.instruments.read().iter().cloned().collect()
    }

    /// Replaces the loaded kit. Notes of the old kit play out; their
    /// instruments are freed by `reap_instruments` once silent.
    pub fn load_kit(&self, kit: Kit) {
        let _guard = self.lock.lock();
        let mut instruments = self.instruments.write();

        for old in instruments.iter() {
            self.sampler.remove_instrument(old.id());
        }
        instruments.clear();

        info!(kit = kit.name(), instruments = kit.instruments().len(), "Loading kit");
        for instrument in kit.into_instruments() {
            self.sampler.add_instrument(&instrument);
            instruments.add(instrument);
        }
    }

    /// Adds an instrument, or replaces the instrument with the same ID.
    pub fn add_instrument(&self, instrument: Arc<Instrument>) -> bool {
        let _guard = self.lock.lock();
        let allocated = self.sampler.add_instrument(&instrument);
        self.instruments.write().add(instrument);
        allocated
    }

    pub fn remove_instrument(&self, id: InstrumentId) -> Option<Arc<Instrument>> {
        let _guard = self.lock.lock();
        self.sampler.remove_instrument(id);
        self.instruments.write().remove(id)
    }

    /// Frees removed instruments whose notes have finished.
    pub fn reap_instruments(&self) -> usize {
        self.instruments.write().reap()
    }

    pub fn schedule(&self, event: ScheduledEvent) {
        self.inbox.push(event);
    }

    pub fn schedule_note(&self, event: ScheduledEvent, duration: NoteDuration) {
        self.inbox.push_note(event, duration);
    }

    /// Translates a MIDI message into events at the start of the next cycle.
    pub fn handle_midi(&self, bytes: &[u8]) -> bool {
        self.handle_midi_at(bytes, 0)
    }

    /// Translates a MIDI message into events at a frame of the next cycle.
    pub fn handle_midi_at(&self, bytes: &[u8], frame: u32) -> bool {
        let mut events = Vec::new();
        let handled = {
            let instruments = self.instruments.read();
            self.translator
                .lock()
                .translate(bytes, frame, &*instruments, &mut events)
        };
        self.inbox.extend(events);
        handled
    }

    /// Renders one cycle of `frames` frames. Returns false if a control thread
    /// held the engine lock, in which case the ports are silenced and nothing
    /// moves.
    pub fn process_cycle(&self, frames: u32) -> bool {
        debug_assert!(
            frames as usize <= self.sampler.buffer_size(),
            "cycle of {frames} frames exceeds the buffer size {}",
            self.sampler.buffer_size()
        );
        // Events, notes and the transport all move by the frames actually rendered.
        let frames = frames.min(u32::try_from(self.sampler.buffer_size()).unwrap_or(u32::MAX));

        let Some(_guard) = self.lock.try_lock() else {
            self.sampler.silence(frames);
            return false;
        };

        let mut transport = self.transport.lock();
        let mut queue = self.queue.lock();
        queue.set_position(*transport.position());
        self.inbox.drain_into(&mut queue);

        for event in queue.cycle(frames) {
            match event.kind {
                EventKind::VolumeUpdate(volume) => {
                    self.master_volume.store(volume.to_bits(), Ordering::Relaxed);
                }
                EventKind::PatchChange(patch) => {
                    self.patch_change.store(u64::from(patch), Ordering::Relaxed);
                }
                _ => {}
            }
        }

        self.sampler
            .process(queue.cycle(frames), transport.position(), frames);
        queue.consumed(frames);
        transport.processed_frames(frames);
        true
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    /// Takes the last patch change seen, as bank << 7 | program.
    pub fn take_patch_change(&self) -> Option<u32> {
        let patch = self.patch_change.swap(NO_PATCH_CHANGE, Ordering::Relaxed);
        u32::try_from(patch).ok()
    }

    /// Stops every note immediately and drops every pending event.
    pub fn panic(&self) {
        let _guard = self.lock.lock();
        warn!("Stopping all notes");
        self.inbox.clear();
        self.queue.lock().clear();
        self.sampler.stop_playing_notes(None);
        debug!(notes = self.sampler.playing_notes_count(), "Engine silenced");
    }
}
