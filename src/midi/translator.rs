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

use tracing::{debug, trace};

use super::dispatch::{dispatch, ChannelFilter, MidiHandler};
use crate::{
    events::ScheduledEvent,
    instrument::Instrument,
    sampler::Note,
};

/// The note number that plays the first instrument of a kit, General MIDI's
/// bass drum.
pub const DEFAULT_NOTE_BASE: u8 = 36;

const CC_BANK_COARSE: u8 = 0;
const CC_VOLUME_COARSE: u8 = 7;
const CC_BANK_FINE: u8 = 32;
const CC_VOLUME_FINE: u8 = 39;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

const MAX_14_BIT: f32 = 16383.0;

/// Finds the instrument played by a note, by its position in the kit.
pub trait InstrumentLookup {
    fn instrument_at(&self, index: usize) -> Option<Arc<Instrument>>;
}

/// Turns raw MIDI input into engine events.
///
/// Bank select and channel volume are 14 bit controllers split over a coarse
/// and a fine controller, so the translator keeps the last value of each half
/// between messages.
#[derive(Debug, Clone)]
pub struct MidiTranslator {
    filter: ChannelFilter,
    note_base: u8,
    bank_coarse: u8,
    bank_fine: u8,
    volume_coarse: u8,
    volume_fine: u8,
}

impl MidiTranslator {
    pub fn new(filter: ChannelFilter, note_base: u8) -> MidiTranslator {
        MidiTranslator {
            filter,
            note_base,
            bank_coarse: 0,
            bank_fine: 0,
            volume_coarse: 0x7F,
            volume_fine: 0x7F,
        }
    }

    pub fn filter(&self) -> ChannelFilter {
        self.filter
    }

    pub fn note_base(&self) -> u8 {
        self.note_base
    }

    /// The current 14 bit bank.
    pub fn bank(&self) -> u16 {
        (u16::from(self.bank_coarse) << 7) | u16::from(self.bank_fine)
    }

    /// Translates one MIDI message, appending the events it produces with the
    /// given cycle frame. Returns true if the message produced any.
    pub fn translate(
        &mut self,
        bytes: &[u8],
        frame: u32,
        kit: &dyn InstrumentLookup,
        out: &mut Vec<ScheduledEvent>,
    ) -> bool {
        let filter = self.filter;
        let mut handler = Translation {
            state: self,
            frame,
            kit,
            out,
        };
        dispatch(&mut handler, filter, bytes)
    }

    fn volume(&self) -> f32 {
        let raw = (u16::from(self.volume_coarse) << 7) | u16::from(self.volume_fine);
        f32::from(raw) / MAX_14_BIT
    }
}

impl Default for MidiTranslator {
    fn default() -> Self {
        MidiTranslator::new(ChannelFilter::All, DEFAULT_NOTE_BASE)
    }
}

// The handler for a single message.
struct Translation<'a> {
    state: &'a mut MidiTranslator,
    frame: u32,
    kit: &'a dyn InstrumentLookup,
    out: &'a mut Vec<ScheduledEvent>,
}

impl Translation<'_> {
    fn lookup(&self, key: u8) -> Option<Arc<Instrument>> {
        let index = key.checked_sub(self.state.note_base)?;
        let instrument = self.kit.instrument_at(usize::from(index));
        if instrument.is_none() {
            trace!(key, "No instrument mapped to key");
        }
        instrument
    }
}

impl MidiHandler for Translation<'_> {
    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> bool {
        if velocity == 0 {
            return self.note_off(channel, key, velocity);
        }
        let Some(instrument) = self.lookup(key) else {
            return false;
        };

        let note = Note::new(instrument, f32::from(velocity) / 127.0);
        self.out.push(ScheduledEvent::note_on(self.frame, note));
        true
    }

    fn note_off(&mut self, _channel: u8, key: u8, _velocity: u8) -> bool {
        let Some(instrument) = self.lookup(key) else {
            return false;
        };

        self.out
            .push(ScheduledEvent::note_off(self.frame, Note::new(instrument, 0.0)));
        true
    }

    fn control_change(&mut self, _channel: u8, controller: u8, value: u8) -> bool {
        match controller {
            CC_BANK_COARSE => {
                self.state.bank_coarse = value;
                false
            }
            CC_BANK_FINE => {
                self.state.bank_fine = value;
                false
            }
            CC_VOLUME_COARSE | CC_VOLUME_FINE => {
                if controller == CC_VOLUME_COARSE {
                    self.state.volume_coarse = value;
                } else {
                    self.state.volume_fine = value;
                }
                self.out
                    .push(ScheduledEvent::volume(self.frame, self.state.volume()));
                true
            }
            CC_ALL_SOUND_OFF | CC_ALL_NOTES_OFF => {
                self.out.push(ScheduledEvent::all_off(self.frame));
                true
            }
            _ => {
                trace!(controller, value, "Ignoring controller");
                false
            }
        }
    }

    fn program_change(&mut self, _channel: u8, program: u8) -> bool {
        let bank = self.state.bank();
        debug!(bank, program, "Patch change");
        self.out
            .push(ScheduledEvent::patch_change(self.frame, bank, program));
        true
    }

    fn unknown(&mut self, bytes: &[u8]) -> bool {
        debug!(?bytes, "Unrecognized MIDI message");
        false
    }
}

#[cfg(test)]
mod test {
    use rand::Rng;

    use crate::{
        events::EventKind,
        instrument::InstrumentList,
        testutil::{constant_sample, instrument},
    };

    use super::*;

    fn kit() -> InstrumentList {
        InstrumentList::new(vec![
            instrument(0, "kick", constant_sample(10, 0.5)),
            instrument(1, "snare", constant_sample(10, 0.5)),
        ])
    }

    fn translate(translator: &mut MidiTranslator, bytes: &[u8]) -> Vec<ScheduledEvent> {
        let mut out = Vec::new();
        translator.translate(bytes, 64, &kit(), &mut out);
        out
    }

    #[test]
    fn notes_map_to_instruments() {
        let mut translator = MidiTranslator::default();

        let events = translate(&mut translator, &[0x90, 37, 127]);
        assert_eq!(1, events.len());
        assert_eq!(64, events[0].frame);
        match &events[0].kind {
            EventKind::NoteOn(note) => {
                assert_eq!("snare", note.instrument().name());
                assert_eq!(1.0, note.velocity());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let events = translate(&mut translator, &[0x80, 36, 64]);
        assert!(matches!(
            &events[0].kind,
            EventKind::NoteOff(note) if note.instrument().name() == "kick"
        ));

        // Below the base and past the end of the kit.
        assert!(translate(&mut translator, &[0x90, 35, 100]).is_empty());
        assert!(translate(&mut translator, &[0x90, 38, 100]).is_empty());
    }

    #[test]
    fn zero_velocity_is_note_off() {
        let mut translator = MidiTranslator::default();
        let events = translate(&mut translator, &[0x99, 36, 0]);
        assert!(matches!(&events[0].kind, EventKind::NoteOff(_)));
    }

    #[test]
    fn bank_and_program() {
        let mut translator = MidiTranslator::default();
        assert!(translate(&mut translator, &[0xB0, 0, 2]).is_empty());
        assert!(translate(&mut translator, &[0xB0, 32, 5]).is_empty());
        assert_eq!(2 << 7 | 5, translator.bank());

        let events = translate(&mut translator, &[0xC0, 9]);
        assert!(matches!(
            events[0].kind,
            EventKind::PatchChange(packed) if packed == ((2 << 7 | 5) << 7 | 9)
        ));
    }

    #[test]
    fn volume_is_fourteen_bits() {
        let mut translator = MidiTranslator::default();
        let volumes: Vec<f32> = [[0xB0, 7, 0], [0xB0, 39, 0], [0xB0, 7, 64]]
            .iter()
            .flat_map(|bytes| translate(&mut translator, bytes))
            .filter_map(|event| match event.kind {
                EventKind::VolumeUpdate(volume) => Some(volume),
                _ => None,
            })
            .collect();
        assert_eq!(vec![127.0 / 16383.0, 0.0, 8192.0 / 16383.0], volumes);
    }

    #[test]
    fn all_notes_off() {
        let mut translator = MidiTranslator::default();
        for controller in [120, 123] {
            let events = translate(&mut translator, &[0xB0, controller, 0]);
            assert!(matches!(events[0].kind, EventKind::AllOff));
        }
        assert!(translate(&mut translator, &[0xB0, 64, 127]).is_empty());
    }

    #[test]
    fn channel_filter_applies() {
        let mut translator = MidiTranslator::new(ChannelFilter::Channel(9), DEFAULT_NOTE_BASE);
        assert!(translate(&mut translator, &[0x90, 36, 100]).is_empty());
        assert_eq!(1, translate(&mut translator, &[0x99, 36, 100]).len());
    }

    #[test]
    fn system_messages_produce_nothing() {
        let mut translator = MidiTranslator::default();
        let messages: [&[u8]; 5] = [&[0xF8], &[0xFA], &[0xF2, 0, 1], &[0xF4], &[]];
        for bytes in messages {
            assert!(translate(&mut translator, bytes).is_empty());
        }
    }

    #[test]
    fn random_byte_stream_keeps_state_sane() {
        let mut rng = rand::thread_rng();
        let kit = kit();
        for _ in 0..50 {
            let mut translator = MidiTranslator::default();
            let stream: Vec<u8> = (0..4096).map(|_| rng.gen()).collect();
            let mut rest = stream.as_slice();
            let mut out = Vec::new();
            while !rest.is_empty() {
                let len = rng.gen_range(1..=4).min(rest.len());
                let (chunk, tail) = rest.split_at(len);
                rest = tail;
                let frame = rng.gen_range(0..512);

                out.clear();
                let produced = translator.translate(chunk, frame, &kit, &mut out);
                assert_eq!(produced, !out.is_empty(), "{chunk:02X?}");
                for event in &out {
                    assert_eq!(frame, event.frame);
                    match &event.kind {
                        EventKind::NoteOn(note) | EventKind::NoteOff(note) => {
                            assert!(kit.find(note.instrument().id()).is_some());
                            assert!((0.0..=1.0).contains(&note.velocity()));
                        }
                        EventKind::VolumeUpdate(volume) => {
                            assert!((0.0..=1.0).contains(volume));
                        }
                        EventKind::PatchChange(patch) => assert!(*patch < 1 << 21),
                        EventKind::AllOff => {}
                    }
                }
                assert!(translator.bank() < 1 << 14);
            }
        }
    }
}
