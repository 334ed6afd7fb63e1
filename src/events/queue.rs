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
use std::slice;

use serde::Deserialize;

use crate::time::MusicalTime;

use super::event::{EventKind, NoteDuration, ScheduledEvent};

/// A lead/lag of 1.0 moves a note by this many ticks.
pub const LEAD_LAG_TICKS: f64 = 5.0;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// The grid quantized events are moved onto. A resolution of 16 means sixteenth
/// notes.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizeGrid {
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default)]
    pub triplets: bool,
}

fn default_resolution() -> u32 {
    16
}

impl Default for QuantizeGrid {
    fn default() -> Self {
        QuantizeGrid {
            resolution: default_resolution(),
            triplets: false,
        }
    }
}

impl QuantizeGrid {
    /// The grid spacing in ticks.
    pub fn ticks(&self, ticks_per_beat: u32) -> f64 {
        let spacing = f64::from(ticks_per_beat) * 4.0 / f64::from(self.resolution.max(1));
        if self.triplets {
            spacing * 2.0 / 3.0
        } else {
            spacing
        }
    }
}

/// Events waiting to be rendered, ordered by frame offset. Events with equal
/// offsets keep the order they were inserted in.
///
/// Offsets are relative to the start of the next process cycle; `consumed`
/// drops the events of a finished cycle and rebases the rest.
#[derive(Debug)]
pub struct EventQueue {
    events: Vec<ScheduledEvent>,
    grid: QuantizeGrid,
    position: MusicalTime,
}

impl EventQueue {
    pub fn new(grid: QuantizeGrid) -> EventQueue {
        EventQueue {
            events: Vec::with_capacity(DEFAULT_QUEUE_CAPACITY),
            grid,
            position: MusicalTime::default(),
        }
    }

    /// Records the position of the upcoming cycle start, used for quantizing.
    pub fn set_position(&mut self, position: MusicalTime) {
        self.position = position;
    }

    pub fn set_grid(&mut self, grid: QuantizeGrid) {
        self.grid = grid;
    }

    pub fn grid(&self) -> QuantizeGrid {
        self.grid
    }

    /// Queues an event, quantizing it and applying note lead/lag first.
    pub fn insert(&mut self, event: ScheduledEvent) {
        self.place(event);
    }

    /// Queues a note. A note on with a finite duration is followed by a matching
    /// note off.
    pub fn insert_note(&mut self, event: ScheduledEvent, duration: NoteDuration) {
        let note_off = match (&event.kind, duration) {
            (EventKind::NoteOn(note), NoteDuration::Frames(frames)) => {
                Some((ScheduledEvent::note_off(0, note.clone()), frames))
            }
            _ => None,
        };

        let frame = self.place(event);
        if let Some((mut off, frames)) = note_off {
            off.frame = frame.saturating_add(frames);
            self.insert_sorted(off);
        }
    }

    /// The events that fall within a cycle of the given length.
    pub fn cycle(&self, frames: u32) -> slice::Iter<'_, ScheduledEvent> {
        let end = self.events.partition_point(|event| event.frame < frames);
        self.events[..end].iter()
    }

    /// Drops the events of a cycle of the given length and moves the rest to be
    /// relative to the following cycle.
    pub fn consumed(&mut self, frames: u32) {
        let end = self.events.partition_point(|event| event.frame < frames);
        self.events.drain(..end);
        for event in self.events.iter_mut() {
            event.frame -= frames;
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, ScheduledEvent> {
        self.events.iter()
    }

    fn place(&mut self, mut event: ScheduledEvent) -> u32 {
        if event.quantize {
            event.frame = self.quantized_frame(event.frame);
        }

        let lead_lag = event.note().map(|note| note.lead_lag()).unwrap_or(0.0);
        if lead_lag != 0.0 {
            let shift = (f64::from(lead_lag) * LEAD_LAG_TICKS * self.position.frames_per_tick()).round();
            event.frame = (f64::from(event.frame) + shift).clamp(0.0, f64::from(u32::MAX)) as u32;
        }

        let frame = event.frame;
        self.insert_sorted(event);
        frame
    }

    fn insert_sorted(&mut self, event: ScheduledEvent) {
        let index = self.events.partition_point(|queued| queued.frame <= event.frame);
        self.events.insert(index, event);
    }

    // Rounds the offset up to the next grid line. The grid starts at the bar
    // start, and an offset within half a frame of a line stays on it.
    fn quantized_frame(&self, frame: u32) -> u32 {
        let fpt = self.position.frames_per_tick();
        let grid = self.grid.ticks(self.position.ticks_per_beat());
        let cycle_start = self.position.ticks_into_bar() as f64 + self.position.bbt_offset() / fpt;
        let at = cycle_start + f64::from(frame) / fpt;
        let snapped = ((at - 0.5 / fpt) / grid).ceil() * grid;
        let offset = ((snapped - cycle_start) * fpt).round();
        offset.clamp(0.0, f64::from(u32::MAX)) as u32
    }
}

#[cfg(test)]
mod test {
    use crate::{
        sampler::Note,
        testutil::{constant_sample, instrument},
        time::MusicalTime,
    };

    use super::*;

    fn frames(queue: &EventQueue) -> Vec<u32> {
        queue.iter().map(|event| event.frame).collect()
    }

    fn volumes(queue: &EventQueue) -> Vec<f32> {
        queue
            .iter()
            .filter_map(|event| match event.kind {
                EventKind::VolumeUpdate(volume) => Some(volume),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn ordered_by_frame_with_stable_ties() {
        let mut queue = EventQueue::new(QuantizeGrid::default());
        queue.insert(ScheduledEvent::volume(300, 0.1));
        queue.insert(ScheduledEvent::volume(100, 0.2));
        queue.insert(ScheduledEvent::volume(300, 0.3));
        queue.insert(ScheduledEvent::volume(100, 0.4));
        queue.insert(ScheduledEvent::volume(0, 0.5));

        assert_eq!(vec![0, 100, 100, 300, 300], frames(&queue));
        assert_eq!(vec![0.5, 0.2, 0.4, 0.1, 0.3], volumes(&queue));
    }

    #[test]
    fn cycle_and_consumed() {
        let mut queue = EventQueue::new(QuantizeGrid::default());
        for frame in [100, 600, 511, 512, 1100] {
            queue.insert(ScheduledEvent::all_off(frame));
        }

        let in_cycle: Vec<u32> = queue.cycle(512).map(|event| event.frame).collect();
        assert_eq!(vec![100, 511], in_cycle);

        queue.consumed(512);
        assert_eq!(vec![0, 88, 588], frames(&queue));

        queue.consumed(512);
        assert_eq!(vec![76], frames(&queue));
        assert_eq!(1, queue.len());
    }

    #[test]
    fn quantize_rounds_up_to_grid() {
        // Sixteenth notes at 192 ticks per beat are 48 ticks, 6000 frames apart.
        let mut queue = EventQueue::new(QuantizeGrid::default());
        queue.set_position(MusicalTime::new(48000, 120.0, 4, 4, 192));

        queue.insert(ScheduledEvent::all_off(100).quantized());
        queue.insert(ScheduledEvent::all_off(0).quantized());
        queue.insert(ScheduledEvent::all_off(6000).quantized());
        queue.insert(ScheduledEvent::all_off(6001).quantized());
        assert_eq!(vec![0, 6000, 6000, 12_000], frames(&queue));
    }

    #[test]
    fn quantize_grid_is_anchored_to_bar() {
        let mut position = MusicalTime::new(48000, 120.0, 4, 4, 192);
        position.locate_bbt(1, 1, 10);

        let mut queue = EventQueue::new(QuantizeGrid::default());
        queue.set_position(position);
        queue.insert(ScheduledEvent::all_off(0).quantized());
        assert_eq!(vec![38 * 125], frames(&queue));

        let mut triplets = EventQueue::new(QuantizeGrid {
            resolution: 16,
            triplets: true,
        });
        triplets.set_position(MusicalTime::new(48000, 120.0, 4, 4, 192));
        triplets.insert(ScheduledEvent::all_off(100).quantized());
        assert_eq!(vec![4000], frames(&triplets));
    }

    #[test]
    fn lead_lag_shifts_notes() {
        let kick = instrument(1, "kick", constant_sample(100, 0.5));
        let mut queue = EventQueue::new(QuantizeGrid::default());

        queue.insert(ScheduledEvent::note_on(
            1000,
            Note::new(kick.clone(), 1.0).with_lead_lag(0.4),
        ));
        queue.insert(ScheduledEvent::note_on(
            100,
            Note::new(kick.clone(), 1.0).with_lead_lag(-1.0),
        ));
        queue.insert(ScheduledEvent::note_on(500, Note::new(kick, 1.0)));

        // 0.4 * 5 ticks * 125 frames.
        assert_eq!(vec![0, 500, 1250], frames(&queue));
    }

    #[test]
    fn notes_with_duration_get_a_note_off() {
        let kick = instrument(1, "kick", constant_sample(100, 0.5));
        let mut queue = EventQueue::new(QuantizeGrid::default());

        queue.insert_note(
            ScheduledEvent::note_on(100, Note::new(kick.clone(), 1.0)),
            NoteDuration::Frames(480),
        );
        queue.insert_note(
            ScheduledEvent::note_on(200, Note::new(kick, 1.0)),
            NoteDuration::Indefinite,
        );

        assert_eq!(vec![100, 200, 580], frames(&queue));
        assert!(matches!(queue.iter().last().map(|e| &e.kind), Some(EventKind::NoteOff(_))));
    }
}
