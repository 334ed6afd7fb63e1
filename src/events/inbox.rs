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
use parking_lot::Mutex;

use super::{
    event::{NoteDuration, ScheduledEvent},
    queue::{EventQueue, DEFAULT_QUEUE_CAPACITY},
};

/// The producer side of the event queue. Control threads push events here and
/// the audio thread moves them into its queue once per cycle. The lock is only
/// held long enough to push or drain.
#[derive(Debug)]
pub struct EventInbox {
    pending: Mutex<Vec<(ScheduledEvent, NoteDuration)>>,
}

impl Default for EventInbox {
    fn default() -> Self {
        EventInbox::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventInbox {
    pub fn with_capacity(capacity: usize) -> EventInbox {
        EventInbox {
            pending: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn push(&self, event: ScheduledEvent) {
        self.pending.lock().push((event, NoteDuration::Indefinite));
    }

    pub fn push_note(&self, event: ScheduledEvent, duration: NoteDuration) {
        self.pending.lock().push((event, duration));
    }

    pub fn extend<I: IntoIterator<Item = ScheduledEvent>>(&self, events: I) {
        let mut pending = self.pending.lock();
        pending.extend(events.into_iter().map(|event| (event, NoteDuration::Indefinite)));
    }

    /// Moves every pending event into the queue. Returns how many were moved.
    pub fn drain_into(&self, queue: &mut EventQueue) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        for (event, duration) in pending.drain(..) {
            queue.insert_note(event, duration);
        }
        count
    }

    /// Drops every pending event.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
