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

use tracing::{debug, info};

use super::{Instrument, InstrumentId};
use crate::midi::InstrumentLookup;

/// The instruments of the loaded kit.
///
/// Notes hold their own reference to their instrument, so removing an
/// instrument never frees it under a sounding note. An instrument removed while
/// it still has notes in flight waits in a pending list until `reap` sees its
/// counter reach zero.
#[derive(Debug, Default)]
pub struct InstrumentList {
    instruments: Vec<Arc<Instrument>>,
    pending_deletion: Vec<Arc<Instrument>>,
}

impl InstrumentList {
    pub fn new(instruments: Vec<Arc<Instrument>>) -> InstrumentList {
        InstrumentList {
            instruments,
            pending_deletion: Vec::new(),
        }
    }

    /// Adds an instrument, replacing any instrument with the same ID.
    pub fn add(&mut self, instrument: Arc<Instrument>) -> Option<Arc<Instrument>> {
        let replaced = self.remove(instrument.id());
        self.instruments.push(instrument);
        replaced
    }

    /// Removes an instrument by ID.
    pub fn remove(&mut self, id: InstrumentId) -> Option<Arc<Instrument>> {
        let index = self.instruments.iter().position(|i| i.id() == id)?;
        let instrument = self.instruments.remove(index);
        if instrument.in_flight() > 0 {
            debug!(
                instrument = %instrument.name(),
                in_flight = instrument.in_flight(),
                "Instrument still playing, deferring deletion"
            );
            self.pending_deletion.push(instrument.clone());
        }
        Some(instrument)
    }

    /// Removes every instrument.
    pub fn clear(&mut self) {
        let ids: Vec<InstrumentId> = self.instruments.iter().map(|i| i.id()).collect();
        for id in ids {
            self.remove(id);
        }
    }

    /// Frees removed instruments that have no notes left. Returns how many were
    /// freed.
    pub fn reap(&mut self) -> usize {
        let before = self.pending_deletion.len();
        self.pending_deletion.retain(|instrument| instrument.in_flight() > 0);
        let reaped = before - self.pending_deletion.len();
        if reaped > 0 {
            info!(reaped, "Freed removed instruments");
        }
        reaped
    }

    pub fn pending_deletion(&self) -> usize {
        self.pending_deletion.len()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Instrument>> {
        self.instruments.get(index)
    }

    pub fn find(&self, id: InstrumentId) -> Option<&Arc<Instrument>> {
        self.instruments.iter().find(|i| i.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Instrument>> {
        self.instruments.iter()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl InstrumentLookup for InstrumentList {
    fn instrument_at(&self, index: usize) -> Option<Arc<Instrument>> {
        self.get(index).cloned()
    }
}
