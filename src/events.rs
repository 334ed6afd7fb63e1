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
//! Scheduled events and the queue that carries them into a process cycle.

mod event;
mod inbox;
mod queue;

pub use event::{EventKind, NoteDuration, ScheduledEvent};
pub use inbox::EventInbox;
pub use queue::{EventQueue, QuantizeGrid, DEFAULT_QUEUE_CAPACITY, LEAD_LAG_TICKS};
