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
//! The transport: the engine's single playback position and who gets to move
//! it.

use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::time::{MusicalTime, SongLayout};

/// Who drives the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineOwner {
    /// The engine moves the position itself.
    #[default]
    Internal,
    /// An external master clock dictates the position.
    External,
}

/// A position report from an external master clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalClock {
    pub frame: u64,
    pub rolling: bool,
    pub beats_per_minute: Option<f64>,
}

pub struct Transport {
    position: MusicalTime,
    song: Arc<dyn SongLayout>,
    owner: TimelineOwner,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("position", &self.position.to_string())
            .field("frame", &self.position.frame())
            .field("owner", &self.owner)
            .finish()
    }
}

impl Transport {
    pub fn new(position: MusicalTime, song: Arc<dyn SongLayout>) -> Transport {
        let mut transport = Transport {
            position,
            song,
            owner: TimelineOwner::Internal,
        };
        let frame = transport.position.frame();
        transport.position.locate_frame_in(transport.song.as_ref(), frame);
        transport
    }

    pub fn position(&self) -> &MusicalTime {
        &self.position
    }

    pub fn song(&self) -> &Arc<dyn SongLayout> {
        &self.song
    }

    pub fn owner(&self) -> TimelineOwner {
        self.owner
    }

    pub fn set_owner(&mut self, owner: TimelineOwner) {
        if self.owner != owner {
            info!(?owner, "Timeline owner changed");
            self.owner = owner;
        }
    }

    pub fn is_rolling(&self) -> bool {
        self.position.is_rolling()
    }

    /// Moves to a frame. Refused while an external clock owns the timeline.
    pub fn locate_frame(&mut self, frame: u64) -> bool {
        if !self.accepts("locate") {
            return false;
        }
        self.position.locate_frame_in(self.song.as_ref(), frame);
        debug!(position = %self.position, frame, "Located");
        true
    }

    /// Moves to bar:beat:tick. Refused while an external clock owns the timeline.
    pub fn locate_bbt(&mut self, bar: i32, beat: i32, tick: i32) -> bool {
        if !self.accepts("locate") {
            return false;
        }
        self.position
            .locate_bbt_in(self.song.as_ref(), bar, beat, tick);
        debug!(position = %self.position, frame = self.position.frame(), "Located");
        true
    }

    pub fn start(&mut self) -> bool {
        if !self.accepts("start") {
            return false;
        }
        info!(position = %self.position, "Starting transport");
        self.position.start();
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.accepts("stop") {
            return false;
        }
        info!(position = %self.position, "Stopping transport");
        self.position.stop();
        true
    }

    /// Advances past a rendered cycle. A stopped transport stays put. Under an
    /// external clock the advance is provisional until the next sync.
    pub fn processed_frames(&mut self, frames: u32) {
        if self.position.is_rolling() {
            self.position.processed_frames(frames, self.song.as_ref());
        }
    }

    pub fn set_tempo(&mut self, beats_per_minute: f64) {
        self.position.set_tempo(beats_per_minute);
        debug!(
            beats_per_minute = self.position.beats_per_minute(),
            "Tempo changed"
        );
    }

    /// Replaces the song layout, keeping the frame.
    pub fn set_song(&mut self, song: Arc<dyn SongLayout>) {
        self.song = song;
        let frame = self.position.frame();
        self.position.locate_frame_in(self.song.as_ref(), frame);
    }

    /// Follows an external master. Small differences are folded into the
    /// current position; anything of a tick or more is a jump and relocates.
    pub fn sync_external(&mut self, clock: ExternalClock) {
        if let Some(beats_per_minute) = clock.beats_per_minute {
            if beats_per_minute != self.position.beats_per_minute() {
                self.position.set_tempo(beats_per_minute);
            }
        }

        match (clock.rolling, self.position.is_rolling()) {
            (true, false) => self.position.start(),
            (false, true) => self.position.stop(),
            _ => {}
        }

        let drift = clock.frame as f64 - self.position.frame() as f64;
        if drift == 0.0 {
            return;
        }
        if drift.abs() < self.position.frames_per_tick() {
            self.position.normalize_to(clock.frame);
        } else {
            debug!(drift, frame = clock.frame, "External clock jumped, relocating");
            self.position.locate_frame_in(self.song.as_ref(), clock.frame);
        }
    }

    fn accepts(&self, request: &str) -> bool {
        if self.owner == TimelineOwner::External {
            warn!(request, "Timeline is owned by an external clock, ignoring request");
            return false;
        }
        true
    }
}
