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
use std::{
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use super::song::{SongLayout, DEFAULT_BEATS_PER_BAR};

pub const DEFAULT_FRAME_RATE: u32 = 48000;
pub const DEFAULT_TICKS_PER_BEAT: u32 = 192;
pub const DEFAULT_BEATS_PER_MINUTE: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Rolling,
}

/// The boundary a position is snapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Bar,
    Beat,
    Tick,
}

/// A position on the musical timeline.
///
/// The position is held twice: as an absolute frame and as bar:beat:tick. The
/// two are tied together by `bbt_offset`, the number of frames between the
/// exact start of the current tick and `frame`. After normalization
/// `bbt_offset` lies in `[-0.5, frames_per_tick - 0.5)`, so the tick is always
/// the one whose start is nearest at or before the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalTime {
    state: TransportState,
    new_position: bool,
    frame: u64,
    frame_rate: u32,
    bar: i32,
    beat: i32,
    tick: i32,
    bbt_offset: f64,
    bar_start_tick: u64,
    beats_per_bar: u32,
    beat_type: u32,
    ticks_per_beat: u32,
    beats_per_minute: f64,
}

impl Default for MusicalTime {
    fn default() -> Self {
        MusicalTime::new(
            DEFAULT_FRAME_RATE,
            DEFAULT_BEATS_PER_MINUTE,
            DEFAULT_BEATS_PER_BAR,
            4,
            DEFAULT_TICKS_PER_BEAT,
        )
    }
}

impl MusicalTime {
    /// Creates a stopped position at 1:1:0, frame 0.
    pub fn new(
        frame_rate: u32,
        beats_per_minute: f64,
        beats_per_bar: u32,
        beat_type: u32,
        ticks_per_beat: u32,
    ) -> MusicalTime {
        MusicalTime {
            state: TransportState::Stopped,
            new_position: true,
            frame: 0,
            frame_rate: frame_rate.max(1),
            bar: 1,
            beat: 1,
            tick: 0,
            bbt_offset: 0.0,
            bar_start_tick: 0,
            beats_per_bar: beats_per_bar.max(1),
            beat_type: beat_type.max(1),
            ticks_per_beat: ticks_per_beat.max(1),
            beats_per_minute: sanitize_bpm(beats_per_minute),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_rolling(&self) -> bool {
        self.state == TransportState::Rolling
    }

    /// True if the position was relocated rather than reached by playback.
    pub fn new_position(&self) -> bool {
        self.new_position
    }

    pub fn clear_new_position(&mut self) {
        self.new_position = false;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn bar(&self) -> u32 {
        self.bar as u32
    }

    pub fn beat(&self) -> u32 {
        self.beat as u32
    }

    pub fn tick(&self) -> u32 {
        self.tick as u32
    }

    pub fn bbt_offset(&self) -> f64 {
        self.bbt_offset
    }

    pub fn bar_start_tick(&self) -> u64 {
        self.bar_start_tick
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn beat_type(&self) -> u32 {
        self.beat_type
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    pub fn beats_per_minute(&self) -> f64 {
        self.beats_per_minute
    }

    pub fn frames_per_tick(&self) -> f64 {
        f64::from(self.frame_rate) * 60.0
            / (self.beats_per_minute * f64::from(self.ticks_per_beat))
    }

    pub fn ticks_per_bar(&self) -> u64 {
        u64::from(self.beats_per_bar) * u64::from(self.ticks_per_beat)
    }

    /// Ticks between the start of the current bar and the current tick.
    pub fn ticks_into_bar(&self) -> u64 {
        (self.beat as u64 - 1) * u64::from(self.ticks_per_beat) + self.tick as u64
    }

    /// Ticks since 1:1:0.
    pub fn absolute_tick(&self) -> u64 {
        self.bar_start_tick + self.ticks_into_bar()
    }

    /// True when the frame sits within half a frame of a tick boundary.
    pub fn is_snapped(&self) -> bool {
        self.bbt_offset.abs() <= 0.5
    }

    pub fn start(&mut self) {
        self.state = TransportState::Rolling;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Changes the tempo while keeping the frame. The musical position is refolded
    /// against the new tick length.
    pub fn set_tempo(&mut self, beats_per_minute: f64) {
        self.beats_per_minute = sanitize_bpm(beats_per_minute);
        self.normalize();
    }

    /// Changes the meter of the current bar.
    pub fn set_meter(&mut self, beats_per_bar: u32, beat_type: u32) {
        self.beats_per_bar = beats_per_bar.max(1);
        self.beat_type = beat_type.max(1);
        self.normalize();
    }

    /// Moves to the given frame using the meter currently in effect.
    pub fn locate_frame(&mut self, frame: u64) {
        let fpt = self.frames_per_tick();
        let ticks = ((frame as f64 + 0.5) / fpt).floor().max(0.0) as u64;
        let ticks_per_bar = self.ticks_per_bar();
        let bars = ticks / ticks_per_bar;
        let in_bar = ticks % ticks_per_bar;

        self.frame = frame;
        self.bbt_offset = frame as f64 - ticks as f64 * fpt;
        self.bar = clamp_i32(bars + 1);
        self.bar_start_tick = bars * ticks_per_bar;
        self.set_ticks_into_bar(in_bar);
        self.new_position = true;
        self.normalize();
    }

    /// Moves to the given frame, walking the bar lengths of the song.
    pub fn locate_frame_in(&mut self, song: &dyn SongLayout, frame: u64) {
        let fpt = self.frames_per_tick();
        let ticks = ((frame as f64 + 0.5) / fpt).floor().max(0.0) as u64;
        let ticks_per_beat = u64::from(self.ticks_per_beat);

        let mut in_song = ticks;
        if song.is_looping() {
            if let Some(total) = song.total_beats().filter(|total| *total > 0) {
                in_song %= total * ticks_per_beat;
            }
        }

        let (bar, bar_start) = song.bar_at_tick(in_song, self.ticks_per_beat);

        self.frame = frame;
        self.bbt_offset = frame as f64 - ticks as f64 * fpt;
        self.bar = clamp_i32(bar);
        self.bar_start_tick = bar_start;
        self.beats_per_bar = song.beats_at(u32::try_from(bar).unwrap_or(u32::MAX));
        self.set_ticks_into_bar(in_song - bar_start);
        self.new_position = true;
        self.normalize();
    }

    /// Moves to the given bar:beat:tick using the meter currently in effect. The
    /// frame becomes the one nearest to the exact start of the tick.
    pub fn locate_bbt(&mut self, bar: i32, beat: i32, tick: i32) {
        let ticks = (i64::from(bar) - 1) * self.ticks_per_bar() as i64
            + (i64::from(beat) - 1) * i64::from(self.ticks_per_beat)
            + i64::from(tick);
        let ticks = ticks.max(0) as u64;
        let ticks_per_bar = self.ticks_per_bar();
        let bars = ticks / ticks_per_bar;

        self.bar = clamp_i32(bars + 1);
        self.bar_start_tick = bars * ticks_per_bar;
        self.set_ticks_into_bar(ticks % ticks_per_bar);
        self.place_at_tick(ticks);
    }

    /// Moves to the given bar:beat:tick, walking the bar lengths of the song.
    /// Beats and ticks past the end of the bar carry into the following bars.
    pub fn locate_bbt_in(&mut self, song: &dyn SongLayout, bar: i32, beat: i32, tick: i32) {
        let start = song.bar_start_tick(bar.max(1) as u32, self.ticks_per_beat);
        let offset = (i64::from(beat) - 1) * i64::from(self.ticks_per_beat) + i64::from(tick);
        let ticks = i64::try_from(start)
            .unwrap_or(i64::MAX)
            .saturating_add(offset)
            .max(0) as u64;
        let (bar, bar_start) = song.bar_at_tick(ticks, self.ticks_per_beat);

        self.beats_per_bar = song.beats_at(u32::try_from(bar).unwrap_or(u32::MAX));
        self.bar = clamp_i32(bar);
        self.bar_start_tick = bar_start;
        self.set_ticks_into_bar(ticks - bar_start);
        self.place_at_tick(ticks);
    }

    /// Advances the position by exactly `frames` frames of playback.
    pub fn processed_frames(&mut self, frames: u32, song: &dyn SongLayout) {
        let fpt = self.frames_per_tick();
        self.frame += u64::from(frames);
        self.bbt_offset += f64::from(frames);
        self.new_position = false;

        if self.bbt_offset >= fpt - 0.5 {
            let whole = ((self.bbt_offset + 0.5) / fpt).floor();
            self.bbt_offset -= whole * fpt;
            self.tick += whole as i32;
        }
        self.fold_offset(fpt);

        let ticks_per_beat = self.ticks_per_beat as i32;
        if self.tick >= ticks_per_beat {
            self.beat += self.tick / ticks_per_beat;
            self.tick %= ticks_per_beat;
        }

        while self.beat > self.beats_per_bar as i32 {
            self.beat -= self.beats_per_bar as i32;
            self.bar_start_tick += self.ticks_per_bar();
            self.bar += 1;

            let next = self.bar as u32;
            match song.bar_count() {
                Some(count) if count > 0 && next > count && song.is_looping() => {
                    self.bar = 1;
                    self.bar_start_tick = 0;
                    self.beats_per_bar = song.beats_at(1);
                }
                _ => self.beats_per_bar = song.beats_at(next),
            }
        }

        self.check_invariants();
    }

    /// Folds out of range fields back into range. The frame is left alone.
    pub fn normalize(&mut self) {
        let fpt = self.frames_per_tick();
        if !(-0.5..fpt - 0.5).contains(&self.bbt_offset) {
            let shift = ((self.bbt_offset + 0.5) / fpt).floor();
            self.bbt_offset -= shift * fpt;
            self.tick = self.tick.saturating_add(shift as i32);
        }
        self.fold_offset(fpt);

        let ticks_per_beat = self.ticks_per_beat as i32;
        self.beat += self.tick.div_euclid(ticks_per_beat);
        self.tick = self.tick.rem_euclid(ticks_per_beat);

        let beats_per_bar = self.beats_per_bar as i32;
        let bars = (self.beat - 1).div_euclid(beats_per_bar);
        self.beat = (self.beat - 1).rem_euclid(beats_per_bar) + 1;
        if bars != 0 {
            self.bar += bars;
            let shifted = self.bar_start_tick as i64 + i64::from(bars) * self.ticks_per_bar() as i64;
            self.bar_start_tick = shifted.max(0) as u64;
        }

        if self.bar < 1 {
            // Nothing exists before the song start.
            self.bar = 1;
            self.beat = 1;
            self.tick = 0;
            self.bar_start_tick = 0;
        }

        self.check_invariants();
    }

    /// Forces the frame to a value dictated from outside (an external clock),
    /// folding the difference into the musical position.
    pub fn normalize_to(&mut self, frame: u64) {
        self.bbt_offset += frame as f64 - self.frame as f64;
        self.frame = frame;
        self.normalize();
    }

    pub fn next_tick(&mut self) {
        self.step_ticks(1);
    }

    pub fn prev_tick(&mut self) {
        self.step_ticks(-1);
    }

    /// Moves by a whole number of ticks.
    ///
    /// A snapped position lands exactly on the frame nearest to the destination
    /// tick, so stepping forward and back returns to the starting frame. An
    /// unsnapped position moves by the tick distance with randomized rounding and
    /// keeps its offset into the tick.
    pub fn step_ticks(&mut self, ticks: i32) {
        if ticks == 0 {
            return;
        }

        let fpt = self.frames_per_tick();
        if self.is_snapped() {
            let exact = self.frame as f64 - self.bbt_offset + f64::from(ticks) * fpt;
            let target = (exact - 0.5).ceil();
            if target < 0.0 {
                self.rewind();
                return;
            }
            self.frame = target as u64;
            self.bbt_offset = target - exact;
        } else {
            let distance = f64::from(ticks) * fpt;
            let delta = (distance + rand::random::<f64>()).floor() as i64;
            let target = self.frame as i64 + delta;
            if target < 0 {
                self.rewind();
                return;
            }
            self.frame = target as u64;
        }

        self.tick = self.tick.saturating_add(ticks);
        self.normalize();
    }

    /// Snaps to the nearest boundary of the given granularity.
    pub fn round(&mut self, granularity: Granularity) {
        let fpt = self.frames_per_tick();
        let (into, span) = match granularity {
            Granularity::Tick => (0, 1),
            Granularity::Beat => (self.tick as u64, u64::from(self.ticks_per_beat)),
            Granularity::Bar => (self.ticks_into_bar(), self.ticks_per_bar()),
        };

        let offset = into as f64 * fpt + self.bbt_offset;
        if offset < span as f64 * fpt / 2.0 {
            self.floor(granularity);
        } else {
            self.ceil(granularity);
        }
    }

    /// Snaps back to the start of the current unit of the given granularity.
    pub fn floor(&mut self, granularity: Granularity) {
        let back = match granularity {
            Granularity::Tick => 0,
            Granularity::Beat => self.tick as u64,
            Granularity::Bar => self.ticks_into_bar(),
        };
        if back == 0 && self.is_snapped() {
            return;
        }

        self.bbt_offset += back as f64 * self.frames_per_tick();
        self.tick -= back as i32;
        self.snap();
    }

    /// Snaps forward to the start of the next unit of the given granularity,
    /// unless the position already sits on one.
    pub fn ceil(&mut self, granularity: Granularity) {
        let snapped = self.is_snapped();
        let forward = match granularity {
            Granularity::Tick => u64::from(!snapped),
            Granularity::Beat if self.tick == 0 && snapped => 0,
            Granularity::Beat => u64::from(self.ticks_per_beat) - self.tick as u64,
            Granularity::Bar => {
                let into = self.ticks_into_bar();
                if into == 0 && snapped {
                    0
                } else {
                    self.ticks_per_bar() - into
                }
            }
        };
        if forward == 0 {
            return;
        }

        self.bbt_offset -= forward as f64 * self.frames_per_tick();
        self.tick += forward as i32;
        self.snap();
    }

    // Moves the frame by the whole number of frames that brings bbt_offset into
    // [-0.5, 0.5).
    fn snap(&mut self) {
        let delta = (-0.5 - self.bbt_offset).ceil();
        let target = self.frame as f64 + delta;
        if target < 0.0 {
            self.rewind();
            return;
        }
        self.frame = target as u64;
        self.bbt_offset += delta;
        self.normalize();
    }

    fn place_at_tick(&mut self, ticks: u64) {
        let exact = ticks as f64 * self.frames_per_tick();
        let frame = (exact - 0.5).ceil().max(0.0);
        self.frame = frame as u64;
        self.bbt_offset = frame - exact;
        self.new_position = true;
        self.normalize();
    }

    fn set_ticks_into_bar(&mut self, ticks: u64) {
        let ticks_per_beat = u64::from(self.ticks_per_beat);
        self.beat = (ticks / ticks_per_beat) as i32 + 1;
        self.tick = (ticks % ticks_per_beat) as i32;
    }

    fn rewind(&mut self) {
        self.frame = 0;
        self.bar = 1;
        self.beat = 1;
        self.tick = 0;
        self.bbt_offset = 0.0;
        self.bar_start_tick = 0;
        self.new_position = true;
    }

    // Guards against floating point leaving the offset a hair outside its range.
    fn fold_offset(&mut self, fpt: f64) {
        while self.bbt_offset >= fpt - 0.5 {
            self.bbt_offset -= fpt;
            self.tick = self.tick.saturating_add(1);
        }
        while self.bbt_offset < -0.5 {
            self.bbt_offset += fpt;
            self.tick = self.tick.saturating_sub(1);
        }
    }

    fn check_invariants(&self) {
        debug_assert!(
            self.bbt_offset >= -0.5 && self.bbt_offset < self.frames_per_tick() - 0.5,
            "bbt_offset {} out of range",
            self.bbt_offset
        );
        debug_assert!(self.bar >= 1, "bar {} before song start", self.bar);
        debug_assert!(
            self.beat >= 1 && self.beat <= self.beats_per_bar as i32,
            "beat {} out of range",
            self.beat
        );
        debug_assert!(
            self.tick >= 0 && self.tick < self.ticks_per_beat as i32,
            "tick {} out of range",
            self.tick
        );
    }
}

fn sanitize_bpm(beats_per_minute: f64) -> f64 {
    if beats_per_minute.is_finite() && beats_per_minute > 0.0 {
        beats_per_minute
    } else {
        DEFAULT_BEATS_PER_MINUTE
    }
}

fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.bar, self.beat, self.tick)
    }
}

impl AddAssign<i32> for MusicalTime {
    fn add_assign(&mut self, ticks: i32) {
        self.step_ticks(ticks);
    }
}

impl SubAssign<i32> for MusicalTime {
    fn sub_assign(&mut self, ticks: i32) {
        self.step_ticks(ticks.saturating_neg());
    }
}

impl Add<i32> for MusicalTime {
    type Output = MusicalTime;

    fn add(mut self, ticks: i32) -> MusicalTime {
        self += ticks;
        self
    }
}

impl Sub<i32> for MusicalTime {
    type Output = MusicalTime;

    fn sub(mut self, ticks: i32) -> MusicalTime {
        self -= ticks;
        self
    }
}
