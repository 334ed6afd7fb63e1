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
use std::fmt;

/// Beats per bar used when a layout has nothing better to offer.
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Describes how long each bar of a song is. Bars are numbered from 1.
pub trait SongLayout: Send + Sync {
    /// The number of beats in the given bar, or None if the bar is past the end
    /// of the layout.
    fn beats_in_bar(&self, bar: u32) -> Option<u32>;

    /// The number of bars in the layout. None means the layout never ends.
    fn bar_count(&self) -> Option<u32>;

    /// Whether playback wraps to bar 1 after the last bar.
    fn is_looping(&self) -> bool {
        false
    }

    /// The number of beats in the given bar. Bars past the end reuse the meter of
    /// the last known bar.
    fn beats_at(&self, bar: u32) -> u32 {
        if let Some(beats) = self.beats_in_bar(bar) {
            return beats.max(1);
        }

        self.bar_count()
            .filter(|count| *count > 0)
            .and_then(|count| self.beats_in_bar(count))
            .unwrap_or(DEFAULT_BEATS_PER_BAR)
            .max(1)
    }

    /// The total number of beats in a finite layout.
    fn total_beats(&self) -> Option<u64> {
        self.bar_count().map(|count| {
            (1..=count)
                .map(|bar| u64::from(self.beats_at(bar)))
                .sum()
        })
    }

    /// The beats of every bar when the layout never changes meter.
    fn constant_meter(&self) -> Option<u32> {
        None
    }

    /// The tick at which the given bar starts.
    fn bar_start_tick(&self, bar: u32, ticks_per_beat: u32) -> u64 {
        let ticks_per_beat = u64::from(ticks_per_beat.max(1));
        let before = u64::from(bar.max(1) - 1);
        if let Some(beats) = self.constant_meter() {
            return before * u64::from(beats.max(1)) * ticks_per_beat;
        }

        let known = match self.bar_count() {
            Some(count) => before.min(u64::from(count)),
            None => before,
        };
        let head: u64 = (1..=known)
            .map(|b| u64::from(self.beats_at(b as u32)))
            .sum();
        // Everything past the end shares the meter of the last bar.
        let tail = (before - known) * u64::from(self.beats_at(bar));
        (head + tail) * ticks_per_beat
    }

    /// The bar containing the given tick and the tick that bar starts at. Bars
    /// past the end of a finite layout are counted without walking them.
    fn bar_at_tick(&self, tick: u64, ticks_per_beat: u32) -> (u64, u64) {
        let ticks_per_beat = u64::from(ticks_per_beat.max(1));
        if let Some(beats) = self.constant_meter() {
            let length = u64::from(beats.max(1)) * ticks_per_beat;
            let bars = tick / length;
            return (bars.saturating_add(1), bars * length);
        }

        let count = self.bar_count();
        let mut bar = 1u32;
        let mut start = 0u64;
        loop {
            let length = u64::from(self.beats_at(bar)) * ticks_per_beat;
            if count.is_some_and(|count| bar > count) || bar == u32::MAX {
                let bars = (tick - start) / length;
                return (u64::from(bar).saturating_add(bars), start + bars * length);
            }
            if tick < start.saturating_add(length) {
                return (u64::from(bar), start);
            }
            start += length;
            bar += 1;
        }
    }
}

/// An endless song with a constant meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedMeter {
    beats_per_bar: u32,
}

impl FixedMeter {
    pub fn new(beats_per_bar: u32) -> FixedMeter {
        FixedMeter {
            beats_per_bar: beats_per_bar.max(1),
        }
    }
}

impl Default for FixedMeter {
    fn default() -> Self {
        FixedMeter::new(DEFAULT_BEATS_PER_BAR)
    }
}

impl SongLayout for FixedMeter {
    fn beats_in_bar(&self, _bar: u32) -> Option<u32> {
        Some(self.beats_per_bar)
    }

    fn bar_count(&self) -> Option<u32> {
        None
    }

    fn constant_meter(&self) -> Option<u32> {
        Some(self.beats_per_bar)
    }
}

/// A finite song with an explicit beat count for every bar.
#[derive(Clone, PartialEq, Eq)]
pub struct BarTable {
    bars: Vec<u32>,
    looping: bool,
}

impl BarTable {
    pub fn new(bars: Vec<u32>, looping: bool) -> BarTable {
        BarTable {
            bars: bars.into_iter().map(|beats| beats.max(1)).collect(),
            looping,
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }
}

impl fmt::Debug for BarTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarTable")
            .field("bars", &self.bars.len())
            .field("looping", &self.looping)
            .finish()
    }
}

impl SongLayout for BarTable {
    fn beats_in_bar(&self, bar: u32) -> Option<u32> {
        if bar == 0 {
            return None;
        }
        self.bars.get(bar as usize - 1).copied()
    }

    fn bar_count(&self) -> Option<u32> {
        Some(u32::try_from(self.bars.len()).unwrap_or(u32::MAX))
    }

    fn is_looping(&self) -> bool {
        self.looping
    }
}
