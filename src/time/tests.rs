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
use super::*;

// 48kHz, 120bpm and 192 ticks per beat give exactly 125 frames per tick.
fn position() -> MusicalTime {
    MusicalTime::new(48000, 120.0, 4, 4, 192)
}

// 44.1kHz gives 114.84375 frames per tick, so ticks never line up with frames.
fn fractional_position() -> MusicalTime {
    MusicalTime::new(44100, 120.0, 4, 4, 192)
}

fn bbt(position: &MusicalTime) -> (u32, u32, u32) {
    (position.bar(), position.beat(), position.tick())
}

#[test]
fn frames_per_tick() {
    assert_eq!(125.0, position().frames_per_tick());
    assert_eq!(114.84375, fractional_position().frames_per_tick());
    assert_eq!(768, position().ticks_per_bar());
}

#[test]
fn starts_at_song_start() {
    let position = position();
    assert_eq!((1, 1, 0), bbt(&position));
    assert_eq!(0, position.frame());
    assert_eq!(TransportState::Stopped, position.state());
    assert_eq!("1:1:0", position.to_string());
}

#[test]
fn locate_frame() {
    let mut position = position();
    position.locate_frame(96_000 + 24_000 + 130);
    assert_eq!((2, 2, 1), bbt(&position));
    assert_eq!(5.0, position.bbt_offset());
    assert_eq!(768, position.bar_start_tick());
    assert!(position.new_position());

    // Within half a frame before a tick counts as that tick.
    let mut fractional = fractional_position();
    fractional.locate_frame(115);
    assert_eq!((1, 1, 1), bbt(&fractional));
    assert_eq!(115.0 - 114.84375, fractional.bbt_offset());
}

#[test]
fn locate_round_trip() {
    for (bar, beat, tick) in [(1, 1, 0), (1, 3, 17), (5, 4, 191), (40, 2, 96)] {
        for mut position in [position(), fractional_position()] {
            position.locate_bbt(bar, beat, tick);
            assert!(position.is_snapped());
            let frame = position.frame();

            let mut located = position;
            located.locate_frame(frame);
            assert_eq!(bbt(&position), bbt(&located));
            assert_eq!(frame, located.frame());
            assert_eq!(position.bbt_offset(), located.bbt_offset());
        }
    }
}

#[test]
fn locate_bbt_folds_out_of_range_fields() {
    let mut position = position();
    position.locate_bbt(1, 5, 192);
    assert_eq!((2, 2, 0), bbt(&position));
    assert_eq!(960 * 125, position.frame());
}

#[test]
fn locate_in_song_walks_bar_lengths() {
    let song = BarTable::new(vec![4, 3, 2], false);
    let mut position = position();

    position.locate_bbt_in(&song, 3, 2, 5);
    let ticks = (4 + 3 + 1) * 192 + 5;
    assert_eq!(ticks * 125, position.frame());
    assert_eq!(2, position.beats_per_bar());
    assert_eq!((4 + 3) * 192, position.bar_start_tick());

    let mut located = MusicalTime::new(48000, 120.0, 4, 4, 192);
    located.locate_frame_in(&song, position.frame());
    assert_eq!((3, 2, 5), bbt(&located));
    assert_eq!(2, located.beats_per_bar());

    // Past the end the last meter is extrapolated.
    located.locate_frame_in(&song, ((4 + 3 + 2 + 2) * 192) * 125);
    assert_eq!((5, 1, 0), bbt(&located));
    assert_eq!(2, located.beats_per_bar());
}

#[test]
fn locate_in_song_carries_out_of_range_fields() {
    let mut plain = position();
    plain.locate_bbt(1, 5, 0);
    let mut walked = position();
    walked.locate_bbt_in(&FixedMeter::new(4), 1, 5, 0);
    assert_eq!((2, 1, 0), bbt(&walked));
    assert_eq!(bbt(&plain), bbt(&walked));
    assert_eq!(plain.frame(), walked.frame());

    // Carrying crosses meter changes: 3 + 2 beats past the start of bar 2.
    let song = BarTable::new(vec![4, 3, 2], false);
    let mut position = position();
    position.locate_bbt_in(&song, 2, 6, 10);
    assert_eq!((4, 1, 10), bbt(&position));
    assert_eq!(2, position.beats_per_bar());
    assert_eq!((4 + 3 + 2) * 192, position.bar_start_tick());
    assert_eq!(((4 + 3 + 2) * 192 + 10) * 125, position.frame());

    // Negative ticks borrow from the previous bar.
    position.locate_bbt_in(&song, 3, 1, -1);
    assert_eq!((2, 3, 191), bbt(&position));
    assert_eq!(3, position.beats_per_bar());
}

#[test]
fn locate_far_past_the_end_of_a_song() {
    let song = BarTable::new(vec![4, 3, 2], false);
    let mut position = position();
    let frame = 1u64 << 44;
    let ticks = frame / 125;
    position.locate_frame_in(&song, frame);
    assert_eq!(frame, position.frame());
    assert_eq!(2, position.beats_per_bar());

    let past_end = ticks - (4 + 3 + 2) * 192;
    assert_eq!(4 + past_end / 384, u64::from(position.bar()));
    assert_eq!(past_end % 384, position.ticks_into_bar());

    let mut endless = self::position();
    endless.locate_frame_in(&FixedMeter::new(4), frame);
    assert_eq!(ticks / 768 + 1, u64::from(endless.bar()));
    assert_eq!(ticks % 768, endless.ticks_into_bar());
}

#[test]
fn start_and_stop_keep_position() {
    let mut position = position();
    position.locate_frame(12_345);
    let before = bbt(&position);
    position.start();
    assert!(position.is_rolling());
    position.stop();
    assert!(!position.is_rolling());
    assert_eq!(before, bbt(&position));
    assert_eq!(12_345, position.frame());
}

#[test]
fn processed_frames() {
    let song = FixedMeter::new(4);
    let mut position = position();
    position.processed_frames(512, &song);
    assert_eq!(512, position.frame());
    assert_eq!((1, 1, 4), bbt(&position));
    assert_eq!(12.0, position.bbt_offset());
    assert!(!position.new_position());

    position.processed_frames(96_000, &song);
    assert_eq!((2, 1, 4), bbt(&position));
    assert_eq!(768, position.bar_start_tick());
}

#[test]
fn processed_frames_composes() {
    let song = BarTable::new(vec![4, 3, 5, 2], false);
    for (first, second) in [(1, 1), (511, 513), (4000, 96_000), (123_457, 33)] {
        for base in [position(), fractional_position()] {
            let mut split = base;
            split.processed_frames(first, &song);
            split.processed_frames(second, &song);

            let mut whole = base;
            whole.processed_frames(first + second, &song);

            assert_eq!(whole.frame(), split.frame());
            assert_eq!(bbt(&whole), bbt(&split));
            assert_eq!(whole.bar_start_tick(), split.bar_start_tick());
            assert!((whole.bbt_offset() - split.bbt_offset()).abs() < 1e-6);
        }
    }
}

#[test]
fn processed_frames_follows_meter_changes() {
    let song = BarTable::new(vec![4, 3], false);
    let mut position = position();
    // One bar of 4/4.
    position.processed_frames(4 * 192 * 125, &song);
    assert_eq!((2, 1, 0), bbt(&position));
    assert_eq!(3, position.beats_per_bar());

    // Bar 2 is three beats long.
    position.processed_frames(3 * 192 * 125, &song);
    assert_eq!((3, 1, 0), bbt(&position));
    assert_eq!(7 * 192, position.bar_start_tick());
    // Bar 3 is past the end and keeps the last meter.
    assert_eq!(3, position.beats_per_bar());
}

#[test]
fn processed_frames_wraps_looping_song() {
    let song = BarTable::new(vec![4, 3], true);
    let mut position = position();
    let song_frames = 7 * 192 * 125;
    position.processed_frames(song_frames + 250, &song);

    assert_eq!((1, 1, 2), bbt(&position));
    assert_eq!(0, position.bar_start_tick());
    assert_eq!(4, position.beats_per_bar());
    // The frame keeps counting.
    assert_eq!(song_frames as u64 + 250, position.frame());
}

#[test]
fn ceil_is_idempotent() {
    for granularity in [Granularity::Tick, Granularity::Beat, Granularity::Bar] {
        for frame in [0, 1, 62, 63, 124, 24_001, 95_999, 123_456] {
            for mut position in [position(), fractional_position()] {
                position.locate_frame(frame);
                position.ceil(granularity);
                let once = position;
                position.ceil(granularity);
                assert_eq!(once, position, "{granularity:?} at {frame}");
                assert!(position.frame() >= frame);
            }
        }
    }
}

#[test]
fn floor_and_round() {
    let mut position = position();
    position.locate_bbt(1, 1, 100);
    position.round(Granularity::Beat);
    assert_eq!((1, 2, 0), bbt(&position));
    assert_eq!(24_000, position.frame());

    position.locate_bbt(1, 1, 100);
    position.floor(Granularity::Beat);
    assert_eq!((1, 1, 0), bbt(&position));
    assert_eq!(0, position.frame());

    position.locate_bbt(1, 3, 5);
    position.round(Granularity::Bar);
    assert_eq!((2, 1, 0), bbt(&position));
    assert_eq!(96_000, position.frame());

    position.locate_bbt(2, 2, 5);
    position.round(Granularity::Bar);
    assert_eq!((2, 1, 0), bbt(&position));

    position.locate_frame(96_000 + 70);
    position.round(Granularity::Tick);
    assert_eq!((2, 1, 1), bbt(&position));
    assert_eq!(96_125, position.frame());

    position.locate_frame(96_000 + 70);
    position.floor(Granularity::Tick);
    assert_eq!((2, 1, 0), bbt(&position));
    assert_eq!(96_000, position.frame());

    // Already on a boundary: nothing moves.
    position.floor(Granularity::Bar);
    assert_eq!(96_000, position.frame());
    position.ceil(Granularity::Bar);
    assert_eq!(96_000, position.frame());
}

#[test]
fn ceil_moves_to_next_boundary() {
    let mut position = position();
    position.locate_frame(96_000 + 1);
    position.ceil(Granularity::Bar);
    assert_eq!((3, 1, 0), bbt(&position));
    assert_eq!(192_000, position.frame());

    let mut fractional = fractional_position();
    fractional.locate_frame(1000);
    fractional.ceil(Granularity::Beat);
    assert_eq!((1, 2, 0), bbt(&fractional));
    // 192 * 114.84375 = 22050 exactly.
    assert_eq!(22_050, fractional.frame());
    assert!(fractional.is_snapped());
}

#[test]
fn tick_steps_round_trip() {
    for mut position in [position(), fractional_position()] {
        position.locate_bbt(3, 2, 77);
        let start = position;
        for ticks in [1, 5, 63, 191, 192, 768, 10_000] {
            let moved = position + ticks;
            let back = moved - ticks;
            assert_eq!(start.frame(), back.frame(), "step by {ticks}");
            assert_eq!(bbt(&start), bbt(&back));
        }

        for _ in 0..1000 {
            position.next_tick();
        }
        for _ in 0..1000 {
            position.prev_tick();
        }
        assert_eq!(start.frame(), position.frame());
    }
}

#[test]
fn snapped_steps_land_on_nearest_frame() {
    let mut position = fractional_position();
    position += 3;
    // 3 * 114.84375 = 344.53125
    assert_eq!(345, position.frame());
    assert_eq!((1, 1, 3), bbt(&position));
    assert!(position.is_snapped());
}

#[test]
fn unsnapped_steps_keep_offset() {
    let mut position = position();
    position.locate_frame(1000 + 40);
    assert!(!position.is_snapped());

    position += 4;
    // 125 frames per tick leaves no fraction for the dither to round.
    assert_eq!(1540, position.frame());
    assert_eq!(40.0, position.bbt_offset());
    assert_eq!((1, 1, 12), bbt(&position));

    let mut fractional = fractional_position();
    fractional.locate_frame(10_000 + 40);
    let offset = fractional.bbt_offset();
    let start = fractional.frame();
    fractional += 10;
    let moved = fractional.frame() - start;
    assert!(moved == 1148 || moved == 1149, "moved {moved}");
    assert_eq!(offset, fractional.bbt_offset());
}

#[test]
fn stepping_before_start_clamps() {
    let mut position = position();
    position.locate_bbt(1, 1, 2);
    position -= 10;
    assert_eq!(0, position.frame());
    assert_eq!((1, 1, 0), bbt(&position));
}

#[test]
fn normalize_to_external_frame() {
    let mut position = position();
    position.locate_frame(1000);
    position.normalize_to(1000 + 300);
    assert_eq!(1300, position.frame());
    assert_eq!((1, 1, 10), bbt(&position));
    assert_eq!(50.0, position.bbt_offset());

    position.normalize_to(900);
    assert_eq!((1, 1, 7), bbt(&position));
    assert_eq!(25.0, position.bbt_offset());
}

#[test]
fn tempo_change_keeps_frame() {
    let mut position = position();
    position.locate_frame(24_000);
    position.set_tempo(60.0);
    assert_eq!(24_000, position.frame());
    assert_eq!(250.0, position.frames_per_tick());
    // Nonsense tempos fall back to the default.
    position.set_tempo(-3.0);
    assert_eq!(DEFAULT_BEATS_PER_MINUTE, position.beats_per_minute());
}
