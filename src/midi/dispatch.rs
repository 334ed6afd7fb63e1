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
use midly::{live::LiveEvent, MidiMessage};

/// Restricts channel messages to a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelFilter {
    #[default]
    All,
    /// A zero based channel, 0 to 15.
    Channel(u8),
}

impl ChannelFilter {
    pub fn accepts(&self, channel: u8) -> bool {
        match self {
            ChannelFilter::All => true,
            ChannelFilter::Channel(wanted) => *wanted == channel,
        }
    }
}

/// Hooks for every kind of MIDI message. Each hook returns true if the message
/// produced something useful. Channels are zero based.
#[allow(unused_variables)]
pub trait MidiHandler {
    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) -> bool {
        false
    }

    fn note_off(&mut self, channel: u8, key: u8, velocity: u8) -> bool {
        false
    }

    fn aftertouch(&mut self, channel: u8, key: u8, pressure: u8) -> bool {
        false
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> bool {
        false
    }

    fn program_change(&mut self, channel: u8, program: u8) -> bool {
        false
    }

    fn channel_pressure(&mut self, channel: u8, pressure: u8) -> bool {
        false
    }

    /// The bend is the raw 14 bit value, centered on 0x2000.
    fn pitch_wheel(&mut self, channel: u8, bend: u16) -> bool {
        false
    }

    /// The payload excludes the 0xF0 and 0xF7 framing bytes.
    fn sysex(&mut self, data: &[u8]) -> bool {
        false
    }

    fn mtc_quarter_frame(&mut self, message_type: u8, value: u8) -> bool {
        false
    }

    /// Position in MIDI beats (sixteenth notes) since the song start.
    fn song_position(&mut self, beats: u16) -> bool {
        false
    }

    fn song_select(&mut self, song: u8) -> bool {
        false
    }

    fn tune_request(&mut self) -> bool {
        false
    }

    fn clock(&mut self) -> bool {
        false
    }

    fn start(&mut self) -> bool {
        false
    }

    fn continue_playback(&mut self) -> bool {
        false
    }

    fn stop(&mut self) -> bool {
        false
    }

    fn active_sensing(&mut self) -> bool {
        false
    }

    fn reset(&mut self) -> bool {
        false
    }

    /// Anything malformed, truncated or undefined.
    fn unknown(&mut self, bytes: &[u8]) -> bool {
        false
    }
}

/// Dispatches one complete MIDI message to the matching handler hook.
///
/// The length of the message must match its status byte exactly. Channel
/// messages that the filter rejects are dropped without calling any hook.
pub fn dispatch<H: MidiHandler + ?Sized>(
    handler: &mut H,
    filter: ChannelFilter,
    bytes: &[u8],
) -> bool {
    let Some(&status) = bytes.first() else {
        return handler.unknown(bytes);
    };
    if status < 0x80 {
        return handler.unknown(bytes);
    }

    if status < 0xF0 {
        let expected = match status & 0xF0 {
            0xC0 | 0xD0 => 2,
            _ => 3,
        };
        if bytes.len() != expected || !is_data(&bytes[1..]) {
            return handler.unknown(bytes);
        }
        if !filter.accepts(status & 0x0F) {
            return false;
        }

        return match LiveEvent::parse(bytes) {
            Ok(LiveEvent::Midi { channel, message }) => {
                dispatch_channel(handler, u8::from(channel), message)
            }
            _ => handler.unknown(bytes),
        };
    }

    match (status, bytes.len()) {
        (0xF0, len) if len >= 2 && bytes[len - 1] == 0xF7 && is_data(&bytes[1..len - 1]) => {
            handler.sysex(&bytes[1..len - 1])
        }
        (0xF1, 2) if is_data(&bytes[1..]) => {
            handler.mtc_quarter_frame(bytes[1] >> 4, bytes[1] & 0x0F)
        }
        (0xF2, 3) if is_data(&bytes[1..]) => {
            handler.song_position(u16::from(bytes[1]) | (u16::from(bytes[2]) << 7))
        }
        (0xF3, 2) if is_data(&bytes[1..]) => handler.song_select(bytes[1]),
        (0xF6, 1) => handler.tune_request(),
        (0xF8, 1) => handler.clock(),
        (0xFA, 1) => handler.start(),
        (0xFB, 1) => handler.continue_playback(),
        (0xFC, 1) => handler.stop(),
        (0xFE, 1) => handler.active_sensing(),
        (0xFF, 1) => handler.reset(),
        _ => handler.unknown(bytes),
    }
}

fn dispatch_channel<H: MidiHandler + ?Sized>(
    handler: &mut H,
    channel: u8,
    message: MidiMessage,
) -> bool {
    match message {
        MidiMessage::NoteOff { key, vel } => handler.note_off(channel, u8::from(key), u8::from(vel)),
        MidiMessage::NoteOn { key, vel } => handler.note_on(channel, u8::from(key), u8::from(vel)),
        MidiMessage::Aftertouch { key, vel } => {
            handler.aftertouch(channel, u8::from(key), u8::from(vel))
        }
        MidiMessage::Controller { controller, value } => {
            handler.control_change(channel, u8::from(controller), u8::from(value))
        }
        MidiMessage::ProgramChange { program } => handler.program_change(channel, u8::from(program)),
        MidiMessage::ChannelAftertouch { vel } => handler.channel_pressure(channel, u8::from(vel)),
        MidiMessage::PitchBend { bend } => handler.pitch_wheel(channel, u16::from(bend.0)),
    }
}

fn is_data(bytes: &[u8]) -> bool {
    bytes.iter().all(|byte| *byte < 0x80)
}
