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
//! Offline rendering of a Standard MIDI File through the engine into a WAV
//! file.

use std::{fs, io, path::Path, sync::Arc};

use hound::{SampleFormat, WavSpec, WavWriter};
use midly::{Format, MetaMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    audio::PortRegistry,
    config::EngineConfig,
    engine::Engine,
    instrument::Kit,
    time::FixedMeter,
};

/// The longest a render runs past the last MIDI event waiting for notes to
/// ring out, in seconds.
pub const MAX_TAIL_SECONDS: u32 = 10;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unable to read MIDI file: {0}")]
    Io(#[from] io::Error),

    #[error("unable to parse MIDI file: {0}")]
    Midi(#[from] midly::Error),

    #[error("unable to write WAV file: {0}")]
    Wav(#[from] hound::Error),

    #[error("SMPTE timecode MIDI files are not supported")]
    Timecode,
}

/// What a render produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    pub frames: u64,
    pub events: usize,
    pub beats_per_minute: f64,
}

// A MIDI message at an absolute MIDI tick.
struct TimedMessage {
    tick: u64,
    bytes: Vec<u8>,
}

/// Renders a MIDI file with a kit into a 32 bit float stereo WAV file.
///
/// The tempo is the first tempo event of the file, or the configured tempo if
/// there is none. Later tempo changes are ignored.
pub fn render_midi_file(
    config: &EngineConfig,
    kit: Kit,
    midi_file: &Path,
    output: &Path,
) -> Result<RenderSummary, RenderError> {
    let buf = fs::read(midi_file)?;
    let smf = Smf::parse(&buf)?;
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(ticks) => u16::from(ticks).max(1),
        Timing::Timecode(..) => return Err(RenderError::Timecode),
    };

    let (messages, tempo) = collect_messages(&smf)?;
    let beats_per_minute = tempo
        .map(|us_per_quarter| 60_000_000.0 / f64::from(us_per_quarter.max(1)))
        .unwrap_or_else(|| config.bpm());
    let config = config.clone().with_bpm(beats_per_minute);

    let sample_rate = config.sample_rate();
    let frames_per_tick =
        f64::from(sample_rate) * 60.0 / (beats_per_minute * f64::from(ticks_per_quarter));
    let (beats_per_bar, _) = config.time_signature();

    info!(
        file = %midi_file.display(),
        events = messages.len(),
        beats_per_minute,
        "Rendering MIDI file"
    );

    let registry = Arc::new(PortRegistry::new());
    let engine = Engine::new(&config, registry, Arc::new(FixedMeter::new(beats_per_bar)));
    engine.load_kit(kit);
    engine.transport().start();

    let mut writer = WavWriter::create(
        output,
        WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let cycle = config.buffer_size();
    let tail = u64::from(sample_rate) * u64::from(MAX_TAIL_SECONDS);
    let mut pending = messages.iter().peekable();
    let mut start = 0u64;
    let mut last_event_frame = 0u64;
    let mut left = vec![0.0f32; cycle as usize];
    let mut right = vec![0.0f32; cycle as usize];

    loop {
        let end = start + u64::from(cycle);
        while let Some(message) =
            pending.next_if(|message| event_frame(message.tick, frames_per_tick) < end)
        {
            let frame = event_frame(message.tick, frames_per_tick);
            let offset = u32::try_from(frame.saturating_sub(start)).unwrap_or(0);
            engine.handle_midi_at(&message.bytes, offset);
            last_event_frame = frame;
        }

        engine.process_cycle(cycle);
        mix_ports(&engine, &mut left, &mut right);
        for (l, r) in left.iter().zip(right.iter()) {
            writer.write_sample(*l)?;
            writer.write_sample(*r)?;
        }
        start = end;

        let events_done = pending.peek().is_none();
        let silent = engine.sampler().playing_notes_count() == 0;
        if events_done && (silent || start >= last_event_frame + tail) {
            break;
        }
    }
    writer.finalize()?;

    debug!(frames = start, "Render finished");
    Ok(RenderSummary {
        frames: start,
        events: messages.len(),
        beats_per_minute,
    })
}

fn event_frame(tick: u64, frames_per_tick: f64) -> u64 {
    (tick as f64 * frames_per_tick).round() as u64
}

// Sums every output port of the sampler, scaled by the master volume.
fn mix_ports(engine: &Engine, left: &mut [f32], right: &mut [f32]) {
    left.fill(0.0);
    right.fill(0.0);
    let volume = engine.master_volume();

    for port in engine.sampler().ports() {
        if port.is_silent() {
            continue;
        }
        let buffers = port.lock();
        let port_left = buffers.channel(0);
        let port_right = if buffers.channel_count() > 1 {
            buffers.channel(1)
        } else {
            port_left
        };
        for (out, sample) in left.iter_mut().zip(port_left) {
            *out += sample * volume;
        }
        for (out, sample) in right.iter_mut().zip(port_right) {
            *out += sample * volume;
        }
    }
}

// Flattens the tracks into one list of live MIDI messages ordered by tick,
// along with the first tempo found.
fn collect_messages(smf: &Smf) -> Result<(Vec<TimedMessage>, Option<u32>), RenderError> {
    let mut messages = Vec::new();
    let mut tempo = None;
    let mut track_start = 0u64;

    for track in smf.tracks.iter() {
        let mut tick = track_start;
        for event in track.iter() {
            tick += u64::from(u32::from(event.delta));
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    tempo.get_or_insert(u32::from(us_per_quarter));
                }
                kind => {
                    if let Some(live) = kind.as_live_event() {
                        let mut bytes = Vec::with_capacity(8);
                        live.write_std(&mut bytes)?;
                        messages.push(TimedMessage { tick, bytes });
                    }
                }
            }
        }
        if smf.header.format == Format::Sequential {
            track_start = tick;
        }
    }

    messages.sort_by_key(|message| message.tick);
    Ok((messages, tempo))
}
