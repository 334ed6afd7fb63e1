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
use std::{error::Error, path::PathBuf};

use beatcore::{
    config::{EngineConfig, KitConfig},
    instrument::Kit,
    render::render_midi_file,
    time::{MusicalTime, DEFAULT_FRAME_RATE, DEFAULT_TICKS_PER_BEAT},
};
use clap::{crate_version, Parser, Subcommand};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample-accurate drum machine engine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renders a MIDI file through a drum kit into a WAV file.
    Render {
        /// The path to the engine config.
        engine_path: PathBuf,
        /// The path to the kit.
        kit_path: PathBuf,
        /// The MIDI file to render.
        midi_path: PathBuf,
        /// The WAV file to write.
        output_path: PathBuf,
    },
    /// Lists the instruments and layers of a kit.
    Kit {
        /// The path to the kit.
        kit_path: PathBuf,
    },
    /// Converts a frame into bar:beat:tick.
    Position {
        /// The frame to convert.
        frame: u64,
        /// The tempo in beats per minute.
        #[arg(short, long, default_value_t = 120.0)]
        bpm: f64,
        /// The sample rate.
        #[arg(short, long, default_value_t = DEFAULT_FRAME_RATE)]
        sample_rate: u32,
        /// The ticks per beat.
        #[arg(short, long, default_value_t = DEFAULT_TICKS_PER_BEAT)]
        ticks_per_beat: u32,
        /// Beats per bar.
        #[arg(long, default_value_t = 4)]
        beats_per_bar: u32,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            engine_path,
            kit_path,
            midi_path,
            output_path,
        } => {
            let config = EngineConfig::deserialize(&engine_path)?;
            let kit = Kit::load(&kit_path)?;
            let summary = render_midi_file(&config, kit, &midi_path, &output_path)?;

            println!(
                "Rendered {} events at {} bpm into {} ({} frames).",
                summary.events,
                summary.beats_per_minute,
                output_path.display(),
                summary.frames
            );
        }
        Commands::Kit { kit_path } => {
            let config = KitConfig::deserialize(&kit_path)?;
            let name = config.name().unwrap_or("unnamed");

            if config.instruments().is_empty() {
                println!("No instruments found in {}.", name);
                return Ok(());
            }

            println!("{} (instruments: {}):", name, config.instruments().len());
            for (index, instrument) in config.instruments().iter().enumerate() {
                println!("- {}: {}", instrument.id(index), instrument.name());
                for layer in instrument.layers() {
                    let [min, max] = layer.velocity();
                    println!("  - {} (velocity {:.2}-{:.2})", layer.file(), min, max);
                }
            }
        }
        Commands::Position {
            frame,
            bpm,
            sample_rate,
            ticks_per_beat,
            beats_per_bar,
        } => {
            let mut position =
                MusicalTime::new(sample_rate, bpm, beats_per_bar, 4, ticks_per_beat);
            position.locate_frame(frame);
            println!(
                "{} (offset {:.2} frames, {:.4} frames per tick)",
                position,
                position.bbt_offset(),
                position.frames_per_tick()
            );
        }
    }

    Ok(())
}
