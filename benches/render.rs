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
use std::{sync::Arc, time::Duration};

use beatcore::{
    audio::PortRegistry,
    config::AllOffPolicy,
    events::ScheduledEvent,
    instrument::{FilterSettings, Instrument, InstrumentLayer, Sample},
    sampler::{Note, NoteLimit, Sampler},
    time::MusicalTime,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const BUFFER_SIZE: u32 = 512;

fn generate_test_sample(duration_seconds: f32, sample_rate: u32) -> Arc<Sample> {
    let num_samples = (duration_seconds * sample_rate as f32) as usize;
    let data = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            // A decaying 60Hz thump with some click on top.
            (-t * 8.0).exp()
                * (0.6 * (2.0 * std::f32::consts::PI * 60.0 * t).sin()
                    + 0.2 * (2.0 * std::f32::consts::PI * 3000.0 * t).sin())
        })
        .collect();
    Arc::new(Sample::mono("bench", data, sample_rate))
}

fn kit(count: u32, sample: &Arc<Sample>, filter: bool) -> Vec<Arc<Instrument>> {
    (0..count)
        .map(|id| {
            let instrument =
                Instrument::new(id, "drum").with_layer(InstrumentLayer::new(sample.clone()));
            let instrument = if filter {
                instrument.with_filter(FilterSettings {
                    active: true,
                    cutoff: 0.4,
                    resonance: 0.5,
                })
            } else {
                instrument
            };
            Arc::new(instrument)
        })
        .collect()
}

fn bench_polyphony(c: &mut Criterion, name: &str, sample_rate: u32, pitch: f32, filter: bool) {
    let mut group = c.benchmark_group(name);
    let sample = generate_test_sample(2.0, sample_rate);
    let position = MusicalTime::default();

    for voices in [1u32, 8, 32, 64] {
        let sampler = Sampler::new(
            Arc::new(PortRegistry::new()),
            BUFFER_SIZE as usize,
            NoteLimit::Max(voices as usize),
            AllOffPolicy::Release,
        );
        let instruments = kit(voices, &sample, filter);
        for instrument in instruments.iter() {
            sampler.add_instrument(instrument);
        }
        let events: Vec<ScheduledEvent> = instruments
            .iter()
            .enumerate()
            .map(|(i, instrument)| {
                ScheduledEvent::note_on(
                    i as u32 % BUFFER_SIZE,
                    Note::new(instrument.clone(), 0.8).with_pitch(pitch),
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(voices), &events, |b, events| {
            b.iter(|| sampler.process(black_box(events), &position, BUFFER_SIZE))
        });
    }

    group.finish();
}

fn benchmark_render(c: &mut Criterion) {
    bench_polyphony(c, "render_unpitched", 48000, 0.0, false);
    bench_polyphony(c, "render_resampled", 44100, 0.0, false);
    bench_polyphony(c, "render_pitched", 48000, 3.0, false);
    bench_polyphony(c, "render_filtered", 48000, 0.0, true);
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = benchmark_render
}
criterion_main!(benches);
