//! Voice Performance Benchmarks
//!
//! Every note-on builds a chain of nodes and every note-off tears it down,
//! so both the render path and the build/teardown path must fit inside an
//! audio callback.
//!
//! ```text
//! time_budget = buffer_size / sample_rate
//! ```
//!
//! At 48 kHz a 256-sample block leaves 5.33 ms.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use duosynth::prelude::*;

const SAMPLE_RATE: f64 = 48000.0;
const BUFFER_SIZE: usize = 256;
const VOICE_COUNTS: [usize; 4] = [1, 4, 8, 16];

fn synth_with(kind: MixerType) -> Synth {
    let mut synth = Synth::new(EngineConfig::with_sample_rate(SAMPLE_RATE)).unwrap();
    let mut patch = Patch::default();
    patch.mixer.kind = kind;
    synth.set_patch(patch).unwrap();
    synth
}

fn bench_note_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("voice/note_on_off");

    for kind in [MixerType::Volume, MixerType::Additive, MixerType::Am, MixerType::Fm] {
        group.bench_with_input(
            BenchmarkId::new("mixer", format!("{:?}", kind)),
            &kind,
            |b, &kind| {
                let mut synth = synth_with(kind);
                b.iter(|| {
                    synth.handle_bytes(black_box(&[0x90u8, 60, 100])).unwrap();
                    synth.handle_bytes(black_box(&[0x80u8, 60, 0])).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("voice/render_block");

    for &voices in &VOICE_COUNTS {
        // Voice-samples per iteration, so per-voice cost reads off directly
        group.throughput(Throughput::Elements((BUFFER_SIZE * voices) as u64));
        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, &voices| {
            let mut synth = synth_with(MixerType::Volume);
            for i in 0..voices {
                synth.note_on(1, 48 + i as u8, 100).unwrap();
            }
            let mut block = vec![0.0f32; BUFFER_SIZE * 2];
            b.iter(|| {
                synth.render(&mut block);
                black_box(&block);
            });
        });
    }

    group.finish();
}

fn bench_pitch_bend(c: &mut Criterion) {
    c.bench_function("voice/pitch_bend_8_voices", |b| {
        let mut synth = synth_with(MixerType::Fm);
        for i in 0..8 {
            synth.note_on(1, 60 + i, 100).unwrap();
        }
        let mut msb = 0u8;
        b.iter(|| {
            msb = (msb + 1) & 0x7F;
            synth.pitch_bend(1, 0, black_box(msb)).unwrap();
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("midi/decode", |b| {
        b.iter(|| black_box(decode(black_box(&[0x93u8, 64, 90]))));
    });
}

criterion_group!(
    benches,
    bench_note_lifecycle,
    bench_render,
    bench_pitch_bend,
    bench_decode
);
criterion_main!(benches);
