use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mobiledoas::acquisition::plan;
use mobiledoas::io::{StdReader, StdWriter};
use mobiledoas::spectrum::{ChannelData, Spectrum, SpectrumInfo};

fn plan_grid(exposures: &[u32], resolutions: &[u32]) {
    for exposure in exposures.iter() {
        for resolution in resolutions.iter() {
            plan(*exposure, *resolution, 15).unwrap();
        }
    }
}

fn summation_plan(c: &mut Criterion) {
    let exposures: Vec<u32> = (3..500).step_by(7).collect();
    let resolutions: Vec<u32> = vec![100, 500, 1000, 2500, 7919, 30000];
    c.bench_function("summation_plan_grid", |b| {
        b.iter(|| plan_grid(black_box(&exposures), black_box(&resolutions)))
    });
}

fn std_parsing(c: &mut Criterion) {
    let samples: Vec<f64> = (0..2048)
        .map(|i| 1000.0 + (i as f64 / 50.0).sin() * 400.0)
        .collect();
    let spectrum = Spectrum::new(
        SpectrumInfo::new("sky", 250, 40),
        ChannelData::single(samples),
    );
    let mut writer = StdWriter::new(Vec::new());
    writer.write_channel(&spectrum, 0).unwrap();
    let buffer = writer.into_inner().unwrap();
    c.bench_function("std_read_2048", |b| {
        b.iter(|| {
            StdReader::new(black_box(buffer.as_slice()))
                .read_spectrum()
                .unwrap()
        })
    });
}

criterion_group!(benches, summation_plan, std_parsing);
criterion_main!(benches);
