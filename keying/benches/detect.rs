use std::hint::black_box;

use criterion::{
    Criterion,
    Throughput,
    criterion_group,
    criterion_main,
};
use keying::{
    FskMode,
    LevelConfig,
    PulseDetector,
    PulseTrain,
};
use rand::{
    Rng,
    SeedableRng,
    rngs::SmallRng,
};

pub fn bench_detect(c: &mut Criterion) {
    let num_samples = 0x100000;
    let chunk_size = 0x4000;
    let sample_rate = 250_000;

    let mut rng = SmallRng::seed_from_u64(7);
    let mut envelope = Vec::with_capacity(num_samples);
    // noise floor with a short burst every 10k samples
    while envelope.len() < num_samples {
        for _ in 0..9_000 {
            envelope.push(rng.gen_range(30i16..70));
        }
        for _ in 0..10 {
            envelope.extend([2000i16; 50]);
            envelope.extend(std::iter::repeat_with(|| rng.gen_range(30i16..70)).take(50));
        }
    }
    envelope.truncate(num_samples);
    let fm = vec![0i16; num_samples];

    let mut group = c.benchmark_group("detect");
    group.throughput(Throughput::Elements(num_samples as u64));

    group.bench_function("ook noise and bursts", |b| {
        b.iter(|| {
            let mut detector = PulseDetector::new(LevelConfig::default());
            let mut ook = PulseTrain::new();
            let mut fsk = PulseTrain::new();
            let mut offset = 0;
            let mut num_packages = 0;

            for (envelope, fm) in envelope.chunks(chunk_size).zip(fm.chunks(chunk_size)) {
                while detector
                    .detect(
                        envelope,
                        fm,
                        sample_rate,
                        offset,
                        FskMode::MinMax,
                        &mut ook,
                        &mut fsk,
                    )
                    .is_some()
                {
                    num_packages += 1;
                }
                offset += envelope.len() as u64;
            }

            black_box(num_packages)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
