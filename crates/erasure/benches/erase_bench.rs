use std::any::Any;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use erasure::{ErasedBox, ThinErasedBox};

/// A 4x4 matrix, the size of a typical transform component
type Transform = [f32; 16];

fn bench_erase(c: &mut Criterion) {
    let mut group = c.benchmark_group("Erase and drop");

    group.bench_function("Box<dyn Any> (baseline)", |b| {
        b.iter(|| {
            let erased: Box<dyn Any> = Box::new(black_box::<Transform>([1.0; 16]));
            black_box(erased)
        });
    });

    group.bench_function("ErasedBox", |b| {
        b.iter(|| black_box(ErasedBox::new(black_box::<Transform>([1.0; 16]))));
    });

    group.bench_function("ThinErasedBox", |b| {
        b.iter(|| black_box(ThinErasedBox::new(black_box::<Transform>([1.0; 16]))));
    });

    group.bench_function("ThinErasedBox from Box<[u32]>", |b| {
        b.iter(|| {
            let values = vec![7u32; 64].into_boxed_slice();
            black_box(ThinErasedBox::from(values))
        });
    });

    group.finish();
}

fn bench_reify(c: &mut Criterion) {
    // 10,000 erased values, read back in a tight loop
    let fat: Vec<ErasedBox> = (0..10_000).map(ErasedBox::new::<u64>).collect();
    let thin: Vec<ThinErasedBox> = (0..10_000).map(ThinErasedBox::new::<u64>).collect();

    let mut group = c.benchmark_group("Reify");

    group.bench_function("ErasedBox (sum)", |b| {
        b.iter(|| {
            let sum: u64 = fat.iter().map(|e| unsafe { *e.reify_ref::<u64>() }).sum();
            black_box(sum)
        });
    });

    group.bench_function("ThinErasedBox (sum)", |b| {
        b.iter(|| {
            let sum: u64 = thin.iter().map(|e| unsafe { *e.reify_ref::<u64>() }).sum();
            black_box(sum)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_erase, bench_reify);
criterion_main!(benches);
