use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use spacebatch::{Crop, Direction, ScalarTransformKernel, ShapeDescriptor, Tensor};


const SPACE_SHAPE: [i64; 4] = [4, 62, 62, 8];
const BLOCK_SHAPE: [i64; 2] = [2, 2];

pub fn space_to_batch_benchmark(c: &mut Criterion) {
    let input = native::generate_random_tensor(&SPACE_SHAPE);
    let paddings = [Crop::new(1, 1); 2];
    let descriptor =
        ShapeDescriptor::for_space_to_batch(&SPACE_SHAPE, &BLOCK_SHAPE, &paddings).unwrap();
    let kernel = ScalarTransformKernel::new(descriptor, Direction::SpaceToBatch);
    let mut output = Tensor::new(descriptor.batch_shape(), 0.0f32);

    let mut group = c.benchmark_group("Space to Batch");

    for i in 0..=2 {
        group.bench_with_input(BenchmarkId::new("Scalar", i), &i, |b, _| {
            b.iter(|| kernel.run(&input, &mut output))
        });
        #[cfg(feature = "parallel")]
        group.bench_with_input(BenchmarkId::new("Scalar Parallel", i), &i, |b, _| {
            b.iter(|| kernel.run_parallel(&input, &mut output))
        });
    }
}

criterion_group!(benches, space_to_batch_benchmark);
criterion_main!(benches);
