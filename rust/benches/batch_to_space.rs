use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use spacebatch::{Crop, PackedTensor, ShapeDescriptor, Tensor, Transform, TransformMode};


const BATCH_SHAPE: [i64; 4] = [16, 32, 32, 8];
const BLOCK_SHAPE: [i64; 2] = [2, 2];

pub fn batch_to_space_benchmark(c: &mut Criterion) {
    let input = native::generate_random_tensor(&BATCH_SHAPE);
    let packed_input = PackedTensor::from_tensor(&input);
    let crops = [Crop::zero(); 2];
    let descriptor = ShapeDescriptor::for_batch_to_space(&BATCH_SHAPE, &BLOCK_SHAPE, &crops).unwrap();

    let Transform::Scalar(scalar) = Transform::new(TransformMode::Scalar, descriptor) else {
        unreachable!()
    };
    let Transform::Packed(packed) = Transform::new(TransformMode::Packed, descriptor) else {
        unreachable!()
    };
    let mut dense_out = Tensor::new(descriptor.output_shape(), 0.0f32);
    let mut packed_out = PackedTensor::new(descriptor.output_shape());

    let mut group = c.benchmark_group("Batch to Space");

    for i in 0..=2 {
        group.bench_with_input(BenchmarkId::new("Scalar", i), &i, |b, _| {
            b.iter(|| scalar.run(&input, &mut dense_out))
        });
        group.bench_with_input(BenchmarkId::new("Packed", i), &i, |b, _| {
            b.iter(|| packed.run(&packed_input, &mut packed_out))
        });
        group.bench_with_input(BenchmarkId::new("Rust Native", i), &i, |b, _| {
            b.iter(|| native::batch_to_space_cpu(&input, BLOCK_SHAPE, crops))
        });
    }
}

criterion_group!(benches, batch_to_space_benchmark);
criterion_main!(benches);
