use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use convbench::{
    backend::Backend,
    device::Device,
    options::MappingOptions,
    template::{KernelTemplate, ENTRY_POINT},
};

fn criterion_benchmark(c: &mut Criterion) {
    let mut backend = Device::Cuda.open(Some(0)).unwrap();

    let spec = KernelTemplate::convolution().instantiate(2).unwrap();
    let input = backend.make_tensor(&[1, 3, 226, 226]);
    let kernel = backend.make_tensor(&[32, 3, 3, 3]);
    let handle = backend
        .compile(&spec, ENTRY_POINT, &[&input, &kernel], &MappingOptions::naive())
        .unwrap();
    let outputs = backend
        .prepare_outputs(&spec, ENTRY_POINT, &[&input, &kernel])
        .unwrap();

    c.bench_function("conv2d_cuda", |b| {
        b.iter_batched(
            || outputs.clone(),
            |mut outputs| backend.profile(handle, &[&input, &kernel], &mut outputs),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
