// benches/gpu_benchmarks.rs — GPU primitives against the CPU reference.
//
//   cargo bench --bench gpu_benchmarks
//
// CRITERION + GPU CAVEATS
// ────────────────────────
// Criterion measures wall time including CPU overhead (buffer writes, bind
// group creation, submit, poll). Each primitive is timed on a buffer that
// is already resident; only the final readback is included, matching how
// a caller blocks on the result.
//
// The first iterations pay pipeline compilation (kernels are compiled on
// first use), so warmup_time is set explicitly.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use std::time::Duration;

use parprim::gpu::{GpuBackend, GpuDevice};
use parprim::reference;
use parprim::{ComputeBackend, DeviceBuffer, Primitives};

const SIZES: [usize; 3] = [1 << 16, 1 << 20, 1 << 24];

fn random_u32(n: usize, max: u32) -> Vec<u32> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(n as u64);
    (0..n).map(|_| rng.gen_range(0..max)).collect()
}

fn setup() -> (GpuBackend, Primitives) {
    let gpu = GpuDevice::new().expect("no Vulkan GPU");
    let config = gpu.primitives_config();
    let p = Primitives::new(config).expect("device config is valid");
    (GpuBackend::new(gpu), p)
}

// ============================================================
// Scan: CPU vs GPU
// ============================================================

fn bench_scan(c: &mut Criterion) {
    let (gpu, p) = setup();
    let mut group = c.benchmark_group("gpu_scan");
    group.warm_up_time(Duration::from_secs(2));
    for n in SIZES {
        let data = random_u32(n, u32::MAX / n as u32);
        let input = gpu.upload(&data).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(BenchmarkId::new("cpu", n), |b| b.iter(|| reference::inclusive_scan(&data)));
        group.bench_function(BenchmarkId::new("gpu", n), |b| {
            b.iter(|| {
                let sums = p.scan.scan(&gpu, &input, n).unwrap();
                let mut last = [0u32];
                sums.read(&mut last, n - 1).unwrap();
                last[0]
            })
        });
    }
    group.finish();
}

// ============================================================
// Sorts: CPU vs GPU bitonic vs GPU radix
// ============================================================

fn bench_sort(c: &mut Criterion) {
    let (gpu, p) = setup();
    let mut group = c.benchmark_group("gpu_sort");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(10);
    for n in SIZES {
        let data = random_u32(n, u32::MAX);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(BenchmarkId::new("cpu", n), |b| b.iter(|| reference::sorted(&data)));
        group.bench_function(BenchmarkId::new("gpu_bitonic", n), |b| {
            b.iter(|| p.bitonic.sort_slice(&gpu, &data).unwrap())
        });
        group.bench_function(BenchmarkId::new("gpu_radix", n), |b| {
            b.iter(|| p.radix.sort_slice(&gpu, &data).unwrap())
        });
    }
    group.finish();
}

// ============================================================
// Max prefix sum: CPU vs GPU
// ============================================================

fn bench_max_prefix(c: &mut Criterion) {
    let (gpu, p) = setup();
    let mut group = c.benchmark_group("gpu_max_prefix_sum");
    group.warm_up_time(Duration::from_secs(2));
    for n in SIZES {
        let range = 1023.min(i32::MAX / n as i32);
        let mut rng = rand::rngs::StdRng::seed_from_u64(n as u64);
        let data: Vec<i32> = (0..n).map(|_| rng.gen_range(-range..=range)).collect();
        let input = gpu.upload(&data).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(BenchmarkId::new("cpu", n), |b| b.iter(|| reference::max_prefix_sum(&data)));
        group.bench_function(BenchmarkId::new("gpu", n), |b| {
            b.iter(|| p.max_prefix.compute(&gpu, &input, n).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan, bench_sort, bench_max_prefix);
criterion_main!(benches);
