// demos/primitives.rs — run every primitive on the GPU and check it.
//
// For each primitive and each size, uploads random data, runs the
// primitive ITERATIONS times, prints mean ± std wall time and throughput,
// and aborts on the first element that disagrees with the CPU reference.
//
//   primitive        sizes                     data
//   ───────────────  ────────────────────────  ──────────────────────────
//   scan             2^10 .. 2^24 (×4)         u32 in [0, 1024)
//   bitonic / radix  2^10 .. 2^22 (×4)         u32, full range
//   max-prefix       2 .. 2^24 (×2)            i32 in ±min(1023, MAX/n)
//
// Scan and sort sizes are offset from powers of two so every run ends in
// a partial group.
//
// USAGE
//   cargo run --release --example primitives
//   cargo run --release --example primitives -- radix 20
//   RUST_LOG=debug PARPRIM_GROUP_SIZE=64 cargo run --example primitives -- scan
//
// The first argument selects one primitive (scan, bitonic, radix,
// max-prefix, all); the second sets the iteration count.

use std::time::Instant;

use rand::{Rng, SeedableRng};

use parprim::gpu::{GpuBackend, GpuDevice};
use parprim::reference;
use parprim::{ComputeBackend, DeviceBuffer, Primitives, Result};

const DEFAULT_ITERATIONS: usize = 10;

/// Mean and standard deviation of a series of timings, in milliseconds.
fn stats(samples: &[f64]) -> (f64, f64) {
    let n = samples.len().max(1) as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn report(name: &str, n: usize, samples: &[f64]) {
    let (mean, std) = stats(samples);
    let rate = n as f64 / (mean / 1000.0) / 1e6;
    println!("  {name:<12} n = {n:>9}  {mean:>9.3} ± {std:>7.3} ms  {rate:>9.1} M elem/s");
}

fn time<R>(iterations: usize, mut f: impl FnMut() -> Result<R>) -> Result<(R, Vec<f64>)> {
    let mut samples = Vec::with_capacity(iterations);
    let mut last = None;
    for _ in 0..iterations.max(1) {
        let t0 = Instant::now();
        last = Some(f()?);
        samples.push(t0.elapsed().as_secs_f64() * 1000.0);
    }
    Ok((last.expect("at least one iteration"), samples))
}

fn run_scan(gpu: &GpuBackend, p: &Primitives, rng: &mut impl Rng, iterations: usize) -> Result<()> {
    println!("\n=== Inclusive scan (u32) ===");
    for shift in (10..=24).step_by(2) {
        let n = (1usize << shift) + 1;
        let data: Vec<u32> = (0..n).map(|_| rng.gen_range(0..1024)).collect();
        let input = gpu.upload(&data)?;
        let (sums, samples) = time(iterations, || p.scan.scan(gpu, &input, n))?;
        reference::verify("scan", &reference::inclusive_scan(&data), &sums.to_vec()?)?;
        report("scan", n, &samples);
    }
    Ok(())
}

fn run_sort(gpu: &GpuBackend, p: &Primitives, rng: &mut impl Rng, iterations: usize, radix: bool) -> Result<()> {
    let name = if radix { "radix" } else { "bitonic" };
    println!("\n=== {name} sort (u32) ===");
    for shift in (10..=22).step_by(2) {
        let n = (1usize << shift) - 3;
        let data: Vec<u32> = (0..n).map(|_| rng.gen()).collect();
        let (sorted, samples) = time(iterations, || {
            let mut buf = gpu.upload(&data)?;
            if radix {
                p.radix.sort(gpu, &mut buf)?;
            } else {
                p.bitonic.sort(gpu, &mut buf, n)?;
            }
            Ok(buf)
        })?;
        reference::verify(name, &reference::sorted(&data), &sorted.to_vec()?)?;
        report(name, n, &samples);
    }
    Ok(())
}

fn run_max_prefix(gpu: &GpuBackend, p: &Primitives, rng: &mut impl Rng, iterations: usize) -> Result<()> {
    println!("\n=== Max prefix sum (i32) ===");
    let mut n = 2usize;
    while n <= 1 << 24 {
        let range = 1023.min(i32::MAX / n as i32);
        let data: Vec<i32> = (0..n).map(|_| rng.gen_range(-range..=range)).collect();
        let input = gpu.upload(&data)?;
        let (got, samples) = time(iterations, || p.max_prefix.compute(gpu, &input, n))?;
        let expected = reference::max_prefix_sum(&data);
        reference::verify("max prefix sum", &[expected], &[got])?;
        report("max-prefix", n, &samples);
        n *= 2;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let which = args.get(1).map(String::as_str).unwrap_or("all");
    let iterations = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_ITERATIONS);

    println!("Initialising GPU...");
    let gpu = GpuDevice::new()?;
    println!("GPU: {gpu}");
    let config = gpu.primitives_config().with_env()?;
    println!("Config: {config}, {iterations} iterations");

    let p = Primitives::new(config)?;
    let backend = GpuBackend::new(gpu);
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);

    match which {
        "scan" => run_scan(&backend, &p, &mut rng, iterations)?,
        "bitonic" => run_sort(&backend, &p, &mut rng, iterations, false)?,
        "radix" => run_sort(&backend, &p, &mut rng, iterations, true)?,
        "max-prefix" => run_max_prefix(&backend, &p, &mut rng, iterations)?,
        "all" => {
            run_scan(&backend, &p, &mut rng, iterations)?;
            run_sort(&backend, &p, &mut rng, iterations, false)?;
            run_sort(&backend, &p, &mut rng, iterations, true)?;
            run_max_prefix(&backend, &p, &mut rng, iterations)?;
        }
        other => {
            eprintln!("unknown primitive '{other}' (scan, bitonic, radix, max-prefix, all)");
            std::process::exit(2);
        }
    }
    println!("\nAll results match the CPU reference.");
    Ok(())
}
