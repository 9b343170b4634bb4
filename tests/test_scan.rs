// tests/test_scan.rs — Integration tests for the recursive scan engine.

use parprim::reference::{exclusive_scan, inclusive_scan, verify};
use parprim::{ComputeBackend, DeviceBuffer, HostBackend, ScanEngine};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};

fn random_u32(n: usize, seed: u64) -> Vec<u32> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..1000)).collect()
}

// ===== Composition over group boundaries =====

#[test]
fn matches_sequential_scan_at_group_boundaries() {
    let engine = ScanEngine::new(128).unwrap();
    for n in [1usize, 2, 127, 128, 129, 1_000_003] {
        let data = random_u32(n, n as u64);
        let got = engine.scan_slice(&HostBackend, &data).unwrap();
        assert_eq!(got.len(), n);
        verify(&format!("scan n={n}"), &inclusive_scan(&data), &got).unwrap();
    }
}

#[test]
fn deep_recursion_with_smallest_group() {
    // Group size 4 over 5000 elements runs seven levels (5000, 1251, 314, 80, 21, 7, 3).
    let engine = ScanEngine::new(4).unwrap();
    assert_eq!(engine.levels(5000), 7);
    let data = random_u32(5000, 99);
    let got = engine.scan_slice(&HostBackend, &data).unwrap();
    verify("deep scan", &inclusive_scan(&data), &got).unwrap();
}

#[test]
fn all_zero_input_stays_zero() {
    let engine = ScanEngine::new(64).unwrap();
    let got = engine.scan_slice(&HostBackend, &vec![0i32; 777]).unwrap();
    assert!(got.iter().all(|&x| x == 0));
}

#[test]
fn float_scan_of_integral_values_is_exact() {
    let engine = ScanEngine::new(32).unwrap();
    let data: Vec<f32> = (0..500).map(|i| (i % 7) as f32 - 3.0).collect();
    let got = engine.scan_slice(&HostBackend, &data).unwrap();
    assert_eq!(got, inclusive_scan(&data));
}

#[test]
fn signed_values_and_exclusive_relation() {
    let engine = ScanEngine::new(16).unwrap();
    let data: Vec<i32> = (0..300).map(|i| if i % 3 == 0 { -i } else { i }).collect();
    let inc = engine.scan_slice(&HostBackend, &data).unwrap();
    let exc = exclusive_scan(&data);
    for i in 0..data.len() {
        assert_eq!(inc[i], exc[i].wrapping_add(data[i]), "index {i}");
    }
}

#[test]
fn input_buffer_is_left_untouched() {
    let engine = ScanEngine::new(8).unwrap();
    let data = random_u32(100, 5);
    let input = HostBackend.upload(&data).unwrap();
    let _ = engine.scan(&HostBackend, &input, data.len()).unwrap();
    assert_eq!(input.to_vec().unwrap(), data);
}

// ===== Properties =====

proptest! {
    #[test]
    fn scan_is_running_sum(data in prop::collection::vec(any::<u32>(), 1..3000), shift in 2u32..9) {
        let engine = ScanEngine::new(1 << shift).unwrap();
        let got = engine.scan_slice(&HostBackend, &data).unwrap();
        prop_assert_eq!(got, inclusive_scan(&data));
    }

    #[test]
    fn last_element_is_total(data in prop::collection::vec(-1000i32..1000, 1..2000)) {
        let engine = ScanEngine::new(32).unwrap();
        let got = engine.scan_slice(&HostBackend, &data).unwrap();
        let total = data.iter().fold(0i32, |a, &b| a.wrapping_add(b));
        prop_assert_eq!(*got.last().unwrap(), total);
    }
}
