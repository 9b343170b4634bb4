// tests/test_radix.rs — Integration tests for the radix sort orchestrator.

use parprim::reference::{sorted, stable_sort_pairs, verify};
use parprim::{BitonicSorter, HostBackend, RadixSorter, ScanEngine};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};

fn sorter(mask_width: u32) -> RadixSorter {
    RadixSorter::new(ScanEngine::new(128).unwrap(), mask_width).unwrap()
}

#[test]
fn sorts_random_keys() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(2);
    let keys: Vec<u32> = (0..20_000).map(|_| rng.gen()).collect();
    let got = sorter(2).sort_slice(&HostBackend, &keys).unwrap();
    verify("radix", &sorted(&keys), &got).unwrap();
}

#[test]
fn stable_on_tagged_duplicates() {
    // Few distinct keys, many duplicates: the tags reveal input order.
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let keys: Vec<u32> = (0..5000).map(|_| rng.gen_range(0..8) << 20).collect();
    let tags: Vec<u32> = (0..keys.len() as u32).collect();
    let (k, v) = sorter(4).sort_pairs_slice(&HostBackend, &keys, &tags).unwrap();
    let (ek, ev) = stable_sort_pairs(&keys, &tags).unwrap();
    assert_eq!(k, ek);
    assert_eq!(v, ev);
}

#[test]
fn agrees_with_bitonic() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(4);
    let keys: Vec<u32> = (0..3000).map(|_| rng.gen()).collect();
    let radix = sorter(8).sort_slice(&HostBackend, &keys).unwrap();
    let bitonic = BitonicSorter::new(128).unwrap().sort_slice(&HostBackend, &keys).unwrap();
    assert_eq!(radix, bitonic);
}

#[test]
fn extreme_keys() {
    let keys = vec![u32::MAX, 0, u32::MAX - 1, 1, 0x8000_0000, 0x7fff_ffff];
    let got = sorter(1).sort_slice(&HostBackend, &keys).unwrap();
    assert_eq!(got, vec![0, 1, 0x7fff_ffff, 0x8000_0000, u32::MAX - 1, u32::MAX]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pairs_match_stable_reference(
        pairs in prop::collection::vec((0u32..16, any::<u32>()), 0..800),
        w in prop::sample::select(vec![1u32, 2, 4, 8]),
    ) {
        let (keys, values): (Vec<u32>, Vec<u32>) = pairs.into_iter().unzip();
        let got = sorter(w).sort_pairs_slice(&HostBackend, &keys, &values).unwrap();
        prop_assert_eq!(got, stable_sort_pairs(&keys, &values).unwrap());
    }
}
