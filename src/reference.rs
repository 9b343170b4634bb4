// reference.rs — sequential CPU versions of every primitive.
//
// These are the ground truth the parallel results are compared against.
// Nothing in the orchestration code calls them.

use std::cmp::Ordering;
use std::fmt::Display;

use crate::element::{Element, ScanElement};
use crate::error::{Error, Result};
use crate::max_prefix::MaxPrefix;

/// Running sum, element `i` included.
pub fn inclusive_scan<T: ScanElement>(data: &[T]) -> Vec<T> {
    let mut acc = T::ZERO;
    data.iter()
        .map(|&x| {
            acc = acc.add(x);
            acc
        })
        .collect()
}

/// Running sum, element `i` excluded.
pub fn exclusive_scan<T: ScanElement>(data: &[T]) -> Vec<T> {
    let mut acc = T::ZERO;
    data.iter()
        .map(|&x| {
            let before = acc;
            acc = acc.add(x);
            before
        })
        .collect()
}

/// Ascending copy. Incomparable values (NaN) are treated as equal.
pub fn sorted<T: Element>(data: &[T]) -> Vec<T> {
    let mut out = data.to_vec();
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    out
}

/// Stable sort of `keys`, applying the same permutation to `values`.
pub fn stable_sort_pairs(keys: &[u32], values: &[u32]) -> Result<(Vec<u32>, Vec<u32>)> {
    if keys.len() != values.len() {
        return Err(Error::LengthMismatch { what: "reference pairs", left: keys.len(), right: values.len() });
    }
    let mut pairs: Vec<(u32, u32)> = keys.iter().copied().zip(values.iter().copied()).collect();
    pairs.sort_by_key(|&(k, _)| k);
    Ok(pairs.into_iter().unzip())
}

/// Left-to-right max prefix sum. Only a strictly greater running sum moves
/// the answer, so ties resolve to the shortest prefix.
pub fn max_prefix_sum(data: &[i32]) -> MaxPrefix {
    let mut best = MaxPrefix::default();
    let mut sum = 0i32;
    for (i, &x) in data.iter().enumerate() {
        sum = sum.wrapping_add(x);
        if sum > best.sum {
            best = MaxPrefix { sum, end: i + 1 };
        }
    }
    best
}

/// Compare `actual` against `expected`, failing on the first difference.
pub fn verify<T: PartialEq + Display>(what: &str, expected: &[T], actual: &[T]) -> Result<()> {
    if let Some(index) = expected.iter().zip(actual).position(|(e, a)| e != a) {
        return Err(Error::Mismatch {
            what: what.to_string(),
            index,
            expected: expected[index].to_string(),
            actual: actual[index].to_string(),
        });
    }
    if expected.len() != actual.len() {
        let index = expected.len().min(actual.len());
        return Err(Error::Mismatch {
            what: what.to_string(),
            index,
            expected: format!("{} elements", expected.len()),
            actual: format!("{} elements", actual.len()),
        });
    }
    Ok(())
}
