// max_prefix.rs — maximum prefix sum and the prefix length achieving it.
//
// The reduction runs over prefix LENGTHS 0..=n, not element indices:
//
//   value(0) = 0            (empty prefix)
//   value(k) = sums[k - 1]  (inclusive scan)
//
// maxes[] starts as the identity 0..=n. Each pairwise pass with active
// length m and half = ceil(m / 2) folds slot k + half into slot k for
// k < m - half; the survivor is the larger value, the shorter prefix on a
// tie. The fold is a max under a total order, so the tree reduction agrees
// with a left-to-right scan that only moves on a strictly greater sum.
// Rounding half up keeps the middle slot alive when m is odd.

use std::fmt;

use crate::dispatch::{ComputeBackend, DeviceBuffer, MaxPairwiseArgs, WorkSize};
use crate::error::{Error, Result};
use crate::scan::ScanEngine;

/// Result of a max-prefix-sum query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxPrefix {
    /// Largest prefix sum (0 if every non-empty prefix is negative).
    pub sum: i32,
    /// Length of the shortest prefix achieving `sum`.
    pub end: usize,
}

impl fmt::Display for MaxPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on prefix [0; {})", self.sum, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPrefixSum {
    scan: ScanEngine,
}

impl MaxPrefixSum {
    pub fn new(scan: ScanEngine) -> Self {
        MaxPrefixSum { scan }
    }

    /// Max prefix sum of `input[..n]`.
    pub fn compute<B: ComputeBackend>(
        &self,
        backend: &B,
        input: &B::Buffer<i32>,
        n: usize,
    ) -> Result<MaxPrefix> {
        if n == 0 {
            return Ok(MaxPrefix::default());
        }
        if n >= u32::MAX as usize {
            return Err(Error::TooLarge { what: "max prefix sum", required: n as u64 + 1, limit: u32::MAX as u64 });
        }
        let sums = self.scan.scan(backend, input, n)?;

        let lengths: Vec<u32> = (0..=n as u32).collect();
        let mut maxes = backend.upload(&lengths)?;

        let mut m = n as u32 + 1;
        let mut level = 0;
        while m > 1 {
            let half = m.div_ceil(2);
            log::debug!("[{}] max-pairwise level {level}: m={m} half={half}", backend.name());
            let ws = WorkSize::new(self.scan.group_size(), (m - half) as usize)?;
            backend.max_pairwise(ws, MaxPairwiseArgs { sums: &sums, maxes: &mut maxes, m, half })?;
            m = half;
            level += 1;
        }

        let mut end = [0u32];
        maxes.read(&mut end, 0)?;
        let end = end[0] as usize;
        let sum = if end == 0 {
            0
        } else {
            let mut sum = [0i32];
            sums.read(&mut sum, end - 1)?;
            sum[0]
        };
        Ok(MaxPrefix { sum, end })
    }

    /// Upload and compute in one call.
    pub fn compute_slice<B: ComputeBackend>(&self, backend: &B, data: &[i32]) -> Result<MaxPrefix> {
        let input = backend.upload(data)?;
        self.compute(backend, &input, data.len())
    }
}
