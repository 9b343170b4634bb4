// radix.rs — LSD radix sort built on the scan engine.
//
// Each pass consumes `mask_width` bits of the key, starting at bit 0:
//
//   radix-count    counts[b * n + i] = (digit(keys[i]) == b)
//   scan           offsets = inclusive scan of counts (n * 2^w elements)
//   radix-reorder  keys_out[offsets[digit(keys[i]) * n + i] - 1] = keys[i]
//   swap           keys <-> keys_out
//
// Because the counts are bucket-major, the scanned offset of element i is
// (all elements in smaller buckets) + (elements of its own bucket at index
// <= i). Every pass is therefore stable, which is what makes LSD order
// correct across passes.
//
// The pass count is fixed at 32 / mask_width regardless of the data. After
// the last swap the sorted keys sit in the caller's handle.

use crate::config::check_mask_width;
use crate::dispatch::{
    ComputeBackend, DeviceBuffer, Payload, RadixCountArgs, RadixReorderArgs, WorkSize,
};
use crate::error::{Error, Result};
use crate::scan::ScanEngine;

/// Stable ascending sort of `u32` keys, optionally moving a `u32` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadixSorter {
    scan: ScanEngine,
    mask_width: u32,
}

impl RadixSorter {
    /// `mask_width` must divide 32 and lie in `1..=8`.
    pub fn new(scan: ScanEngine, mask_width: u32) -> Result<Self> {
        check_mask_width(mask_width)?;
        Ok(RadixSorter { scan, mask_width })
    }

    pub fn mask_width(&self) -> u32 {
        self.mask_width
    }

    /// Number of count/scan/reorder passes per sort.
    pub fn passes(&self) -> u32 {
        32 / self.mask_width
    }

    /// Sort `keys` ascending in place.
    pub fn sort<B: ComputeBackend>(&self, backend: &B, keys: &mut B::Buffer<u32>) -> Result<()> {
        self.run(backend, keys, None)
    }

    /// Sort `keys` ascending in place, applying the same permutation to
    /// `values`. Equal keys keep their input order.
    pub fn sort_pairs<B: ComputeBackend>(
        &self,
        backend: &B,
        keys: &mut B::Buffer<u32>,
        values: &mut B::Buffer<u32>,
    ) -> Result<()> {
        if keys.len() != values.len() {
            return Err(Error::LengthMismatch {
                what: "radix sort keys/values",
                left: keys.len(),
                right: values.len(),
            });
        }
        self.run(backend, keys, Some(values))
    }

    fn run<B: ComputeBackend>(
        &self,
        backend: &B,
        keys: &mut B::Buffer<u32>,
        mut values: Option<&mut B::Buffer<u32>>,
    ) -> Result<()> {
        let n = keys.len();
        if n == 0 {
            return Ok(());
        }
        let w = self.mask_width;
        let counted = (n as u64) << w;
        if counted > u32::MAX as u64 {
            return Err(Error::TooLarge { what: "radix counts", required: counted, limit: u32::MAX as u64 });
        }
        let counted = counted as usize;
        let ws = WorkSize::new(self.scan.group_size(), n)?;
        log::debug!(
            "[{}] radix sort: n={n}, {} passes of {w} bits{}",
            backend.name(),
            self.passes(),
            if values.is_some() { " with payload" } else { "" }
        );

        let mut counts = backend.alloc::<u32>(counted)?;
        let mut keys_out = backend.alloc::<u32>(n)?;
        let mut values_out = match values {
            Some(_) => Some(backend.alloc::<u32>(n)?),
            None => None,
        };

        for shift in (0..32).step_by(w as usize) {
            backend.radix_count(ws, RadixCountArgs {
                keys: &*keys,
                counts: &mut counts,
                n: n as u32,
                shift,
                mask_width: w,
            })?;

            let offsets = self.scan.scan(backend, &counts, counted)?;

            let payload = match (values.as_deref(), values_out.as_mut()) {
                (Some(values), Some(values_out)) => Some(Payload { values, values_out }),
                _ => None,
            };
            backend.radix_reorder(ws, RadixReorderArgs {
                keys: &*keys,
                offsets: &offsets,
                keys_out: &mut keys_out,
                payload,
                n: n as u32,
                shift,
                mask_width: w,
            })?;

            keys.swap(&mut keys_out);
            if let (Some(values), Some(values_out)) = (values.as_deref_mut(), values_out.as_mut()) {
                values.swap(values_out);
            }
        }
        Ok(())
    }

    /// Upload, sort and read back in one call.
    pub fn sort_slice<B: ComputeBackend>(&self, backend: &B, keys: &[u32]) -> Result<Vec<u32>> {
        let mut buf = backend.upload(keys)?;
        self.sort(backend, &mut buf)?;
        buf.to_vec()
    }

    /// Upload, sort by key and read both arrays back.
    pub fn sort_pairs_slice<B: ComputeBackend>(
        &self,
        backend: &B,
        keys: &[u32],
        values: &[u32],
    ) -> Result<(Vec<u32>, Vec<u32>)> {
        let mut k = backend.upload(keys)?;
        let mut v = backend.upload(values)?;
        self.sort_pairs(backend, &mut k, &mut v)?;
        Ok((k.to_vec()?, v.to_vec()?))
    }
}
