// scan.rs — recursive block-decomposed inclusive prefix sum.
//
// ALGORITHM
// ─────────
// For n elements and group size g:
//
//   res_n      = n rounded up to a multiple of g
//   sums       = res_n elements      (result, padded)
//   block_sums = res_n / g + 1       (leading zero + one total per group)
//
//   scan-first   in-group scan of input into sums, group totals into
//                block_sums[1..]
//   if g >= n    done: one group covers everything
//   recurse      scan(block_sums) → exclusive offset of every group
//   scan-second  add each group's offset into its elements
//
// block_sums[0] must be zeroed explicitly: the scanned value at index k is
// the sum of totals of groups 0..k, which only holds if slot 0 adds nothing.
//
// Every level owns its own scratch buffers; they are dropped on return, so
// at most O(log_g n) levels of scratch are alive at once. The result buffer
// is shrunk to n and moved out to the caller.

use crate::config::check_group_size;
use crate::dispatch::{ComputeBackend, DeviceBuffer, EntryPoint, ScanFirstArgs, ScanSecondArgs, WorkSize};
use crate::element::ScanElement;
use crate::error::{Error, Result};

/// Inclusive prefix sum over device buffers of any length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEngine {
    group_size: u32,
}

impl ScanEngine {
    /// `group_size` must be a power of two in `4..=256`.
    pub fn new(group_size: u32) -> Result<Self> {
        check_group_size(group_size)?;
        Ok(ScanEngine { group_size })
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    /// Number of recursion levels a scan of `n` elements runs.
    pub fn levels(&self, n: usize) -> usize {
        let g = self.group_size as usize;
        let mut n = n;
        let mut levels = 0;
        while n > 0 {
            levels += 1;
            if g >= n {
                break;
            }
            n = n.div_ceil(g) + 1;
        }
        levels
    }

    /// Inclusive scan of `input[..n]`. Returns a new buffer of exactly `n`
    /// elements; `input` is only borrowed.
    pub fn scan<B, T>(&self, backend: &B, input: &B::Buffer<T>, n: usize) -> Result<B::Buffer<T>>
    where
        B: ComputeBackend,
        T: ScanElement,
    {
        if n > input.len() {
            return Err(Error::SizeMismatch {
                kernel: EntryPoint::ScanFirst,
                buffer: "input",
                required: n,
                actual: input.len(),
            });
        }
        if n == 0 {
            return backend.alloc(0);
        }
        if u32::try_from(n).is_err() {
            return Err(Error::TooLarge { what: "scan", required: n as u64, limit: u32::MAX as u64 });
        }
        self.scan_level(backend, input, n, 0)
    }

    fn scan_level<B, T>(
        &self,
        backend: &B,
        input: &B::Buffer<T>,
        n: usize,
        depth: usize,
    ) -> Result<B::Buffer<T>>
    where
        B: ComputeBackend,
        T: ScanElement,
    {
        let g = self.group_size as usize;
        let ws = WorkSize::new(self.group_size, n)?;
        let res_n = ws.total_width as usize;
        log::debug!("[{}] scan level {depth}: n={n} padded={res_n}", backend.name());

        let mut sums = backend.alloc::<T>(res_n)?;
        let mut block_sums = backend.alloc::<T>(res_n / g + 1)?;
        block_sums.write(&[T::ZERO], 0)?;

        backend.scan_first(ws, ScanFirstArgs {
            input,
            block_sums: &mut block_sums,
            sums: &mut sums,
            n: n as u32,
        })?;

        if g < n {
            let offsets = self.scan_level(backend, &block_sums, res_n / g + 1, depth + 1)?;
            drop(block_sums);
            backend.scan_second(ws, ScanSecondArgs { block_sums: &offsets, sums: &mut sums, n: n as u32 })?;
        }

        sums.resize(n)?;
        Ok(sums)
    }

    /// Upload, scan and read back in one call.
    pub fn scan_slice<B, T>(&self, backend: &B, data: &[T]) -> Result<Vec<T>>
    where
        B: ComputeBackend,
        T: ScanElement,
    {
        let input = backend.upload(data)?;
        self.scan(backend, &input, data.len())?.to_vec()
    }
}
