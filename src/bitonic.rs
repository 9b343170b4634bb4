// bitonic.rs — bitonic sorting network sequencer.
//
// PASS SEQUENCE
// ─────────────
// For merge-stage width bsize = 2, 4, 8, ... while bsize / 2 < n:
//
//   stride = bsize / 2
//   while stride * 2 > group_size:  one large-stride pass (bsize, stride),
//                                   stride /= 2
//   one small-stride pass (bsize, stride) that walks stride down to 1
//                                   inside a single work group
//
// Large strides pair elements in different groups and need one pass per
// stride. Once a pair fits in a group, all remaining strides of the stage
// run fused in one pass.
//
// The first stride of each stage uses the flip comparator (i ↔ i ^ (bsize-1)),
// so each stage merges two ascending runs and no descending half is ever
// materialised. Missing partners (index >= n) act as +∞, so n need not be a
// power of two.

use crate::config::check_group_size;
use crate::dispatch::{BitonicArgs, ComputeBackend, DeviceBuffer, EntryPoint, WorkSize};
use crate::element::Element;
use crate::error::{Error, Result};

/// Largest supported length; the next stage width must still fit in `u32`.
pub const MAX_LEN: usize = 1 << 31;

/// One compare-exchange dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitonicPass {
    pub kernel: EntryPoint,
    pub block_size: u32,
    pub stride: u32,
}

/// Ascending in-place sort through a bitonic network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitonicSorter {
    group_size: u32,
}

impl BitonicSorter {
    pub fn new(group_size: u32) -> Result<Self> {
        check_group_size(group_size)?;
        Ok(BitonicSorter { group_size })
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    /// The pass sequence for `n` elements. Empty for `n <= 1`.
    pub fn plan(&self, n: usize) -> Vec<BitonicPass> {
        let n = n as u64;
        let g = self.group_size as u64;
        let mut passes = Vec::new();
        let mut block = 2u64;
        while block / 2 < n {
            let mut stride = block / 2;
            while stride * 2 > g {
                passes.push(BitonicPass {
                    kernel: EntryPoint::BitonicLargeStride,
                    block_size: block as u32,
                    stride: stride as u32,
                });
                stride /= 2;
            }
            passes.push(BitonicPass {
                kernel: EntryPoint::BitonicSmallStride,
                block_size: block as u32,
                stride: stride as u32,
            });
            block *= 2;
        }
        passes
    }

    /// Sort `data[..n]` ascending in place.
    pub fn sort<B, T>(&self, backend: &B, data: &mut B::Buffer<T>, n: usize) -> Result<()>
    where
        B: ComputeBackend,
        T: Element,
    {
        if n > MAX_LEN {
            return Err(Error::TooLarge { what: "bitonic sort", required: n as u64, limit: MAX_LEN as u64 });
        }
        let ws = WorkSize::new(self.group_size, n)?;
        let passes = self.plan(n);
        log::debug!("[{}] bitonic sort: n={n}, {} passes", backend.name(), passes.len());

        for pass in passes {
            let args = BitonicArgs {
                data: &mut *data,
                n: n as u32,
                block_size: pass.block_size,
                stride: pass.stride,
            };
            match pass.kernel {
                EntryPoint::BitonicLargeStride => backend.bitonic_large_stride(ws, args)?,
                _ => backend.bitonic_small_stride(ws, args)?,
            }
        }
        Ok(())
    }

    /// Upload, sort and read back in one call.
    pub fn sort_slice<B, T>(&self, backend: &B, data: &[T]) -> Result<Vec<T>>
    where
        B: ComputeBackend,
        T: Element,
    {
        let mut buf = backend.upload(data)?;
        self.sort(backend, &mut buf, data.len())?;
        buf.to_vec()
    }
}
