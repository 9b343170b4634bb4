// dispatch.rs — the device buffer / kernel dispatch contract.
//
// Every algorithm in this crate is written against two traits:
//
//   DeviceBuffer    — an owning handle to linear device memory of one
//                     element type: resize, read, write, O(1) swap.
//   ComputeBackend  — a device + one ordered queue. One method per kernel
//                     entry point; each call enqueues exactly one pass.
//
// ORDERING CONTRACT
// ─────────────────
// Passes issued on the same backend execute in submission order and each
// pass observes the complete memory effects of every earlier pass. Reads
// and writes from the host are synchronous. The orchestration code relies
// on this and never fences explicitly.
//
// ARGUMENT STRUCTS
// ────────────────
// Each entry point takes a dedicated struct instead of a positional list.
// Field order is binding order in the WGSL source. `check()` enforces the
// size contract before anything is enqueued: a pass that would touch more
// elements than a buffer holds fails with `Error::SizeMismatch`.

use std::fmt;

use crate::element::{Element, ScanElement};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// DeviceBuffer
// ---------------------------------------------------------------------------

/// Owning handle to device-resident linear memory.
///
/// Invariant: `len() <= capacity()`. Host transfers must stay inside
/// `[0, len())`.
pub trait DeviceBuffer: Sized {
    type Elem: Element;

    /// Logical element count.
    fn len(&self) -> usize;

    /// Number of elements the current allocation can hold.
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change the logical element count.
    ///
    /// Shrinking, or growing within capacity, keeps the retained prefix.
    /// Growing past capacity reallocates; contents are then undefined.
    fn resize(&mut self, n: usize) -> Result<()>;

    /// Copy `src` into elements `[offset, offset + src.len())`.
    fn write(&mut self, src: &[Self::Elem], offset: usize) -> Result<()>;

    /// Copy elements `[offset, offset + dst.len())` into `dst`. Blocks
    /// until every previously enqueued pass has finished.
    fn read(&self, dst: &mut [Self::Elem], offset: usize) -> Result<()>;

    /// Exchange storage (element counts included) with `other` in O(1).
    fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Read the whole logical range back to the host.
    fn to_vec(&self) -> Result<Vec<Self::Elem>> {
        let mut out = vec![Self::Elem::default(); self.len()];
        if !out.is_empty() {
            self.read(&mut out, 0)?;
        }
        Ok(out)
    }
}

/// Validate a host transfer of `count` elements at `offset` against `len`.
pub(crate) fn check_range(op: &'static str, offset: usize, count: usize, len: usize) -> Result<()> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::OutOfRange { op, offset, count, len }),
    }
}

// ---------------------------------------------------------------------------
// WorkSize
// ---------------------------------------------------------------------------

/// Work-size descriptor: `(group_size, total_width)`.
///
/// `total_width` is the logical count rounded up to a multiple of
/// `group_size`. Kernels bounds-check the padding lanes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSize {
    pub group_size: u32,
    pub total_width: u32,
}

impl WorkSize {
    /// Cover `count` lanes with groups of `group_size`.
    pub fn new(group_size: u32, count: usize) -> Result<Self> {
        let invalid = || Error::InvalidWorkSize { group_size, total_width: 0, count };
        if group_size == 0 {
            return Err(invalid());
        }
        let total_width = round_up(count as u64, group_size as u64);
        let total_width = u32::try_from(total_width).map_err(|_| invalid())?;
        Ok(WorkSize { group_size, total_width })
    }

    /// Number of work groups (`total_width / group_size`).
    pub fn num_groups(&self) -> u32 {
        self.total_width / self.group_size
    }

    /// Fails unless this descriptor is group-aligned and covers `count`.
    pub fn check_covers(&self, count: usize) -> Result<()> {
        let aligned = self.group_size > 0 && self.total_width % self.group_size == 0;
        if !aligned || (self.total_width as usize) < count {
            return Err(Error::InvalidWorkSize {
                group_size: self.group_size,
                total_width: self.total_width,
                count,
            });
        }
        Ok(())
    }
}

impl fmt::Display for WorkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group_size == 0 {
            return write!(f, "(0, {})", self.total_width);
        }
        write!(f, "{}×{}", self.num_groups(), self.group_size)
    }
}

/// Round `value` up to the next multiple of `multiple`.
#[inline]
pub fn round_up(value: u64, multiple: u64) -> u64 {
    (value + multiple - 1) / multiple * multiple
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Named kernel entry points of the compute-kernel set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    ScanFirst,
    ScanSecond,
    BitonicLargeStride,
    BitonicSmallStride,
    RadixCount,
    RadixReorder,
    RadixReorderPairs,
    MaxPairwise,
}

impl EntryPoint {
    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::ScanFirst => "scan-first",
            EntryPoint::ScanSecond => "scan-second",
            EntryPoint::BitonicLargeStride => "bitonic-large-stride",
            EntryPoint::BitonicSmallStride => "bitonic-small-stride",
            EntryPoint::RadixCount => "radix-count",
            EntryPoint::RadixReorder => "radix-reorder",
            EntryPoint::RadixReorderPairs => "radix-reorder-pairs",
            EntryPoint::MaxPairwise => "max-pairwise",
        }
    }

    /// Function name in the WGSL source.
    pub fn wgsl_fn(self) -> &'static str {
        match self {
            EntryPoint::ScanFirst => "scan_first",
            EntryPoint::ScanSecond => "scan_second",
            EntryPoint::BitonicLargeStride => "bitonic_large",
            EntryPoint::BitonicSmallStride => "bitonic_small",
            EntryPoint::RadixCount => "radix_count",
            EntryPoint::RadixReorder => "radix_reorder",
            EntryPoint::RadixReorderPairs => "radix_reorder_pairs",
            EntryPoint::MaxPairwise => "max_pairwise",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn require(kernel: EntryPoint, buffer: &'static str, actual: usize, required: usize) -> Result<()> {
    if actual < required {
        return Err(Error::SizeMismatch { kernel, buffer, required, actual });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-kernel arguments
// ---------------------------------------------------------------------------

/// `scan-first`: in-group inclusive scan of `input[..n]` into `sums`, and
/// each group's total into `block_sums[group + 1]`.
pub struct ScanFirstArgs<'a, B> {
    pub input: &'a B,
    pub block_sums: &'a mut B,
    pub sums: &'a mut B,
    pub n: u32,
}

impl<B: DeviceBuffer> ScanFirstArgs<'_, B> {
    pub fn check(&self, ws: &WorkSize) -> Result<()> {
        let n = self.n as usize;
        ws.check_covers(n)?;
        let groups = ws.num_groups() as usize;
        let padded = groups * ws.group_size as usize;
        require(EntryPoint::ScanFirst, "input", self.input.len(), n)?;
        require(EntryPoint::ScanFirst, "sums", self.sums.len(), padded)?;
        require(EntryPoint::ScanFirst, "block_sums", self.block_sums.len(), groups + 1)
    }
}

/// `scan-second`: add `block_sums[group]` (already scanned, so the
/// exclusive offset of that group) into every element of the group.
pub struct ScanSecondArgs<'a, B> {
    pub block_sums: &'a B,
    pub sums: &'a mut B,
    pub n: u32,
}

impl<B: DeviceBuffer> ScanSecondArgs<'_, B> {
    pub fn check(&self, ws: &WorkSize) -> Result<()> {
        let n = self.n as usize;
        ws.check_covers(n)?;
        let groups = ws.num_groups() as usize;
        require(EntryPoint::ScanSecond, "sums", self.sums.len(), n)?;
        require(EntryPoint::ScanSecond, "block_sums", self.block_sums.len(), groups)
    }
}

/// Arguments shared by both bitonic compare-exchange kernels.
///
/// `stride == block_size / 2` selects the flip comparator
/// (`i ↔ i ^ (block_size - 1)`), any smaller stride the half-cleaner
/// (`i ↔ i ^ stride`). The small-stride kernel walks `stride` down to 1.
pub struct BitonicArgs<'a, B> {
    pub data: &'a mut B,
    pub n: u32,
    pub block_size: u32,
    pub stride: u32,
}

impl<B: DeviceBuffer> BitonicArgs<'_, B> {
    pub fn check(&self, kernel: EntryPoint, ws: &WorkSize) -> Result<()> {
        ws.check_covers(self.n as usize)?;
        let valid = self.block_size.is_power_of_two()
            && self.stride > 0
            && self.stride.is_power_of_two()
            && self.stride * 2 <= self.block_size;
        if !valid {
            return Err(Error::Config(format!(
                "{kernel}: stride {} is not a power of two at most half of block {}",
                self.stride, self.block_size
            )));
        }
        if kernel == EntryPoint::BitonicSmallStride && self.stride * 2 > ws.group_size {
            return Err(Error::Config(format!(
                "{kernel}: stride {} spans more than one group of {}",
                self.stride, ws.group_size
            )));
        }
        require(kernel, "data", self.data.len(), self.n as usize)
    }
}

/// `radix-count`: one-hot bucket indicators, bucket-major:
/// `counts[b * n + i] = (digit(keys[i]) == b)`.
pub struct RadixCountArgs<'a, B> {
    pub keys: &'a B,
    pub counts: &'a mut B,
    pub n: u32,
    pub shift: u32,
    pub mask_width: u32,
}

impl<B: DeviceBuffer> RadixCountArgs<'_, B> {
    pub fn check(&self, ws: &WorkSize) -> Result<()> {
        let n = self.n as usize;
        ws.check_covers(n)?;
        check_digit(EntryPoint::RadixCount, self.shift, self.mask_width)?;
        require(EntryPoint::RadixCount, "keys", self.keys.len(), n)?;
        require(EntryPoint::RadixCount, "counts", self.counts.len(), n << self.mask_width)
    }
}

/// A payload moved alongside the keys by `radix-reorder`.
pub struct Payload<'a, B> {
    pub values: &'a B,
    pub values_out: &'a mut B,
}

/// `radix-reorder`: scatter `keys[i]` to `keys_out[offsets[digit * n + i] - 1]`.
pub struct RadixReorderArgs<'a, B> {
    pub keys: &'a B,
    pub offsets: &'a B,
    pub keys_out: &'a mut B,
    pub payload: Option<Payload<'a, B>>,
    pub n: u32,
    pub shift: u32,
    pub mask_width: u32,
}

impl<B: DeviceBuffer> RadixReorderArgs<'_, B> {
    pub fn entry_point(&self) -> EntryPoint {
        if self.payload.is_some() {
            EntryPoint::RadixReorderPairs
        } else {
            EntryPoint::RadixReorder
        }
    }

    pub fn check(&self, ws: &WorkSize) -> Result<()> {
        let kernel = self.entry_point();
        let n = self.n as usize;
        ws.check_covers(n)?;
        check_digit(kernel, self.shift, self.mask_width)?;
        require(kernel, "keys", self.keys.len(), n)?;
        require(kernel, "offsets", self.offsets.len(), n << self.mask_width)?;
        require(kernel, "keys_out", self.keys_out.len(), n)?;
        if let Some(payload) = &self.payload {
            require(kernel, "values", payload.values.len(), n)?;
            require(kernel, "values_out", payload.values_out.len(), n)?;
        }
        Ok(())
    }
}

fn check_digit(kernel: EntryPoint, shift: u32, mask_width: u32) -> Result<()> {
    if mask_width == 0 || mask_width > 8 || shift >= 32 {
        return Err(Error::Config(format!(
            "{kernel}: digit at bit {shift} of width {mask_width} is outside a 32-bit key"
        )));
    }
    Ok(())
}

/// `max-pairwise`: for `k < m - half`, keep in `maxes[k]` whichever of the
/// prefix lengths `maxes[k]`, `maxes[k + half]` has the larger prefix sum,
/// the shorter prefix winning ties. The prefix sum of length `len` is
/// `sums[len - 1]`; length 0 is the empty prefix with sum 0.
pub struct MaxPairwiseArgs<'a, S, M> {
    pub sums: &'a S,
    pub maxes: &'a mut M,
    pub m: u32,
    pub half: u32,
}

impl<S: DeviceBuffer, M: DeviceBuffer> MaxPairwiseArgs<'_, S, M> {
    pub fn check(&self, ws: &WorkSize) -> Result<()> {
        let pairs = self.m.saturating_sub(self.half) as usize;
        ws.check_covers(pairs)?;
        if self.half == 0 || self.half > self.m || self.m - self.half > self.half {
            return Err(Error::Config(format!(
                "{}: half {} does not split active length {}",
                EntryPoint::MaxPairwise,
                self.half,
                self.m
            )));
        }
        require(EntryPoint::MaxPairwise, "maxes", self.maxes.len(), self.m as usize)?;
        // Entries are prefix lengths below the first level's active length,
        // so at that level the kernel reads at most sums[m - 2].
        require(EntryPoint::MaxPairwise, "sums", self.sums.len(), self.m as usize - 1)
    }
}

// ---------------------------------------------------------------------------
// ComputeBackend
// ---------------------------------------------------------------------------

/// A device plus one ordered command queue.
///
/// Each entry-point method enqueues exactly one pass after validating its
/// arguments with `check()`.
pub trait ComputeBackend {
    type Buffer<T: Element>: DeviceBuffer<Elem = T>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Allocate a buffer of `n` elements with undefined contents.
    fn alloc<T: Element>(&self, n: usize) -> Result<Self::Buffer<T>>;

    /// Allocate a buffer holding a copy of `data`.
    fn upload<T: Element>(&self, data: &[T]) -> Result<Self::Buffer<T>> {
        let mut buf = self.alloc(data.len())?;
        if !data.is_empty() {
            buf.write(data, 0)?;
        }
        Ok(buf)
    }

    fn scan_first<T: ScanElement>(
        &self,
        ws: WorkSize,
        args: ScanFirstArgs<'_, Self::Buffer<T>>,
    ) -> Result<()>;

    fn scan_second<T: ScanElement>(
        &self,
        ws: WorkSize,
        args: ScanSecondArgs<'_, Self::Buffer<T>>,
    ) -> Result<()>;

    fn bitonic_large_stride<T: Element>(
        &self,
        ws: WorkSize,
        args: BitonicArgs<'_, Self::Buffer<T>>,
    ) -> Result<()>;

    fn bitonic_small_stride<T: Element>(
        &self,
        ws: WorkSize,
        args: BitonicArgs<'_, Self::Buffer<T>>,
    ) -> Result<()>;

    fn radix_count(&self, ws: WorkSize, args: RadixCountArgs<'_, Self::Buffer<u32>>) -> Result<()>;

    fn radix_reorder(
        &self,
        ws: WorkSize,
        args: RadixReorderArgs<'_, Self::Buffer<u32>>,
    ) -> Result<()>;

    fn max_pairwise(
        &self,
        ws: WorkSize,
        args: MaxPairwiseArgs<'_, Self::Buffer<i32>, Self::Buffer<u32>>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_size_rounds_up() {
        let ws = WorkSize::new(128, 129).unwrap();
        assert_eq!(ws.total_width, 256);
        assert_eq!(ws.num_groups(), 2);

        let ws = WorkSize::new(128, 128).unwrap();
        assert_eq!(ws.total_width, 128);
        assert_eq!(ws.num_groups(), 1);
    }

    #[test]
    fn test_work_size_zero_count() {
        let ws = WorkSize::new(64, 0).unwrap();
        assert_eq!(ws.total_width, 0);
        assert_eq!(ws.num_groups(), 0);
    }

    #[test]
    fn test_work_size_rejects_zero_group() {
        assert!(matches!(WorkSize::new(0, 10), Err(Error::InvalidWorkSize { .. })));
    }

    #[test]
    fn test_check_covers() {
        let ws = WorkSize { group_size: 4, total_width: 8 };
        assert!(ws.check_covers(8).is_ok());
        assert!(ws.check_covers(5).is_ok());
        assert!(ws.check_covers(9).is_err());

        let unaligned = WorkSize { group_size: 4, total_width: 6 };
        assert!(unaligned.check_covers(1).is_err());
    }

    #[test]
    fn test_check_range() {
        assert!(check_range("read", 0, 4, 4).is_ok());
        assert!(check_range("read", 3, 1, 4).is_ok());
        assert!(check_range("read", 3, 2, 4).is_err());
        assert!(check_range("write", usize::MAX, 2, 4).is_err());
    }

    #[test]
    fn test_entry_point_names() {
        assert_eq!(EntryPoint::ScanFirst.to_string(), "scan-first");
        assert_eq!(EntryPoint::BitonicSmallStride.wgsl_fn(), "bitonic_small");
        assert_eq!(EntryPoint::MaxPairwise.name(), "max-pairwise");
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 128), 0);
        assert_eq!(round_up(1, 128), 128);
        assert_eq!(round_up(128, 128), 128);
        assert_eq!(round_up(129, 128), 256);
    }
}
