// host.rs — CPU execution of the compute-kernel set.
//
// `HostBackend` implements every kernel entry point in plain Rust with the
// same lane, group and padding rules as the WGSL kernels in src/shaders/.
// Orchestration code cannot tell the two backends apart, which lets the
// whole multi-pass machinery (recursion, ping-pong, work-size rounding) be
// exercised and tested on machines without a GPU.
//
// EXECUTION MODEL
// ───────────────
// Work groups run in parallel on the rayon pool; lanes within a group run
// sequentially. Kernels whose lanes write disjoint slots are expressed as
// `par_chunks_mut` over the group (or compare-exchange segment) they own.
// The radix scatter writes to data-dependent slots and runs sequentially.
//
// A pass returns only after all of its writes are done, so consecutive
// calls observe each other's effects in submission order.

use rayon::prelude::*;

use crate::dispatch::{
    check_range, BitonicArgs, ComputeBackend, DeviceBuffer, EntryPoint, MaxPairwiseArgs,
    RadixCountArgs, RadixReorderArgs, ScanFirstArgs, ScanSecondArgs, WorkSize,
};
use crate::element::{Element, ScanElement};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// HostBuffer
// ---------------------------------------------------------------------------

/// Host-memory stand-in for a device buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBuffer<T> {
    data: Vec<T>,
}

impl<T: Element> HostBuffer<T> {
    pub fn from_vec(data: Vec<T>) -> Self {
        HostBuffer { data }
    }

    /// Direct view of the logical range. Host-only; device buffers must
    /// go through `read`.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T: Element> DeviceBuffer for HostBuffer<T> {
    type Elem = T;

    fn len(&self) -> usize {
        self.data.len()
    }

    fn capacity(&self) -> usize {
        self.data.capacity()
    }

    fn resize(&mut self, n: usize) -> Result<()> {
        self.data.resize(n, T::default());
        Ok(())
    }

    fn write(&mut self, src: &[T], offset: usize) -> Result<()> {
        check_range("write", offset, src.len(), self.data.len())?;
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn read(&self, dst: &mut [T], offset: usize) -> Result<()> {
        check_range("read", offset, dst.len(), self.data.len())?;
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HostBackend
// ---------------------------------------------------------------------------

/// CPU backend. Stateless; cheap to create and copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        HostBackend
    }
}

fn log_pass(entry: EntryPoint, ws: &WorkSize) {
    log::debug!("[host] {entry} over {ws}");
}

impl ComputeBackend for HostBackend {
    type Buffer<T: Element> = HostBuffer<T>;

    fn name(&self) -> &str {
        "host"
    }

    fn alloc<T: Element>(&self, n: usize) -> Result<HostBuffer<T>> {
        Ok(HostBuffer { data: vec![T::default(); n] })
    }

    fn scan_first<T: ScanElement>(
        &self,
        ws: WorkSize,
        args: ScanFirstArgs<'_, HostBuffer<T>>,
    ) -> Result<()> {
        args.check(&ws)?;
        log_pass(EntryPoint::ScanFirst, &ws);

        let g = ws.group_size as usize;
        let n = args.n as usize;
        let groups = ws.num_groups() as usize;
        let input = &args.input.data[..n];

        // Padding lanes contribute zero, so they carry the group total.
        let totals: Vec<T> = args.sums.data[..groups * g]
            .par_chunks_mut(g)
            .enumerate()
            .map(|(group, out)| {
                let start = group * g;
                let valid = n.saturating_sub(start).min(g);
                let mut acc = T::ZERO;
                for (lane, slot) in out.iter_mut().enumerate() {
                    if lane < valid {
                        acc = acc.add(input[start + lane]);
                    }
                    *slot = acc;
                }
                acc
            })
            .collect();

        args.block_sums.data[1..=groups].copy_from_slice(&totals);
        Ok(())
    }

    fn scan_second<T: ScanElement>(
        &self,
        ws: WorkSize,
        args: ScanSecondArgs<'_, HostBuffer<T>>,
    ) -> Result<()> {
        args.check(&ws)?;
        log_pass(EntryPoint::ScanSecond, &ws);

        let g = ws.group_size as usize;
        let n = args.n as usize;
        let offsets = &args.block_sums.data;
        args.sums.data[..n]
            .par_chunks_mut(g)
            .enumerate()
            .for_each(|(group, chunk)| {
                let offset = offsets[group];
                for x in chunk {
                    *x = x.add(offset);
                }
            });
        Ok(())
    }

    fn bitonic_large_stride<T: Element>(
        &self,
        ws: WorkSize,
        args: BitonicArgs<'_, HostBuffer<T>>,
    ) -> Result<()> {
        args.check(EntryPoint::BitonicLargeStride, &ws)?;
        log_pass(EntryPoint::BitonicLargeStride, &ws);

        let n = args.n as usize;
        let block = args.block_size as usize;
        let stride = args.stride as usize;
        if n == 0 {
            return Ok(());
        }
        // Every compare-exchange pair lies inside one aligned segment.
        let span = if stride * 2 == block { block } else { stride * 2 };
        args.data.data[..n]
            .par_chunks_mut(span)
            .for_each(|seg| compare_exchange(seg, block, stride));
        Ok(())
    }

    fn bitonic_small_stride<T: Element>(
        &self,
        ws: WorkSize,
        args: BitonicArgs<'_, HostBuffer<T>>,
    ) -> Result<()> {
        args.check(EntryPoint::BitonicSmallStride, &ws)?;
        log_pass(EntryPoint::BitonicSmallStride, &ws);

        let n = args.n as usize;
        let block = args.block_size as usize;
        let first_stride = args.stride as usize;
        if n == 0 {
            return Ok(());
        }
        args.data.data[..n]
            .par_chunks_mut(ws.group_size as usize)
            .for_each(|group| {
                let mut stride = first_stride;
                while stride > 0 {
                    compare_exchange(group, block, stride);
                    stride /= 2;
                }
            });
        Ok(())
    }

    fn radix_count(&self, ws: WorkSize, args: RadixCountArgs<'_, HostBuffer<u32>>) -> Result<()> {
        args.check(&ws)?;
        log_pass(EntryPoint::RadixCount, &ws);

        let n = args.n as usize;
        if n == 0 {
            return Ok(());
        }
        let shift = args.shift;
        let mask = (1u32 << args.mask_width) - 1;
        let keys = &args.keys.data[..n];
        args.counts.data[..n << args.mask_width]
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(bucket, row)| {
                for (slot, &key) in row.iter_mut().zip(keys) {
                    *slot = u32::from((key >> shift) & mask == bucket as u32);
                }
            });
        Ok(())
    }

    fn radix_reorder(
        &self,
        ws: WorkSize,
        mut args: RadixReorderArgs<'_, HostBuffer<u32>>,
    ) -> Result<()> {
        args.check(&ws)?;
        let entry = args.entry_point();
        log_pass(entry, &ws);

        let n = args.n as usize;
        let mask = (1u32 << args.mask_width) - 1;
        let offsets = &args.offsets.data;
        for (i, &key) in args.keys.data[..n].iter().enumerate() {
            let digit = ((key >> args.shift) & mask) as usize;
            let dst = (offsets[digit * n + i] as usize).wrapping_sub(1);
            if dst >= n {
                return Err(Error::Device(format!(
                    "{entry}: scanned offset {} for element {i} is outside 1..={n}",
                    offsets[digit * n + i]
                )));
            }
            args.keys_out.data[dst] = key;
            if let Some(payload) = args.payload.as_mut() {
                payload.values_out.data[dst] = payload.values.data[i];
            }
        }
        Ok(())
    }

    fn max_pairwise(
        &self,
        ws: WorkSize,
        args: MaxPairwiseArgs<'_, HostBuffer<i32>, HostBuffer<u32>>,
    ) -> Result<()> {
        args.check(&ws)?;
        log_pass(EntryPoint::MaxPairwise, &ws);

        let m = args.m as usize;
        let half = args.half as usize;
        let sums = &args.sums.data;
        let prefix = |len: u32| if len == 0 { 0 } else { sums[len as usize - 1] };

        let (lo, hi) = args.maxes.data[..m].split_at_mut(half);
        lo[..m - half]
            .par_iter_mut()
            .zip(hi.par_iter())
            .for_each(|(a, &b)| {
                let (va, vb) = (prefix(*a), prefix(b));
                if vb > va || (vb == va && b < *a) {
                    *a = b;
                }
            });
        Ok(())
    }
}

/// One compare-exchange step over a segment aligned to its pairing span.
///
/// `stride == block / 2` pairs `i` with `i ^ (block - 1)`, smaller strides
/// pair `i` with `i ^ stride`. Partners past the end of the segment stand
/// for +∞ and are left alone.
fn compare_exchange<T: Element>(seg: &mut [T], block: usize, stride: usize) {
    let flip = stride * 2 == block;
    for i in 0..seg.len() {
        let j = if flip { i ^ (block - 1) } else { i ^ stride };
        if j > i && j < seg.len() && seg[j] < seg[i] {
            seg.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_resize_keeps_prefix() {
        let mut buf = HostBuffer::from_vec(vec![1u32, 2, 3, 4]);
        buf.resize(2).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2]);
        buf.resize(3).unwrap();
        assert_eq!(&buf.as_slice()[..2], &[1, 2]);
        assert!(buf.len() <= buf.capacity());
    }

    #[test]
    fn test_buffer_out_of_range() {
        let mut buf = HostBuffer::from_vec(vec![0i32; 4]);
        assert!(matches!(buf.write(&[1, 2], 3), Err(Error::OutOfRange { .. })));
        let mut dst = [0i32; 5];
        assert!(matches!(buf.read(&mut dst, 0), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_buffer_swap_exchanges_counts() {
        let mut a = HostBuffer::from_vec(vec![1u32, 2, 3]);
        let mut b = HostBuffer::from_vec(vec![9u32]);
        a.swap(&mut b);
        assert_eq!(a.as_slice(), &[9]);
        assert_eq!(b.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_scan_first_writes_group_totals() {
        let backend = HostBackend::new();
        let input = HostBuffer::from_vec(vec![1u32, 2, 3, 4, 5]);
        let mut sums = backend.alloc::<u32>(8).unwrap();
        let mut block_sums = backend.alloc::<u32>(3).unwrap();
        let ws = WorkSize::new(4, 5).unwrap();
        backend
            .scan_first(ws, ScanFirstArgs {
                input: &input,
                block_sums: &mut block_sums,
                sums: &mut sums,
                n: 5,
            })
            .unwrap();
        assert_eq!(&sums.as_slice()[..5], &[1, 3, 6, 10, 5]);
        // Padding lanes hold the running group total.
        assert_eq!(&sums.as_slice()[5..], &[5, 5, 5]);
        assert_eq!(&block_sums.as_slice()[1..], &[10, 5]);
    }

    #[test]
    fn test_scan_first_rejects_short_sums() {
        let backend = HostBackend::new();
        let input = HostBuffer::from_vec(vec![1u32; 5]);
        let mut sums = backend.alloc::<u32>(5).unwrap();
        let mut block_sums = backend.alloc::<u32>(3).unwrap();
        let ws = WorkSize::new(4, 5).unwrap();
        let err = backend
            .scan_first(ws, ScanFirstArgs {
                input: &input,
                block_sums: &mut block_sums,
                sums: &mut sums,
                n: 5,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch { kernel: EntryPoint::ScanFirst, buffer: "sums", required: 8, actual: 5 }
        ));
    }

    #[test]
    fn test_compare_exchange_flip() {
        // Flip pairs 0↔3 and 1↔2; only (5, 2) is out of order.
        let mut seg = vec![1, 5, 2, 6];
        compare_exchange(&mut seg, 4, 2);
        assert_eq!(seg, vec![1, 2, 5, 6]);

        let mut seg = vec![5, 6, 1, 2];
        compare_exchange(&mut seg, 4, 2);
        assert_eq!(seg, vec![2, 1, 6, 5]);
    }

    #[test]
    fn test_compare_exchange_ignores_missing_partner() {
        let mut seg = vec![9, 1, 7];
        compare_exchange(&mut seg, 4, 2);
        // 0 ↔ 3 has no partner; 1 ↔ 2 is already ordered.
        assert_eq!(seg, vec![9, 1, 7]);
    }

    #[test]
    fn test_radix_count_is_bucket_major() {
        let backend = HostBackend::new();
        let keys = HostBuffer::from_vec(vec![0b01u32, 0b11, 0b00]);
        let mut counts = backend.alloc::<u32>(3 * 4).unwrap();
        let ws = WorkSize::new(4, 3).unwrap();
        backend
            .radix_count(ws, RadixCountArgs { keys: &keys, counts: &mut counts, n: 3, shift: 0, mask_width: 2 })
            .unwrap();
        assert_eq!(
            counts.as_slice(),
            &[0, 0, 1, /* bucket 1 */ 1, 0, 0, /* bucket 2 */ 0, 0, 0, /* bucket 3 */ 0, 1, 0]
        );
    }

    #[test]
    fn test_max_pairwise_prefers_shorter_prefix_on_tie() {
        let backend = HostBackend::new();
        // Prefix sums of [1, -1, 1]: lengths 0..=3 have sums 0, 1, 0, 1.
        let sums = HostBuffer::from_vec(vec![1i32, 0, 1]);
        let mut maxes = HostBuffer::from_vec(vec![0u32, 1, 2, 3]);
        let ws = WorkSize::new(4, 2).unwrap();
        backend
            .max_pairwise(ws, MaxPairwiseArgs { sums: &sums, maxes: &mut maxes, m: 4, half: 2 })
            .unwrap();
        // slot 0: len 0 (0) vs len 2 (0) → 0; slot 1: len 1 (1) vs len 3 (1) → 1.
        assert_eq!(&maxes.as_slice()[..2], &[0, 1]);
    }
}
