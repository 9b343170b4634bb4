// gpu/backend.rs — `ComputeBackend` over a wgpu device.
//
// Every entry point validates its arguments, then records exactly one
// compute pass and submits it on the device's single queue. Queue order
// gives the read-after-write guarantee between consecutive passes; only
// host reads block.

use std::sync::Arc;

use crate::dispatch::{
    BitonicArgs, ComputeBackend, EntryPoint, MaxPairwiseArgs, RadixCountArgs, RadixReorderArgs,
    ScanFirstArgs, ScanSecondArgs, WorkSize,
};
use crate::element::{Element, ScanElement};
use crate::error::Result;
use crate::gpu::buffer::GpuBuffer;
use crate::gpu::device::GpuDevice;
use crate::gpu::kernels::{KernelCache, Params};

pub struct GpuBackend {
    gpu: Arc<GpuDevice>,
    kernels: KernelCache,
}

impl GpuBackend {
    pub fn new(gpu: GpuDevice) -> Self {
        GpuBackend { gpu: Arc::new(gpu), kernels: KernelCache::default() }
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    fn bitonic<T: Element>(
        &self,
        entry: EntryPoint,
        ws: WorkSize,
        args: BitonicArgs<'_, GpuBuffer<T>>,
    ) -> Result<()> {
        args.check(entry, &ws)?;
        self.kernels.launch(
            &self.gpu,
            entry,
            T::WGSL_TYPE,
            ws,
            Params::new(args.n, args.block_size, args.stride),
            &[args.data.raw()],
        )
    }
}

impl ComputeBackend for GpuBackend {
    type Buffer<T: Element> = GpuBuffer<T>;

    fn name(&self) -> &str {
        "gpu"
    }

    fn alloc<T: Element>(&self, n: usize) -> Result<GpuBuffer<T>> {
        GpuBuffer::new(&self.gpu, n)
    }

    fn scan_first<T: ScanElement>(&self, ws: WorkSize, args: ScanFirstArgs<'_, GpuBuffer<T>>) -> Result<()> {
        args.check(&ws)?;
        self.kernels.launch(
            &self.gpu,
            EntryPoint::ScanFirst,
            T::WGSL_TYPE,
            ws,
            Params::new(args.n, 0, 0),
            &[args.input.raw(), args.block_sums.raw(), args.sums.raw()],
        )
    }

    fn scan_second<T: ScanElement>(&self, ws: WorkSize, args: ScanSecondArgs<'_, GpuBuffer<T>>) -> Result<()> {
        args.check(&ws)?;
        self.kernels.launch(
            &self.gpu,
            EntryPoint::ScanSecond,
            T::WGSL_TYPE,
            ws,
            Params::new(args.n, 0, 0),
            &[args.block_sums.raw(), args.sums.raw()],
        )
    }

    fn bitonic_large_stride<T: Element>(&self, ws: WorkSize, args: BitonicArgs<'_, GpuBuffer<T>>) -> Result<()> {
        self.bitonic(EntryPoint::BitonicLargeStride, ws, args)
    }

    fn bitonic_small_stride<T: Element>(&self, ws: WorkSize, args: BitonicArgs<'_, GpuBuffer<T>>) -> Result<()> {
        self.bitonic(EntryPoint::BitonicSmallStride, ws, args)
    }

    fn radix_count(&self, ws: WorkSize, args: RadixCountArgs<'_, GpuBuffer<u32>>) -> Result<()> {
        args.check(&ws)?;
        self.kernels.launch(
            &self.gpu,
            EntryPoint::RadixCount,
            u32::WGSL_TYPE,
            ws,
            Params::new(args.n, args.shift, args.mask_width),
            &[args.keys.raw(), args.counts.raw()],
        )
    }

    fn radix_reorder(&self, ws: WorkSize, args: RadixReorderArgs<'_, GpuBuffer<u32>>) -> Result<()> {
        args.check(&ws)?;
        let entry = args.entry_point();
        let params = Params::new(args.n, args.shift, args.mask_width);
        match &args.payload {
            Some(payload) => self.kernels.launch(
                &self.gpu,
                entry,
                u32::WGSL_TYPE,
                ws,
                params,
                &[
                    args.keys.raw(),
                    args.offsets.raw(),
                    args.keys_out.raw(),
                    payload.values.raw(),
                    payload.values_out.raw(),
                ],
            ),
            None => self.kernels.launch(
                &self.gpu,
                entry,
                u32::WGSL_TYPE,
                ws,
                params,
                &[args.keys.raw(), args.offsets.raw(), args.keys_out.raw()],
            ),
        }
    }

    fn max_pairwise(
        &self,
        ws: WorkSize,
        args: MaxPairwiseArgs<'_, GpuBuffer<i32>, GpuBuffer<u32>>,
    ) -> Result<()> {
        args.check(&ws)?;
        self.kernels.launch(
            &self.gpu,
            EntryPoint::MaxPairwise,
            u32::WGSL_TYPE,
            ws,
            Params::new(args.m, args.half, 0),
            &[args.sums.raw(), args.maxes.raw()],
        )
    }
}
