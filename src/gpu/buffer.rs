// gpu/buffer.rs — typed storage buffer with host transfers.
//
// A `GpuBuffer<T>` owns one wgpu storage buffer sized for `capacity`
// elements and tracks a logical length `len <= capacity`. Shrinking or
// growing within capacity only moves `len`; growing past it allocates a
// fresh buffer (old contents are not copied).
//
// TRANSFERS
// ─────────
// write — `queue.write_buffer`. wgpu stages the bytes and orders the copy
//         before the next submit, so the next pass sees them.
// read  — copy into a MAP_READ staging buffer, submit, `map_async`, then
//         `poll(Wait)`. Blocks until every earlier pass has completed.
//
// A zero-capacity buffer owns no wgpu allocation (wgpu rejects zero-sized
// storage bindings); passes over zero elements never bind it.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::dispatch::{check_range, DeviceBuffer};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::gpu::device::GpuDevice;

const ELEM_BYTES: u64 = 4;

pub struct GpuBuffer<T: Element> {
    raw: Option<wgpu::Buffer>,
    len: usize,
    capacity: usize,
    gpu: Arc<GpuDevice>,
    _elem: PhantomData<T>,
}

impl<T: Element> GpuBuffer<T> {
    /// Allocate `n` elements with undefined contents.
    pub fn new(gpu: &Arc<GpuDevice>, n: usize) -> Result<Self> {
        let raw = allocate(gpu, n)?;
        Ok(GpuBuffer { raw, len: n, capacity: n, gpu: Arc::clone(gpu), _elem: PhantomData })
    }

    /// The underlying wgpu buffer, if any storage is allocated.
    pub fn raw(&self) -> Option<&wgpu::Buffer> {
        self.raw.as_ref()
    }

    fn raw_for(&self, op: &'static str) -> Result<&wgpu::Buffer> {
        self.raw
            .as_ref()
            .ok_or_else(|| Error::Device(format!("{op} on a buffer without storage")))
    }
}

fn allocate(gpu: &GpuDevice, n: usize) -> Result<Option<wgpu::Buffer>> {
    if n == 0 {
        return Ok(None);
    }
    let bytes = n as u64 * ELEM_BYTES;
    let limit = gpu.max_buffer_bytes();
    if bytes > limit {
        return Err(Error::BufferTooLarge { bytes, limit });
    }
    log::trace!("allocating {bytes} byte storage buffer");
    Ok(Some(gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("parprim storage"),
        size: bytes,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })))
}

impl<T: Element> DeviceBuffer for GpuBuffer<T> {
    type Elem = T;

    fn len(&self) -> usize {
        self.len
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn resize(&mut self, n: usize) -> Result<()> {
        if n > self.capacity {
            self.raw = allocate(&self.gpu, n)?;
            self.capacity = n;
        }
        self.len = n;
        Ok(())
    }

    fn write(&mut self, src: &[T], offset: usize) -> Result<()> {
        check_range("write", offset, src.len(), self.len)?;
        if src.is_empty() {
            return Ok(());
        }
        log::trace!("write {} elements at {offset}", src.len());
        let raw = self.raw_for("write")?;
        self.gpu
            .queue
            .write_buffer(raw, offset as u64 * ELEM_BYTES, bytemuck::cast_slice(src));
        Ok(())
    }

    fn read(&self, dst: &mut [T], offset: usize) -> Result<()> {
        check_range("read", offset, dst.len(), self.len)?;
        if dst.is_empty() {
            return Ok(());
        }
        log::trace!("read {} elements at {offset}", dst.len());
        let raw = self.raw_for("read")?;
        let bytes = dst.len() as u64 * ELEM_BYTES;
        let device = &self.gpu.device;

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parprim readback"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("parprim readback"),
        });
        encoder.copy_buffer_to_buffer(raw, offset as u64 * ELEM_BYTES, &staging, 0, bytes);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| Error::Device("readback callback never fired".to_string()))??;

        {
            let mapped = slice.get_mapped_range();
            dst.copy_from_slice(bytemuck::cast_slice(&mapped));
        }
        staging.unmap();
        Ok(())
    }
}
