// gpu/kernels.rs — WGSL templates, pipeline cache and the launch path.
//
// TEMPLATES
// ─────────
// Each shader file holds one kernel family and is specialised by text
// substitution before compilation:
//
//   {{ELEM}}        element type (u32 / i32 / f32)
//   {{BLOCK_SIZE}}  lanes per work group; also sizes the workgroup tiles
//
// Pipelines are compiled on first use and cached per
// (entry point, element type, group size).
//
// BINDINGS
// ────────
// Within a family every entry point shares one binding numbering, so a
// module never declares two variables at the same slot. Each entry point
// binds only the subset it uses, followed by the `Params` uniform.
//
// GRID
// ────
// wgpu caps a dispatch at `max_compute_workgroups_per_dimension` groups
// per axis (65535 by default). Larger passes fold into a 2-D grid; kernels
// recover the linear group index as `wg.y * groups_x + wg.x` and discard
// the overshoot of the last row.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wgpu::util::DeviceExt;

use crate::dispatch::{EntryPoint, WorkSize};
use crate::error::{Error, Result};
use crate::gpu::device::GpuDevice;

const SCAN_WGSL: &str = include_str!("../shaders/scan.wgsl");
const BITONIC_WGSL: &str = include_str!("../shaders/bitonic.wgsl");
const RADIX_WGSL: &str = include_str!("../shaders/radix.wgsl");
const MAX_PREFIX_WGSL: &str = include_str!("../shaders/max_prefix.wgsl");

// ---------------------------------------------------------------------------
// Uniform params (must match every WGSL `struct Params` exactly)
// ---------------------------------------------------------------------------

/// Scalar arguments of one pass. Each family names `arg0`/`arg1` in its
/// own WGSL struct (block_size/stride, shift/mask_width, half/-).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct Params {
    pub n: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub groups_x: u32,
}

impl Params {
    pub fn new(n: u32, arg0: u32, arg1: u32) -> Self {
        Params { n, arg0, arg1, groups_x: 0 }
    }
}

/// One storage binding: slot number and whether the WGSL declares it
/// `read` (as opposed to `read_write`).
#[derive(Debug, Clone, Copy)]
struct Slot {
    binding: u32,
    read_only: bool,
}

const fn ro(binding: u32) -> Slot {
    Slot { binding, read_only: true }
}

const fn rw(binding: u32) -> Slot {
    Slot { binding, read_only: false }
}

const SCAN_FIRST_SLOTS: &[Slot] = &[ro(0), rw(1), rw(2)];
const SCAN_SECOND_SLOTS: &[Slot] = &[rw(1), rw(2)];
const BITONIC_SLOTS: &[Slot] = &[rw(0)];
const RADIX_COUNT_SLOTS: &[Slot] = &[ro(0), rw(1)];
const RADIX_REORDER_SLOTS: &[Slot] = &[ro(0), rw(1), rw(2)];
const RADIX_REORDER_PAIRS_SLOTS: &[Slot] = &[ro(0), rw(1), rw(2), ro(3), rw(4)];
const MAX_PAIRWISE_SLOTS: &[Slot] = &[ro(0), rw(1)];

/// Source template, storage slots and uniform slot for an entry point.
fn layout(entry: EntryPoint) -> (&'static str, &'static [Slot], u32) {
    match entry {
        EntryPoint::ScanFirst => (SCAN_WGSL, SCAN_FIRST_SLOTS, 3),
        EntryPoint::ScanSecond => (SCAN_WGSL, SCAN_SECOND_SLOTS, 3),
        EntryPoint::BitonicLargeStride | EntryPoint::BitonicSmallStride => (BITONIC_WGSL, BITONIC_SLOTS, 1),
        EntryPoint::RadixCount => (RADIX_WGSL, RADIX_COUNT_SLOTS, 5),
        EntryPoint::RadixReorder => (RADIX_WGSL, RADIX_REORDER_SLOTS, 5),
        EntryPoint::RadixReorderPairs => (RADIX_WGSL, RADIX_REORDER_PAIRS_SLOTS, 5),
        EntryPoint::MaxPairwise => (MAX_PREFIX_WGSL, MAX_PAIRWISE_SLOTS, 2),
    }
}

/// Specialise a template for one element type and group size.
pub(crate) fn render(template: &str, elem: &str, group_size: u32) -> String {
    template
        .replace("{{ELEM}}", elem)
        .replace("{{BLOCK_SIZE}}", &group_size.to_string())
}

/// Split `groups` into an `(x, y)` grid with `x <= max_per_dim`.
pub(crate) fn grid(groups: u32, max_per_dim: u32) -> (u32, u32) {
    if groups <= max_per_dim {
        (groups, 1)
    } else {
        (max_per_dim, groups.div_ceil(max_per_dim))
    }
}

// ---------------------------------------------------------------------------
// KernelCache
// ---------------------------------------------------------------------------

struct Kernel {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

type Key = (EntryPoint, &'static str, u32);

/// Lazily compiled pipelines, shared by every pass of a backend.
#[derive(Default)]
pub(crate) struct KernelCache {
    kernels: Mutex<HashMap<Key, Arc<Kernel>>>,
}

impl KernelCache {
    fn get(&self, gpu: &GpuDevice, entry: EntryPoint, elem: &'static str, group_size: u32) -> Result<Arc<Kernel>> {
        let mut kernels = self
            .kernels
            .lock()
            .map_err(|_| Error::Device("kernel cache lock poisoned".to_string()))?;
        if let Some(k) = kernels.get(&(entry, elem, group_size)) {
            return Ok(Arc::clone(k));
        }
        let kernel = Arc::new(compile(gpu, entry, elem, group_size)?);
        kernels.insert((entry, elem, group_size), Arc::clone(&kernel));
        Ok(kernel)
    }

    /// Enqueue one pass of `entry` over `ws`, binding `buffers` in slot order.
    ///
    /// `buffers` holds one entry per storage slot of the entry point;
    /// `None` is a buffer without storage and is only legal when the pass
    /// has no work groups.
    pub fn launch(
        &self,
        gpu: &GpuDevice,
        entry: EntryPoint,
        elem: &'static str,
        ws: WorkSize,
        mut params: Params,
        buffers: &[Option<&wgpu::Buffer>],
    ) -> Result<()> {
        let groups = ws.num_groups();
        if groups == 0 {
            return Ok(());
        }
        let max = gpu.limits.max_compute_invocations_per_workgroup;
        if ws.group_size > max {
            return Err(Error::WorkgroupTooLarge { total: ws.group_size, max });
        }
        let (_, slots, uniform_slot) = layout(entry);
        if buffers.len() != slots.len() {
            return Err(Error::Device(format!(
                "{entry}: {} buffers bound, kernel declares {}",
                buffers.len(),
                slots.len()
            )));
        }

        let kernel = self.get(gpu, entry, elem, ws.group_size)?;
        let (gx, gy) = grid(groups, gpu.limits.max_compute_workgroups_per_dimension);
        params.groups_x = gx;
        log::debug!("[gpu] {entry}<{elem}> over {ws} as {gx}×{gy} grid");

        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parprim params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = Vec::with_capacity(slots.len() + 1);
        for (slot, buf) in slots.iter().zip(buffers) {
            let buf = buf.ok_or_else(|| {
                Error::Device(format!("{entry}: binding {} has no storage", slot.binding))
            })?;
            entries.push(wgpu::BindGroupEntry { binding: slot.binding, resource: buf.as_entire_binding() });
        }
        entries.push(wgpu::BindGroupEntry { binding: uniform_slot, resource: params_buf.as_entire_binding() });

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(entry.name()),
            layout: &kernel.bgl,
            entries: &entries,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(entry.name()) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(entry.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(gx, gy, 1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(Error::Device(format!("{entry}: {e}")));
        }
        Ok(())
    }
}

fn compile(gpu: &GpuDevice, entry: EntryPoint, elem: &'static str, group_size: u32) -> Result<Kernel> {
    let (template, slots, uniform_slot) = layout(entry);
    log::debug!("compiling {entry}<{elem}> for group size {group_size}");

    let mut bgl_entries: Vec<wgpu::BindGroupLayoutEntry> = slots
        .iter()
        .map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot.binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: slot.read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();
    bgl_entries.push(wgpu::BindGroupLayoutEntry {
        binding: uniform_slot,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    let device = &gpu.device;
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(entry.name()),
        source: wgpu::ShaderSource::Wgsl(render(template, elem, group_size).into()),
    });
    let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(entry.name()),
        entries: &bgl_entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(entry.name()),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry.name()),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: entry.wgsl_fn(),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    if let Some(e) = pollster::block_on(device.pop_error_scope()) {
        return Err(Error::Compile { entry: entry.name(), message: e.to_string() });
    }
    Ok(Kernel { pipeline, bgl })
}
