// gpu/mod.rs — wgpu execution of the compute-kernel set.
//
//   device   adapter selection, profile limits, group size
//   buffer   `GpuBuffer<T>`: storage buffer with blocking host transfers
//   kernels  WGSL templates, pipeline cache, one-pass launch
//   backend  `GpuBackend`: `ComputeBackend` over the above
//
// Results are validated against `HostBackend` and the sequential
// references in `crate::reference`; there is no CPU fallback when the
// device fails.

pub mod device;
pub mod buffer;
pub(crate) mod kernels;
pub mod backend;

pub use backend::GpuBackend;
pub use buffer::GpuBuffer;
pub use device::{AdapterInfo, DeviceProfile, GpuDevice};
