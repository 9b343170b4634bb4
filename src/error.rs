// error.rs — crate-wide error type.
//
// Every failure is fatal to the primitive that hit it: nothing here is
// retried or degraded locally. Errors bubble up with `?` to whoever started
// the multi-pass algorithm.
//
//   SizeMismatch / InvalidWorkSize  — a dispatch would touch more elements
//                                     than a bound buffer holds.
//   Mismatch                        — post-hoc comparison against the CPU
//                                     reference disagreed.
//   NoSuitableAdapter / DeviceRequest / Compile / Device
//                                   — device bring-up or kernel compilation
//                                     failed. There is no CPU fallback.

use thiserror::Error;

use crate::dispatch::EntryPoint;

/// Errors produced by buffers, dispatches, and the orchestration algorithms.
#[derive(Debug, Error)]
pub enum Error {
    /// A bound buffer is smaller than what the pass reads or writes.
    #[error("{kernel}: buffer `{buffer}` holds {actual} elements but the pass touches {required}")]
    SizeMismatch {
        kernel: EntryPoint,
        buffer: &'static str,
        required: usize,
        actual: usize,
    },

    /// The work-size descriptor does not cover the logical element count.
    #[error("work size ({group_size}, {total_width}) cannot cover {count} elements")]
    InvalidWorkSize {
        group_size: u32,
        total_width: u32,
        count: usize,
    },

    /// A host transfer fell outside `[0, element_count)`.
    #[error("{op} of {count} elements at offset {offset} exceeds buffer length {len}")]
    OutOfRange {
        op: &'static str,
        offset: usize,
        count: usize,
        len: usize,
    },

    /// Two buffers that must move together have different lengths.
    #[error("{what}: length {left} does not match length {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    /// A derived element count does not fit in the 32-bit index space the
    /// kernels use.
    #[error("{what} needs {required} elements, more than the {limit} addressable by a kernel")]
    TooLarge {
        what: &'static str,
        required: u64,
        limit: u64,
    },

    /// Invalid configuration value (group size, digit width, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Result disagrees with the sequential reference implementation.
    #[error("{what}: mismatch at index {index}: expected {expected}, got {actual}")]
    Mismatch {
        what: String,
        index: usize,
        expected: String,
        actual: String,
    },

    /// No Vulkan adapter found that passes the non-CPU filter.
    #[error(
        "no suitable Vulkan adapter found (only CPU/software renderers visible); \
         check that `vulkaninfo` lists a real GPU"
    )]
    NoSuitableAdapter,

    /// wgpu device request failed (driver issue, unsupported limits, etc.).
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Requested group size exceeds the profile's invocation limit.
    #[error("workgroup size {total} exceeds profile limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },

    /// Buffer allocation larger than the device allows for a storage binding.
    #[error("buffer of {bytes} bytes exceeds device limit of {limit} bytes")]
    BufferTooLarge { bytes: u64, limit: u64 },

    /// WGSL compilation or pipeline creation failed.
    #[error("kernel `{entry}` failed to compile: {message}")]
    Compile { entry: &'static str, message: String },

    /// Validation or out-of-memory error raised by the device mid-run.
    #[error("device error: {0}")]
    Device(String),

    /// Mapping a staging buffer for readback failed.
    #[error("buffer readback failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
