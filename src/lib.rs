// parprim: PARallel PRIMitives orchestrated from the host
//
// Multi-pass data-parallel algorithms built from single-pass compute
// kernels: inclusive scan over arbitrarily large arrays, bitonic sort,
// LSD radix sort on top of the scan, and max-prefix-sum on top of scan
// plus a tree reduction.
//
// The algorithms are generic over `ComputeBackend`:
//   HostBackend  — every kernel emulated on the CPU (rayon across groups)
//   GpuBackend   — WGSL kernels on a Vulkan device through wgpu

pub mod error;
pub mod element;
pub mod dispatch;
pub mod config;
pub mod host;
pub mod scan;
pub mod bitonic;
pub mod radix;
pub mod max_prefix;
pub mod reference;
pub mod gpu;

pub use bitonic::{BitonicPass, BitonicSorter};
pub use config::PrimitivesConfig;
pub use dispatch::{ComputeBackend, DeviceBuffer, EntryPoint, WorkSize};
pub use element::{Element, ScanElement};
pub use error::{Error, Result};
pub use host::{HostBackend, HostBuffer};
pub use max_prefix::{MaxPrefix, MaxPrefixSum};
pub use radix::RadixSorter;
pub use scan::ScanEngine;

/// All four primitives built from one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitives {
    pub config: PrimitivesConfig,
    pub scan: ScanEngine,
    pub bitonic: BitonicSorter,
    pub radix: RadixSorter,
    pub max_prefix: MaxPrefixSum,
}

impl Primitives {
    pub fn new(config: PrimitivesConfig) -> Result<Self> {
        config.validate()?;
        let scan = ScanEngine::new(config.group_size)?;
        Ok(Primitives {
            config,
            scan,
            bitonic: BitonicSorter::new(config.group_size)?,
            radix: RadixSorter::new(scan, config.radix_mask_width)?,
            max_prefix: MaxPrefixSum::new(scan),
        })
    }
}
