// config.rs — tunables shared by every primitive.
//
// Two knobs exist: the work-group size every pass is launched with, and the
// digit width of the radix sort. Defaults come from the device profile;
// environment variables override them for benchmarking sweeps:
//
//   PARPRIM_GROUP_SIZE   power of two in 4..=256
//   PARPRIM_MASK_WIDTH   divisor of 32 in 1..=8

use std::fmt;

use crate::error::{Error, Result};
use crate::gpu::device::DeviceProfile;

pub const GROUP_SIZE_ENV: &str = "PARPRIM_GROUP_SIZE";
pub const MASK_WIDTH_ENV: &str = "PARPRIM_MASK_WIDTH";

/// Smallest group size for which the recursive scan always shrinks.
pub const MIN_GROUP_SIZE: u32 = 4;
pub const MAX_GROUP_SIZE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitivesConfig {
    /// Lanes per work group for every pass.
    pub group_size: u32,
    /// Bits consumed per radix pass; `2^radix_mask_width` buckets.
    pub radix_mask_width: u32,
}

impl Default for PrimitivesConfig {
    fn default() -> Self {
        PrimitivesConfig { group_size: 128, radix_mask_width: 2 }
    }
}

impl PrimitivesConfig {
    /// Defaults for a hardware profile. The Raspberry Pi gets half-size
    /// groups so a group fits in one V3D scheduling slot.
    pub fn for_profile(profile: DeviceProfile) -> Self {
        let group_size = match profile {
            DeviceProfile::Native => 128,
            DeviceProfile::RaspberryPi => 64,
        };
        PrimitivesConfig { group_size, ..Self::default() }
    }

    /// Defaults with `PARPRIM_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Apply `PARPRIM_*` environment overrides on top of `self`.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(g) = env_u32(GROUP_SIZE_ENV)? {
            self.group_size = g;
        }
        if let Some(w) = env_u32(MASK_WIDTH_ENV)? {
            self.radix_mask_width = w;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        check_group_size(self.group_size)?;
        check_mask_width(self.radix_mask_width)
    }
}

impl fmt::Display for PrimitivesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {} / radix {} bits", self.group_size, self.radix_mask_width)
    }
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::Config(format!("{key}: {e}"))),
    }
}

pub(crate) fn check_group_size(group_size: u32) -> Result<()> {
    if !group_size.is_power_of_two() || !(MIN_GROUP_SIZE..=MAX_GROUP_SIZE).contains(&group_size) {
        return Err(Error::Config(format!(
            "group size {group_size} must be a power of two in {MIN_GROUP_SIZE}..={MAX_GROUP_SIZE}"
        )));
    }
    Ok(())
}

pub(crate) fn check_mask_width(mask_width: u32) -> Result<()> {
    if !(1..=8).contains(&mask_width) || 32 % mask_width != 0 {
        return Err(Error::Config(format!(
            "radix mask width {mask_width} must divide 32 and lie in 1..=8"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = PrimitivesConfig::default();
        assert_eq!(cfg.group_size, 128);
        assert_eq!(cfg.radix_mask_width, 2);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_profiles() {
        assert_eq!(PrimitivesConfig::for_profile(DeviceProfile::Native).group_size, 128);
        let rpi = PrimitivesConfig::for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(rpi.group_size, 64);
        rpi.validate().unwrap();
    }

    #[test]
    fn test_group_size_bounds() {
        for g in [4, 8, 64, 256] {
            check_group_size(g).unwrap();
        }
        for g in [0, 1, 2, 3, 96, 512] {
            assert!(matches!(check_group_size(g), Err(Error::Config(_))), "g = {g}");
        }
    }

    #[test]
    fn test_mask_width_divides_32() {
        for w in [1, 2, 4, 8] {
            check_mask_width(w).unwrap();
        }
        for w in [0, 3, 5, 16] {
            assert!(check_mask_width(w).is_err(), "w = {w}");
        }
    }
}
