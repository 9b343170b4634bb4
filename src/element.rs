// element.rs — 4-byte element types that can live in a device buffer.

use std::fmt;

/// A 4-byte plain-old-data element type usable in device buffers.
///
/// `WGSL_TYPE` is substituted for `{{ELEM}}` in the shader templates, so
/// the same kernel source is compiled once per element type.
pub trait Element:
    bytemuck::Pod + Default + PartialOrd + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const WGSL_TYPE: &'static str;
}

/// An element type with the additive structure the scan needs.
///
/// Integer addition wraps on overflow; the kernels use WGSL's native `+`,
/// which wraps too, so both backends agree bit-for-bit.
pub trait ScanElement: Element {
    const ZERO: Self;

    fn add(self, rhs: Self) -> Self;
}

impl Element for u32 {
    const WGSL_TYPE: &'static str = "u32";
}

impl Element for i32 {
    const WGSL_TYPE: &'static str = "i32";
}

impl Element for f32 {
    const WGSL_TYPE: &'static str = "f32";
}

impl ScanElement for u32 {
    const ZERO: Self = 0;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
}

impl ScanElement for i32 {
    const ZERO: Self = 0;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }
}

/// Float addition is not associative. The device scans a group in tree
/// order and the host adds left to right, so the two backends agree exactly
/// only when every partial sum is representable (e.g. integer-valued
/// floats below 2^24).
impl ScanElement for f32 {
    const ZERO: Self = 0.0;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self + rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_add_wraps() {
        assert_eq!(u32::MAX.add(2), 1);
        assert_eq!(i32::MAX.add(1), i32::MIN);
    }

    #[test]
    fn test_wgsl_names() {
        assert_eq!(u32::WGSL_TYPE, "u32");
        assert_eq!(i32::WGSL_TYPE, "i32");
        assert_eq!(f32::WGSL_TYPE, "f32");
    }
}
