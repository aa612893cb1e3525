//! Precision policies.
//!
//! Map-space pixels are kept in `f64` on the CPU. Vertex buffers carry `f32`,
//! so positions are written relative to a per-layer origin to keep the
//! mantissa spent on the small offsets that matter at high zoom.
//! `StableF64` gives floats a deterministic total ordering for sorting and keys.

use core::cmp::Ordering;

use super::Vec2;

/// CPU-authoritative precision type.
pub type HighPrecision = f64;

/// GPU-friendly, origin-relative position in `f32`.
pub type OriginRelativeF32 = [f32; 2];

/// Origin-relative precision model.
///
/// Convention: positions sent to the GPU are `pixel - origin` in zoom-0
/// map-space pixels, then cast to `f32`.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct OriginRelative {
    pub origin: Vec2,
}

impl OriginRelative {
    pub fn new(origin: Vec2) -> Self {
        Self { origin }
    }

    #[inline]
    pub fn to_f32(self, pixel: Vec2) -> OriginRelativeF32 {
        let d = pixel - self.origin;
        [d.x as f32, d.y as f32]
    }

    /// Screen-space error (pixels) introduced by `f32` storage at `scale`.
    ///
    /// The worst case is half an ulp of the largest offset magnitude.
    pub fn screen_error_px(self, pixel: Vec2, scale: f64) -> f64 {
        let d = pixel - self.origin;
        let magnitude = d.x.abs().max(d.y.abs()) as f32;
        f64::from(ulp_f32(magnitude)) * 0.5 * scale
    }
}

fn ulp_f32(v: f32) -> f32 {
    if v == 0.0 || !v.is_finite() {
        return f32::MIN_POSITIVE;
    }
    f32::from_bits(v.to_bits() + 1) - v
}

/// Canonicalize a floating-point value for deterministic ordering.
///
/// Rules:
/// - `-0.0` becomes `0.0`
/// - all NaNs become a single canonical NaN
pub fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 {
        // Handles +0.0 and -0.0.
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

/// Deterministic total ordering for floats.
pub fn stable_total_cmp_f64(a: f64, b: f64) -> Ordering {
    canonical_f64(a).total_cmp(&canonical_f64(b))
}

#[cfg(test)]
mod tests {
    use super::{OriginRelative, canonical_f64, stable_total_cmp_f64};
    use core::cmp::Ordering;

    use crate::math::Vec2;

    #[test]
    fn canonicalizes_negative_zero() {
        assert_eq!(canonical_f64(-0.0), 0.0);
        assert_eq!(canonical_f64(0.0), 0.0);
    }

    #[test]
    fn stable_cmp_is_total_and_deterministic() {
        assert_eq!(stable_total_cmp_f64(1.0, 2.0), Ordering::Less);
        assert_eq!(stable_total_cmp_f64(f64::NAN, f64::NAN), Ordering::Equal);
    }

    #[test]
    fn origin_relative_preserves_small_offsets() {
        // Zoom-0 pixels near the antimeridian, sub-pixel deltas.
        let origin = Vec2::new(255.875, 128.5);
        let pixel = Vec2::new(255.880_859_375, 128.498_046_875);
        let rel = OriginRelative::new(origin).to_f32(pixel);
        assert_eq!(rel, [0.005_859_375, -0.001_953_125]);
    }

    #[test]
    fn screen_error_grows_with_distance_from_origin() {
        let rel = OriginRelative::new(Vec2::new(0.0, 0.0));
        let scale = 2f64.powi(18);
        let near = rel.screen_error_px(Vec2::new(0.01, 0.0), scale);
        let far = rel.screen_error_px(Vec2::new(1000.0, 0.0), scale);
        assert!(near < 0.01);
        assert!(far > 1.0);
    }
}
