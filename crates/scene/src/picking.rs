use foundation::math::{LatLng, Vec2, zoom_scale};
use foundation::math::precision::stable_total_cmp_f64;

use crate::spatial::GridIndex;

/// Anything with a zoom-0 map-space position.
pub trait Locatable {
    fn pixel(&self) -> Vec2;
}

impl Locatable for Vec2 {
    fn pixel(&self) -> Vec2 {
        *self
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NearestHit {
    /// Position in the list the index was built from.
    pub position: usize,
    /// Distance in zoom-0 map-space pixels.
    pub distance: f64,
    /// `true` when the grid had no candidate and every entry was scanned.
    pub used_fallback: bool,
}

impl NearestHit {
    /// Distance in screen pixels at `zoom`.
    pub fn screen_distance(&self, zoom: f64) -> f64 {
        self.distance * zoom_scale(zoom)
    }
}

/// Nearest entry to `target` among `candidates`.
///
/// Ordering contract:
/// - The smallest projected distance wins.
/// - On equal distance, the candidate listed first wins.
/// - Candidates without a finite pixel are ignored.
pub fn nearest<T: Locatable>(
    items: &[T],
    candidates: impl IntoIterator<Item = usize>,
    target: Vec2,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for position in candidates {
        let Some(item) = items.get(position) else {
            continue;
        };
        let pixel = item.pixel();
        if !pixel.is_finite() {
            continue;
        }
        let d = pixel.distance(target);
        best = match best {
            Some((_, bd)) if stable_total_cmp_f64(d, bd).is_lt() => Some((position, d)),
            None => Some((position, d)),
            keep => keep,
        };
    }
    best
}

/// Grid-accelerated nearest lookup.
///
/// `point` selects the grid neighbourhood; `target` is the same point
/// projected at zoom 0 and is what distances are measured against.
pub fn query_nearest<T: Locatable>(
    items: &[T],
    index: &GridIndex,
    point: LatLng,
    target: Vec2,
    ring: i32,
) -> Option<NearestHit> {
    if items.is_empty() {
        return None;
    }
    let found = index.candidates(point, ring);
    let (position, distance) = nearest(items, found.indices, target)?;
    Some(NearestHit {
        position,
        distance,
        used_fallback: found.used_fallback,
    })
}

/// `true` when `point` lies within `radius` of `center` (inclusive).
pub fn pixel_in_circle(center: Vec2, point: Vec2, radius: f64) -> bool {
    center.distance(point) <= radius
}
