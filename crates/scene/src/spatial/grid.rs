use std::collections::BTreeMap;

use foundation::math::LatLng;

/// Bucket resolution: coordinates are keyed at two decimal degrees.
pub const GRID_STEPS_PER_DEGREE: f64 = 100.0;

/// Buckets scanned on each side of the query bucket (±0.03°, a 7x7 block).
pub const DEFAULT_RING: i32 = 3;

/// Coordinate rounded to two decimal degrees.
///
/// Stored as integer hundredths so the ring scan steps exactly, without
/// accumulating float error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridKey {
    pub lat: i32,
    pub lng: i32,
}

impl GridKey {
    pub const fn new(lat: i32, lng: i32) -> Self {
        Self { lat, lng }
    }

    pub fn from_lat_lng(p: LatLng) -> Self {
        Self {
            lat: (p.lat * GRID_STEPS_PER_DEGREE).round() as i32,
            lng: (p.lng * GRID_STEPS_PER_DEGREE).round() as i32,
        }
    }

    /// Saturates at the `i32` range; out-of-range coordinates already clamp
    /// there in `from_lat_lng`.
    pub fn offset(self, d_lat: i32, d_lng: i32) -> Self {
        Self::new(self.lat.saturating_add(d_lat), self.lng.saturating_add(d_lng))
    }
}

impl std::fmt::Display for GridKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2}x{:.2}",
            f64::from(self.lat) / GRID_STEPS_PER_DEGREE,
            f64::from(self.lng) / GRID_STEPS_PER_DEGREE
        )
    }
}

/// Candidates returned by a ring query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCandidates {
    /// Positions into the indexed list, ascending.
    pub indices: Vec<usize>,
    /// `true` when no bucket matched and every entry was returned.
    pub used_fallback: bool,
}

/// Coarse lat/lng bucket grid over a feature metadata list.
///
/// Values are positions into that list; the index never owns features and is
/// rebuilt in lockstep with the list it points into.
///
/// Ordering contract:
/// - Bucket contents keep insertion order.
/// - Query results are sorted ascending, so "first encountered" means lowest
///   position regardless of bucket layout.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GridIndex {
    buckets: BTreeMap<GridKey, Vec<usize>>,
    len: usize,
}

impl GridIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from keys listed in metadata order.
    pub fn build(keys: impl IntoIterator<Item = GridKey>) -> Self {
        let mut index = Self::new();
        for (position, key) in keys.into_iter().enumerate() {
            index.insert(key, position);
        }
        index
    }

    pub fn insert(&mut self, key: GridKey, position: usize) {
        self.buckets.entry(key).or_default().push(position);
        self.len += 1;
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, key: GridKey) -> &[usize] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Collects entries from the `(2 * ring + 1)^2` buckets around `point`.
    ///
    /// Falls back to every entry when no bucket in range is populated.
    pub fn candidates(&self, point: LatLng, ring: i32) -> GridCandidates {
        let center = GridKey::from_lat_lng(point);
        let ring = ring.max(0);

        let mut indices = Vec::new();
        for d_lat in -ring..=ring {
            for d_lng in -ring..=ring {
                indices.extend_from_slice(self.bucket(center.offset(d_lat, d_lng)));
            }
        }

        if indices.is_empty() {
            return GridCandidates {
                indices: (0..self.len).collect(),
                used_fallback: true,
            };
        }

        indices.sort_unstable();
        GridCandidates {
            indices,
            used_fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_RING, GridIndex, GridKey};
    use foundation::math::LatLng;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_round_to_two_decimals() {
        assert_eq!(GridKey::from_lat_lng(LatLng::new(10.006, -0.004)), GridKey::new(1001, 0));
        assert_eq!(GridKey::from_lat_lng(LatLng::new(-12.347, 45.0)).to_string(), "-12.35x45.00");
    }

    #[test]
    fn ring_query_collects_neighbouring_buckets() {
        let keys = [
            GridKey::from_lat_lng(LatLng::new(0.0, 0.0)),
            GridKey::from_lat_lng(LatLng::new(10.0, 10.0)),
            GridKey::from_lat_lng(LatLng::new(10.005, 10.005)),
        ];
        let index = GridIndex::build(keys);
        let found = index.candidates(LatLng::new(10.0, 10.0), DEFAULT_RING);
        assert!(!found.used_fallback);
        assert_eq!(found.indices, vec![1, 2]);
    }

    #[test]
    fn ring_edge_is_inclusive() {
        let index = GridIndex::build([GridKey::from_lat_lng(LatLng::new(1.03, 1.0))]);
        assert!(!index.candidates(LatLng::new(1.0, 1.0), 3).used_fallback);
        assert!(index.candidates(LatLng::new(1.0, 1.0), 2).used_fallback);
    }

    #[test]
    fn empty_ring_falls_back_to_everything() {
        let index = GridIndex::build([
            GridKey::from_lat_lng(LatLng::new(0.0, 0.0)),
            GridKey::from_lat_lng(LatLng::new(50.0, 50.0)),
        ]);
        let found = index.candidates(LatLng::new(20.0, 20.0), DEFAULT_RING);
        assert!(found.used_fallback);
        assert_eq!(found.indices, vec![0, 1]);
    }

    #[test]
    fn empty_index_yields_no_candidates() {
        let found = GridIndex::new().candidates(LatLng::new(0.0, 0.0), DEFAULT_RING);
        assert!(found.indices.is_empty());
        assert!(found.used_fallback);
    }

    #[test]
    fn non_geographic_queries_fall_back_without_overflow() {
        let index = GridIndex::build([GridKey::from_lat_lng(LatLng::new(0.0, 0.0))]);
        let huge = LatLng::new(3.0e7, -3.0e7);
        assert_eq!(GridKey::from_lat_lng(huge), GridKey::new(i32::MAX, i32::MIN));
        let found = index.candidates(huge, DEFAULT_RING);
        assert!(found.used_fallback);
        assert_eq!(found.indices, vec![0]);
    }
}
