use serde::{Deserialize, Serialize};

/// WGS84 semi-major axis (meters). Spherical Mercator uses it as the sphere radius.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude where Spherical Mercator becomes a square world.
pub const MAX_MERCATOR_LATITUDE_DEG: f64 = 85.051_128_779_806_6;

/// Geographic coordinate in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Clamps latitude into the Mercator-representable band.
    pub fn clamp_mercator(self) -> Self {
        Self::new(
            self.lat
                .clamp(-MAX_MERCATOR_LATITUDE_DEG, MAX_MERCATOR_LATITUDE_DEG),
            self.lng,
        )
    }
}

/// Great-circle distance on the WGS84 sphere (meters).
pub fn haversine_distance_m(a: LatLng, b: LatLng) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
