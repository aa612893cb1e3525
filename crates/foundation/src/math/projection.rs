use std::f64::consts::PI;

use super::{EARTH_RADIUS_M, LatLng, Vec2};

/// Pixel width of the whole world at zoom 0.
pub const TILE_SIZE_PX: f64 = 256.0;

/// Geographic <-> pixel projection at a given zoom.
///
/// Zoom 0 is the reference level for map-space pixels: every vertex buffer is
/// expressed in zoom-0 pixels and scaled by `2^zoom` on the GPU.
pub trait Projector {
    fn project(&self, lat_lng: LatLng, zoom: f64) -> Vec2;
    fn unproject(&self, pixel: Vec2, zoom: f64) -> LatLng;
}

/// `2^zoom`, the factor between zoom-0 pixels and pixels at `zoom`.
pub fn zoom_scale(zoom: f64) -> f64 {
    2f64.powf(zoom)
}

/// Web Mercator (EPSG:3857) on a 256px tile pyramid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SphericalMercator;

impl SphericalMercator {
    const SCALE: f64 = 0.5 / (PI * EARTH_RADIUS_M);

    fn world_px(zoom: f64) -> f64 {
        TILE_SIZE_PX * zoom_scale(zoom)
    }
}

impl Projector for SphericalMercator {
    fn project(&self, lat_lng: LatLng, zoom: f64) -> Vec2 {
        let clamped = lat_lng.clamp_mercator();
        let sin = clamped.lat.to_radians().sin();
        let x = EARTH_RADIUS_M * clamped.lng.to_radians();
        let y = EARTH_RADIUS_M * ((1.0 + sin) / (1.0 - sin)).ln() * 0.5;

        let world = Self::world_px(zoom);
        Vec2::new(
            world * (Self::SCALE * x + 0.5),
            world * (-Self::SCALE * y + 0.5),
        )
    }

    fn unproject(&self, pixel: Vec2, zoom: f64) -> LatLng {
        let world = Self::world_px(zoom);
        let x = (pixel.x / world - 0.5) / Self::SCALE;
        let y = (0.5 - pixel.y / world) / Self::SCALE;

        let lat = 2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI * 0.5;
        LatLng::new(lat.to_degrees(), (x / EARTH_RADIUS_M).to_degrees())
    }
}
