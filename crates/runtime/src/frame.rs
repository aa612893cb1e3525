use foundation::bounds::Aabb2;
use foundation::math::{Vec2, zoom_scale};

use crate::host::HostView;

/// Per-frame draw context handed to the overlay by the host's draw callback.
///
/// Everything here is a snapshot of the live host view at the time the frame
/// was requested.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawContext {
    /// 0-based frame index.
    pub index: u64,
    /// Visible area in degrees, `[lng, lat]` min/max.
    pub bounds: Aabb2,
    /// Top-left canvas corner in zoom-0 map-space pixels.
    pub offset: Vec2,
    /// View center in zoom-0 map-space pixels.
    pub center: Vec2,
    /// `2^zoom`.
    pub scale: f64,
    /// Canvas size in pixels.
    pub size: Vec2,
    /// `1 / scale`: one screen pixel expressed in zoom-0 pixels.
    pub zoom_scale: f64,
    pub zoom: f64,
}

impl DrawContext {
    pub fn from_host(index: u64, host: &dyn HostView) -> Self {
        let zoom = host.zoom();
        let scale = zoom_scale(zoom);
        let size = host.size();
        let center = host.center_pixel();
        let offset = center - size / (2.0 * scale);
        let bottom_right = offset + size / scale;

        let nw = host.unproject(offset, 0.0);
        let se = host.unproject(bottom_right, 0.0);
        let bounds = Aabb2::from_corners(Vec2::new(nw.lng, nw.lat), Vec2::new(se.lng, se.lat));

        Self {
            index,
            bounds,
            offset,
            center,
            scale,
            size,
            zoom_scale: 1.0 / scale,
            zoom,
        }
    }

    /// Canvas dimensions rounded to whole device pixels.
    pub fn viewport_px(&self) -> (u32, u32) {
        (
            self.size.x.max(0.0).round() as u32,
            self.size.y.max(0.0).round() as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::DrawContext;
    use crate::host::StaticView;
    use foundation::math::{LatLng, Vec2};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn context_is_deterministic_for_a_view() {
        let view = StaticView::new(LatLng::new(0.0, 0.0), 2.0, Vec2::new(512.0, 256.0));
        let a = DrawContext::from_host(7, &view);
        let b = DrawContext::from_host(7, &view);
        assert_eq!(a, b);
        assert_eq!(a.scale, 4.0);
        assert_eq!(a.zoom_scale, 0.25);
        assert_eq!(a.offset, Vec2::new(64.0, 96.0));
        assert_eq!(a.viewport_px(), (512, 256));
    }

    #[test]
    fn bounds_cover_the_canvas() {
        let view = StaticView::new(LatLng::new(0.0, 0.0), 0.0, Vec2::new(256.0, 256.0));
        let ctx = DrawContext::from_host(0, &view);
        assert_close(ctx.bounds.min[0], -180.0, 1e-9);
        assert_close(ctx.bounds.max[0], 180.0, 1e-9);
        assert!(ctx.bounds.contains(Vec2::new(10.0, 10.0)));
    }
}
