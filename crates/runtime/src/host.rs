use foundation::math::{LatLng, Projector, SphericalMercator, Vec2, zoom_scale};

/// The interactive map view hosting the overlay.
///
/// The host owns pan/zoom state and the projection; the overlay only reads it.
pub trait HostView: Projector {
    fn zoom(&self) -> f64;
    fn center(&self) -> LatLng;
    /// Canvas size in CSS pixels (width, height).
    fn size(&self) -> Vec2;

    /// View center in zoom-0 map-space pixels.
    fn center_pixel(&self) -> Vec2 {
        self.project(self.center(), 0.0)
    }

    /// Top-left corner of the canvas in zoom-0 map-space pixels.
    fn top_left_pixel(&self) -> Vec2 {
        self.center_pixel() - self.size() / (2.0 * zoom_scale(self.zoom()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GestureKind {
    Pan,
    Zoom,
    Drag,
}

/// Events the host delivers to the overlay.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MapEvent {
    PanStart,
    PanEnd,
    ZoomStart,
    ZoomEnd,
    DragStart,
    DragEnd,
    Resize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GesturePhase {
    Start(GestureKind),
    End(GestureKind),
}

impl MapEvent {
    pub fn gesture(self) -> Option<GesturePhase> {
        match self {
            MapEvent::PanStart => Some(GesturePhase::Start(GestureKind::Pan)),
            MapEvent::PanEnd => Some(GesturePhase::End(GestureKind::Pan)),
            MapEvent::ZoomStart => Some(GesturePhase::Start(GestureKind::Zoom)),
            MapEvent::ZoomEnd => Some(GesturePhase::End(GestureKind::Zoom)),
            MapEvent::DragStart => Some(GesturePhase::Start(GestureKind::Drag)),
            MapEvent::DragEnd => Some(GesturePhase::End(GestureKind::Drag)),
            MapEvent::Resize => None,
        }
    }
}

/// A host view with explicit state, backed by Spherical Mercator.
///
/// Used by headless tools and tests; a browser host implements `HostView`
/// over its own map object instead.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StaticView {
    pub center: LatLng,
    pub zoom: f64,
    pub size: Vec2,
}

impl StaticView {
    pub fn new(center: LatLng, zoom: f64, size: Vec2) -> Self {
        Self { center, zoom, size }
    }

    pub fn pan_to(&mut self, center: LatLng) {
        self.center = center;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn resize(&mut self, size: Vec2) {
        self.size = size;
    }
}

impl Projector for StaticView {
    fn project(&self, lat_lng: LatLng, zoom: f64) -> Vec2 {
        SphericalMercator.project(lat_lng, zoom)
    }

    fn unproject(&self, pixel: Vec2, zoom: f64) -> LatLng {
        SphericalMercator.unproject(pixel, zoom)
    }
}

impl HostView for StaticView {
    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn center(&self) -> LatLng {
        self.center
    }

    fn size(&self) -> Vec2 {
        self.size
    }
}
