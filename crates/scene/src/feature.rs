use foundation::math::LatLng;
use serde::{Deserialize, Serialize};

/// Raw coordinate tuple as read from input; axis order is set per layer.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Representative coordinate: the point itself, or the first vertex.
    pub fn anchor(&self) -> Option<&Position> {
        match self {
            Geometry::Point(p) => Some(p),
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => ps.first(),
            Geometry::MultiLineString(lines) => lines.first().and_then(|l| l.first()),
            Geometry::Polygon(rings) => rings.first().and_then(|r| r.first()),
            Geometry::MultiPolygon(polys) => polys
                .first()
                .and_then(|rings| rings.first())
                .and_then(|r| r.first()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }
}

/// An input feature with an opaque payload passed through to callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<P> {
    pub geometry: Geometry,
    pub payload: P,
}

impl<P> Feature<P> {
    pub fn new(geometry: Geometry, payload: P) -> Self {
        Self { geometry, payload }
    }

    pub fn point(position: impl Into<Position>, payload: P) -> Self {
        Self::new(Geometry::Point(position.into()), payload)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateError {
    EmptyGeometry,
    MissingSlot { slot: usize, len: usize },
    NonFinite { lat: f64, lng: f64 },
}

impl std::fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinateError::EmptyGeometry => write!(f, "geometry has no coordinates"),
            CoordinateError::MissingSlot { slot, len } => {
                write!(f, "coordinate slot {slot} missing (tuple has {len} values)")
            }
            CoordinateError::NonFinite { lat, lng } => {
                write!(f, "non-finite coordinate (lat {lat}, lng {lng})")
            }
        }
    }
}

impl std::error::Error for CoordinateError {}

/// Which tuple slot holds which axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisOrder {
    pub latitude_key: usize,
    pub longitude_key: usize,
}

impl AxisOrder {
    /// `[lat, lng]` tuples.
    pub const fn latitude_first() -> Self {
        Self {
            latitude_key: 0,
            longitude_key: 1,
        }
    }

    /// `[lng, lat]` tuples (GeoJSON order).
    pub const fn longitude_first() -> Self {
        Self {
            latitude_key: 1,
            longitude_key: 0,
        }
    }

    pub fn resolve(&self, position: &[f64]) -> Result<LatLng, CoordinateError> {
        let len = position.len();
        let lat = *position
            .get(self.latitude_key)
            .ok_or(CoordinateError::MissingSlot {
                slot: self.latitude_key,
                len,
            })?;
        let lng = *position
            .get(self.longitude_key)
            .ok_or(CoordinateError::MissingSlot {
                slot: self.longitude_key,
                len,
            })?;
        let lat_lng = LatLng::new(lat, lng);
        if !lat_lng.is_finite() {
            return Err(CoordinateError::NonFinite { lat, lng });
        }
        Ok(lat_lng)
    }

    pub fn resolve_anchor(&self, geometry: &Geometry) -> Result<LatLng, CoordinateError> {
        let position = geometry.anchor().ok_or(CoordinateError::EmptyGeometry)?;
        self.resolve(position)
    }

    /// Swaps the axes in `lat_lng` back into a tuple in this order.
    pub fn to_position(&self, lat_lng: LatLng) -> Position {
        let mut out = vec![0.0; self.latitude_key.max(self.longitude_key) + 1];
        out[self.latitude_key] = lat_lng.lat;
        out[self.longitude_key] = lat_lng.lng;
        out
    }
}

impl Default for AxisOrder {
    fn default() -> Self {
        Self::latitude_first()
    }
}
