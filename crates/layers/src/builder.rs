use std::cell::Cell;

use formats::FontAtlas;
use foundation::math::precision::OriginRelative;
use foundation::math::{LatLng, Projector, Vec2};
use gpu::{BufferError, PackedBuffer, VertexAttribute, VertexLayout};
use scene::{CoordinateError, Feature, Geometry, GridKey, Locatable, Position};
use tracing::{debug, warn};

use crate::labels::{BackgroundBox, layout_text};
use crate::settings::{LabelSettings, LayerKind, LayerSettings};
use crate::style::{Color, LayerStyles};
use crate::vector::{HitOutline, line_segments, triangulate_polygon};

/// Depth slots reserved per feature. Slot 3 is headroom so neighbouring
/// features never share a depth range.
pub const DEPTH_SLOTS_PER_FEATURE: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DepthSlot {
    Icon = 0,
    LabelBackground = 1,
    LabelGlyph = 2,
}

/// `(4 * index + slot) * increment_z`.
pub fn feature_depth(index: usize, slot: DepthSlot, increment_z: f64) -> f64 {
    (DEPTH_SLOTS_PER_FEATURE * index + slot as usize) as f64 * increment_z
}

/// Record layout of a layer's main buffer.
pub fn main_layout(kind: LayerKind, stack_depth: bool) -> VertexLayout {
    let mut attributes = vec![VertexAttribute::new("vertex", 2), VertexAttribute::new("color", 4)];
    match kind {
        LayerKind::Points => attributes.push(VertexAttribute::new("pointSize", 1)),
        LayerKind::Icons | LayerKind::LabeledIcons => {
            attributes.push(VertexAttribute::new("pointSize", 1));
            attributes.push(VertexAttribute::new("texCoord", 2));
            if stack_depth {
                attributes.push(VertexAttribute::new("offsetZ", 1));
            }
        }
        LayerKind::Lines | LayerKind::Shapes => {}
    }
    VertexLayout::new(attributes)
}

/// One instance per label: anchor, box offset and size, corner radius,
/// colour, depth.
pub fn label_background_layout() -> VertexLayout {
    VertexLayout::new(vec![
        VertexAttribute::new("vertex", 2),
        VertexAttribute::new("labelOffset", 2),
        VertexAttribute::new("boxSize", 2),
        VertexAttribute::new("cornerRadius", 1),
        VertexAttribute::new("color", 4),
        VertexAttribute::new("offsetZ", 1),
    ])
}

/// One instance per glyph: anchor, pen offset, kerning, atlas rect, colour,
/// depth.
pub fn glyph_layout() -> VertexLayout {
    VertexLayout::new(vec![
        VertexAttribute::new("vertex", 2),
        VertexAttribute::new("glyphOffset", 2),
        VertexAttribute::new("kerning", 1),
        VertexAttribute::new("atlasRect", 4),
        VertexAttribute::new("color", 4),
        VertexAttribute::new("offsetZ", 1),
    ])
}

/// Per-feature lookup entry, parallel to the feature list.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMetadata {
    /// Position in the layer's feature list.
    pub index: usize,
    pub lat_lng: LatLng,
    /// Zoom-0 map-space pixel of `lat_lng`.
    pub pixel: Vec2,
    /// Resolved colour, alpha filled.
    pub color: Color,
    pub size: f64,
    pub key: GridKey,
    /// Offset of the feature's first record in the main buffer.
    pub byte_offset: usize,
    pub record_count: usize,
}

impl Locatable for FeatureMetadata {
    fn pixel(&self) -> Vec2 {
        self.pixel
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFeature {
    pub index: usize,
    pub error: CoordinateError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelBuffers {
    pub backgrounds: PackedBuffer,
    pub glyphs: PackedBuffer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub buffer: PackedBuffer,
    pub labels: Option<LabelBuffers>,
    pub metadata: Vec<FeatureMetadata>,
    /// Hit geometry, parallel to `metadata`.
    pub outlines: Vec<HitOutline>,
    pub skipped: Vec<SkippedFeature>,
}

impl BuildOutput {
    pub fn empty(layout: &VertexLayout, origin: OriginRelative, labels: bool) -> Self {
        Self {
            buffer: PackedBuffer::new(layout.stride(), origin),
            labels: labels.then(|| LabelBuffers {
                backgrounds: PackedBuffer::new(label_background_layout().stride(), origin),
                glyphs: PackedBuffer::new(glyph_layout().stride(), origin),
            }),
            metadata: Vec::new(),
            outlines: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Metadata position of feature `index`, if it was not skipped.
    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.metadata
            .binary_search_by_key(&index, |m| m.index)
            .ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    MalformedFeature { index: usize, source: CoordinateError },
    InvalidStyleValue { field: &'static str, reason: String },
    /// `build` was called from inside a style resolver.
    Reentrant,
    IndexOutOfRange { index: usize, len: usize },
    Buffer(BufferError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::MalformedFeature { index, source } => {
                write!(f, "feature {index} is malformed: {source}")
            }
            BuildError::InvalidStyleValue { field, reason } => {
                write!(f, "invalid style value for {field}: {reason}")
            }
            BuildError::Reentrant => write!(f, "vertex build re-entered from a style resolver"),
            BuildError::IndexOutOfRange { index, len } => {
                write!(f, "feature index {index} out of range (len {len})")
            }
            BuildError::Buffer(e) => write!(f, "vertex buffer error: {e:?}"),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<BufferError> for BuildError {
    fn from(e: BufferError) -> Self {
        BuildError::Buffer(e)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct LabelContext<'a> {
    pub atlas: &'a FontAtlas,
    pub settings: &'a LabelSettings,
}

/// Everything a build reads besides the features and styles.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub projector: &'a dyn Projector,
    /// Zoom-0 pixel the f32 positions are stored relative to.
    pub origin: Vec2,
    pub settings: &'a LayerSettings,
    /// Font atlas for label-bearing layers; labels are omitted without it.
    pub labels: Option<LabelContext<'a>>,
}

/// Records produced for a single feature.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeature {
    pub records: Vec<f32>,
    /// `byte_offset` is 0 until the records are placed in a buffer.
    pub metadata: FeatureMetadata,
    pub outline: HitOutline,
    pub background: Vec<f32>,
    pub glyphs: Vec<f32>,
}

struct BuildGuard<'a>(&'a Cell<bool>);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Turns features into packed vertex records for one layer kind.
///
/// Builds are non-reentrant: a style resolver that calls back into the same
/// builder gets `BuildError::Reentrant`.
#[derive(Debug)]
pub struct FeatureVertexBuilder {
    kind: LayerKind,
    layout: VertexLayout,
    stack_depth: bool,
    building: Cell<bool>,
}

impl FeatureVertexBuilder {
    pub fn new(settings: &LayerSettings) -> Self {
        let stack_depth = settings.stacks_depth();
        Self {
            kind: settings.kind,
            layout: main_layout(settings.kind, stack_depth),
            stack_depth,
            building: Cell::new(false),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    fn enter(&self) -> Result<BuildGuard<'_>, BuildError> {
        if self.building.replace(true) {
            return Err(BuildError::Reentrant);
        }
        Ok(BuildGuard(&self.building))
    }

    /// Builds fresh buffers and metadata for `features`, in input order.
    ///
    /// Malformed features are skipped and listed in `skipped`; style errors
    /// abort the build.
    pub fn build<P>(
        &self,
        features: &[Feature<P>],
        styles: &LayerStyles<P>,
        ctx: &BuildContext<'_>,
    ) -> Result<BuildOutput, BuildError> {
        let _guard = self.enter()?;
        let origin = OriginRelative::new(ctx.origin);
        let with_labels = self.kind.has_labels();
        let mut out = BuildOutput::empty(&self.layout, origin, with_labels);
        out.metadata.reserve(features.len());
        out.outlines.reserve(features.len());
        if ctx.settings.opacity.is_none() {
            warn!(kind = self.kind.as_str(), "no layer opacity; colours without alpha are transparent");
        }

        for (index, feature) in features.iter().enumerate() {
            let encoded = match self.encode(index, feature, styles, ctx) {
                Ok(encoded) => encoded,
                Err(BuildError::MalformedFeature { index, source }) => {
                    debug!(index, kind = feature.geometry.kind_name(), "skipping malformed feature: {source}");
                    out.skipped.push(SkippedFeature {
                        index,
                        error: source,
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut metadata = encoded.metadata;
            metadata.byte_offset = out.buffer.record_count() * out.buffer.stride_bytes();
            for record in encoded.records.chunks(self.layout.stride()) {
                out.buffer.push_record(record)?;
            }
            if let Some(labels) = out.labels.as_mut() {
                if !encoded.background.is_empty() {
                    labels.backgrounds.push_record(&encoded.background)?;
                }
                for glyph in encoded.glyphs.chunks(labels.glyphs.stride()) {
                    labels.glyphs.push_record(glyph)?;
                }
            }
            out.metadata.push(metadata);
            out.outlines.push(encoded.outline);
        }

        debug!(
            kind = self.kind.as_str(),
            features = features.len(),
            records = out.buffer.record_count(),
            skipped = out.skipped.len(),
            "built vertex buffer"
        );
        Ok(out)
    }

    /// Encodes one feature without placing it in a buffer.
    pub fn encode_feature<P>(
        &self,
        index: usize,
        feature: &Feature<P>,
        styles: &LayerStyles<P>,
        ctx: &BuildContext<'_>,
    ) -> Result<EncodedFeature, BuildError> {
        let _guard = self.enter()?;
        self.encode(index, feature, styles, ctx)
    }

    fn encode<P>(
        &self,
        index: usize,
        feature: &Feature<P>,
        styles: &LayerStyles<P>,
        ctx: &BuildContext<'_>,
    ) -> Result<EncodedFeature, BuildError> {
        let settings = ctx.settings;
        let axis = settings.axis_order;
        let malformed = |source| BuildError::MalformedFeature { index, source };

        let lat_lng = axis.resolve_anchor(&feature.geometry).map_err(malformed)?;
        let pixel = ctx.projector.project(lat_lng, 0.0);

        let Some(color_style) = styles.color.as_ref() else {
            return Err(BuildError::InvalidStyleValue {
                field: "color",
                reason: "no constant or resolver configured".to_string(),
            });
        };
        let color = color_style.resolve(index, feature);
        if !color.is_finite() {
            return Err(BuildError::InvalidStyleValue {
                field: "color",
                reason: format!("non-finite channel in {color:?}"),
            });
        }
        let color = color.with_resolved_alpha(settings.opacity);

        let size = if self.kind.uses_size() {
            let Some(size_style) = styles.size.as_ref() else {
                return Err(BuildError::InvalidStyleValue {
                    field: "size",
                    reason: "no constant or resolver configured".to_string(),
                });
            };
            let size = size_style.resolve(index, feature);
            if !size.is_finite() || size < 0.0 {
                return Err(BuildError::InvalidStyleValue {
                    field: "size",
                    reason: format!("expected a finite non-negative size, got {size}"),
                });
            }
            size
        } else {
            0.0
        };

        let origin = OriginRelative::new(ctx.origin);
        let rgba = color.to_f32();
        let mut records = Vec::with_capacity(self.layout.stride());
        let mut outline = HitOutline::Anchor;
        match self.kind {
            LayerKind::Points => {
                records.extend_from_slice(&origin.to_f32(pixel));
                records.extend_from_slice(&rgba);
                records.push(size as f32);
            }
            LayerKind::Icons | LayerKind::LabeledIcons => {
                records.extend_from_slice(&origin.to_f32(pixel));
                records.extend_from_slice(&rgba);
                records.push(size as f32);
                records.push(settings.icon_anchor[0] as f32);
                records.push(settings.icon_anchor[1] as f32);
                if self.stack_depth {
                    records.push(feature_depth(index, DepthSlot::Icon, settings.increment_z) as f32);
                }
            }
            LayerKind::Lines => {
                let lines = project_rings(&line_rings(&feature.geometry), ctx).map_err(malformed)?;
                let segments = line_segments(&lines);
                for vertex in &segments {
                    records.extend_from_slice(&origin.to_f32(*vertex));
                    records.extend_from_slice(&rgba);
                }
                outline = HitOutline::Segments(segments);
            }
            LayerKind::Shapes => {
                let mut triangles = Vec::new();
                for polygon in polygons(&feature.geometry) {
                    let rings = project_rings(&polygon, ctx).map_err(malformed)?;
                    triangles.extend(triangulate_polygon(&rings));
                }
                for vertex in &triangles {
                    records.extend_from_slice(&origin.to_f32(*vertex));
                    records.extend_from_slice(&rgba);
                }
                outline = HitOutline::triangles(triangles);
            }
        }

        let mut encoded = EncodedFeature {
            records,
            metadata: FeatureMetadata {
                index,
                lat_lng,
                pixel,
                color,
                size,
                key: GridKey::from_lat_lng(lat_lng),
                byte_offset: 0,
                record_count: 0,
            },
            outline,
            background: Vec::new(),
            glyphs: Vec::new(),
        }
        .with_record_count(self.layout.stride());

        if self.kind.has_labels()
            && let Some(labels) = ctx.labels
        {
            self.encode_label(index, feature, styles, ctx, labels, origin.to_f32(pixel), &mut encoded);
        }
        Ok(encoded)
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_label<P>(
        &self,
        index: usize,
        feature: &Feature<P>,
        styles: &LayerStyles<P>,
        ctx: &BuildContext<'_>,
        labels: LabelContext<'_>,
        anchor: [f32; 2],
        encoded: &mut EncodedFeature,
    ) {
        let label_styles = &styles.labels;
        let text = label_styles
            .text
            .as_ref()
            .map(|s| s.resolve(index, feature))
            .unwrap_or_default();
        if text.is_empty() {
            return;
        }
        let layout = layout_text(labels.atlas, &text, labels.settings.font_scale);
        if layout.missing > 0 {
            debug!(index, missing = layout.missing, "label characters missing from font atlas");
        }
        if layout.is_empty() {
            return;
        }

        let offset = label_styles
            .offset
            .as_ref()
            .map_or(labels.settings.offset, |s| s.resolve(index, feature));
        let offset = Vec2::new(offset[0], offset[1]);
        // Label colours without alpha are opaque.
        let text_color = label_styles
            .color
            .as_ref()
            .map_or(labels.settings.color, |s| s.resolve(index, feature))
            .with_resolved_alpha(Some(1.0))
            .to_f32();
        let background_color = label_styles
            .background_color
            .as_ref()
            .map_or(labels.settings.background_color, |s| s.resolve(index, feature))
            .with_resolved_alpha(Some(1.0))
            .to_f32();
        let increment_z = ctx.settings.increment_z;

        let bg = BackgroundBox::around(
            &layout,
            offset,
            labels.settings.padding,
            labels.settings.corner_radius,
        );
        encoded.background.extend_from_slice(&anchor);
        encoded
            .background
            .extend_from_slice(&[bg.offset.x as f32, bg.offset.y as f32]);
        encoded
            .background
            .extend_from_slice(&[bg.size.x as f32, bg.size.y as f32]);
        encoded.background.push(bg.corner_radius as f32);
        encoded.background.extend_from_slice(&background_color);
        encoded
            .background
            .push(feature_depth(index, DepthSlot::LabelBackground, increment_z) as f32);

        let glyph_depth = feature_depth(index, DepthSlot::LabelGlyph, increment_z) as f32;
        for glyph in &layout.glyphs {
            let at = glyph.offset + offset;
            encoded.glyphs.extend_from_slice(&anchor);
            encoded.glyphs.extend_from_slice(&[at.x as f32, at.y as f32]);
            encoded.glyphs.push(glyph.kerning as f32);
            encoded
                .glyphs
                .extend(glyph.atlas_rect.iter().map(|v| *v as f32));
            encoded.glyphs.extend_from_slice(&text_color);
            encoded.glyphs.push(glyph_depth);
        }
    }
}

impl EncodedFeature {
    fn with_record_count(mut self, stride: usize) -> Self {
        self.metadata.record_count = self.records.len() / stride.max(1);
        self
    }
}

/// Polylines drawn by a lines layer: line strings as-is, polygon rings as
/// outlines.
fn line_rings(geometry: &Geometry) -> Vec<&[Position]> {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
        Geometry::LineString(line) => vec![line.as_slice()],
        Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
            lines.iter().map(Vec::as_slice).collect()
        }
        Geometry::MultiPolygon(polys) => polys
            .iter()
            .flat_map(|rings| rings.iter().map(Vec::as_slice))
            .collect(),
    }
}

fn polygons(geometry: &Geometry) -> Vec<Vec<&[Position]>> {
    match geometry {
        Geometry::Polygon(rings) => vec![rings.iter().map(Vec::as_slice).collect()],
        Geometry::MultiPolygon(polys) => polys
            .iter()
            .map(|rings| rings.iter().map(Vec::as_slice).collect())
            .collect(),
        _ => Vec::new(),
    }
}

fn project_rings(rings: &[&[Position]], ctx: &BuildContext<'_>) -> Result<Vec<Vec<Vec2>>, CoordinateError> {
    let axis = ctx.settings.axis_order;
    rings
        .iter()
        .map(|ring| {
            ring.iter()
                .map(|p| -> Result<Vec2, CoordinateError> {
                    Ok(ctx.projector.project(axis.resolve(p)?, 0.0))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{
        BuildContext, BuildError, DepthSlot, FeatureVertexBuilder, LabelContext, feature_depth,
        glyph_layout, label_background_layout,
    };
    use crate::settings::{LabelSettings, LayerKind, LayerSettings};
    use crate::style::{Color, LabelStyles, LayerStyles, StyleValue};
    use crate::vector::HitOutline;
    use formats::FontAtlas;
    use foundation::math::{Projector, SphericalMercator, Vec2};
    use scene::{CoordinateError, Feature, Geometry};

    const ATLAS: &str = r#"{
        "chars": [
            { "id": 72, "char": "H", "x": 0, "y": 0, "width": 8, "height": 10, "xadvance": 9 },
            { "id": 105, "char": "i", "x": 8, "y": 0, "width": 3, "height": 10, "xadvance": 4 }
        ],
        "kernings": []
    }"#;

    fn ctx<'a>(settings: &'a LayerSettings, labels: Option<LabelContext<'a>>) -> BuildContext<'a> {
        BuildContext {
            projector: &SphericalMercator,
            origin: Vec2::new(128.0, 128.0),
            settings,
            labels,
        }
    }

    fn grid_points(n: usize) -> Vec<Feature<usize>> {
        (0..n)
            .map(|i| Feature::point(vec![(i % 10) as f64, (i / 10) as f64], i))
            .collect()
    }

    fn styles() -> LayerStyles<usize> {
        LayerStyles::new(Color::RED, 4.0)
    }

    #[test]
    fn icon_stride_nine_times_hundred_features() {
        let settings = LayerSettings::for_kind(LayerKind::Icons);
        let builder = FeatureVertexBuilder::new(&settings);
        assert_eq!(builder.stride(), 9);
        let out = builder
            .build(&grid_points(100), &styles(), &ctx(&settings, None))
            .expect("build");
        assert_eq!(out.buffer.len(), 900);
        assert_eq!(out.metadata.len(), 100);
    }

    #[test]
    fn buffer_length_is_multiple_of_stride_for_every_kind() {
        let features = vec![
            Feature::new(Geometry::Point(vec![1.0, 1.0]), 0usize),
            Feature::new(
                Geometry::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 0.0]]),
                1,
            ),
            Feature::new(
                Geometry::Polygon(vec![vec![
                    vec![0.0, 0.0],
                    vec![0.0, 1.0],
                    vec![1.0, 1.0],
                    vec![1.0, 0.0],
                    vec![0.0, 0.0],
                ]]),
                2,
            ),
        ];
        for kind in LayerKind::ALL {
            let settings = LayerSettings::for_kind(kind);
            let builder = FeatureVertexBuilder::new(&settings);
            let out = builder
                .build(&features, &styles(), &ctx(&settings, None))
                .expect("build");
            assert_eq!(out.buffer.len() % builder.stride(), 0, "{kind:?}");
        }
    }

    #[test]
    fn lines_and_shapes_tessellate() {
        let line = Feature::new(
            Geometry::LineString(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 0.0]]),
            0usize,
        );
        let settings = LayerSettings::for_kind(LayerKind::Lines);
        let out = FeatureVertexBuilder::new(&settings)
            .build(&[line], &styles(), &ctx(&settings, None))
            .expect("build");
        assert_eq!(out.buffer.record_count(), 4);
        assert_eq!(out.metadata[0].record_count, 4);
        assert!(matches!(&out.outlines[0], HitOutline::Segments(pairs) if pairs.len() == 4));

        let square = Feature::new(
            Geometry::MultiPolygon(vec![
                vec![vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0], vec![1.0, 0.0]]],
                vec![vec![vec![5.0, 5.0], vec![5.0, 6.0], vec![6.0, 6.0], vec![6.0, 5.0]]],
            ]),
            0usize,
        );
        let settings = LayerSettings::for_kind(LayerKind::Shapes);
        let out = FeatureVertexBuilder::new(&settings)
            .build(&[square], &LayerStyles { size: None, ..styles() }, &ctx(&settings, None))
            .expect("build");
        assert_eq!(out.buffer.record_count(), 12);
        assert_eq!(out.outlines.len(), out.metadata.len());
        let inside_second = SphericalMercator.project(foundation::math::LatLng::new(5.5, 5.5), 0.0);
        assert_eq!(out.outlines[0].distance(inside_second), Some(0.0));
    }

    #[test]
    fn points_record_layout_and_offsets() {
        let settings = LayerSettings::for_kind(LayerKind::Points);
        let builder = FeatureVertexBuilder::new(&settings);
        let features = vec![Feature::point(vec![0.0, 0.0], 0usize), Feature::point(vec![10.0, 10.0], 1)];
        let out = builder
            .build(&features, &styles(), &ctx(&settings, None))
            .expect("build");

        // (0, 0) projects onto the origin (128, 128).
        assert_eq!(out.buffer.record(0), Some(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 4.0][..]));
        assert_eq!(out.metadata[1].byte_offset, 28);
        assert_eq!(out.metadata[1].index, 1);
        let expected = SphericalMercator.project(foundation::math::LatLng::new(10.0, 10.0), 0.0);
        assert_eq!(out.metadata[1].pixel, expected);
    }

    #[test]
    fn alpha_falls_back_to_opacity_then_zero() {
        let mut settings = LayerSettings::for_kind(LayerKind::Points);
        settings.opacity = Some(0.25);
        let features = vec![Feature::point(vec![0.0, 0.0], 0usize)];
        let out = FeatureVertexBuilder::new(&settings)
            .build(&features, &styles(), &ctx(&settings, None))
            .expect("build");
        assert_eq!(out.buffer.record(0).map(|r| r[5]), Some(0.25));

        settings.opacity = None;
        let out = FeatureVertexBuilder::new(&settings)
            .build(&features, &styles(), &ctx(&settings, None))
            .expect("build");
        assert_eq!(out.buffer.record(0).map(|r| r[5]), Some(0.0));
        assert_eq!(out.metadata[0].color.a, Some(0.0));
    }

    #[test]
    fn malformed_features_are_skipped_and_reported() {
        let settings = LayerSettings::for_kind(LayerKind::Points);
        let features = vec![
            Feature::point(vec![1.0, 1.0], 0usize),
            Feature::point(vec![f64::NAN, 1.0], 1),
            Feature::point(vec![2.0], 2),
            Feature::point(vec![3.0, 3.0], 3),
        ];
        let out = FeatureVertexBuilder::new(&settings)
            .build(&features, &styles(), &ctx(&settings, None))
            .expect("build");
        assert_eq!(out.metadata.iter().map(|m| m.index).collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(out.skipped.len(), 2);
        assert_eq!(out.skipped[1].error, CoordinateError::MissingSlot { slot: 1, len: 1 });
        assert_eq!(out.position_of(3), Some(1));
        assert_eq!(out.position_of(1), None);
    }

    #[test]
    fn missing_size_resolver_is_fatal() {
        let settings = LayerSettings::for_kind(LayerKind::Points);
        let styles = LayerStyles::<usize> {
            color: Some(Color::RED.into()),
            ..LayerStyles::default()
        };
        let err = FeatureVertexBuilder::new(&settings)
            .build(&grid_points(1), &styles, &ctx(&settings, None))
            .expect_err("must fail");
        assert!(matches!(err, BuildError::InvalidStyleValue { field: "size", .. }));

        let bad_size = LayerStyles::new(Color::RED, StyleValue::resolver(|_, _: &Feature<usize>| f64::NAN));
        let err = FeatureVertexBuilder::new(&settings)
            .build(&grid_points(1), &bad_size, &ctx(&settings, None))
            .expect_err("must fail");
        assert!(matches!(err, BuildError::InvalidStyleValue { field: "size", .. }));
    }

    #[test]
    fn rebuilding_same_input_is_byte_identical() {
        let settings = LayerSettings::for_kind(LayerKind::Icons);
        let builder = FeatureVertexBuilder::new(&settings);
        let features = grid_points(20);
        let a = builder.build(&features, &styles(), &ctx(&settings, None)).expect("build");
        let b = builder.build(&features, &styles(), &ctx(&settings, None)).expect("build");
        assert_eq!(a.buffer.as_bytes(), b.buffer.as_bytes());
        assert_eq!(a.metadata, b.metadata);
    }

    #[test]
    fn labeled_icons_emit_labels_on_separate_depth_slots() {
        let settings = LayerSettings::for_kind(LayerKind::LabeledIcons);
        let label_settings = LabelSettings::default();
        let atlas = FontAtlas::from_json_str(ATLAS).expect("atlas");
        let labels = LabelContext {
            atlas: &atlas,
            settings: &label_settings,
        };
        let styles = styles().with_labels(LabelStyles {
            text: Some(StyleValue::resolver(|i, _: &Feature<usize>| {
                if i == 1 { String::new() } else { "Hi".to_string() }
            })),
            ..LabelStyles::default()
        });
        let builder = FeatureVertexBuilder::new(&settings);
        assert_eq!(builder.stride(), 10);
        let out = builder
            .build(&grid_points(3), &styles, &ctx(&settings, Some(labels)))
            .expect("build");

        let label_buffers = out.labels.expect("labels");
        assert_eq!(label_buffers.backgrounds.stride(), label_background_layout().stride());
        assert_eq!(label_buffers.glyphs.stride(), glyph_layout().stride());
        // Feature 1 has no text.
        assert_eq!(label_buffers.backgrounds.record_count(), 2);
        assert_eq!(label_buffers.glyphs.record_count(), 4);

        let inc = settings.increment_z;
        let icon_z = out.buffer.record(2).map(|r| r[9]);
        assert_eq!(icon_z, Some(feature_depth(2, DepthSlot::Icon, inc) as f32));
        let bg = label_buffers.backgrounds.record(1).expect("background");
        assert_eq!(bg[11], feature_depth(2, DepthSlot::LabelBackground, inc) as f32);
        // Box: width 13 (9 + 4) and height 10, padded by 2 on each side.
        assert_eq!(&bg[2..6], &[-2.0, -2.0, 17.0, 14.0]);
        let glyph = label_buffers.glyphs.record(3).expect("glyph");
        assert_eq!(glyph[2], 9.0);
        assert_eq!(glyph[13], feature_depth(2, DepthSlot::LabelGlyph, inc) as f32);

        // Depth ranges of consecutive features never overlap.
        assert!(feature_depth(0, DepthSlot::LabelGlyph, inc) < feature_depth(1, DepthSlot::Icon, inc));
    }

    #[test]
    fn nested_build_from_resolver_is_rejected() {
        let settings = LayerSettings::for_kind(LayerKind::Points);
        let builder = Rc::new(FeatureVertexBuilder::new(&settings));
        let seen: Rc<RefCell<Option<BuildError>>> = Rc::new(RefCell::new(None));

        let inner = Rc::clone(&builder);
        let inner_seen = Rc::clone(&seen);
        let inner_settings = settings.clone();
        let styles = LayerStyles::new(
            StyleValue::resolver(move |_, _: &Feature<usize>| {
                let nested = inner.build::<usize>(&[], &LayerStyles::default(), &ctx(&inner_settings, None));
                *inner_seen.borrow_mut() = nested.err();
                Color::RED
            }),
            1.0,
        );

        builder
            .build(&grid_points(1), &styles, &ctx(&settings, None))
            .expect("outer build");
        assert_eq!(*seen.borrow(), Some(BuildError::Reentrant));

        // The guard is released afterwards.
        assert!(builder.build(&grid_points(1), &LayerStyles::new(Color::RED, 1.0), &ctx(&settings, None)).is_ok());
    }
}
