use std::mem;

use formats::FontAtlas;
use foundation::math::{LatLng, Projector, SphericalMercator, Vec2, zoom_scale};
use gpu::{
    BatchTexture, DecodedImage, DrawMode, DrawPass, FrameUniform, LayerBatch, LayerId, Primitive,
    RenderableLayer, ShaderSource, TextureRole, UniformValue, VertexLayout,
};
use runtime::{DiagnosticKind, Diagnostics};
use scene::{DEFAULT_RING, Feature, GridIndex, HoverDelta, HoverSet, query_nearest};
use tracing::{debug, info};

use crate::builder::{
    BuildContext, BuildError, BuildOutput, FeatureMetadata, FeatureVertexBuilder, LabelContext,
    glyph_layout, label_background_layout,
};
use crate::registry::{ClickHandler, HoverHandler, HoverOffHandler, PointerEvent};
use crate::settings::{LabelSettings, LayerKind, LayerSettings};
use crate::style::LayerStyles;

/// Shader programs a layer draws with. Label shaders are only used by
/// labeled icon layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerShaders {
    pub main: ShaderSource,
    pub label_background: ShaderSource,
    pub label_glyph: ShaderSource,
}

impl LayerShaders {
    pub fn new(main: ShaderSource) -> Self {
        Self {
            main,
            label_background: ShaderSource::new("", ""),
            label_glyph: ShaderSource::new("", ""),
        }
    }

    pub fn with_labels(mut self, background: ShaderSource, glyph: ShaderSource) -> Self {
        self.label_background = background;
        self.label_glyph = glyph;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    IconImage(String),
    FontAtlas(String),
}

impl std::fmt::Display for AssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetError::IconImage(reason) => write!(f, "icon image failed to load: {reason}"),
            AssetError::FontAtlas(reason) => write!(f, "font atlas failed to load: {reason}"),
        }
    }
}

impl std::error::Error for AssetError {}

/// Nearest feature of one layer.
#[derive(Debug)]
pub struct LayerHit<'a, P> {
    pub feature: &'a Feature<P>,
    pub metadata: &'a FeatureMetadata,
    /// Zoom-0 map-space pixels. `0.0` for a point inside a shape.
    pub distance: f64,
    /// Always `false` for line and shape picks, which scan every outline.
    pub used_fallback: bool,
}

impl<P> LayerHit<'_, P> {
    pub fn screen_distance(&self, zoom: f64) -> f64 {
        self.distance * zoom_scale(zoom)
    }
}

/// Outcome of one hover pass over a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverUpdate {
    /// Value returned by the hover handler, if it ran and returned one.
    pub result: Option<bool>,
    /// Feature indices entering and leaving the hovered set.
    pub delta: HoverDelta,
}

struct Handlers<P> {
    click: Option<ClickHandler<P>>,
    hover: Option<HoverHandler<P>>,
    hover_off: Option<HoverOffHandler<P>>,
}

#[derive(Debug, Clone, PartialEq)]
struct TextureAsset {
    image: DecodedImage,
    revision: u64,
}

/// One overlay layer: features, their packed buffers and hit index.
///
/// Every data operation (`set_data`, `insert`, `update`, `remove`) rebuilds
/// synchronously; the new buffers are drawn on the next frame. A failed build
/// leaves the previous features and buffers in place.
///
/// A rebuild clears the hovered set without running the hover-off handler,
/// since feature indices may have shifted. The next pointer move reports
/// whatever is under it as entered.
pub struct GlLayer<P> {
    id: LayerId,
    settings: LayerSettings,
    label_settings: LabelSettings,
    styles: LayerStyles<P>,
    shaders: LayerShaders,
    builder: FeatureVertexBuilder,
    background_layout: VertexLayout,
    glyph_layout: VertexLayout,
    projector: Box<dyn Projector>,
    origin: Vec2,
    features: Vec<Feature<P>>,
    output: BuildOutput,
    grid: GridIndex,
    active: bool,
    icon: Option<TextureAsset>,
    font_atlas: Option<FontAtlas>,
    font_texture: Option<TextureAsset>,
    asset_revision: u64,
    asset_failure: Option<AssetError>,
    diagnostics: Diagnostics,
    hovered: HoverSet,
    handlers: Handlers<P>,
}

impl<P> std::fmt::Debug for GlLayer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlLayer")
            .field("id", &self.id)
            .field("kind", &self.settings.kind)
            .field("features", &self.features.len())
            .field("records", &self.output.buffer.record_count())
            .field("active", &self.active)
            .field("origin", &self.origin)
            .finish()
    }
}

impl<P> GlLayer<P> {
    pub fn new(id: LayerId, settings: LayerSettings, styles: LayerStyles<P>, shaders: LayerShaders) -> Self {
        let builder = FeatureVertexBuilder::new(&settings);
        let origin = Vec2::ZERO;
        let output = BuildOutput::empty(
            builder.layout(),
            foundation::math::OriginRelative::new(origin),
            settings.kind.has_labels(),
        );
        Self {
            id,
            settings,
            label_settings: LabelSettings::default(),
            styles,
            shaders,
            builder,
            background_layout: label_background_layout(),
            glyph_layout: glyph_layout(),
            projector: Box::new(SphericalMercator),
            origin,
            features: Vec::new(),
            output,
            grid: GridIndex::new(),
            active: true,
            icon: None,
            font_atlas: None,
            font_texture: None,
            asset_revision: 0,
            asset_failure: None,
            diagnostics: Diagnostics::new(),
            hovered: HoverSet::new(),
            handlers: Handlers {
                click: None,
                hover: None,
                hover_off: None,
            },
        }
    }

    pub fn with_label_settings(mut self, label_settings: LabelSettings) -> Self {
        self.label_settings = label_settings;
        self
    }

    /// Replaces the default spherical Mercator projection.
    pub fn with_projector(mut self, projector: Box<dyn Projector>) -> Self {
        self.projector = projector;
        self
    }

    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn on_click(mut self, handler: impl FnMut(&PointerEvent, &Feature<P>) -> Option<bool> + 'static) -> Self {
        self.handlers.click = Some(Box::new(handler));
        self
    }

    pub fn on_hover(mut self, handler: impl FnMut(&PointerEvent, &Feature<P>) -> Option<bool> + 'static) -> Self {
        self.handlers.hover = Some(Box::new(handler));
        self
    }

    pub fn on_hover_off(mut self, handler: impl FnMut(&PointerEvent, &Feature<P>) + 'static) -> Self {
        self.handlers.hover_off = Some(Box::new(handler));
        self
    }

    pub fn kind(&self) -> LayerKind {
        self.settings.kind
    }

    pub fn settings(&self) -> &LayerSettings {
        &self.settings
    }

    pub fn label_settings(&self) -> &LabelSettings {
        &self.label_settings
    }

    pub fn features(&self) -> &[Feature<P>] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn output(&self) -> &BuildOutput {
        &self.output
    }

    pub fn metadata(&self) -> &[FeatureMetadata] {
        &self.output.metadata
    }

    /// Metadata of feature `index`, `None` if it was skipped.
    pub fn metadata_for(&self, index: usize) -> Option<&FeatureMetadata> {
        self.output
            .position_of(index)
            .and_then(|p| self.output.metadata.get(p))
    }

    pub fn grid(&self) -> &GridIndex {
        &self.grid
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn hovered(&self) -> &HoverSet {
        &self.hovered
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn asset_failure(&self) -> Option<&AssetError> {
        self.asset_failure.as_ref()
    }

    /// Replaces all features.
    pub fn set_data(&mut self, features: Vec<Feature<P>>) -> Result<(), BuildError> {
        let previous = mem::replace(&mut self.features, features);
        if let Err(e) = self.rebuild() {
            self.features = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Inserts `features` before position `index` (`index == len` appends).
    pub fn insert(&mut self, features: Vec<Feature<P>>, index: usize) -> Result<(), BuildError> {
        let len = self.features.len();
        if index > len {
            return Err(BuildError::IndexOutOfRange { index, len });
        }
        let count = features.len();
        self.features.splice(index..index, features);
        if let Err(e) = self.rebuild() {
            self.features.drain(index..index + count);
            return Err(e);
        }
        Ok(())
    }

    /// Replaces feature `index`.
    ///
    /// Point and icon layers patch the feature's records in place; other
    /// kinds (and features that were or become malformed) rebuild.
    pub fn update(&mut self, feature: Feature<P>, index: usize) -> Result<(), BuildError> {
        let len = self.features.len();
        let Some(slot) = self.features.get_mut(index) else {
            return Err(BuildError::IndexOutOfRange { index, len });
        };
        let previous = mem::replace(slot, feature);

        let patched = match self.output.position_of(index) {
            Some(position) if self.kind().fixed_record_count() => self.patch(index, position),
            _ => Ok(false),
        };
        let result = match patched {
            Ok(true) => Ok(()),
            Ok(false) => self.rebuild(),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.features[index] = previous;
        }
        result
    }

    /// Removes the features at `indices` and returns them in ascending index
    /// order. Duplicate indices are ignored.
    pub fn remove(&mut self, indices: &[usize]) -> Result<Vec<Feature<P>>, BuildError> {
        let len = self.features.len();
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if let Some(&index) = sorted.iter().find(|&&i| i >= len) {
            return Err(BuildError::IndexOutOfRange { index, len });
        }

        let mut removed: Vec<(usize, Feature<P>)> = Vec::with_capacity(sorted.len());
        for &index in sorted.iter().rev() {
            removed.push((index, self.features.remove(index)));
        }
        if let Err(e) = self.rebuild() {
            for (index, feature) in removed.into_iter().rev() {
                self.features.insert(index, feature);
            }
            return Err(e);
        }
        Ok(removed.into_iter().rev().map(|(_, f)| f).collect())
    }

    pub fn remove_all(&mut self) -> Vec<Feature<P>> {
        let removed = mem::take(&mut self.features);
        let output = BuildOutput::empty(
            self.builder.layout(),
            foundation::math::OriginRelative::new(self.origin),
            self.kind().has_labels(),
        );
        self.install(output);
        removed
    }

    /// Replaces the styles and rebuilds.
    pub fn set_styles(&mut self, styles: LayerStyles<P>) -> Result<(), BuildError> {
        let previous = mem::replace(&mut self.styles, styles);
        if let Err(e) = self.rebuild() {
            self.styles = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Rebuilds relative to a new origin so `f32` positions near the view stay
    /// precise.
    pub fn reanchor(&mut self, origin: Vec2) -> Result<(), BuildError> {
        if origin == self.origin {
            return Ok(());
        }
        let previous = mem::replace(&mut self.origin, origin);
        if let Err(e) = self.rebuild() {
            self.origin = previous;
            return Err(e);
        }
        debug!(layer = self.id.0, x = origin.x, y = origin.y, "re-anchored layer");
        Ok(())
    }

    /// Nearest feature to `lat_lng`, measured in zoom-0 pixels.
    pub fn query_nearest(&self, lat_lng: LatLng) -> Option<LayerHit<'_, P>> {
        let target = self.projector.project(lat_lng, 0.0);
        let hit = query_nearest(&self.output.metadata, &self.grid, lat_lng, target, DEFAULT_RING)?;
        let metadata = self.output.metadata.get(hit.position)?;
        let feature = self.features.get(metadata.index)?;
        Some(LayerHit {
            feature,
            metadata,
            distance: hit.distance,
            used_fallback: hit.used_fallback,
        })
    }

    /// Feature under `lat_lng`, as click and hover dispatch see it.
    ///
    /// Points and icons use `query_nearest`. Lines measure the distance to
    /// the nearest segment. Shapes hit at distance `0.0` when `lat_lng` falls
    /// inside a polygon (holes excluded), the first such shape winning.
    pub fn pick(&self, lat_lng: LatLng) -> Option<LayerHit<'_, P>> {
        if !matches!(self.kind(), LayerKind::Lines | LayerKind::Shapes) {
            return self.query_nearest(lat_lng);
        }
        let target = self.projector.project(lat_lng, 0.0);
        let mut best: Option<(usize, f64)> = None;
        for (position, outline) in self.output.outlines.iter().enumerate() {
            let Some(distance) = outline.distance(target) else {
                continue;
            };
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((position, distance));
            }
        }
        let (position, distance) = best?;
        let metadata = self.output.metadata.get(position)?;
        let feature = self.features.get(metadata.index)?;
        Some(LayerHit {
            feature,
            metadata,
            distance,
            used_fallback: false,
        })
    }

    pub fn set_icon_image(&mut self, image: DecodedImage) {
        self.asset_revision += 1;
        self.icon = Some(TextureAsset {
            image,
            revision: self.asset_revision,
        });
        if matches!(self.asset_failure, Some(AssetError::IconImage(_))) {
            self.asset_failure = None;
        }
        info!(layer = self.id.0, "icon image loaded");
    }

    /// Installs the font atlas and its texture, then rebuilds so labels are
    /// laid out with it.
    pub fn set_font_atlas(&mut self, atlas: FontAtlas, texture: DecodedImage) -> Result<(), BuildError> {
        let previous = self.font_atlas.replace(atlas);
        if let Err(e) = self.rebuild() {
            self.font_atlas = previous;
            return Err(e);
        }
        self.asset_revision += 1;
        self.font_texture = Some(TextureAsset {
            image: texture,
            revision: self.asset_revision,
        });
        if matches!(self.asset_failure, Some(AssetError::FontAtlas(_))) {
            self.asset_failure = None;
        }
        info!(layer = self.id.0, glyphs = self.font_atlas.as_ref().map_or(0, FontAtlas::glyph_count), "font atlas loaded");
        Ok(())
    }

    /// Marks an asset as failed; the layer draws nothing until the asset is
    /// loaded successfully.
    pub fn asset_failed(&mut self, error: AssetError) {
        self.diagnostics
            .emit(DiagnosticKind::AssetLoadFailure, format!("layer {}: {error}", self.id.0));
        self.asset_failure = Some(error);
    }

    fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            projector: self.projector.as_ref(),
            origin: self.origin,
            settings: &self.settings,
            labels: self.font_atlas.as_ref().map(|atlas| LabelContext {
                atlas,
                settings: &self.label_settings,
            }),
        }
    }

    fn rebuild(&mut self) -> Result<(), BuildError> {
        let output = self
            .builder
            .build(&self.features, &self.styles, &self.build_context())?;
        self.install(output);
        Ok(())
    }

    fn install(&mut self, output: BuildOutput) {
        for skipped in &output.skipped {
            self.diagnostics.emit(
                DiagnosticKind::MalformedFeature,
                format!("layer {} feature {}: {}", self.id.0, skipped.index, skipped.error),
            );
        }
        self.grid = GridIndex::build(output.metadata.iter().map(|m| m.key));
        self.output = output;
        self.hovered.clear();
    }

    /// Rewrites the records of one feature in place. `Ok(false)` means the
    /// feature cannot be patched and needs a rebuild.
    fn patch(&mut self, index: usize, position: usize) -> Result<bool, BuildError> {
        let encoded = {
            let ctx = self.build_context();
            match self
                .builder
                .encode_feature(index, &self.features[index], &self.styles, &ctx)
            {
                Ok(encoded) => encoded,
                Err(BuildError::MalformedFeature { .. }) => return Ok(false),
                Err(e) => return Err(e),
            }
        };
        let Some(old) = self.output.metadata.get(position) else {
            return Ok(false);
        };
        if old.record_count != encoded.metadata.record_count {
            return Ok(false);
        }
        let byte_offset = old.byte_offset;
        self.output
            .buffer
            .write_records_at(byte_offset, &encoded.records)?;

        let mut metadata = encoded.metadata;
        metadata.byte_offset = byte_offset;
        self.output.metadata[position] = metadata;
        self.grid = GridIndex::build(self.output.metadata.iter().map(|m| m.key));
        Ok(true)
    }

    pub(crate) fn fire_click(&mut self, event: &PointerEvent, index: usize) -> Option<bool> {
        let feature = self.features.get(index)?;
        self.handlers.click.as_mut().and_then(|h| h(event, feature))
    }

    /// Updates the hovered set for a pointer at `event` and runs the hover
    /// handlers.
    pub(crate) fn update_hover(&mut self, event: &PointerEvent) -> HoverUpdate {
        let hit = self.pick(event.lat_lng).and_then(|hit| {
            let radius = self.settings.hover_radius(hit.metadata.size);
            (hit.screen_distance(event.zoom) <= radius).then_some(hit.metadata.index)
        });

        let mut update = HoverUpdate::default();
        let next = HoverSet::from_positions(hit);
        if let Some(index) = hit
            && let Some(feature) = self.features.get(index)
            && let Some(handler) = self.handlers.hover.as_mut()
        {
            update.result = handler(event, feature);
        }
        update.delta = self.hovered.replace(next);
        if let Some(handler) = self.handlers.hover_off.as_mut() {
            for index in &update.delta.left {
                if let Some(feature) = self.features.get(*index) {
                    handler(event, feature);
                }
            }
        }
        update
    }

    fn main_batch(&self) -> LayerBatch<'_> {
        let kind = self.kind();
        let (pass, primitive) = match kind {
            LayerKind::Points | LayerKind::Icons | LayerKind::LabeledIcons => {
                (DrawPass::Points, Primitive::Points)
            }
            LayerKind::Lines => (DrawPass::Lines, Primitive::Lines),
            LayerKind::Shapes => (DrawPass::Shapes, Primitive::Triangles),
        };
        let texture = self
            .icon
            .as_ref()
            .filter(|_| kind.uses_icon())
            .map(|icon| BatchTexture {
                role: TextureRole::IconSprite,
                image: &icon.image,
                revision: icon.revision,
            });
        let uniforms = if kind.uses_icon() {
            vec![("iconSize", UniformValue::Float(self.settings.icon_size as f32))]
        } else {
            Vec::new()
        };
        LayerBatch {
            key: "main",
            pass,
            shader: &self.shaders.main,
            layout: self.builder.layout(),
            buffer: &self.output.buffer,
            mode: DrawMode::Vertices(primitive),
            texture,
            frame_uniforms: &[FrameUniform::Matrix],
            uniforms,
        }
    }
}

impl<P> RenderableLayer for GlLayer<P> {
    fn id(&self) -> LayerId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_ready(&self) -> bool {
        let kind = self.kind();
        self.asset_failure.is_none()
            && (!kind.uses_icon() || self.icon.is_some())
            && (!kind.has_labels() || (self.font_atlas.is_some() && self.font_texture.is_some()))
    }

    fn origin(&self) -> Vec2 {
        self.origin
    }

    fn batches(&self) -> Vec<LayerBatch<'_>> {
        let mut out = vec![self.main_batch()];
        if let (Some(labels), Some(font)) = (self.output.labels.as_ref(), self.font_texture.as_ref()) {
            let quad = DrawMode::Instanced {
                primitive: Primitive::Triangles,
                vertices_per_instance: 6,
            };
            out.push(LayerBatch {
                key: "label_backgrounds",
                pass: DrawPass::LabelBackgrounds,
                shader: &self.shaders.label_background,
                layout: &self.background_layout,
                buffer: &labels.backgrounds,
                mode: quad,
                texture: None,
                frame_uniforms: &[FrameUniform::Matrix, FrameUniform::Viewport],
                uniforms: Vec::new(),
            });
            out.push(LayerBatch {
                key: "label_glyphs",
                pass: DrawPass::LabelGlyphs,
                shader: &self.shaders.label_glyph,
                layout: &self.glyph_layout,
                buffer: &labels.glyphs,
                mode: quad,
                texture: Some(BatchTexture {
                    role: TextureRole::FontAtlas,
                    image: &font.image,
                    revision: font.revision,
                }),
                frame_uniforms: &[FrameUniform::Matrix, FrameUniform::Viewport],
                uniforms: Vec::new(),
            });
        }
        out
    }
}
