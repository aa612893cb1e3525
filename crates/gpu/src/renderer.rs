use std::collections::BTreeMap;

use foundation::math::precision::OriginRelative;
use foundation::math::{Vec2, zoom_scale};
use runtime::{
    Counter, DiagnosticKind, Diagnostics, DrawContext, FrameMetrics, GesturePhase, HostView,
    InteractionCache, MapEvent, ViewAnchor,
};
use tracing::{debug, error, info};

use crate::buffers::{BufferSlot, PackedBuffer};
use crate::context::{DrawCall, GpuBackend, GpuError, Primitive, UniformValue};
use crate::pipeline::{Pipeline, ShaderSource, VertexLayout};
use crate::render_graph::{DrawPass, RenderGraph};
use crate::textures::{DecodedImage, TextureRole, TextureSlot};
use crate::view::ViewTransform;

/// Screen error (pixels) from `f32` vertex storage above which a layer is
/// asked to re-anchor its buffers.
pub const MAX_SCREEN_ERROR_PX: f64 = 0.25;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

/// Per-frame values the orchestrator feeds to a batch's program.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameUniform {
    /// The 4x4 view transform.
    Matrix,
    /// Canvas size in pixels.
    Viewport,
    /// `2^zoom`.
    Scale,
}

impl FrameUniform {
    pub fn name(self) -> &'static str {
        match self {
            FrameUniform::Matrix => "matrix",
            FrameUniform::Viewport => "viewport",
            FrameUniform::Scale => "scale",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DrawMode {
    /// One vertex per record.
    Vertices(Primitive),
    /// One instance per record, each expanded to `vertices_per_instance`.
    Instanced {
        primitive: Primitive,
        vertices_per_instance: u32,
    },
}

#[derive(Debug, Copy, Clone)]
pub struct BatchTexture<'a> {
    pub role: TextureRole,
    pub image: &'a DecodedImage,
    /// Bumped by the layer whenever the image is replaced.
    pub revision: u64,
}

/// One buffer + program pair a layer wants drawn this frame.
#[derive(Debug, Clone)]
pub struct LayerBatch<'a> {
    /// Stable per-layer name; keys GPU resources across frames.
    pub key: &'static str,
    pub pass: DrawPass,
    pub shader: &'a ShaderSource,
    pub layout: &'a VertexLayout,
    pub buffer: &'a PackedBuffer,
    pub mode: DrawMode,
    pub texture: Option<BatchTexture<'a>>,
    pub frame_uniforms: &'static [FrameUniform],
    pub uniforms: Vec<(&'static str, UniformValue)>,
}

/// Capability shared by every overlay layer kind.
pub trait RenderableLayer {
    fn id(&self) -> LayerId;

    fn is_active(&self) -> bool {
        true
    }

    /// `false` while a required asset is missing; the layer is skipped.
    fn is_ready(&self) -> bool {
        true
    }

    /// Zoom-0 map-space pixel its buffers are relative to.
    fn origin(&self) -> Vec2;

    fn batches(&self) -> Vec<LayerBatch<'_>>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Waiting for the host's ready signal (icons, font atlas).
    AwaitingAssets,
    /// Ready; GPU resources are created on the next frame.
    AwaitingFirstFrame,
    Rendering,
    /// A GPU error occurred; `reinitialize` is required.
    Faulted,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AwaitingAssets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub draw_calls: u32,
    pub buffer_uploads: u32,
    pub texture_uploads: u32,
    /// `true` when the gesture snapshot (not the live view) placed geometry.
    pub used_cached_anchor: bool,
    pub anchor: ViewAnchor,
    /// Active layers skipped because an asset is missing.
    pub layers_waiting: u32,
    /// Layers whose buffers have drifted too far from the view to stay
    /// sub-pixel accurate; the host should re-anchor them.
    pub reanchor: Vec<LayerId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Skipped(SkipReason),
    Drawn(FrameReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// This frame hit a GPU error; the orchestrator is now faulted.
    Gpu(GpuError),
    /// A previous fault has not been cleared with `reinitialize`.
    Faulted,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Gpu(e) => write!(f, "render failed: {e}"),
            RenderError::Faulted => write!(f, "renderer is faulted; reinitialize required"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<GpuError> for RenderError {
    fn from(e: GpuError) -> Self {
        RenderError::Gpu(e)
    }
}

#[derive(Debug)]
struct BatchResources {
    pipeline: Pipeline,
    buffer: BufferSlot,
    texture: Option<TextureSlot>,
}

#[derive(Debug, Default)]
struct FrameTally {
    draw_calls: u32,
    buffer_uploads: u32,
    texture_uploads: u32,
}

/// Drives per-frame drawing of every overlay layer.
///
/// Frame contract:
/// - `render` before the ready signal is a no-op, never queued.
/// - The anchor comes from `InteractionCache` fresh each frame.
/// - Buffers upload only when their generation changed; textures upload once
///   per revision and bind every frame.
/// - Batches draw in `DrawPass` order.
/// - Any GPU error moves to `Faulted`; there is no automatic retry.
#[derive(Debug)]
pub struct RenderOrchestrator {
    state: OrchestratorState,
    interaction: InteractionCache,
    transform: ViewTransform,
    resources: BTreeMap<(LayerId, &'static str), BatchResources>,
    diagnostics: Diagnostics,
    metrics: FrameMetrics,
}

impl Default for RenderOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderOrchestrator {
    pub fn new() -> Self {
        Self {
            state: OrchestratorState::AwaitingAssets,
            interaction: InteractionCache::new(),
            transform: ViewTransform::new(),
            resources: BTreeMap::new(),
            diagnostics: Diagnostics::new(),
            metrics: FrameMetrics::new(),
        }
    }

    /// For hosts with no assets to wait on.
    pub fn ready() -> Self {
        let mut out = Self::new();
        out.mark_ready();
        out
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn interaction(&self) -> &InteractionCache {
        &self.interaction
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    pub fn transform(&self) -> &ViewTransform {
        &self.transform
    }

    /// The host's ready signal: all assets required for the first frame loaded.
    pub fn mark_ready(&mut self) {
        if self.state == OrchestratorState::AwaitingAssets {
            info!("assets ready; awaiting first frame");
            self.state = OrchestratorState::AwaitingFirstFrame;
        }
    }

    /// Records an asset failure. The orchestrator stays inert until a later
    /// `mark_ready`.
    pub fn asset_load_failed(&mut self, message: impl Into<String>) {
        self.diagnostics
            .emit(DiagnosticKind::AssetLoadFailure, message);
    }

    /// Drops every GPU handle and leaves `Faulted`. Call after the host has
    /// restored its context.
    pub fn reinitialize(&mut self) {
        self.resources.clear();
        if self.state != OrchestratorState::AwaitingAssets {
            info!("reinitializing renderer");
            self.state = OrchestratorState::AwaitingFirstFrame;
        }
    }

    /// Releases GPU bookkeeping for a removed layer.
    pub fn forget_layer(&mut self, id: LayerId) {
        self.resources.retain(|(layer, _), _| *layer != id);
    }

    pub fn handle_event(&mut self, event: MapEvent, host: &dyn HostView) {
        match event.gesture() {
            Some(GesturePhase::Start(kind)) => {
                let live = ViewAnchor::new(host.center_pixel(), host.zoom(), host.top_left_pixel());
                self.interaction.start_gesture(kind, live);
            }
            Some(GesturePhase::End(kind)) => {
                self.interaction.end_gesture(kind);
            }
            None => {
                debug!("canvas resized");
                self.interaction.request_redraw();
            }
        }
    }

    /// Consumes a pending redraw request (gesture end or resize).
    pub fn take_redraw_request(&mut self) -> bool {
        self.interaction.take_redraw_request()
    }

    pub fn render(
        &mut self,
        ctx: &DrawContext,
        layers: &[&dyn RenderableLayer],
        backend: &mut dyn GpuBackend,
    ) -> Result<FrameOutcome, RenderError> {
        self.diagnostics.set_frame(ctx.index);
        match self.state {
            OrchestratorState::AwaitingAssets => {
                self.metrics.inc(Counter::FramesSkipped, 1);
                return Ok(FrameOutcome::Skipped(SkipReason::AwaitingAssets));
            }
            OrchestratorState::Faulted => return Err(RenderError::Faulted),
            OrchestratorState::AwaitingFirstFrame | OrchestratorState::Rendering => {}
        }

        match self.draw_frame(ctx, layers, backend) {
            Ok(report) => {
                if self.state == OrchestratorState::AwaitingFirstFrame {
                    info!(frame = ctx.index, "first frame rendered");
                }
                self.state = OrchestratorState::Rendering;
                self.metrics
                    .inc(Counter::BufferUploads, u64::from(report.buffer_uploads));
                self.metrics
                    .inc(Counter::TextureUploads, u64::from(report.texture_uploads));
                self.metrics.record_frame(u64::from(report.draw_calls));
                Ok(FrameOutcome::Drawn(report))
            }
            Err(e) => {
                error!(frame = ctx.index, "GPU fault: {e}");
                self.diagnostics
                    .emit(DiagnosticKind::GpuFault, e.to_string());
                self.state = OrchestratorState::Faulted;
                Err(RenderError::Gpu(e))
            }
        }
    }

    fn draw_frame(
        &mut self,
        ctx: &DrawContext,
        layers: &[&dyn RenderableLayer],
        backend: &mut dyn GpuBackend,
    ) -> Result<FrameReport, GpuError> {
        if backend.is_context_lost() {
            return Err(GpuError::ContextLost);
        }

        let live = ViewAnchor::from_context(ctx);
        let anchor = self.interaction.anchor(live);
        let used_cached_anchor = self.interaction.is_interacting();
        let scale = zoom_scale(anchor.zoom);

        let (width, height) = ctx.viewport_px();
        backend.viewport(width, height)?;
        backend.clear()?;

        let mut graph = RenderGraph::new();
        let mut batches: Vec<Vec<LayerBatch<'_>>> = Vec::with_capacity(layers.len());
        let mut layers_waiting = 0;
        let mut reanchor = Vec::new();
        for (position, layer) in layers.iter().enumerate() {
            if !layer.is_active() {
                batches.push(Vec::new());
                continue;
            }
            if !layer.is_ready() {
                layers_waiting += 1;
                batches.push(Vec::new());
                continue;
            }
            if !used_cached_anchor
                && OriginRelative::new(layer.origin()).screen_error_px(anchor.center, scale)
                    > MAX_SCREEN_ERROR_PX
            {
                reanchor.push(layer.id());
            }
            let layer_batches = layer.batches();
            for (index, batch) in layer_batches.iter().enumerate() {
                graph.push(batch.pass, position, index);
            }
            batches.push(layer_batches);
        }

        let mut tally = FrameTally::default();
        for draw in graph.ordered() {
            let layer = layers[draw.layer];
            let batch = &batches[draw.layer][draw.batch];
            self.draw_batch(backend, ctx, anchor, scale, layer.id(), layer.origin(), batch, &mut tally)?;
        }

        Ok(FrameReport {
            frame_index: ctx.index,
            draw_calls: tally.draw_calls,
            buffer_uploads: tally.buffer_uploads,
            texture_uploads: tally.texture_uploads,
            used_cached_anchor,
            anchor,
            layers_waiting,
            reanchor,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_batch(
        &mut self,
        backend: &mut dyn GpuBackend,
        ctx: &DrawContext,
        anchor: ViewAnchor,
        scale: f64,
        layer: LayerId,
        origin: Vec2,
        batch: &LayerBatch<'_>,
        tally: &mut FrameTally,
    ) -> Result<(), GpuError> {
        let records = batch.buffer.record_count() as u32;
        if records == 0 {
            return Ok(());
        }

        let key = (layer, batch.key);
        if !self.resources.contains_key(&key) {
            let resources = create_resources(backend, batch)?;
            debug!(layer = layer.0, batch = batch.key, "created GPU resources");
            self.resources.insert(key, resources);
        }
        let Some(resources) = self.resources.get_mut(&key) else {
            return Err(GpuError::ResourceCreation(batch.key.to_string()));
        };

        if resources.buffer.sync(backend, batch.buffer)? {
            tally.buffer_uploads += 1;
        }
        resources.pipeline.bind(backend)?;

        self.transform
            .set_size(ctx.size.x, ctx.size.y)
            .scale_to(scale)
            .translate_to(origin.x - anchor.offset.x, origin.y - anchor.offset.y);
        for uniform in batch.frame_uniforms {
            let value = match uniform {
                FrameUniform::Matrix => UniformValue::Mat4(self.transform.array()),
                FrameUniform::Viewport => UniformValue::Vec2([ctx.size.x as f32, ctx.size.y as f32]),
                FrameUniform::Scale => UniformValue::Float(scale as f32),
            };
            resources
                .pipeline
                .set_uniform(backend, uniform.name(), value)?;
        }
        for (name, value) in &batch.uniforms {
            resources.pipeline.set_uniform(backend, name, *value)?;
        }

        if let Some(texture) = &batch.texture {
            if TextureSlot::sync(
                &mut resources.texture,
                backend,
                texture.role,
                texture.image,
                texture.revision,
            )? {
                tally.texture_uploads += 1;
            }
            resources.pipeline.set_uniform(
                backend,
                texture.role.sampler_uniform(),
                UniformValue::Int(texture.role.unit() as i32),
            )?;
        }

        let call = match batch.mode {
            DrawMode::Vertices(primitive) => DrawCall {
                primitive,
                first: 0,
                count: records,
                instances: None,
            },
            DrawMode::Instanced {
                primitive,
                vertices_per_instance,
            } => DrawCall {
                primitive,
                first: 0,
                count: vertices_per_instance,
                instances: Some(records),
            },
        };
        backend.draw(call)?;
        tally.draw_calls += 1;
        Ok(())
    }
}

fn create_resources(
    backend: &mut dyn GpuBackend,
    batch: &LayerBatch<'_>,
) -> Result<BatchResources, GpuError> {
    let mut uniforms: Vec<&'static str> = batch.frame_uniforms.iter().map(|u| u.name()).collect();
    uniforms.extend(batch.uniforms.iter().map(|(name, _)| *name));
    if let Some(texture) = &batch.texture {
        uniforms.push(texture.role.sampler_uniform());
    }
    let instanced = matches!(batch.mode, DrawMode::Instanced { .. });
    let pipeline = Pipeline::link(backend, batch.shader, batch.layout, instanced, &uniforms)?;
    Ok(BatchResources {
        pipeline,
        buffer: BufferSlot::create(backend)?,
        texture: None,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        DrawMode, FrameOutcome, FrameUniform, LayerBatch, LayerId, OrchestratorState,
        RenderError, RenderOrchestrator, RenderableLayer, SkipReason,
    };
    use crate::buffers::PackedBuffer;
    use crate::context::{GpuError, Primitive, UniformValue};
    use crate::pipeline::{ShaderSource, VertexAttribute, VertexLayout};
    use crate::recording::{GpuCommand, RecordingBackend};
    use crate::render_graph::DrawPass;
    use crate::textures::{DecodedImage, TextureRole};
    use crate::BatchTexture;
    use foundation::math::precision::OriginRelative;
    use foundation::math::{LatLng, Vec2};
    use runtime::{DiagnosticKind, DrawContext, HostView, MapEvent, StaticView};

    struct TestLayer {
        id: LayerId,
        origin: Vec2,
        shader: ShaderSource,
        layout: VertexLayout,
        shapes: PackedBuffer,
        points: PackedBuffer,
        sprite: Option<DecodedImage>,
        ready: bool,
    }

    impl TestLayer {
        fn new(id: u64, origin: Vec2) -> Self {
            let layout = VertexLayout::new(vec![VertexAttribute::new("vertex", 2)]);
            let rel = OriginRelative::new(origin);
            let mut shapes = PackedBuffer::new(2, rel);
            let mut points = PackedBuffer::new(2, rel);
            for i in 0..3 {
                shapes.push_record(&[i as f32, 0.0]).expect("push");
                points.push_record(&[0.0, i as f32]).expect("push");
            }
            Self {
                id: LayerId(id),
                origin,
                shader: ShaderSource::new("void main() {}", "void main() {}"),
                layout,
                shapes,
                points,
                sprite: None,
                ready: true,
            }
        }
    }

    impl RenderableLayer for TestLayer {
        fn id(&self) -> LayerId {
            self.id
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn origin(&self) -> Vec2 {
            self.origin
        }

        fn batches(&self) -> Vec<LayerBatch<'_>> {
            // Listed out of pass order on purpose.
            vec![
                LayerBatch {
                    key: "points",
                    pass: DrawPass::Points,
                    shader: &self.shader,
                    layout: &self.layout,
                    buffer: &self.points,
                    mode: DrawMode::Vertices(Primitive::Points),
                    texture: self.sprite.as_ref().map(|image| BatchTexture {
                        role: TextureRole::IconSprite,
                        image,
                        revision: 1,
                    }),
                    frame_uniforms: &[FrameUniform::Matrix],
                    uniforms: Vec::new(),
                },
                LayerBatch {
                    key: "shapes",
                    pass: DrawPass::Shapes,
                    shader: &self.shader,
                    layout: &self.layout,
                    buffer: &self.shapes,
                    mode: DrawMode::Instanced {
                        primitive: Primitive::Triangles,
                        vertices_per_instance: 6,
                    },
                    texture: None,
                    frame_uniforms: &[FrameUniform::Matrix, FrameUniform::Viewport],
                    uniforms: vec![("opacity", UniformValue::Float(0.5))],
                },
            ]
        }
    }

    fn view() -> StaticView {
        StaticView::new(LatLng::new(0.0, 0.0), 3.0, Vec2::new(800.0, 600.0))
    }

    fn ctx(index: u64, host: &StaticView) -> DrawContext {
        DrawContext::from_host(index, host)
    }

    fn matrices(gpu: &RecordingBackend) -> Vec<[f32; 16]> {
        gpu.commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::SetUniform {
                    value: UniformValue::Mat4(m),
                    ..
                } => Some(*m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn renders_are_no_ops_until_ready() {
        let host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::new();

        for i in 0..3 {
            let out = orch.render(&ctx(i, &host), &[&layer], &mut gpu).expect("render");
            assert_eq!(out, FrameOutcome::Skipped(SkipReason::AwaitingAssets));
        }
        assert!(gpu.commands().is_empty());

        orch.mark_ready();
        assert_eq!(orch.state(), OrchestratorState::AwaitingFirstFrame);
        let out = orch.render(&ctx(3, &host), &[&layer], &mut gpu).expect("render");
        assert!(matches!(out, FrameOutcome::Drawn(_)));
        assert_eq!(orch.state(), OrchestratorState::Rendering);
    }

    #[test]
    fn draws_in_pass_order_and_uploads_once() {
        let host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();

        let FrameOutcome::Drawn(first) = orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert_eq!(first.draw_calls, 2);
        assert_eq!(first.buffer_uploads, 2);
        let draws = gpu.draw_calls();
        assert_eq!(draws[0].primitive, Primitive::Triangles);
        assert_eq!(draws[0].instances, Some(3));
        assert_eq!(draws[1].primitive, Primitive::Points);
        assert_eq!(draws[1].count, 3);

        let FrameOutcome::Drawn(second) = orch.render(&ctx(1, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert_eq!(second.buffer_uploads, 0);
        assert_eq!(second.draw_calls, 2);
    }

    #[test]
    fn rebuilt_buffer_is_reuploaded() {
        let host = view();
        let mut layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();
        orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render");

        layer.points.push_record(&[9.0, 9.0]).expect("push");
        let FrameOutcome::Drawn(report) = orch.render(&ctx(1, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert_eq!(report.buffer_uploads, 1);
    }

    #[test]
    fn forgotten_layer_uploads_again() {
        let host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();
        orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render");

        orch.forget_layer(LayerId(1));
        let FrameOutcome::Drawn(report) = orch.render(&ctx(1, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert_eq!(report.buffer_uploads, 2);
    }

    #[test]
    fn asset_failure_is_reported_and_keeps_waiting() {
        let host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::new();
        orch.asset_load_failed("icon.png: 404");

        let out = orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render");
        assert_eq!(out, FrameOutcome::Skipped(SkipReason::AwaitingAssets));
        assert_eq!(orch.diagnostics().count(DiagnosticKind::AssetLoadFailure), 1);
    }

    #[test]
    fn textures_upload_once_and_bind_every_frame() {
        let host = view();
        let mut layer = TestLayer::new(1, host.center_pixel());
        layer.sprite = Some(DecodedImage::solid(2, 2, [255, 0, 0, 255]));
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();
        orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render");
        orch.render(&ctx(1, &host), &[&layer], &mut gpu).expect("render");

        assert_eq!(gpu.count(|c| matches!(c, GpuCommand::CreateTexture { .. })), 1);
        assert_eq!(gpu.count(|c| matches!(c, GpuCommand::BindTexture { .. })), 2);
        assert_eq!(orch.metrics().counter(runtime::Counter::TextureUploads), 1);
    }

    #[test]
    fn gesture_freezes_anchor_until_end() {
        let mut host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();

        orch.handle_event(MapEvent::ZoomStart, &host);
        host.set_zoom(5.0);
        host.pan_to(LatLng::new(1.0, 1.0));
        let FrameOutcome::Drawn(during) = orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert!(during.used_cached_anchor);
        assert_eq!(during.anchor.zoom, 3.0);

        orch.handle_event(MapEvent::ZoomEnd, &host);
        assert!(orch.take_redraw_request());
        let FrameOutcome::Drawn(after) = orch.render(&ctx(1, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert!(!after.used_cached_anchor);
        assert_eq!(after.anchor.zoom, 5.0);
    }

    #[test]
    fn start_end_without_frames_uses_live_anchor() {
        let mut host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();

        orch.handle_event(MapEvent::DragStart, &host);
        host.pan_to(LatLng::new(0.5, 0.5));
        orch.handle_event(MapEvent::DragEnd, &host);
        let live = ctx(0, &host);
        let FrameOutcome::Drawn(report) = orch.render(&live, &[&layer], &mut gpu).expect("render") else {
            panic!("expected a drawn frame");
        };
        assert_eq!(report.anchor.offset, live.offset);
        assert_eq!(report.anchor.center, live.center);
    }

    #[test]
    fn matrix_places_origin_at_view_center() {
        let host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();
        orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render");

        // A vertex at the origin (0, 0) must land at clip (0, 0).
        let m = matrices(&gpu)[0];
        assert!(m[12].abs() < 1e-4, "x offset {}", m[12]);
        assert!(m[13].abs() < 1e-4, "y offset {}", m[13]);
        assert!((m[0] - 2.0 * 8.0 / 800.0).abs() < 1e-6);
    }

    #[test]
    fn gpu_error_faults_until_reinitialized() {
        let host = view();
        let layer = TestLayer::new(1, host.center_pixel());
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();
        orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render");

        gpu.lose_context();
        assert_eq!(
            orch.render(&ctx(1, &host), &[&layer], &mut gpu),
            Err(RenderError::Gpu(GpuError::ContextLost))
        );
        assert_eq!(orch.state(), OrchestratorState::Faulted);
        assert_eq!(orch.diagnostics().count(DiagnosticKind::GpuFault), 1);

        gpu.restore_context();
        assert_eq!(
            orch.render(&ctx(2, &host), &[&layer], &mut gpu),
            Err(RenderError::Faulted)
        );

        orch.reinitialize();
        let FrameOutcome::Drawn(report) = orch.render(&ctx(3, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        // Handles were dropped, so buffers upload again.
        assert_eq!(report.buffer_uploads, 2);
    }

    #[test]
    fn draw_failure_and_missing_attribute_fault() {
        let host = view();
        let layer = TestLayer::new(1, host.center_pixel());

        let mut gpu = RecordingBackend::new();
        gpu.fail_draws(true);
        let mut orch = RenderOrchestrator::ready();
        assert!(matches!(
            orch.render(&ctx(0, &host), &[&layer], &mut gpu),
            Err(RenderError::Gpu(GpuError::DrawFailed(_)))
        ));

        let mut gpu = RecordingBackend::new();
        gpu.hide_location("vertex");
        let mut orch = RenderOrchestrator::ready();
        assert_eq!(
            orch.render(&ctx(0, &host), &[&layer], &mut gpu),
            Err(RenderError::Gpu(GpuError::MissingAttribute("vertex".to_string())))
        );
    }

    #[test]
    fn unready_layers_are_skipped_and_counted() {
        let host = view();
        let mut layer = TestLayer::new(1, host.center_pixel());
        layer.ready = false;
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();
        let FrameOutcome::Drawn(report) = orch.render(&ctx(0, &host), &[&layer], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert_eq!(report.draw_calls, 0);
        assert_eq!(report.layers_waiting, 1);
    }

    #[test]
    fn far_origin_requests_reanchor_when_idle() {
        let mut host = view();
        host.set_zoom(18.0);
        let near = TestLayer::new(1, host.center_pixel());
        let far = TestLayer::new(2, host.center_pixel() + Vec2::new(100.0, 0.0));
        let mut gpu = RecordingBackend::new();
        let mut orch = RenderOrchestrator::ready();
        let FrameOutcome::Drawn(report) = orch.render(&ctx(0, &host), &[&near, &far], &mut gpu).expect("render")
        else {
            panic!("expected a drawn frame");
        };
        assert_eq!(report.reanchor, vec![LayerId(2)]);
    }
}
