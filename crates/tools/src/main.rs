use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use formats::{FeatureProperties, FontAtlas, features_from_value};
use foundation::math::{LatLng, Vec2, haversine_distance_m};
use gpu::{DecodedImage, FrameOutcome, LayerId, RecordingBackend, RenderOrchestrator, RenderableLayer};
use layers::{GlLayer, LabelSettings, LabelStyles, LayerKind, LayerSettings, LayerStyles};
use runtime::{DrawContext, StaticView};
use scene::AxisOrder;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod shaders;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless inspector for GPU overlay layers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LayerArgs {
    /// GeoJSON document or JSON array of coordinate tuples
    input: PathBuf,

    /// Layer kind: points, icons, labeled_icons, lines or shapes
    #[arg(long, default_value = "points", value_parser = parse_kind)]
    kind: LayerKind,

    /// JSON file with layer settings; unset fields keep their defaults
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Size for features without a `size` property
    #[arg(long, default_value_t = 10.0)]
    size: f64,

    /// BMFont-style JSON atlas for labeled icons
    #[arg(long)]
    font_atlas: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the layer buffers and summarize them
    Inspect {
        #[command(flatten)]
        layer: LayerArgs,
    },

    /// Find the feature nearest to a coordinate
    Nearest {
        #[command(flatten)]
        layer: LayerArgs,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Zoom used for the click-radius check
        #[arg(long, default_value_t = 0.0)]
        zoom: f64,
    },

    /// Render frames against a recording backend and report the draw calls
    Frame {
        #[command(flatten)]
        layer: LayerArgs,

        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true, default_value_t = 0.0)]
        lng: f64,

        #[arg(long, default_value_t = 2.0)]
        zoom: f64,

        #[arg(long, default_value_t = 800.0)]
        width: f64,

        #[arg(long, default_value_t = 600.0)]
        height: f64,

        #[arg(long, default_value_t = 1)]
        frames: u64,
    },
}

fn parse_kind(value: &str) -> Result<LayerKind, String> {
    LayerKind::ALL
        .into_iter()
        .find(|kind| kind.as_str() == value)
        .ok_or_else(|| format!("unknown layer kind {value:?}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let report = match cli.command {
        Command::Inspect { layer } => serde_json::to_value(inspect(&layer)?)?,
        Command::Nearest {
            layer,
            lat,
            lng,
            zoom,
        } => serde_json::to_value(nearest(&layer, LatLng::new(lat, lng), zoom)?)?,
        Command::Frame {
            layer,
            lat,
            lng,
            zoom,
            width,
            height,
            frames,
        } => {
            let view = StaticView::new(LatLng::new(lat, lng), zoom, Vec2::new(width, height));
            serde_json::to_value(frame(&layer, view, frames)?)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// GeoJSON documents store `[lng, lat]`; bare tuple arrays stay `[lat, lng]`.
/// An `axis_order` in the settings file overrides both.
fn read_settings(
    path: Option<&Path>,
    kind: LayerKind,
    geojson: bool,
) -> Result<LayerSettings, Box<dyn std::error::Error>> {
    let value = match path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Value::Object(Default::default()),
    };
    settings_from_value(value, kind, geojson)
}

fn settings_from_value(
    value: Value,
    kind: LayerKind,
    geojson: bool,
) -> Result<LayerSettings, Box<dyn std::error::Error>> {
    let explicit_axes = value.get("axis_order").is_some();
    let mut settings: LayerSettings = serde_json::from_value(value)?;
    settings.kind = kind;
    if geojson && !explicit_axes {
        settings.axis_order = AxisOrder::longitude_first();
    }
    Ok(settings)
}

fn load_layer(args: &LayerArgs) -> Result<GlLayer<FeatureProperties>, Box<dyn std::error::Error>> {
    let document: Value = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    let settings = read_settings(args.settings.as_deref(), args.kind, document.is_object())?;
    let label_settings = LabelSettings::default();
    let mut styles = LayerStyles::from_properties(args.size);
    if args.kind.has_labels() {
        styles = styles.with_labels(LabelStyles::from_properties(&label_settings));
    }

    let mut layer = GlLayer::new(LayerId(1), settings, styles, shaders::stock_shaders(args.kind))
        .with_label_settings(label_settings);

    let features = features_from_value(&document)?;
    info!(path = %args.input.display(), features = features.len(), "loaded features");
    layer.set_data(features)?;

    if args.kind.uses_icon() {
        layer.set_icon_image(DecodedImage::solid(32, 32, [255, 255, 255, 255]));
    }
    if let Some(path) = &args.font_atlas {
        let atlas = FontAtlas::from_json_str(&fs::read_to_string(path)?)?;
        let (w, h) = atlas.texture_size().unwrap_or((256.0, 256.0));
        layer.set_font_atlas(atlas, DecodedImage::solid(w as u32, h as u32, [255, 255, 255, 255]))?;
    } else if args.kind.has_labels() {
        warn!("labeled icons need --font-atlas; labels will not be drawn");
    }
    Ok(layer)
}

#[derive(Serialize)]
struct InspectReport {
    kind: &'static str,
    features: usize,
    encoded: usize,
    skipped: Vec<SkippedReport>,
    stride: usize,
    records: usize,
    bytes: usize,
    label_backgrounds: Option<usize>,
    label_glyphs: Option<usize>,
    grid_buckets: usize,
}

#[derive(Serialize)]
struct SkippedReport {
    index: usize,
    reason: String,
}

fn inspect(args: &LayerArgs) -> Result<InspectReport, Box<dyn std::error::Error>> {
    let layer = load_layer(args)?;
    let output = layer.output();
    Ok(InspectReport {
        kind: layer.kind().as_str(),
        features: layer.len(),
        encoded: output.metadata.len(),
        skipped: output
            .skipped
            .iter()
            .map(|s| SkippedReport {
                index: s.index,
                reason: s.error.to_string(),
            })
            .collect(),
        stride: output.buffer.stride(),
        records: output.buffer.record_count(),
        bytes: output.buffer.as_bytes().len(),
        label_backgrounds: output.labels.as_ref().map(|l| l.backgrounds.record_count()),
        label_glyphs: output.labels.as_ref().map(|l| l.glyphs.record_count()),
        grid_buckets: layer.grid().bucket_count(),
    })
}

#[derive(Serialize)]
struct NearestReport {
    index: Option<usize>,
    lat: Option<f64>,
    lng: Option<f64>,
    distance_px: Option<f64>,
    distance_m: Option<f64>,
    used_fallback: bool,
    within_click_radius: bool,
}

fn nearest(args: &LayerArgs, at: LatLng, zoom: f64) -> Result<NearestReport, Box<dyn std::error::Error>> {
    let layer = load_layer(args)?;
    let Some(hit) = layer.query_nearest(at) else {
        return Ok(NearestReport {
            index: None,
            lat: None,
            lng: None,
            distance_px: None,
            distance_m: None,
            used_fallback: false,
            within_click_radius: false,
        });
    };
    let distance_px = hit.screen_distance(zoom);
    // Lines and shapes are clicked by outline, not by their first vertex.
    let within_click_radius = layer.pick(at).is_some_and(|picked| {
        picked.metadata.index == hit.metadata.index
            && picked.screen_distance(zoom) <= layer.settings().click_radius(picked.metadata.size)
    });
    Ok(NearestReport {
        index: Some(hit.metadata.index),
        lat: Some(hit.metadata.lat_lng.lat),
        lng: Some(hit.metadata.lat_lng.lng),
        distance_px: Some(distance_px),
        distance_m: Some(haversine_distance_m(at, hit.metadata.lat_lng)),
        used_fallback: hit.used_fallback,
        within_click_radius,
    })
}

#[derive(Serialize)]
struct FrameSummary {
    frame_index: u64,
    skipped: bool,
    draw_calls: u32,
    buffer_uploads: u32,
    texture_uploads: u32,
    layers_waiting: u32,
    reanchor: Vec<u64>,
}

#[derive(Serialize)]
struct DrawCallReport {
    primitive: String,
    count: u32,
    instances: Option<u32>,
}

#[derive(Serialize)]
struct FrameRun {
    frames: Vec<FrameSummary>,
    draw_calls: Vec<DrawCallReport>,
    diagnostics: Vec<String>,
}

fn frame(args: &LayerArgs, view: StaticView, frames: u64) -> Result<FrameRun, Box<dyn std::error::Error>> {
    let layer = load_layer(args)?;
    let mut backend = RecordingBackend::new();
    let mut orchestrator = RenderOrchestrator::ready();
    let layers: [&dyn RenderableLayer; 1] = [&layer];

    let mut summaries = Vec::new();
    for index in 0..frames {
        let ctx = DrawContext::from_host(index, &view);
        let summary = match orchestrator.render(&ctx, &layers, &mut backend)? {
            FrameOutcome::Skipped(_) => FrameSummary {
                frame_index: index,
                skipped: true,
                draw_calls: 0,
                buffer_uploads: 0,
                texture_uploads: 0,
                layers_waiting: 0,
                reanchor: Vec::new(),
            },
            FrameOutcome::Drawn(report) => FrameSummary {
                frame_index: report.frame_index,
                skipped: false,
                draw_calls: report.draw_calls,
                buffer_uploads: report.buffer_uploads,
                texture_uploads: report.texture_uploads,
                layers_waiting: report.layers_waiting,
                reanchor: report.reanchor.iter().map(|id| id.0).collect(),
            },
        };
        summaries.push(summary);
    }

    Ok(FrameRun {
        frames: summaries,
        draw_calls: backend
            .draw_calls()
            .into_iter()
            .map(|call| DrawCallReport {
                primitive: format!("{:?}", call.primitive),
                count: call.count,
                instances: call.instances,
            })
            .collect(),
        diagnostics: orchestrator
            .diagnostics()
            .entries()
            .iter()
            .chain(layer.diagnostics().entries())
            .map(|d| format!("{}: {}", d.kind.as_str(), d.message))
            .collect(),
    })
}
