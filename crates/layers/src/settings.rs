use scene::AxisOrder;
use serde::{Deserialize, Serialize};

use crate::style::Color;

/// The overlay layer variants. Declaration order is click-dispatch order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Points,
    Icons,
    LabeledIcons,
    Lines,
    Shapes,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Points,
        LayerKind::Icons,
        LayerKind::LabeledIcons,
        LayerKind::Lines,
        LayerKind::Shapes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Points => "points",
            LayerKind::Icons => "icons",
            LayerKind::LabeledIcons => "labeled_icons",
            LayerKind::Lines => "lines",
            LayerKind::Shapes => "shapes",
        }
    }

    pub fn uses_icon(self) -> bool {
        matches!(self, LayerKind::Icons | LayerKind::LabeledIcons)
    }

    pub fn has_labels(self) -> bool {
        self == LayerKind::LabeledIcons
    }

    /// Shapes are filled polygons and carry no size.
    pub fn uses_size(self) -> bool {
        self != LayerKind::Shapes
    }

    /// One record per feature, so a single feature can be patched in place.
    pub fn fixed_record_count(self) -> bool {
        matches!(self, LayerKind::Points | LayerKind::Icons)
    }
}

/// Layer configuration. Unset JSON fields take the `Default` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSettings {
    pub kind: LayerKind,
    pub axis_order: AxisOrder,
    /// Alpha for colours that carry none. `None` leaves them transparent.
    pub opacity: Option<f64>,
    /// Click hit radius as a multiple of feature size.
    pub sensitivity: f64,
    /// Hover hit radius as a multiple of `size * 30`.
    pub sensitivity_hover: f64,
    pub icon_size: f64,
    /// Pixel within the icon placed on the feature coordinate.
    pub icon_anchor: [f64; 2],
    /// Depth step between per-feature slots.
    pub increment_z: f64,
    /// Adds an `offsetZ` field to icon records. Always on for labeled icons.
    pub stack_depth: bool,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            kind: LayerKind::Points,
            axis_order: AxisOrder::latitude_first(),
            opacity: Some(1.0),
            sensitivity: 2.0,
            sensitivity_hover: 0.03,
            icon_size: 32.0,
            icon_anchor: [16.0, 32.0],
            increment_z: 1e-5,
            stack_depth: false,
        }
    }
}

impl LayerSettings {
    pub fn for_kind(kind: LayerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn stacks_depth(&self) -> bool {
        self.stack_depth || self.kind.has_labels()
    }

    /// Click hit radius in screen pixels for a feature of `size`.
    pub fn click_radius(&self, size: f64) -> f64 {
        size * self.sensitivity
    }

    pub fn hover_radius(&self, size: f64) -> f64 {
        size * self.sensitivity_hover * 30.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Screen-pixel offset from the icon.
    pub offset: [f64; 2],
    pub color: Color,
    pub background_color: Color,
    pub padding: [f64; 2],
    pub corner_radius: f64,
    /// Multiplier from atlas pixels to screen pixels.
    pub font_scale: f64,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            color: Color::rgba(0.0, 0.0, 0.0, 1.0),
            background_color: Color::rgba(1.0, 1.0, 1.0, 0.7),
            padding: [2.0, 2.0],
            corner_radius: 3.0,
            font_scale: 1.0,
        }
    }
}
