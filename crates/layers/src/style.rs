use std::fmt;
use std::sync::Arc;

use formats::FeatureProperties;
use scene::Feature;
use serde::{Deserialize, Serialize};

/// RGBA colour with channels in `0..=1`.
///
/// `a` is optional: a missing alpha falls back to the layer opacity, then to
/// `0.0` (see `Color::resolve_alpha`).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
}

impl Color {
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const TEAL: Color = Color::rgb(0.0, 1.0, 1.0);
    pub const YELLOW: Color = Color::rgb(1.0, 1.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const GRAY: Color = Color::rgb(0.5, 0.5, 0.5);

    pub const PALETTE: [Color; 8] = [
        Color::GREEN,
        Color::RED,
        Color::BLUE,
        Color::TEAL,
        Color::YELLOW,
        Color::WHITE,
        Color::BLACK,
        Color::GRAY,
    ];

    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: None }
    }

    pub const fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a: Some(a) }
    }

    /// Deterministic palette pick for feature `index`.
    pub fn palette(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    /// Parses `#rgb` or `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| f64::from(v) / 255.0);
        match digits.len() {
            3 => {
                let expand = |i: usize| {
                    let c = digits.get(i..i + 1)?;
                    channel(&format!("{c}{c}"))
                };
                Some(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Some(Self::rgb(
                channel(digits.get(0..2)?)?,
                channel(digits.get(2..4)?)?,
                channel(digits.get(4..6)?)?,
            )),
            _ => None,
        }
    }

    /// Alpha fallback chain: own alpha, then `opacity`, then `0.0`.
    pub fn resolve_alpha(&self, opacity: Option<f64>) -> f64 {
        self.a.or(opacity).unwrap_or(0.0)
    }

    /// Copy with the alpha chain applied.
    pub fn with_resolved_alpha(&self, opacity: Option<f64>) -> Self {
        Self {
            a: Some(self.resolve_alpha(opacity)),
            ..*self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite()
            && self.g.is_finite()
            && self.b.is_finite()
            && self.a.is_none_or(f64::is_finite)
    }

    /// `[r, g, b, a]` for vertex records; call after resolving alpha.
    pub fn to_f32(&self) -> [f32; 4] {
        [
            self.r as f32,
            self.g as f32,
            self.b as f32,
            self.a.unwrap_or(0.0) as f32,
        ]
    }
}

/// A style input that is either fixed or computed per feature.
pub enum StyleValue<P, T> {
    Constant(T),
    Resolver(Arc<dyn Fn(usize, &Feature<P>) -> T>),
}

impl<P, T: Clone> StyleValue<P, T> {
    pub fn resolver(f: impl Fn(usize, &Feature<P>) -> T + 'static) -> Self {
        StyleValue::Resolver(Arc::new(f))
    }

    pub fn resolve(&self, index: usize, feature: &Feature<P>) -> T {
        match self {
            StyleValue::Constant(value) => value.clone(),
            StyleValue::Resolver(f) => f(index, feature),
        }
    }
}

impl<P, T: Clone> Clone for StyleValue<P, T> {
    fn clone(&self) -> Self {
        match self {
            StyleValue::Constant(value) => StyleValue::Constant(value.clone()),
            StyleValue::Resolver(f) => StyleValue::Resolver(Arc::clone(f)),
        }
    }
}

impl<P, T: fmt::Debug> fmt::Debug for StyleValue<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleValue::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            StyleValue::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl<P, T> From<T> for StyleValue<P, T> {
    fn from(value: T) -> Self {
        StyleValue::Constant(value)
    }
}

/// Per-label inputs. Unset entries fall back to `LabelSettings`; a feature
/// without text gets no label.
pub struct LabelStyles<P> {
    pub text: Option<StyleValue<P, String>>,
    pub color: Option<StyleValue<P, Color>>,
    pub background_color: Option<StyleValue<P, Color>>,
    /// Screen-pixel offset of the label from its icon.
    pub offset: Option<StyleValue<P, [f64; 2]>>,
}

impl<P> Default for LabelStyles<P> {
    fn default() -> Self {
        Self {
            text: None,
            color: None,
            background_color: None,
            offset: None,
        }
    }
}

impl<P> Clone for LabelStyles<P> {
    fn clone(&self) -> Self {
        Self {
            text: self.text.clone(),
            color: self.color.clone(),
            background_color: self.background_color.clone(),
            offset: self.offset.clone(),
        }
    }
}

impl<P> fmt::Debug for LabelStyles<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelStyles")
            .field("text", &self.text)
            .field("color", &self.color)
            .field("background_color", &self.background_color)
            .field("offset", &self.offset)
            .finish()
    }
}

impl LabelStyles<FeatureProperties> {
    /// Reads `labelText`, `labelColor` and `labelBackgroundColor` from GeoJSON
    /// properties; features lacking a property use the layer defaults.
    pub fn from_properties(defaults: &crate::LabelSettings) -> Self {
        let color = defaults.color;
        let background = defaults.background_color;
        Self {
            text: Some(StyleValue::resolver(|_, f: &Feature<FeatureProperties>| {
                f.payload.get_str("labelText").unwrap_or_default().to_string()
            })),
            color: Some(StyleValue::resolver(move |_, f: &Feature<FeatureProperties>| {
                property_color(&f.payload, "labelColor").unwrap_or(color)
            })),
            background_color: Some(StyleValue::resolver(
                move |_, f: &Feature<FeatureProperties>| {
                    property_color(&f.payload, "labelBackgroundColor").unwrap_or(background)
                },
            )),
            offset: None,
        }
    }
}

fn property_color(props: &FeatureProperties, key: &str) -> Option<Color> {
    if let Some(hex) = props.get_str(key) {
        return Color::from_hex(hex);
    }
    let ([r, g, b], a) = props.get_rgba(key)?;
    Some(Color { r, g, b, a })
}

/// Style inputs of one layer.
///
/// `color` is required by every kind; `size` by every kind except shapes.
/// A missing required entry fails the build with `InvalidStyleValue`.
pub struct LayerStyles<P> {
    pub color: Option<StyleValue<P, Color>>,
    pub size: Option<StyleValue<P, f64>>,
    pub labels: LabelStyles<P>,
}

impl<P> LayerStyles<P> {
    pub fn new(color: impl Into<StyleValue<P, Color>>, size: impl Into<StyleValue<P, f64>>) -> Self {
        Self {
            color: Some(color.into()),
            size: Some(size.into()),
            labels: LabelStyles::default(),
        }
    }

    pub fn with_labels(mut self, labels: LabelStyles<P>) -> Self {
        self.labels = labels;
        self
    }
}

impl LayerStyles<FeatureProperties> {
    /// Styles driven by GeoJSON properties: `color` (hex string, object or
    /// array) and `size`. Features without them cycle through `PALETTE` and
    /// take `default_size`.
    pub fn from_properties(default_size: f64) -> Self {
        Self {
            color: Some(StyleValue::resolver(|i, f: &Feature<FeatureProperties>| {
                property_color(&f.payload, "color").unwrap_or_else(|| Color::palette(i))
            })),
            size: Some(StyleValue::resolver(move |_, f: &Feature<FeatureProperties>| {
                f.payload.get_f64("size").unwrap_or(default_size)
            })),
            labels: LabelStyles::default(),
        }
    }
}

impl<P> Default for LayerStyles<P> {
    fn default() -> Self {
        Self {
            color: None,
            size: None,
            labels: LabelStyles::default(),
        }
    }
}

impl<P> Clone for LayerStyles<P> {
    fn clone(&self) -> Self {
        Self {
            color: self.color.clone(),
            size: self.size.clone(),
            labels: self.labels.clone(),
        }
    }
}

impl<P> fmt::Debug for LayerStyles<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerStyles")
            .field("color", &self.color)
            .field("size", &self.size)
            .field("labels", &self.labels)
            .finish()
    }
}
