use std::collections::BTreeMap;

use serde::Deserialize;

/// Metrics of one glyph inside the atlas texture (pixels).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlyphMetrics {
    pub id: u32,
    #[serde(rename = "char")]
    pub ch: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub xoffset: f64,
    #[serde(default)]
    pub yoffset: f64,
    #[serde(default)]
    pub xadvance: f64,
}

impl GlyphMetrics {
    /// Horizontal pen advance; atlases without `xadvance` advance by width.
    pub fn advance(&self) -> f64 {
        if self.xadvance > 0.0 {
            self.xadvance
        } else {
            self.width
        }
    }

    /// `[x, y, width, height]` in atlas pixels.
    pub fn atlas_rect(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct KerningPair {
    pub first: u32,
    pub second: u32,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasCommon {
    #[serde(default)]
    pub line_height: f64,
    #[serde(default)]
    pub scale_w: f64,
    #[serde(default)]
    pub scale_h: f64,
}

#[derive(Debug, Deserialize)]
struct RawAtlas {
    chars: Vec<GlyphMetrics>,
    #[serde(default)]
    kernings: Vec<KerningPair>,
    #[serde(default)]
    common: AtlasCommon,
}

#[derive(Debug)]
pub enum FontAtlasError {
    Json(String),
    Empty,
    InvalidGlyph { index: usize, reason: String },
}

impl std::fmt::Display for FontAtlasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontAtlasError::Json(e) => write!(f, "font atlas JSON error: {e}"),
            FontAtlasError::Empty => write!(f, "font atlas has no characters"),
            FontAtlasError::InvalidGlyph { index, reason } => {
                write!(f, "invalid glyph at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for FontAtlasError {}

/// Bitmap font atlas description: character metrics plus kerning pairs.
///
/// Parsed from the BMFont-style JSON emitted by msdf atlas generators.
#[derive(Debug, Clone, PartialEq)]
pub struct FontAtlas {
    glyphs: BTreeMap<char, GlyphMetrics>,
    kernings: BTreeMap<(u32, u32), f64>,
    pub common: AtlasCommon,
}

impl FontAtlas {
    pub fn from_json_str(payload: &str) -> Result<Self, FontAtlasError> {
        let raw: RawAtlas =
            serde_json::from_str(payload).map_err(|e| FontAtlasError::Json(e.to_string()))?;
        if raw.chars.is_empty() {
            return Err(FontAtlasError::Empty);
        }

        let mut glyphs = BTreeMap::new();
        for (index, glyph) in raw.chars.into_iter().enumerate() {
            let mut chars = glyph.ch.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                return Err(FontAtlasError::InvalidGlyph {
                    index,
                    reason: format!("char must be a single character, got {:?}", glyph.ch),
                });
            };
            if glyph.width < 0.0 || glyph.height < 0.0 {
                return Err(FontAtlasError::InvalidGlyph {
                    index,
                    reason: "negative glyph size".to_string(),
                });
            }
            glyphs.insert(ch, glyph);
        }

        let kernings = raw
            .kernings
            .into_iter()
            .map(|k| ((k.first, k.second), k.amount))
            .collect();

        Ok(Self {
            glyphs,
            kernings,
            common: raw.common,
        })
    }

    pub fn glyph(&self, ch: char) -> Option<&GlyphMetrics> {
        self.glyphs.get(&ch)
    }

    /// Kerning adjustment between two consecutive glyphs (0 when absent).
    pub fn kerning(&self, first: &GlyphMetrics, second: &GlyphMetrics) -> f64 {
        self.kernings
            .get(&(first.id, second.id))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Atlas texture size in pixels, when declared.
    pub fn texture_size(&self) -> Option<(f64, f64)> {
        (self.common.scale_w > 0.0 && self.common.scale_h > 0.0)
            .then_some((self.common.scale_w, self.common.scale_h))
    }
}
