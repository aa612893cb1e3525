use formats::{FontAtlas, GlyphMetrics};
use foundation::math::Vec2;

/// Screen-space placement of one glyph relative to the label origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlyphPlacement {
    pub ch: char,
    /// Pen position plus the glyph's own x/y offset.
    pub offset: Vec2,
    /// Kerning applied before this glyph.
    pub kerning: f64,
    /// `[x, y, width, height]` in atlas pixels.
    pub atlas_rect: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLayout {
    pub glyphs: Vec<GlyphPlacement>,
    /// Largest pen position reached.
    pub width: f64,
    /// Tallest glyph.
    pub height: f64,
    /// Characters absent from the atlas (skipped).
    pub missing: usize,
}

impl TextLayout {
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// Lays `text` out on a single line.
///
/// The pen starts at 0; before each glyph it moves by the kerning between the
/// previous and current glyph, and after it by the glyph's advance. All atlas
/// metrics are multiplied by `scale`.
pub fn layout_text(atlas: &FontAtlas, text: &str, scale: f64) -> TextLayout {
    let mut out = TextLayout::default();
    let mut pen = 0.0;
    let mut previous: Option<&GlyphMetrics> = None;

    for ch in text.chars() {
        let Some(glyph) = atlas.glyph(ch) else {
            out.missing += 1;
            continue;
        };
        let kerning = previous.map_or(0.0, |p| atlas.kerning(p, glyph)) * scale;
        pen += kerning;
        out.glyphs.push(GlyphPlacement {
            ch,
            offset: Vec2::new(pen + glyph.xoffset * scale, glyph.yoffset * scale),
            kerning,
            atlas_rect: glyph.atlas_rect(),
        });
        pen += glyph.advance() * scale;
        out.width = out.width.max(pen);
        out.height = out.height.max(glyph.height * scale);
        previous = Some(glyph);
    }
    out
}

/// Rounded rectangle drawn behind a label, in screen pixels from the anchor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BackgroundBox {
    pub offset: Vec2,
    pub size: Vec2,
    pub corner_radius: f64,
}

impl BackgroundBox {
    /// Box around `layout` placed at `label_offset`, grown by `padding` on
    /// every side.
    pub fn around(layout: &TextLayout, label_offset: Vec2, padding: [f64; 2], corner_radius: f64) -> Self {
        Self {
            offset: Vec2::new(label_offset.x - padding[0], label_offset.y - padding[1]),
            size: Vec2::new(
                layout.width + padding[0] * 2.0,
                layout.height + padding[1] * 2.0,
            ),
            corner_radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackgroundBox, layout_text};
    use formats::FontAtlas;
    use foundation::math::Vec2;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    const ATLAS: &str = r#"{
        "chars": [
            { "id": 65, "char": "A", "x": 0, "y": 0, "width": 10, "height": 12, "xadvance": 9 },
            { "id": 86, "char": "V", "x": 10, "y": 0, "width": 10, "height": 12, "xadvance": 9 },
            { "id": 46, "char": ".", "x": 20, "y": 0, "width": 3, "height": 3, "yoffset": 9 }
        ],
        "kernings": [ { "first": 65, "second": 86, "amount": -2 } ],
        "common": { "lineHeight": 14, "scaleW": 64, "scaleH": 64 }
    }"#;

    #[test]
    fn applies_kerning_between_consecutive_glyphs() {
        let atlas = FontAtlas::from_json_str(ATLAS).expect("atlas");
        let layout = layout_text(&atlas, "AV.", 1.0);
        assert_eq!(layout.glyphs.len(), 3);
        assert_close(layout.glyphs[0].offset.x, 0.0, 1e-12);
        // 9 advance, then -2 kerning.
        assert_close(layout.glyphs[1].offset.x, 7.0, 1e-12);
        assert_close(layout.glyphs[1].kerning, -2.0, 1e-12);
        // No xadvance: "." advances by its width.
        assert_close(layout.glyphs[2].offset.x, 16.0, 1e-12);
        assert_close(layout.glyphs[2].offset.y, 9.0, 1e-12);
        assert_close(layout.width, 19.0, 1e-12);
        assert_close(layout.height, 12.0, 1e-12);
    }

    #[test]
    fn skips_missing_glyphs_and_scales() {
        let atlas = FontAtlas::from_json_str(ATLAS).expect("atlas");
        let layout = layout_text(&atlas, "A?A", 2.0);
        assert_eq!(layout.missing, 1);
        assert_eq!(layout.glyphs.len(), 2);
        assert_close(layout.glyphs[1].offset.x, 18.0, 1e-12);
        assert_close(layout.height, 24.0, 1e-12);
        assert!(layout_text(&atlas, "", 1.0).is_empty());
    }

    #[test]
    fn background_wraps_text_with_padding() {
        let atlas = FontAtlas::from_json_str(ATLAS).expect("atlas");
        let layout = layout_text(&atlas, "A", 1.0);
        let bg = BackgroundBox::around(&layout, Vec2::new(5.0, -4.0), [2.0, 3.0], 3.0);
        assert_eq!(bg.offset, Vec2::new(3.0, -7.0));
        assert_eq!(bg.size, Vec2::new(13.0, 18.0));
    }
}
