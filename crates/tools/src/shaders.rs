use gpu::ShaderSource;
use layers::{LayerKind, LayerShaders};

const POINT_VERTEX: &str = r#"
uniform mat4 matrix;
attribute vec4 vertex;
attribute vec4 color;
attribute float pointSize;
varying vec4 _color;

void main() {
    gl_PointSize = pointSize;
    gl_Position = matrix * vertex;
    _color = color;
}
"#;

const POINT_FRAGMENT: &str = r#"
precision mediump float;
varying vec4 _color;

void main() {
    float border = 0.05;
    float radius = 0.5;
    vec2 m = gl_PointCoord.xy - vec2(0.5, 0.5);
    float dist = radius - sqrt(m.x * m.x + m.y * m.y);
    float t = 0.0;
    if (dist > border) {
        t = 1.0;
    } else if (dist > 0.0) {
        t = dist / border;
    }
    gl_FragColor = vec4(_color.rgb, _color.a * t);
}
"#;

const ICON_VERTEX: &str = r#"
uniform mat4 matrix;
uniform float iconSize;
attribute vec4 vertex;
attribute vec4 color;
attribute float pointSize;
attribute vec2 texCoord;
attribute float offsetZ;
varying vec4 _color;
varying vec2 _anchor;

void main() {
    gl_PointSize = pointSize;
    gl_Position = matrix * vec4(vertex.xy, offsetZ, 1.0);
    _color = color;
    _anchor = texCoord / iconSize;
}
"#;

const ICON_FRAGMENT: &str = r#"
precision mediump float;
uniform sampler2D iconTexture;
varying vec4 _color;
varying vec2 _anchor;

void main() {
    vec4 texel = texture2D(iconTexture, gl_PointCoord + _anchor - vec2(0.5, 1.0));
    gl_FragColor = texel * _color;
}
"#;

const VECTOR_VERTEX: &str = r#"
uniform mat4 matrix;
attribute vec4 vertex;
attribute vec4 color;
varying vec4 _color;

void main() {
    gl_Position = matrix * vertex;
    _color = color;
}
"#;

const VECTOR_FRAGMENT: &str = r#"
precision mediump float;
varying vec4 _color;

void main() {
    gl_FragColor = _color;
}
"#;

const LABEL_BACKGROUND_VERTEX: &str = r#"
uniform mat4 matrix;
uniform vec2 viewport;
attribute vec2 vertex;
attribute vec2 labelOffset;
attribute vec2 boxSize;
attribute float cornerRadius;
attribute vec4 color;
attribute float offsetZ;
varying vec4 _color;

void main() {
    vec4 anchor = matrix * vec4(vertex, offsetZ, 1.0);
    vec2 pixel = (labelOffset + boxSize * 0.5) / viewport * 2.0;
    gl_Position = anchor + vec4(pixel.x, -pixel.y, 0.0, 0.0);
    _color = color;
}
"#;

const LABEL_GLYPH_VERTEX: &str = r#"
uniform mat4 matrix;
uniform vec2 viewport;
attribute vec2 vertex;
attribute vec2 glyphOffset;
attribute float kerning;
attribute vec4 atlasRect;
attribute vec4 color;
attribute float offsetZ;
varying vec4 _color;
varying vec2 _uv;

void main() {
    vec4 anchor = matrix * vec4(vertex, offsetZ, 1.0);
    vec2 pixel = glyphOffset / viewport * 2.0;
    gl_Position = anchor + vec4(pixel.x, -pixel.y, 0.0, 0.0);
    _color = color;
    _uv = atlasRect.xy;
}
"#;

const LABEL_GLYPH_FRAGMENT: &str = r#"
precision mediump float;
uniform sampler2D fontTexture;
varying vec4 _color;
varying vec2 _uv;

void main() {
    float coverage = texture2D(fontTexture, _uv).a;
    gl_FragColor = vec4(_color.rgb, _color.a * coverage);
}
"#;

/// Stock GLSL programs for every layer kind.
pub fn stock_shaders(kind: LayerKind) -> LayerShaders {
    match kind {
        LayerKind::Points => LayerShaders::new(ShaderSource::new(POINT_VERTEX, POINT_FRAGMENT)),
        LayerKind::Icons => LayerShaders::new(ShaderSource::new(ICON_VERTEX, ICON_FRAGMENT)),
        LayerKind::LabeledIcons => LayerShaders::new(ShaderSource::new(ICON_VERTEX, ICON_FRAGMENT))
            .with_labels(
                ShaderSource::new(LABEL_BACKGROUND_VERTEX, VECTOR_FRAGMENT),
                ShaderSource::new(LABEL_GLYPH_VERTEX, LABEL_GLYPH_FRAGMENT),
            ),
        LayerKind::Lines | LayerKind::Shapes => {
            LayerShaders::new(ShaderSource::new(VECTOR_VERTEX, VECTOR_FRAGMENT))
        }
    }
}
