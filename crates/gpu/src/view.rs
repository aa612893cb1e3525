/// 2D view transform stored as a column-major 4x4 matrix.
///
/// Maps origin-relative zoom-0 map-space pixels to clip space. Only the 2D
/// scale and translation slots are ever written; z is dropped and w passes
/// through.
///
/// Call order is `set_size`, then `scale_to`, then `translate_to`. Out-of-order
/// calls are not checked: before `set_size` the linear part is zero, so every
/// point lands on the origin (or on the clip corner once `translate_to` ran).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewTransform {
    m: [f32; 16],
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewTransform {
    pub fn new() -> Self {
        let mut m = [0.0; 16];
        m[15] = 1.0;
        Self { m }
    }

    /// Pixel -> clip space for a `width` x `height` canvas, flipping Y.
    pub fn set_size(&mut self, width: f64, height: f64) -> &mut Self {
        self.m = [0.0; 16];
        self.m[0] = (2.0 / width) as f32;
        self.m[5] = (-2.0 / height) as f32;
        self.m[12] = -1.0;
        self.m[13] = 1.0;
        self.m[15] = 1.0;
        self
    }

    pub fn scale_to(&mut self, scale: f64) -> &mut Self {
        self.m[0] *= scale as f32;
        self.m[5] *= scale as f32;
        self
    }

    /// Shifts by `(dx, dy)` pixels in pre-scale space.
    pub fn translate_to(&mut self, dx: f64, dy: f64) -> &mut Self {
        self.m[12] = self.m[0] * dx as f32 - 1.0;
        self.m[13] = self.m[5] * dy as f32 + 1.0;
        self
    }

    pub fn array(&self) -> [f32; 16] {
        self.m
    }

    /// Applies the transform to a 2D point (for tests and CPU-side hit checks).
    pub fn apply(&self, x: f32, y: f32) -> [f32; 2] {
        [
            self.m[0] * x + self.m[4] * y + self.m[12],
            self.m[1] * x + self.m[5] * y + self.m[13],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::ViewTransform;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() <= 1e-5, "expected {a} ~= {b}");
    }

    #[test]
    fn set_size_maps_canvas_corners_to_clip_space() {
        let mut t = ViewTransform::new();
        t.set_size(200.0, 100.0);
        let tl = t.apply(0.0, 0.0);
        let br = t.apply(200.0, 100.0);
        assert_close(tl[0], -1.0);
        assert_close(tl[1], 1.0);
        assert_close(br[0], 1.0);
        assert_close(br[1], -1.0);
    }

    #[test]
    fn chained_scale_and_translate() {
        let mut t = ViewTransform::new();
        t.set_size(100.0, 100.0).scale_to(4.0).translate_to(-10.0, -20.0);
        // (10, 20) lands on the top-left corner; one unit further is 4 pixels.
        let p = t.apply(10.0, 20.0);
        assert_close(p[0], -1.0);
        assert_close(p[1], 1.0);
        let q = t.apply(11.0, 20.0);
        assert_close(q[0], -1.0 + 4.0 * 2.0 / 100.0);
        let m = t.array();
        assert_eq!(m[15], 1.0);
        assert_eq!(m[10], 0.0);
    }

    #[test]
    fn unsized_transform_collapses_to_origin() {
        let mut t = ViewTransform::new();
        t.scale_to(8.0).translate_to(3.0, 4.0);
        let m = t.array();
        // translate_to still writes the clip offsets; the linear part stays zero.
        assert_eq!(m[0], 0.0);
        assert_eq!(m[5], 0.0);
        assert_eq!(ViewTransform::new().apply(123.0, -45.0), [0.0, 0.0]);
    }
}
