use crate::math::Vec2;

/// Axis-aligned bounding box in 2D (pixels or lng/lat degrees).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    /// An inverted box that any `extend` call will overwrite.
    pub fn empty() -> Self {
        Aabb2 {
            min: [f64::INFINITY, f64::INFINITY],
            max: [f64::NEG_INFINITY, f64::NEG_INFINITY],
        }
    }

    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Aabb2 {
            min: [a.x.min(b.x), a.y.min(b.y)],
            max: [a.x.max(b.x), a.y.max(b.y)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1]
    }

    pub fn extend(&mut self, p: Vec2) {
        self.min[0] = self.min[0].min(p.x);
        self.min[1] = self.min[1].min(p.y);
        self.max[0] = self.max[0].max(p.x);
        self.max[1] = self.max[1].max(p.y);
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min[0] && p.x <= self.max[0] && p.y >= self.min[1] && p.y <= self.max[1]
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Aabb2;
    use crate::math::Vec2;

    #[test]
    fn extend_grows_from_empty() {
        let mut b = Aabb2::empty();
        assert!(b.is_empty());
        b.extend(Vec2::new(1.0, -2.0));
        b.extend(Vec2::new(-3.0, 4.0));
        assert!(!b.is_empty());
        assert_eq!(b, Aabb2::new([-3.0, -2.0], [1.0, 4.0]));
        assert_eq!(b.center(), Vec2::new(-1.0, 1.0));
    }

    #[test]
    fn corners_are_normalized() {
        let b = Aabb2::from_corners(Vec2::new(5.0, 0.0), Vec2::new(0.0, 5.0));
        assert!(b.contains(Vec2::new(2.5, 2.5)));
        assert!(!b.contains(Vec2::new(6.0, 2.5)));
    }
}
