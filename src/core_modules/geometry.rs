// THEORY:
// Integer pixel geometry shared by every spatial stage. Coordinates follow image
// conventions: `x` grows to the right, `y` grows downward, and `(0, 0)` is the
// top-left pixel. A `Rect` is half-open: it covers `x..x + width` and
// `y..y + height`, so `right()` and `bottom()` name the first column/row *outside*
// the rectangle.

use serde::{Deserialize, Serialize};

/// A pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The tightest rectangle enclosing every point, or `None` for an empty slice.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    pub const fn left(&self) -> i32 {
        self.x
    }

    pub const fn top(&self) -> i32 {
        self.y
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub const fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// True when `p` lies strictly inside all four edges.
    pub fn strictly_contains(&self, p: Point) -> bool {
        p.x > self.left() && p.y > self.top() && p.x < self.right() && p.y < self.bottom()
    }

    /// Clips the rectangle to a `width` x `height` frame. Returns `None` when
    /// nothing of it remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let left = self.left().max(0);
        let top = self.top().max(0);
        let right = self.right().min(width as i32);
        let bottom = self.bottom().min(height as i32);
        (right > left && bottom > top).then(|| Self::new(left, top, right - left, bottom - top))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_is_tight_and_inclusive() {
        let points = [Point::new(3, 4), Point::new(10, 2), Point::new(7, 9)];
        let rect = Rect::bounding(&points).unwrap();
        assert_eq!(rect, Rect::new(3, 2, 8, 8));
        assert_eq!(rect.right(), 11);
        assert_eq!(rect.bottom(), 10);
        assert!(Rect::bounding(&[]).is_none());
    }

    #[test]
    fn strict_containment_excludes_edges() {
        let rect = Rect::new(10, 10, 5, 5);
        assert!(rect.strictly_contains(Point::new(12, 12)));
        assert!(!rect.strictly_contains(Point::new(10, 12)));
        assert!(!rect.strictly_contains(Point::new(12, 15)));
    }

    #[test]
    fn clamp_drops_rectangles_outside_the_frame() {
        assert_eq!(
            Rect::new(-5, -5, 10, 10).clamp_to(64, 64),
            Some(Rect::new(0, 0, 5, 5))
        );
        assert_eq!(Rect::new(70, 0, 10, 10).clamp_to(64, 64), None);
    }
}
