// ============================================================================
// GEOMETRY - integer rectangles, bounds fitting, transform helpers
// ============================================================================

use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{IntraPaintError, Result};

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntPoint {
    pub x: i32,
    pub y: i32,
}

impl IntPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Integer width × height pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntSize {
    pub width: i32,
    pub height: i32,
}

impl IntSize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Per-dimension minimum of two sizes.
    pub fn bounded_to(&self, other: IntSize) -> IntSize {
        IntSize::new(self.width.min(other.width), self.height.min(other.height))
    }

    pub fn area(&self) -> u64 {
        self.width.max(0) as u64 * self.height.max(0) as u64
    }
}

/// Axis-aligned integer rectangle. `right()`/`bottom()` are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl IntRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(size: IntSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn from_origin_size(origin: IntPoint, size: IntSize) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn origin(&self) -> IntPoint {
        IntPoint::new(self.x, self.y)
    }

    pub fn size(&self) -> IntSize {
        IntSize::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains_point(&self, pt: IntPoint) -> bool {
        pt.x >= self.x && pt.y >= self.y && pt.x < self.right() && pt.y < self.bottom()
    }

    pub fn contains_rect(&self, other: &IntRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlapping region, or an empty rect at the origin when the two do not meet.
    pub fn intersected(&self, other: &IntRect) -> IntRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            IntRect::default()
        } else {
            IntRect::new(x0, y0, x1 - x0, y1 - y0)
        }
    }

    /// Smallest rect enclosing both. Empty rects do not contribute.
    pub fn united(&self, other: &IntRect) -> IntRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        IntRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn translated(&self, dx: i32, dy: i32) -> IntRect {
        IntRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn moved_to(&self, x: i32, y: i32) -> IntRect {
        IntRect::new(x, y, self.width, self.height)
    }

    pub fn to_kurbo(&self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            self.right() as f64,
            self.bottom() as f64,
        )
    }

    /// Rounds a float rect outward to whole pixels.
    pub fn from_kurbo_bbox(rect: Rect) -> IntRect {
        let x0 = (rect.x0.min(rect.x1) + 1e-6).floor() as i32;
        let y0 = (rect.y0.min(rect.y1) + 1e-6).floor() as i32;
        let x1 = (rect.x0.max(rect.x1) - 1e-6).ceil() as i32;
        let y1 = (rect.y0.max(rect.y1) - 1e-6).ceil() as i32;
        IntRect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    /// Bounding box of this rect after mapping through `transform`.
    pub fn mapped_bbox(&self, transform: &Affine) -> IntRect {
        if self.is_empty() {
            return IntRect::default();
        }
        IntRect::from_kurbo_bbox(transform.transform_rect_bbox(self.to_kurbo()))
    }
}

/// Clamp `rect` into an image of size `bounds` while respecting size limits.
///
/// Width is clamped to the image width, then to `max_size`, then raised to `min_size`;
/// height likewise. The rect is then pushed left/up until its far edge fits and its near
/// edge is clamped at zero. A minimum larger than the maximum wins.
pub fn fit_rect_in_bounds(
    rect: IntRect,
    min_size: IntSize,
    max_size: IntSize,
    bounds: IntSize,
) -> IntRect {
    let mut area = rect;

    area.width = area.width.min(bounds.width);
    area.width = area.width.min(max_size.width);
    area.width = area.width.max(min_size.width);

    area.height = area.height.min(bounds.height);
    area.height = area.height.min(max_size.height);
    area.height = area.height.max(min_size.height);

    if area.x > bounds.width - area.width {
        area.x = bounds.width - area.width;
    }
    if area.x < 0 {
        area.x = 0;
    }
    if area.y > bounds.height - area.height {
        area.y = bounds.height - area.height;
    }
    if area.y < 0 {
        area.y = 0;
    }
    area
}

/// Inverse of `transform`, failing on a degenerate matrix.
pub fn invert_checked(transform: &Affine) -> Result<Affine> {
    let det = transform.determinant();
    if !det.is_finite() || det.abs() < 1e-12 {
        return Err(IntraPaintError::NonInvertibleTransform);
    }
    Ok(transform.inverse())
}

pub fn is_translation_only(transform: &Affine) -> bool {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0
}

/// Integer translation component when the transform is a pure whole-pixel offset.
pub fn integer_translation(transform: &Affine) -> Option<IntPoint> {
    if !is_translation_only(transform) {
        return None;
    }
    let t = transform.translation();
    if t.x.fract() == 0.0 && t.y.fract() == 0.0 {
        Some(IntPoint::new(t.x as i32, t.y as i32))
    } else {
        None
    }
}

pub fn map_point(transform: &Affine, pt: IntPoint) -> Point {
    *transform * Point::new(pt.x as f64, pt.y as f64)
}
