use serde::Serialize;

use crate::shared::region::Region;

/// Box in image-pixel space as `(x1, y1, x2, y2)`.
///
/// Area and overlap follow the inclusive-pixel convention: one pixel is
/// added to each dimension, so a box with `x1 == x2` is one pixel wide.
/// Suppression thresholds are tuned against this convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Square with side `max(width, height)` sharing this box's center.
    pub fn square(&self) -> Self {
        let w = self.width();
        let h = self.height();
        let side = w.max(h);
        let x1 = self.x1 + (w - side) * 0.5;
        let y1 = self.y1 + (h - side) * 0.5;
        Self {
            x1,
            y1,
            x2: x1 + side,
            y2: y1 + side,
        }
    }

    /// Applies a `(dy1, dx1, dy2, dx2)` offset vector scaled by the box size.
    pub fn regressed(&self, regression: &[f32; 4]) -> Self {
        let w = self.width();
        let h = self.height();
        Self {
            x1: self.x1 + regression[1] * w,
            y1: self.y1 + regression[0] * h,
            x2: self.x2 + regression[3] * w,
            y2: self.y2 + regression[2] * h,
        }
    }

    /// Inclusive-pixel area.
    pub fn area(&self) -> f32 {
        (self.width() + 1.0) * (self.height() + 1.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let w = (ix2 - ix1 + 1.0).max(0.0);
        let h = (iy2 - iy1 + 1.0).max(0.0);
        w * h
    }

    /// Intersection over union.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Intersection over the smaller of the two areas.
    pub fn iom(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter == 0.0 {
            return 0.0;
        }
        inter / self.area().min(other.area())
    }

    /// Pixel range used to crop this box out of an image.
    ///
    /// Coordinates truncate toward zero; values beyond the `i32` range
    /// saturate.
    pub fn to_region(&self) -> Region {
        Region::new(
            self.x1 as i32,
            self.y1 as i32,
            self.width() as i32,
            self.height() as i32,
        )
    }
}
