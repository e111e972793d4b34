// transform.rs — Coordinate transforms between world and image pixel space
//
// Scripts compute in world coordinates. Each bound image carries a transform
// from world coordinates to its own pixel grid; the identity is the default.
// Mapped coordinates are rounded to the nearest pixel.

use std::fmt;

/// Maps world coordinates to an image's pixel coordinates.
pub trait CoordinateTransform: fmt::Debug + Send + Sync {
    fn world_to_image(&self, x: f64, y: f64) -> (f64, f64);

    /// The inverse mapping, if the transform has one.
    fn image_to_world(&self, _x: f64, _y: f64) -> Option<(f64, f64)> {
        None
    }

    fn is_identity(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn world_to_image(&self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }

    fn image_to_world(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        Some((x, y))
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Axis-aligned scale then translate: `image = world * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl AffineTransform {
    pub fn new(scale_x: f64, scale_y: f64, offset_x: f64, offset_y: f64) -> Self {
        AffineTransform {
            scale_x,
            scale_y,
            offset_x,
            offset_y,
        }
    }

    pub fn translate(dx: f64, dy: f64) -> Self {
        Self::new(1.0, 1.0, dx, dy)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, sy, 0.0, 0.0)
    }
}

impl CoordinateTransform for AffineTransform {
    fn world_to_image(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale_x + self.offset_x, y * self.scale_y + self.offset_y)
    }

    fn image_to_world(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.scale_x == 0.0 || self.scale_y == 0.0 {
            return None;
        }
        Some((
            (x - self.offset_x) / self.scale_x,
            (y - self.offset_y) / self.scale_y,
        ))
    }

    fn is_identity(&self) -> bool {
        self.scale_x == 1.0 && self.scale_y == 1.0 && self.offset_x == 0.0 && self.offset_y == 0.0
    }
}

/// Nearest pixel index for a mapped coordinate; `None` if it is not finite.
pub fn to_pixel(v: f64) -> Option<i64> {
    v.is_finite().then(|| v.round() as i64)
}
