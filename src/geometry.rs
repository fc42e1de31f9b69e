//! Frame-space geometry for pointer hit testing
//!
//! All coordinates are normalized to the video frame: `(0, 0)` is the top-left
//! corner and `(1, 1)` the bottom-right, with y growing downward.

use serde::Deserialize;

/// A 2D point in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const CENTER: Point = Point { x: 0.5, y: 0.5 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Clamp both axes into the frame
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
        }
    }
}

/// Hit area of a dwell region
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    /// Axis-aligned rectangle, half-open on the right and bottom edges so that
    /// stacked rows never share a point
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    /// Circle, inclusive of its rim
    Disc { center: Point, radius: f32 },
}

impl Bounds {
    pub fn rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Bounds::Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn disc(center: Point, radius: f32) -> Self {
        Bounds::Disc { center, radius }
    }

    /// Check whether a point lies inside the area
    pub fn contains(&self, point: Point) -> bool {
        match *self {
            Bounds::Rect {
                x,
                y,
                width,
                height,
            } => point.x >= x && point.x < x + width && point.y >= y && point.y < y + height,
            Bounds::Disc { center, radius } => center.distance(&point) <= radius,
        }
    }

    pub fn center(&self) -> Point {
        match *self {
            Bounds::Rect {
                x,
                y,
                width,
                height,
            } => Point::new(x + width / 2.0, y + height / 2.0),
            Bounds::Disc { center, .. } => center,
        }
    }
}
