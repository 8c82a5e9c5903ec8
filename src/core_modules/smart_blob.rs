// THEORY:
// A `SmartBlob` is one connected foreground region of the cleaned mask, captured in a
// single frame. It is a "dumb" data container: its boundary, the moments derived from
// that boundary and the boundary's arc length. It has no memory of earlier frames;
// the only thing that outlives a frame is the track.

use crate::core_modules::moment::Moments;
use imageproc::point::Point;
use std::f64::consts::PI;

/// A single connected region detected in a frame.
#[derive(Debug, Clone)]
pub struct SmartBlob {
    /// Index of this blob within the current frame only. Not persistent.
    pub id: u64,
    /// Top-left and bottom-right corners of the boundary, inclusive.
    pub bounding_box: (Point<i32>, Point<i32>),
    /// Closed outer boundary, in processing-frame pixel coordinates.
    pub contour: Vec<Point<i32>>,
    pub moments: Moments,
    /// Closed-contour arc length.
    pub perimeter: f64,
}

impl SmartBlob {
    pub fn new(id: u64, contour: Vec<Point<i32>>) -> Self {
        let moments = Moments::from_contour(&contour);
        let perimeter = imageproc::geometry::arc_length(&contour, true);

        let mut min = Point::new(i32::MAX, i32::MAX);
        let mut max = Point::new(i32::MIN, i32::MIN);
        for point in &contour {
            min.x = min.x.min(point.x);
            min.y = min.y.min(point.y);
            max.x = max.x.max(point.x);
            max.y = max.y.max(point.y);
        }

        Self {
            id,
            bounding_box: (min, max),
            contour,
            moments,
            perimeter,
        }
    }

    pub fn area(&self) -> f64 {
        self.moments.m00
    }

    /// `4 * pi * area / perimeter^2`; `None` when the perimeter is zero.
    pub fn circularity(&self) -> Option<f64> {
        if self.perimeter <= 0.0 {
            return None;
        }
        Some(4.0 * PI * self.area() / (self.perimeter * self.perimeter))
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        self.moments.centroid()
    }

    /// True for a blob with no area or no perimeter, such as a lone pixel or a
    /// one-pixel-thick line.
    pub fn is_degenerate(&self) -> bool {
        self.area() <= 0.0 || self.perimeter <= 0.0
    }
}
