// THEORY:
// Geometric moments summarise a region by integrals over its area. The detector only
// needs the zeroth moment (area) and the two first moments, from which the centroid
// follows directly: x from m10, y from m01.
//
// Moments are computed from the closed boundary polygon with Green's theorem, so a
// blob that is a single pixel or a one-pixel-thick line has zero area. Such a blob
// has no centroid and is reported as not found rather than guessed at.

use imageproc::point::Point;

/// Zeroth and first-order moments of a closed contour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    /// Area.
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// Moments of the polygon traced by `contour`, independent of its orientation.
    pub fn from_contour(contour: &[Point<i32>]) -> Self {
        if contour.len() < 3 {
            return Self::default();
        }

        let mut doubled_area = 0.0;
        let mut m10 = 0.0;
        let mut m01 = 0.0;
        let next = contour.iter().cycle().skip(1);
        for (current, next) in contour.iter().zip(next) {
            let (x0, y0) = (current.x as f64, current.y as f64);
            let (x1, y1) = (next.x as f64, next.y as f64);
            let cross = x0 * y1 - x1 * y0;
            doubled_area += cross;
            m10 += (x0 + x1) * cross;
            m01 += (y0 + y1) * cross;
        }

        // Clockwise traversal gives negative signed moments.
        let sign = if doubled_area < 0.0 { -1.0 } else { 1.0 };
        Self {
            m00: sign * doubled_area / 2.0,
            m10: sign * m10 / 6.0,
            m01: sign * m01 / 6.0,
        }
    }

    /// Centroid `(m10 / m00, m01 / m00)`, or `None` for a zero-area region.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 <= 0.0 {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}
