// THEORY:
// The `BlobDetector` is the decision point of the detector. It turns the cleaned
// mask into `SmartBlob`s and decides whether exactly one of them is the laser.
//
// Algorithm:
// 1.  **Extraction**: Every outer border found by contour tracing delimits one
//     connected foreground region. Its boundary, moments and arc length are
//     packaged into a `SmartBlob`.
// 2.  **Shortcut**: With no filter enabled, a lone blob is taken as-is.
// 3.  **Filtering**: Otherwise degenerate blobs (no area or no perimeter) are
//     dropped, and every remaining blob is checked against the enabled filters.
//     The area filter bounds m00. The circularity filter bounds
//     `4 * pi * m00 / perimeter^2`; a blob with no perimeter always fails it.
// 4.  **Resolution**: Exactly one survivor is selected. Zero survivors or several
//     are both reported as not found. There is no tie-breaking: ambiguity is never
//     resolved by picking the largest or the closest blob.
//
// The detector is stateless: one mask in, one selection out.

use crate::core_modules::segmenter::BACKGROUND;
use crate::core_modules::smart_blob::SmartBlob;
use crate::error::ConfigError;
use image::GrayImage;

/// Bounds on blob area (m00), in square pixels of the processing frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AreaFilter {
    pub enabled: bool,
    min: f64,
    max: f64,
}

impl AreaFilter {
    pub fn new(enabled: bool, min: f64, max: f64) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() || min > max || min < 0.0 {
            return Err(ConfigError::InvertedAreaRange { min, max });
        }
        Ok(Self { enabled, min, max })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn accepts(&self, blob: &SmartBlob) -> bool {
        self.min <= blob.area() && blob.area() <= self.max
    }
}

/// Bounds on blob circularity, both within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CircularityFilter {
    pub enabled: bool,
    min: f64,
    max: f64,
}

impl CircularityFilter {
    pub fn new(enabled: bool, min: f64, max: f64) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ConfigError::InvalidCircularity { min, max });
        }
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min > max {
            return Err(ConfigError::InvalidCircularity { min, max });
        }
        Ok(Self { enabled, min, max })
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn accepts(&self, blob: &SmartBlob) -> bool {
        match blob.circularity() {
            Some(circularity) => self.min <= circularity && circularity <= self.max,
            None => false,
        }
    }
}

/// Shape filters applied to blob candidates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlobFilterConfig {
    pub area: AreaFilter,
    pub circularity: CircularityFilter,
}

impl BlobFilterConfig {
    pub fn any_enabled(&self) -> bool {
        self.area.enabled || self.circularity.enabled
    }

    pub fn accepts(&self, blob: &SmartBlob) -> bool {
        (!self.area.enabled || self.area.accepts(blob))
            && (!self.circularity.enabled || self.circularity.accepts(blob))
    }
}

/// Outcome of blob resolution for one frame.
#[derive(Debug, Clone)]
pub enum BlobSelection {
    /// The mask holds no foreground region.
    NoBlobs,
    /// Blobs exist but none passed the enabled filters.
    NoSurvivor { blobs: usize },
    /// More than one blob passed; nothing is chosen.
    Ambiguous { survivors: usize },
    Selected(SmartBlob),
}

impl BlobSelection {
    pub fn selected(&self) -> Option<&SmartBlob> {
        match self {
            BlobSelection::Selected(blob) => Some(blob),
            _ => None,
        }
    }
}

pub mod blob_detector {
    use super::*; // Make structs from parent module available.
    use imageproc::contours::{BorderType, find_contours};
    use tracing::trace;

    /// Extracts one blob per connected foreground region of `mask`.
    pub fn find_blobs(mask: &GrayImage) -> Vec<SmartBlob> {
        find_contours::<i32>(mask)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer)
            .enumerate()
            .map(|(id, contour)| SmartBlob::new(id as u64, contour.points))
            .collect()
    }

    /// Picks the laser candidate among `blobs`.
    pub fn select_blob(blobs: Vec<SmartBlob>, config: &BlobFilterConfig) -> BlobSelection {
        let blob_count = blobs.len();
        if blob_count == 0 {
            return BlobSelection::NoBlobs;
        }

        if blob_count == 1 && !config.any_enabled() {
            return blobs
                .into_iter()
                .next()
                .map_or(BlobSelection::NoBlobs, BlobSelection::Selected);
        }

        let mut survivors: Vec<SmartBlob> = blobs
            .into_iter()
            .filter(|blob| {
                let accepted = !blob.is_degenerate() && config.accepts(blob);
                trace!(
                    blob = blob.id,
                    area = blob.area(),
                    circularity = ?blob.circularity(),
                    accepted,
                    "blob filter"
                );
                accepted
            })
            .collect();

        match survivors.len() {
            0 => BlobSelection::NoSurvivor { blobs: blob_count },
            1 => survivors
                .pop()
                .map_or(BlobSelection::NoBlobs, BlobSelection::Selected),
            n => BlobSelection::Ambiguous { survivors: n },
        }
    }

    /// Renders a single blob as a filled mask the size of the processing frame.
    pub fn blob_mask(blob: &SmartBlob, width: u32, height: u32) -> GrayImage {
        use crate::core_modules::segmenter::FOREGROUND;
        use image::Luma;
        use imageproc::point::Point;

        let mut mask = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
        let mut polygon: Vec<Point<i32>> = blob.contour.clone();
        // The polygon filler rejects closed input and needs a real outline.
        if polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }
        if polygon.len() >= 3 {
            imageproc::drawing::draw_polygon_mut(&mut mask, &polygon, Luma([FOREGROUND]));
        }
        for point in &blob.contour {
            if point.x >= 0 && point.y >= 0 && (point.x as u32) < width && (point.y as u32) < height {
                mask.put_pixel(point.x as u32, point.y as u32, Luma([FOREGROUND]));
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::*;
    use super::*;
    use crate::core_modules::segmenter::FOREGROUND;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    fn mask_with_rects(rects: &[(i32, i32, u32, u32)]) -> GrayImage {
        let mut mask = GrayImage::new(64, 48);
        for &(x, y, w, h) in rects {
            draw_filled_rect_mut(&mut mask, Rect::at(x, y).of_size(w, h), Luma([FOREGROUND]));
        }
        mask
    }

    fn area_only(min: f64, max: f64) -> BlobFilterConfig {
        BlobFilterConfig {
            area: AreaFilter::new(true, min, max).expect("valid"),
            ..Default::default()
        }
    }

    #[test]
    fn empty_mask_has_no_blobs() {
        let blobs = find_blobs(&GrayImage::new(10, 10));
        assert!(blobs.is_empty());
        assert!(matches!(
            select_blob(blobs, &BlobFilterConfig::default()),
            BlobSelection::NoBlobs
        ));
    }

    #[test]
    fn one_circular_blob_without_filters_is_selected_at_its_center() {
        let mut mask = GrayImage::new(48, 48);
        draw_filled_circle_mut(&mut mask, (20, 24), 4, Luma([FOREGROUND]));

        let blobs = find_blobs(&mask);
        assert_eq!(blobs.len(), 1);
        let selection = select_blob(blobs, &BlobFilterConfig::default());
        let blob = selection.selected().expect("one blob is selected");
        let (cx, cy) = blob.centroid().expect("non-degenerate");
        assert!((cx - 20.0).abs() < 0.5, "cx = {cx}");
        assert!((cy - 24.0).abs() < 0.5, "cy = {cy}");
        assert!(blob.circularity().expect("has perimeter") > 0.7);
    }

    #[test]
    fn two_blobs_without_filters_are_ambiguous() {
        let blobs = find_blobs(&mask_with_rects(&[(2, 2, 6, 6), (30, 30, 6, 6)]));
        assert_eq!(blobs.len(), 2);
        assert!(matches!(
            select_blob(blobs, &BlobFilterConfig::default()),
            BlobSelection::Ambiguous { survivors: 2 }
        ));
    }

    #[test]
    fn area_filter_keeps_the_only_matching_blob() {
        // Outline areas: 11x6 pixels -> 10 * 5 = 50, 6x3 pixels -> 5 * 2 = 10.
        let mask = mask_with_rects(&[(4, 4, 11, 6), (40, 30, 6, 3)]);
        let selection = select_blob(find_blobs(&mask), &area_only(40.0, 60.0));
        let blob = selection.selected().expect("area 50 survives");
        assert!((blob.area() - 50.0).abs() < 1e-9);
        let (cx, cy) = blob.centroid().expect("non-degenerate");
        assert!((cx - 9.0).abs() < 1e-9);
        assert!((cy - 6.5).abs() < 1e-9);
    }

    #[test]
    fn a_single_blob_is_still_filtered_when_a_filter_is_enabled() {
        let mask = mask_with_rects(&[(40, 30, 6, 3)]);
        assert!(matches!(
            select_blob(find_blobs(&mask), &area_only(40.0, 60.0)),
            BlobSelection::NoSurvivor { blobs: 1 }
        ));
    }

    #[test]
    fn circularity_filter_rejects_elongated_blobs() {
        let mask = mask_with_rects(&[(2, 2, 8, 8), (2, 30, 30, 3)]);
        let config = BlobFilterConfig {
            circularity: CircularityFilter::new(true, 0.5, 1.0).expect("valid"),
            ..Default::default()
        };
        let selection = select_blob(find_blobs(&mask), &config);
        let blob = selection.selected().expect("the square survives");
        assert_eq!(blob.bounding_box.0.y, 2);
    }

    #[test]
    fn zero_perimeter_blob_fails_circularity() {
        let mut mask = GrayImage::new(8, 8);
        mask.put_pixel(3, 3, Luma([FOREGROUND]));
        let config = BlobFilterConfig {
            circularity: CircularityFilter::new(true, 0.0, 1.0).expect("valid"),
            ..Default::default()
        };
        assert!(matches!(
            select_blob(find_blobs(&mask), &config),
            BlobSelection::NoSurvivor { blobs: 1 }
        ));
    }

    #[test]
    fn noise_pixels_do_not_make_a_dot_ambiguous() {
        let mut mask = mask_with_rects(&[(4, 4, 11, 6)]);
        mask.put_pixel(50, 40, Luma([FOREGROUND]));
        let blobs = find_blobs(&mask);
        assert_eq!(blobs.len(), 2);

        let selection = select_blob(blobs, &area_only(0.0, 100.0));
        let blob = selection.selected().expect("the rectangle is the only real blob");
        assert!((blob.area() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_blobs_are_dropped_even_without_filters() {
        let mut mask = mask_with_rects(&[(4, 4, 11, 6)]);
        draw_filled_rect_mut(&mut mask, Rect::at(30, 30).of_size(8, 1), Luma([FOREGROUND]));
        let selection = select_blob(find_blobs(&mask), &BlobFilterConfig::default());
        let blob = selection.selected().expect("the line has no area");
        assert_eq!(blob.bounding_box.0, imageproc::point::Point::new(4, 4));
    }

    #[test]
    fn filter_bounds_are_validated() {
        assert!(AreaFilter::new(true, f64::NAN, 40.0).is_err());
        assert!(AreaFilter::new(true, 0.0, f64::NAN).is_err());
        assert!(AreaFilter::new(true, 0.0, f64::INFINITY).is_err());
        assert!(CircularityFilter::new(true, f64::NAN, 1.0).is_err());
        assert!(AreaFilter::new(true, 60.0, 40.0).is_err());
        assert!(CircularityFilter::new(true, 0.2, 1.5).is_err());
        assert!(CircularityFilter::new(true, 0.8, 0.2).is_err());
    }

    #[test]
    fn blob_mask_covers_the_blob() {
        let mask = mask_with_rects(&[(4, 4, 11, 6)]);
        let blobs = find_blobs(&mask);
        let rendered = blob_mask(&blobs[0], 64, 48);
        assert_eq!(rendered.get_pixel(9, 6)[0], FOREGROUND);
        assert_eq!(rendered.get_pixel(4, 4)[0], FOREGROUND);
        assert_eq!(rendered.get_pixel(30, 30)[0], BACKGROUND);
    }
}
