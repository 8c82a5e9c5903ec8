pub mod image_helper {
    use crate::core_modules::detection::Diagnostics;
    use image::{GrayImage, ImageEncoder};
    use std::path::{Path, PathBuf};

    /// Writes a single-channel mask as an 8-bit grayscale PNG.
    pub fn save_mask(path: &Path, mask: &GrayImage) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(mask.as_raw(), mask.width(), mask.height(), image::ExtendedColorType::L8)?;

        Ok(())
    }

    /// Dumps every diagnostic mask of one frame into `dir` as
    /// `<frame>_<channel>.png` and returns the written paths.
    pub fn save_diagnostics(
        dir: &Path,
        frame_index: u64,
        diagnostics: &Diagnostics,
    ) -> Result<Vec<PathBuf>, image::error::ImageError> {
        std::fs::create_dir_all(dir)?;

        let mut masks: Vec<(&str, &GrayImage)> = vec![
            ("hue", &diagnostics.hue),
            ("saturation", &diagnostics.saturation),
            ("value", &diagnostics.value),
            ("blobs", &diagnostics.blobs),
        ];
        if let Some(laser_blob) = &diagnostics.laser_blob {
            masks.push(("laser", laser_blob));
        }

        let mut written = Vec::with_capacity(masks.len());
        for (channel, mask) in masks {
            let path = dir.join(format!("{frame_index:06}_{channel}.png"));
            save_mask(&path, mask)?;
            written.push(path);
        }
        Ok(written)
    }
}
