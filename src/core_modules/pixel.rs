// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the detector. It holds a single
// RGB sample and the only single-pixel heuristic the laser detector needs: its
// position in the 8-bit HSV cylinder.
//
// The HSV encoding follows the convention used by most camera tooling for 8-bit
// images so that calibration values carry over unchanged:
// - Hue is the color-wheel angle halved, `[0, 180)`, so it fits in a byte.
//   0 is red, 60 is green, 120 is blue.
// - Saturation is `chroma / value` scaled to `[0, 255]` (0 for black and grays).
// - Value is `max(R, G, B)`.
//
// Everything here is 1D: no neighbors, no history. Masks built from these values
// live in the segmenter.

pub mod pixel {
    pub type Channel = u8;
    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;

    /// Number of distinct 8-bit hue values; hue is circular modulo this.
    pub const HUE_RANGE: u16 = 180;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
    }

    /// A pixel expressed in 8-bit HSV.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hsv {
        pub hue: Hue,
        pub saturation: Saturation,
        pub value: Value,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        /// HSV value (V): brightness defined as max(R, G, B).
        pub fn value(&self) -> Value {
            self.red.max(self.green.max(self.blue))
        }

        /// Chroma: max(R, G, B) - min(R, G, B).
        pub fn chroma(&self) -> u8 {
            self.value() - self.red.min(self.green.min(self.blue))
        }

        /// HSV saturation scaled to [0, 255].
        pub fn saturation(&self) -> Saturation {
            let value = self.value();
            if value == 0 {
                return 0;
            }
            ((self.chroma() as f32 * 255.0) / value as f32).round() as Saturation
        }

        /// Hue in [0, 180).
        ///
        /// - Achromatic pixels (chroma 0) have hue 0.
        /// - The sector is chosen by the maximum channel, red first.
        pub fn hue(&self) -> Hue {
            let maximum_channel = self.value();
            let chroma = self.chroma() as i32;
            if chroma == 0 {
                return 0;
            }

            let (red, green, blue) = (self.red as i32, self.green as i32, self.blue as i32);
            let (base_difference, sector_offset) = if maximum_channel == self.red {
                (green - blue, 0)
            } else if maximum_channel == self.green {
                (blue - red, 2 * chroma)
            } else {
                (red - green, 4 * chroma)
            };

            // 60 degrees per sector, halved to fit a byte.
            let mut hue = ((base_difference + sector_offset) as f32 * 30.0 / chroma as f32).round() as i32;
            if hue < 0 {
                hue += HUE_RANGE as i32;
            }
            if hue >= HUE_RANGE as i32 {
                hue -= HUE_RANGE as i32;
            }
            hue as Hue
        }

        pub fn hsv(&self) -> Hsv {
            Hsv {
                hue: self.hue(),
                saturation: self.saturation(),
                value: self.value(),
            }
        }
    }

    impl From<&image::Rgb<u8>> for Pixel {
        fn from(rgb: &image::Rgb<u8>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn primaries_land_on_reference_hues() {
        assert_eq!(Pixel::new(255, 0, 0).hue(), 0);
        assert_eq!(Pixel::new(0, 255, 0).hue(), 60);
        assert_eq!(Pixel::new(0, 0, 255).hue(), 120);
        assert_eq!(Pixel::new(255, 255, 0).hue(), 30);
    }

    #[test]
    fn reddish_magenta_wraps_below_180() {
        // Red dominant with more blue than green: negative sector, wraps to the top.
        let hue = Pixel::new(255, 0, 40).hue();
        assert!(hue > 170 && hue < 180, "hue = {hue}");
    }

    #[test]
    fn grays_have_no_hue_or_saturation() {
        let gray = Pixel::new(128, 128, 128).hsv();
        assert_eq!(gray, Hsv { hue: 0, saturation: 0, value: 128 });
        assert_eq!(Pixel::new(0, 0, 0).saturation(), 0);
    }

    #[test]
    fn saturation_is_chroma_over_value() {
        assert_eq!(Pixel::new(255, 0, 0).saturation(), 255);
        assert_eq!(Pixel::new(200, 100, 100).saturation(), 128);
    }
}
