use image::{Rgb, RgbImage};
use std::sync::Arc;

/// A decoded source image shared by local extractors.
#[derive(Clone)]
pub struct ImageFrame {
    rgb: Arc<RgbImage>,
}

impl ImageFrame {
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::from_rgb(image.to_rgb8()))
    }

    pub fn from_rgb(rgb: RgbImage) -> Self {
        Self { rgb: Arc::new(rgb) }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        let (w, h) = self.dimensions();
        w == 0 || h == 0
    }

    /// Pixels on a regular grid, row-major. A step of 0 is treated as 1.
    pub fn sampled_pixels(&self, step: u32) -> impl Iterator<Item = &Rgb<u8>> + '_ {
        let step = step.max(1) as usize;
        let (w, h) = self.dimensions();
        (0..h)
            .step_by(step)
            .flat_map(move |y| (0..w).step_by(step).map(move |x| (x, y)))
            .map(move |(x, y)| self.rgb.get_pixel(x, y))
    }
}

#[cfg(test)]
pub(crate) fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image.clone())
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .expect("png encoding");
    bytes
}
