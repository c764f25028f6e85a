//! Producer-side image buffer with an `embedded-graphics` draw surface.
//!
//! The encoder consumes a flat byte buffer; this wraps one in a type that
//! drawing code can target. Heap-allocated and runtime-sized, since panel
//! chains are a runtime configuration on this platform.

use std::convert::Infallible;

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use rand::Rng;

use crate::config::SceneConfig;
use crate::Color;

/// Byte image in the layout the encoder expects: `stride` bytes per pixel
/// (3 for RGB, 4 for RGBA), rows in raster order, ports stacked.
pub struct FrameBuffer {
    data: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
}

impl FrameBuffer {
    /// Allocate a black frame buffer sized for the scene.
    pub fn new(scene: &SceneConfig) -> Self {
        let width = scene.width as usize;
        let height = scene.height as usize;
        let stride = scene.stride as usize;
        Self {
            data: vec![0u8; width * height * stride],
            width,
            height,
            stride,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Clear the frame buffer to black.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Set a pixel in the frame buffer.
    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        let offset = (y * self.width + x) * self.stride;
        self.data[offset] = color.r();
        self.data[offset + 1] = color.g();
        self.data[offset + 2] = color.b();
    }

    /// Get a pixel from the frame buffer.
    pub fn get_pixel(&self, x: usize, y: usize) -> Color {
        let offset = (y * self.width + x) * self.stride;
        Color::new(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        )
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view for the encoder, which remaps and dithers in place.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Dimensions for FrameBuffer {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.width as u32, self.height as u32))
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if p.x < 0 || p.x as usize >= self.width || p.y < 0 || p.y as usize >= self.height {
                continue;
            }
            self.set_pixel(p.x as usize, p.y as usize, c);
        }

        Ok(())
    }
}

/// Fill a randomly sized, randomly placed, randomly colored rectangle.
/// Sizes are clamped to the image, so this works down to a single
/// 16-pixel panel.
pub fn draw_random_square(image: &mut [u8], width: usize, height: usize, stride: usize) {
    let mut rng = rand::rng();
    let w = rng.random_range(4..20usize).min(width);
    let h = rng.random_range(4..20usize).min(height);
    let x0 = rng.random_range(0..=width - w);
    let y0 = rng.random_range(0..=height - h);
    let color: [u8; 3] = [rng.random(), rng.random(), rng.random()];

    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let o = (y * width + x) * stride;
            image[o..o + 3].copy_from_slice(&color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::PrimitiveStyle;

    fn scene_rgb() -> SceneConfig {
        let mut scene = SceneConfig::default();
        scene.stride = 3;
        scene
    }

    #[test]
    fn pixels_round_trip() {
        let mut fb = FrameBuffer::new(&scene_rgb());
        fb.set_pixel(3, 5, Color::new(10, 20, 30));
        assert_eq!(fb.get_pixel(3, 5), Color::new(10, 20, 30));
        let offset = (5 * 64 + 3) * 3;
        assert_eq!(&fb.as_bytes()[offset..offset + 3], &[10, 20, 30]);
    }

    #[test]
    fn rgba_stride_leaves_alpha_alone() {
        let mut scene = SceneConfig::default();
        scene.stride = 4;
        let mut fb = FrameBuffer::new(&scene);
        fb.set_pixel(0, 0, Color::new(1, 2, 3));
        assert_eq!(&fb.as_bytes()[..4], &[1, 2, 3, 0]);
    }

    #[test]
    fn draw_target_clips_out_of_bounds() {
        let mut fb = FrameBuffer::new(&scene_rgb());
        Rectangle::new(Point::new(60, 60), Size::new(10, 10))
            .into_styled(PrimitiveStyle::with_fill(Color::WHITE))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.get_pixel(63, 63), Color::WHITE);
        assert_eq!(fb.get_pixel(59, 59), Color::BLACK);
    }

    #[test]
    fn random_squares_fit_a_single_small_panel() {
        // 16x16 is smaller than the largest unclamped square
        let mut image = vec![0u8; 16 * 16 * 3];
        for _ in 0..200 {
            draw_random_square(&mut image, 16, 16, 3);
        }
        assert!(image.iter().any(|&b| b != 0));
    }

    #[test]
    fn clear_resets_to_black() {
        let mut fb = FrameBuffer::new(&scene_rgb());
        fb.set_pixel(1, 1, Color::WHITE);
        fb.clear();
        assert!(fb.as_bytes().iter().all(|&b| b == 0));
    }
}
