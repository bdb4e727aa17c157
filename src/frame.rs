use anyhow::Result;

use crate::image::Image;
use crate::pyramid::Pyramid;

pub type Rgb = [u8; 3];

pub const GREEN: Rgb = [0, 255, 0];
pub const RED: Rgb = [255, 0, 0];

/// A decoded video frame, row-major interleaved RGB8.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Frame {
    /// Create a frame filled with one color
    pub fn filled(width: usize, height: usize, color: Rgb) -> Frame {
        let mut data = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            data.extend_from_slice(&color);
        }
        Frame {
            data,
            width,
            height,
        }
    }

    /// Expand a grayscale image to RGB
    pub fn from_gray(image: &Image) -> Frame {
        let mut data = Vec::with_capacity(image.data.len() * 3);
        for v in &image.data {
            data.extend_from_slice(&[*v, *v, *v]);
        }
        Frame {
            data,
            width: image.width,
            height: image.height,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline(always)]
    pub fn pixel(&self, x: usize, y: usize) -> Rgb {
        let i = 3 * (y * self.width + x);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Set a pixel, coordinates outside the frame are ignored
    #[inline(always)]
    pub fn put_pixel(&mut self, x: i32, y: i32, color: Rgb) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let i = 3 * (y as usize * self.width + x as usize);
        self.data[i..i + 3].copy_from_slice(&color);
    }

    /// ITU-R BT.601 luma, the same weights opencv uses for RGB2GRAY
    pub fn to_gray(&self) -> Image {
        let data = self
            .data
            .chunks_exact(3)
            .map(|p| {
                let y = 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64;
                y.round().min(255.) as u8
            })
            .collect();
        Image {
            data,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug)]
pub struct PyramidFrame {
    /// original image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    pub fn new(image: Image, levels: usize) -> Result<PyramidFrame> {
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, levels)?;
        Ok(PyramidFrame { image, pyramid })
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_roundtrip() {
        let image = Image {
            data: vec![0, 50, 128, 255],
            width: 2,
            height: 2,
        };
        assert_eq!(Frame::from_gray(&image).to_gray(), image);
    }

    #[test]
    fn test_put_pixel_out_of_bounds_is_ignored() {
        let mut frame = Frame::filled(3, 2, [0, 0, 0]);
        let before = frame.clone();
        frame.put_pixel(-1, 0, RED);
        frame.put_pixel(3, 1, RED);
        frame.put_pixel(0, 2, RED);
        assert_eq!(frame, before);
        frame.put_pixel(2, 1, RED);
        assert_eq!(frame.pixel(2, 1), RED);
    }
}
