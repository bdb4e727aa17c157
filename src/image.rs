use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create a black image of the given size
    pub fn new(width: usize, height: usize) -> Image {
        Image {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline(always)]
    pub fn value_i32(&self, x: i32, y: i32) -> u8 {
        self.data[y as usize * self.width + x as usize]
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Copy `patch` with its top-left corner at (x, y), clipping at the borders.
    pub fn set_sub_image_i32(&mut self, x: i32, y: i32, patch: &Image) {
        for py in 0..patch.height as i32 {
            for px in 0..patch.width as i32 {
                let (tx, ty) = (x + px, y + py);
                if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
                    continue;
                }
                self.data[ty as usize * self.width + tx as usize] =
                    patch.value(px as usize, py as usize);
            }
        }
    }
}

/// Bilinear interpolation. The caller keeps `p` inside the image, the
/// right and bottom neighbours are clamped to the last row and column.
pub fn bilinear(image: &Image, p: Vector2d) -> f64 {
    let x0 = p.x.floor();
    let y0 = p.y.floor();
    let fx = p.x - x0;
    let fy = p.y - y0;
    let x0 = x0 as i32;
    let y0 = y0 as i32;
    let x1 = i32::min(x0 + 1, image.width as i32 - 1);
    let y1 = i32::min(y0 + 1, image.height as i32 - 1);

    let v00 = image.value_i32(x0, y0) as f64;
    let v10 = image.value_i32(x1, y0) as f64;
    let v01 = image.value_i32(x0, y1) as f64;
    let v11 = image.value_i32(x1, y1) as f64;

    (1. - fy) * ((1. - fx) * v00 + fx * v10) + fy * ((1. - fx) * v01 + fx * v11)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear() {
        let image = Image {
            data: vec![0, 10, 20, 30],
            width: 2,
            height: 2,
        };
        assert_eq!(bilinear(&image, Vector2d::new(0., 0.)), 0.);
        assert_eq!(bilinear(&image, Vector2d::new(1., 1.)), 30.);
        assert!((bilinear(&image, Vector2d::new(0.5, 0.5)) - 15.).abs() < 1e-9);
        assert!((bilinear(&image, Vector2d::new(0.5, 0.)) - 5.).abs() < 1e-9);
    }

    #[test]
    fn test_set_sub_image_clips() {
        let mut image = Image::new(4, 4);
        let patch = Image {
            data: vec![9; 4],
            width: 2,
            height: 2,
        };
        image.set_sub_image_i32(3, -1, &patch);
        assert_eq!(image.value(3, 0), 9);
        assert_eq!(image.data.iter().filter(|v| **v == 9).count(), 1);
    }
}
