use anyhow::{bail, Result};

use crate::image::Image;

/// Successively halved copies of a grayscale image, level 0 is half size.
#[derive(Debug)]
pub struct Pyramid {
    pub levels: Vec<Image>,
    pub parent_size: [usize; 2],
}

impl Pyramid {
    pub fn empty() -> Self {
        Self {
            levels: vec![],
            parent_size: [0; 2],
        }
    }

    /// Rebuild `level_count` levels from `image`, reusing the level buffers.
    pub fn compute(&mut self, image: &Image, level_count: usize) -> Result<()> {
        self.levels.resize_with(level_count, Image::empty);
        let mut parent = image;
        for level in self.levels.iter_mut() {
            downscale(parent, level)?;
            parent = level;
        }
        self.parent_size = [image.width, image.height];
        Ok(())
    }
}

/// 3x3 binomial blur sampled at every other pixel. An odd last row or
/// column is dropped, borders repeat the edge pixel.
fn downscale(parent: &Image, child: &mut Image) -> Result<()> {
    let (w, h) = (parent.width as i32, parent.height as i32);
    if w < 2 || h < 2 {
        bail!("cannot downscale image with shape {w} x {h}");
    }

    child.data.clear();
    child.width = (w / 2) as usize;
    child.height = (h / 2) as usize;

    let v = |x: i32, y: i32| -> u16 { parent.value_i32(x.clamp(0, w - 1), y.clamp(0, h - 1)) as u16 };

    for y in (0..h - 1).step_by(2) {
        for x in (0..w - 1).step_by(2) {
            let center = v(x, y) / 4;
            let cross = (v(x + 1, y) + v(x - 1, y) + v(x, y + 1) + v(x, y - 1)) / 8;
            let corners =
                (v(x + 1, y + 1) + v(x - 1, y - 1) + v(x - 1, y + 1) + v(x + 1, y - 1)) / 16;
            child.data.push((center + cross + corners) as u8);
        }
    }
    Ok(())
}
