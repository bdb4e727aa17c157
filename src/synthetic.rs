//! Generated scenes with a known target path, for demos and tests.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::f64::consts::PI;

use crate::error::IoFault;
use crate::frame::Frame;
use crate::image::Image;
use crate::my_types::*;
use crate::video::FrameSource;

/// Smooth periodic texture translated by (dx, dy), strong gradients in both axes.
pub fn texture(width: usize, height: usize, dx: f64, dy: f64) -> Image {
    let mut image = Image::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let u = x as f64 - dx;
            let v = y as f64 - dy;
            let value = 128. + 60. * (2. * PI * u / 23.).sin() + 50. * (2. * PI * v / 17.).cos();
            image.set_value(x, y, value.round() as u8);
        }
    }
    image
}

/// Random noise background with a checkered square target pasted on top.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    background: Image,
}

impl SyntheticScene {
    pub fn new(width: usize, height: usize, seed: u64) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut background = Image::new(width, height);
        for v in background.data.iter_mut() {
            // keep the noise away from the target's two intensities
            *v = rng.gen_range(70..=180);
        }
        Self { background }
    }

    pub fn width(&self) -> usize {
        self.background.width
    }

    pub fn height(&self) -> usize {
        self.background.height
    }

    /// Render the target with its top-left corner at (x, y)
    pub fn render(&self, x: i32, y: i32, size: usize) -> Frame {
        let mut image = self.background.clone();
        let mut target = Image::new(size, size);
        for ty in 0..size {
            for tx in 0..size {
                let dark = (tx / 4 + ty / 4) % 2 == 0;
                target.set_value(tx, ty, if dark { 20 } else { 235 });
            }
        }
        image.set_sub_image_i32(x, y, &target);
        Frame::from_gray(&image)
    }
}

/// Frame source moving the target along a straight line with a fixed step per frame.
#[derive(Debug)]
pub struct SyntheticSource {
    scene: SyntheticScene,
    start: Vector2d,
    step: Vector2d,
    size: usize,
    frames: u64,
    index: u64,
}

impl SyntheticSource {
    pub fn new(scene: SyntheticScene, start: Vector2d, step: Vector2d, size: usize, frames: u64) -> Self {
        Self {
            scene,
            start,
            step,
            size,
            frames,
            index: 0,
        }
    }

    /// Top-left corner of the target in frame `index`
    pub fn target_at(&self, index: u64) -> Vector2d {
        self.start + self.step * index as f64
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, IoFault> {
        if self.index >= self.frames {
            return Ok(None);
        }
        let p = self.target_at(self.index);
        self.index += 1;
        Ok(Some(self.scene.render(
            p.x.round() as i32,
            p.y.round() as i32,
            self.size,
        )))
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.saturating_sub(self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_is_seeded() {
        let a = SyntheticScene::new(32, 24, 3).render(4, 4, 8);
        let b = SyntheticScene::new(32, 24, 3).render(4, 4, 8);
        let c = SyntheticScene::new(32, 24, 4).render(4, 4, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.pixel(4, 4), [20, 20, 20]);
        assert_eq!(a.pixel(8, 4), [235, 235, 235]);
    }

    #[test]
    fn test_source_is_bounded() {
        let scene = SyntheticScene::new(64, 48, 1);
        let mut source =
            SyntheticSource::new(scene, Vector2d::new(5., 5.), Vector2d::new(2., 1.), 8, 3);
        assert_eq!(source.target_at(2), Vector2d::new(9., 7.));
        assert_eq!(source.frame_count(), Some(3));
        let mut count = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.size(), (64, 48));
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(source.frame_count(), Some(0));
        assert!(source.next_frame().unwrap().is_none());
    }
}
