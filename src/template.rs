use crate::error::{InitError, StrategyFault};
use crate::frame::Frame;
use crate::image::Image;
use crate::locus::BoundingBox;
use crate::strategy::{BoxTracker, Tracked};

/// Box tracker matching the first frame's box contents by sum of squared
/// differences inside a window around the last known position.
#[derive(Debug)]
pub struct TemplateTracker {
    /// search radius in pixels around the previous top-left corner
    search: i32,
    /// root mean square intensity error above which the target counts as lost
    max_rmse: f64,
    template: Image,
    frame_size: (usize, usize),
    last: Option<(i32, i32)>,
}

impl TemplateTracker {
    pub fn new(search: i32, max_rmse: f64) -> Self {
        Self {
            search,
            max_rmse,
            template: Image::empty(),
            frame_size: (0, 0),
            last: None,
        }
    }

    /// Mean squared error of the template placed at (x, y), the caller keeps it inside the image
    fn mse(&self, image: &Image, x: i32, y: i32) -> f64 {
        let mut sum = 0u64;
        for ty in 0..self.template.height {
            let row = (y as usize + ty) * image.width + x as usize;
            let image_row = &image.data[row..row + self.template.width];
            let template_row =
                &self.template.data[ty * self.template.width..(ty + 1) * self.template.width];
            for (a, b) in image_row.iter().zip(template_row) {
                let d = *a as i64 - *b as i64;
                sum += (d * d) as u64;
            }
        }
        sum as f64 / self.template.data.len() as f64
    }
}

impl Default for TemplateTracker {
    fn default() -> Self {
        Self::new(16, 40.)
    }
}

impl BoxTracker for TemplateTracker {
    fn init(&mut self, first: &Frame, bbox: BoundingBox) -> Result<(), InitError> {
        let x = bbox.x.round() as i64;
        let y = bbox.y.round() as i64;
        let w = bbox.width.round() as i64;
        let h = bbox.height.round() as i64;
        if w < 1 || h < 1 {
            return Err(InitError::InvalidLocus(format!("box {bbox} is empty")));
        }
        if x < 0 || y < 0 || x + w > first.width as i64 || y + h > first.height as i64 {
            return Err(InitError::InvalidLocus(format!(
                "box {bbox} does not fit the {}x{} frame",
                first.width, first.height
            )));
        }

        let gray = first.to_gray();
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        let mut template = Image::new(w, h);
        for ty in 0..h {
            for tx in 0..w {
                template.set_value(tx, ty, gray.value(x + tx, y + ty));
            }
        }
        self.template = template;
        self.frame_size = first.size();
        self.last = Some((x as i32, y as i32));
        Ok(())
    }

    fn update(&mut self, frame: &Frame) -> Result<Tracked<BoundingBox>, StrategyFault> {
        let Some((last_x, last_y)) = self.last else {
            return Err(StrategyFault::NotInitialized);
        };
        if frame.size() != self.frame_size {
            return Err(StrategyFault::FrameSize {
                want_w: self.frame_size.0,
                want_h: self.frame_size.1,
                got_w: frame.width,
                got_h: frame.height,
            });
        }

        let gray = frame.to_gray();
        let max_x = (gray.width - self.template.width) as i32;
        let max_y = (gray.height - self.template.height) as i32;
        let mut best: Option<(f64, i32, i32)> = None;
        for y in (last_y - self.search).max(0)..=(last_y + self.search).min(max_y) {
            for x in (last_x - self.search).max(0)..=(last_x + self.search).min(max_x) {
                let mse = self.mse(&gray, x, y);
                // on ties prefer the candidate closest to the last position
                let better = match best {
                    None => true,
                    Some((b, bx, by)) => {
                        mse < b
                            || (mse == b
                                && (x - last_x).abs() + (y - last_y).abs()
                                    < (bx - last_x).abs() + (by - last_y).abs())
                    }
                };
                if better {
                    best = Some((mse, x, y));
                }
            }
        }

        match best {
            Some((mse, x, y)) if mse.sqrt() <= self.max_rmse => {
                self.last = Some((x, y));
                Ok(Tracked::Found(BoundingBox {
                    x: x as f64,
                    y: y as f64,
                    width: self.template.width as f64,
                    height: self.template.height as f64,
                }))
            }
            _ => Ok(Tracked::Lost),
        }
    }
}
