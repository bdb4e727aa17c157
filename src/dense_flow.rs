use ndarray as nd;
use num_traits::clamp;

use crate::error::{InitError, StrategyFault};
use crate::frame::Frame;
use crate::my_types::*;
use crate::optical_flow::{LkParams, OpticalFlow};
use crate::strategy::{PointFlowTracker, PointUpdate, Tracked};

/// Per-pixel displacement between two frames, shape `(height, width, 2)`
/// holding `(dx, dy)` the way opencv lays out a CV_32FC2 flow image.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub flow: nd::Array3<f32>,
}

impl FlowField {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            flow: nd::Array3::zeros((height, width, 2)),
        }
    }

    pub fn uniform(width: usize, height: usize, dx: f32, dy: f32) -> Self {
        let mut field = Self::zeros(width, height);
        field.flow.slice_mut(nd::s![.., .., 0]).fill(dx);
        field.flow.slice_mut(nd::s![.., .., 1]).fill(dy);
        field
    }

    pub fn width(&self) -> usize {
        self.flow.dim().1
    }

    pub fn height(&self) -> usize {
        self.flow.dim().0
    }

    pub fn set(&mut self, x: usize, y: usize, dx: f32, dy: f32) {
        self.flow[(y, x, 0)] = dx;
        self.flow[(y, x, 1)] = dy;
    }

    pub fn get(&self, x: usize, y: usize) -> Vector2d {
        Vector2d::new(self.flow[(y, x, 0)] as f64, self.flow[(y, x, 1)] as f64)
    }

    /// Displacement under integer coordinates, clamped into the field.
    /// `None` only for an empty field.
    pub fn sample_clamped(&self, x: f64, y: f64) -> Option<Vector2d> {
        if self.width() == 0 || self.height() == 0 {
            return None;
        }
        let x = clamp(x, 0., (self.width() - 1) as f64) as usize;
        let y = clamp(y, 0., (self.height() - 1) as f64) as usize;
        Some(self.get(x, y))
    }
}

/// Dense flow estimated block-wise: one Lucas-Kanade solve at the center of
/// every `cell` x `cell` block, copied to all pixels of the block. Blocks
/// without enough texture get zero flow.
pub struct DenseFlow {
    flow: OpticalFlow,
    cell: usize,
}

impl DenseFlow {
    pub fn new(params: LkParams, cell: usize) -> Self {
        Self {
            flow: OpticalFlow::new(params),
            cell: cell.max(1),
        }
    }

    pub fn compute(&mut self, prev: &Frame, frame: &Frame) -> Result<FlowField, StrategyFault> {
        if prev.size() != frame.size() {
            return Err(StrategyFault::FrameSize {
                want_w: prev.width,
                want_h: prev.height,
                got_w: frame.width,
                got_h: frame.height,
            });
        }
        let pyramid_frame0 = self.flow.pyramid_frame(prev.to_gray())?;
        let pyramid_frame1 = self.flow.pyramid_frame(frame.to_gray())?;

        let (width, height) = frame.size();
        let mut field = FlowField::zeros(width, height);
        for y0 in (0..height).step_by(self.cell) {
            for x0 in (0..width).step_by(self.cell) {
                let x1 = usize::min(x0 + self.cell, width);
                let y1 = usize::min(y0 + self.cell, height);
                let center = Vector2d::new((x0 + x1 - 1) as f64 / 2., (y0 + y1 - 1) as f64 / 2.);
                let Some(moved) =
                    self.flow
                        .track_point(&pyramid_frame0, &pyramid_frame1, center, None)
                else {
                    continue;
                };
                let d = moved - center;
                field
                    .flow
                    .slice_mut(nd::s![y0..y1, x0..x1, 0])
                    .fill(d.x as f32);
                field
                    .flow
                    .slice_mut(nd::s![y0..y1, x0..x1, 1])
                    .fill(d.y as f32);
            }
        }
        Ok(field)
    }
}

impl Default for DenseFlow {
    fn default() -> Self {
        Self::new(LkParams::default(), 8)
    }
}

impl PointFlowTracker for DenseFlow {
    fn init(&mut self, first: &Frame, point: Vector2d) -> Result<(), InitError> {
        if first.width == 0 || first.height == 0 {
            return Err(InitError::InvalidLocus(format!(
                "cannot track ({}, {}) on an empty frame",
                point.x, point.y
            )));
        }
        // the frame must carry every pyramid level the solver walks
        self.flow
            .pyramid_frame(first.to_gray())
            .map_err(|err| InitError::Backend(err.to_string()))?;
        Ok(())
    }

    fn update(
        &mut self,
        prev: &Frame,
        frame: &Frame,
        _prev_point: Vector2d,
    ) -> Result<Tracked<PointUpdate>, StrategyFault> {
        Ok(Tracked::Found(PointUpdate::Displacement(
            self.compute(prev, frame)?,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::texture;

    #[test]
    fn test_sample_clamped() {
        let mut field = FlowField::zeros(3, 2);
        field.set(2, 1, -1., 4.);
        assert_eq!(field.sample_clamped(9., 9.), Some(Vector2d::new(-1., 4.)));
        assert_eq!(field.sample_clamped(-3., 0.), Some(Vector2d::zeros()));
        assert_eq!(FlowField::zeros(0, 0).sample_clamped(0., 0.), None);
    }

    #[test]
    fn test_uniform_field() {
        let field = FlowField::uniform(5, 4, 1.5, -2.);
        assert_eq!((field.width(), field.height()), (5, 4));
        assert_eq!(field.get(4, 3), Vector2d::new(1.5, -2.));
    }

    #[test]
    fn test_dense_flow_of_translation() {
        let frame0 = Frame::from_gray(&texture(96, 96, 0., 0.));
        let frame1 = Frame::from_gray(&texture(96, 96, 2., 1.));
        let mut dense = DenseFlow::new(LkParams::default(), 16);
        let field = dense.compute(&frame0, &frame1).unwrap();
        assert_eq!((field.width(), field.height()), (96, 96));
        // interior blocks see the whole translation
        let d = field.get(48, 48);
        assert!((d - Vector2d::new(2., 1.)).norm() < 0.3, "flow {d}");
    }

    #[test]
    fn test_init_rejects_frame_too_small_for_pyramid() {
        let mut dense = DenseFlow::default();
        let tiny = Frame::filled(3, 3, [50, 50, 50]);
        assert!(matches!(
            dense.init(&tiny, Vector2d::new(1., 1.)),
            Err(InitError::Backend(_))
        ));
        let frame = Frame::filled(16, 16, [50, 50, 50]);
        assert!(dense.init(&frame, Vector2d::new(1., 1.)).is_ok());
    }

    #[test]
    fn test_frame_size_mismatch_is_a_fault() {
        let mut dense = DenseFlow::default();
        let a = Frame::filled(16, 16, [0, 0, 0]);
        let b = Frame::filled(8, 16, [0, 0, 0]);
        assert!(matches!(
            dense.compute(&a, &b),
            Err(StrategyFault::FrameSize { .. })
        ));
    }
}
