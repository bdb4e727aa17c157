use nalgebra as na;

use crate::error::{InitError, StrategyFault};
use crate::frame::{Frame, PyramidFrame};
use crate::image::*;
use crate::my_types::*;
use crate::strategy::{PointFlowTracker, PointUpdate, Tracked};

type Range = [[i16; 2]; 2];

/// Pyramidal Lucas-Kanade parameters
#[derive(Clone, Copy, Debug)]
pub struct LkParams {
    /// side of the square integration window, odd
    pub win_size: usize,
    /// pyramid levels above the full resolution image
    pub levels: usize,
    pub iters: usize,
    /// stop iterating once the update is shorter than this, in pixels
    pub term: f64,
    /// minimum eigenvalue of the structure tensor
    pub min_eig: f64,
}

impl Default for LkParams {
    fn default() -> Self {
        Self {
            win_size: 15,
            levels: 2,
            iters: 10,
            term: 0.03,
            min_eig: 1e-4,
        }
    }
}

pub struct OpticalFlow {
    params: LkParams,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl OpticalFlow {
    pub fn new(params: LkParams) -> OpticalFlow {
        let n = params.win_size;
        OpticalFlow {
            params,
            ix: na::DMatrix::zeros(n, n),
            iy: na::DMatrix::zeros(n, n),
            it: na::DMatrix::zeros(n, n),
            grid: na::DMatrix::zeros(n, n),
        }
    }

    /// Build a pyramid deep enough for these parameters
    pub fn pyramid_frame(&self, image: Image) -> Result<PyramidFrame, StrategyFault> {
        PyramidFrame::new(image, self.params.levels)
            .map_err(|err| StrategyFault::Backend(err.to_string()))
    }

    /// Find `point0` of `pyramid_frame0` in `pyramid_frame1`. `None` when the
    /// window leaves the image, the window has no texture or the iteration
    /// does not converge.
    ///
    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    pub fn track_point(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
        point1_in: Option<Vector2d>,
    ) -> Option<Vector2d> {
        let levels = self.params.levels;
        let lk_term2 = self.params.term.powi(2);
        let r = (self.params.win_size - 1) / 2;

        // initial guess
        let mut g_init = point1_in
            .map(|p| p - point0)
            .unwrap_or(Vector2d::zeros())
            / u32::pow(2, levels as u32) as f64;
        let mut d = Vector2d::zeros();
        for level in (0..levels + 1).rev() {
            let level0 = pyramid_frame0.get_image_at_level(level);
            let level1 = pyramid_frame1.get_image_at_level(level);
            let u = point0 / u32::pow(2, level as u32) as f64;
            let range = integration_range(level0, u, r, 1)?;
            // compute the derivative
            scharr(level0, u, range, &mut self.ix, &mut self.iy, &mut self.grid);
            let gradient = spatial_gradient(&self.ix, &self.iy);
            if gradient.symmetric_eigenvalues().min() < self.params.min_eig {
                return None;
            }
            let mut converged = false;
            let mut nu = Vector2d::zeros();
            for _ in 0..self.params.iters {
                image_difference(range, r, &self.grid, &mut self.it, level1, u + g_init + nu)?;
                let eta = flow_vector(&gradient, &self.ix, &self.iy, &self.it)?;
                nu += eta;
                if eta.norm_squared() < lk_term2 {
                    converged = true;
                    break;
                }
            }

            d = nu;
            if !converged {
                return None;
            }
            if level > 0 {
                g_init = 2. * (g_init + d)
            }
        }

        Some(point0 + g_init + d)
    }
}

/// Sparse single point flow, the new point replaces the old one.
pub struct LucasKanade {
    flow: OpticalFlow,
    /// pyramid of the last frame handed to `update`, reused when it comes back as `prev`
    last: Option<PyramidFrame>,
}

impl LucasKanade {
    pub fn new(params: LkParams) -> Self {
        Self {
            flow: OpticalFlow::new(params),
            last: None,
        }
    }

    fn prev_pyramid(&mut self, prev: &Frame) -> Result<PyramidFrame, StrategyFault> {
        let gray = prev.to_gray();
        match self.last.take() {
            Some(cached) if cached.image == gray => Ok(cached),
            _ => self.flow.pyramid_frame(gray),
        }
    }
}

impl PointFlowTracker for LucasKanade {
    fn init(&mut self, first: &Frame, point: Vector2d) -> Result<(), InitError> {
        if point.x < 0.
            || point.y < 0.
            || point.x > (first.width as f64 - 1.)
            || point.y > (first.height as f64 - 1.)
        {
            return Err(InitError::InvalidLocus(format!(
                "point ({}, {}) is outside the {}x{} frame",
                point.x, point.y, first.width, first.height
            )));
        }
        self.last = Some(
            self.flow
                .pyramid_frame(first.to_gray())
                .map_err(|err| InitError::Backend(err.to_string()))?,
        );
        Ok(())
    }

    fn update(
        &mut self,
        prev: &Frame,
        frame: &Frame,
        prev_point: Vector2d,
    ) -> Result<Tracked<PointUpdate>, StrategyFault> {
        let pyramid_frame0 = self.prev_pyramid(prev)?;
        let pyramid_frame1 = self.flow.pyramid_frame(frame.to_gray())?;
        let tracked = self
            .flow
            .track_point(&pyramid_frame0, &pyramid_frame1, prev_point, None);
        self.last = Some(pyramid_frame1);
        Ok(match tracked {
            Some(point) => Tracked::Found(PointUpdate::Absolute(point)),
            None => Tracked::Lost,
        })
    }
}

fn flow_vector(gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Option<Vector2d> {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    gradient.try_inverse().map(|inv_g| inv_g * b)
}

fn image_difference(
    prev_range: Range,
    r: usize,
    i0: &Matrixd,
    it: &mut Matrixd,
    level: &Image,
    center: Vector2d,
) -> Option<()> {
    let range = integration_range(level, center, r, 0)?;
    if range != prev_range {
        return None;
    }
    fill_grid(level, range, center, it);
    *it *= -1.;
    *it += i0.view((1, 1), (it.nrows(), it.ncols()));
    Some(())
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    assert_eq!(ix.nrows(), iy.nrows());
    assert_eq!(ix.ncols(), iy.ncols());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(
    level: &Image,
    center: Vector2d,
    range: Range,
    out_x: &mut Matrixd,
    out_y: &mut Matrixd,
    grid: &mut Matrixd,
) {
    let grange = [
        [range[0][0] - 1, range[0][1] + 1],
        [range[1][0] - 1, range[1][1] + 1],
    ];
    fill_grid(level, grange, center, grid);

    *out_x = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    *out_y = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

fn fill_grid(level: &Image, range: Range, center: Vector2d, grid: &mut Matrixd) {
    *grid = na::DMatrix::zeros(
        (range[1][1] - range[1][0] + 1) as usize,
        (range[0][1] - range[0][0] + 1) as usize,
    );

    for (y_ind, y) in (range[1][0]..=range[1][1]).enumerate() {
        for (x_ind, x) in (range[0][0]..=range[0][1]).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}

/// Returns closed range of integer steps that can be taken without going outside
/// the image borders. Returns None if the center point is outside the level
/// boundaries.
fn integration_range(level: &Image, center: Vector2d, r: usize, padding: i16) -> Option<Range> {
    let r = r as i16;
    let mut range = [[0, 0], [0, 0]];
    for i in 0..2 {
        let s = if i == 0 { level.width } else { level.height };
        if center[i] < 0. || center[i] > (s as f64 - 1.) {
            return None;
        }
        let n = center[i] as i16;
        let fract = if center[i].fract() > 0. { 1 } else { 0 };
        range[i] = [
            i16::max(-r, -n + padding),
            i16::min(r, s as i16 - n - padding - 1 - fract),
        ];
        if range[i][0] > range[i][1] {
            return None;
        }
    }
    Some(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::texture;

    #[test]
    fn test_flow() {
        let flow_params = LkParams::default();
        let mut flow = OpticalFlow::new(flow_params);
        let (dx, dy) = (2., -1.);
        let pyramid_frame0 = flow.pyramid_frame(texture(96, 96, 0., 0.)).unwrap();
        let pyramid_frame1 = flow.pyramid_frame(texture(96, 96, dx, dy)).unwrap();

        let point0 = Vector2d::new(48., 48.);
        let point1 = flow
            .track_point(&pyramid_frame0, &pyramid_frame1, point0, None)
            .unwrap();
        let err = (point1 - point0) - Vector2d::new(dx, dy);
        assert!(err.norm() < 0.3, "optical flow err {}", err.norm());
    }

    #[test]
    fn test_flat_image_is_lost() {
        let mut flow = OpticalFlow::new(LkParams::default());
        let flat = || flow_frame(Image {
            data: vec![77; 64 * 64],
            width: 64,
            height: 64,
        });
        let (f0, f1) = (flat(), flat());
        assert!(flow
            .track_point(&f0, &f1, Vector2d::new(32., 32.), None)
            .is_none());
    }

    fn flow_frame(image: Image) -> PyramidFrame {
        PyramidFrame::new(image, LkParams::default().levels).unwrap()
    }

    #[test]
    fn test_lucas_kanade_strategy() {
        let frame0 = Frame::from_gray(&texture(96, 96, 0., 0.));
        let frame1 = Frame::from_gray(&texture(96, 96, 1., 1.));
        let mut lk = LucasKanade::new(LkParams::default());
        lk.init(&frame0, Vector2d::new(50., 40.)).unwrap();
        match lk.update(&frame0, &frame1, Vector2d::new(50., 40.)).unwrap() {
            Tracked::Found(PointUpdate::Absolute(p)) => {
                assert!((p - Vector2d::new(51., 41.)).norm() < 0.3)
            }
            _ => panic!("expected an absolute point"),
        }
        // near the border the window no longer fits at the coarse level
        assert!(matches!(
            lk.update(&frame1, &frame0, Vector2d::new(0.5, 0.5)).unwrap(),
            Tracked::Lost
        ));
    }

    #[test]
    fn test_init_rejects_point_outside_frame() {
        let frame = Frame::filled(10, 10, [0, 0, 0]);
        let mut lk = LucasKanade::new(LkParams::default());
        assert!(matches!(
            lk.init(&frame, Vector2d::new(10., 3.)),
            Err(InitError::InvalidLocus(_))
        ));
    }

    #[test]
    fn test_scharr() {
        let mut image = Image {
            data: vec![
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            ],
            width: 5,
            height: 5,
        };

        let mut out_x = na::dmatrix!();
        let mut out_y = na::dmatrix!();
        let mut grid = na::dmatrix!();

        let center = Vector2d::new(2.0, 2.0);
        let range = integration_range(&image, center, 1, 1).unwrap();
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::zeros(3, 3));
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));

        image.data = vec![
            0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1, 2, 3, 4,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        assert_eq!(out_x, na::DMatrix::repeat(3, 3, 1.));
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));

        image.data = vec![
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
            0, 0, 5, 0, 0,
        ];
        scharr(&image, center, range, &mut out_x, &mut out_y, &mut grid);
        let answer_x = na::dmatrix!(
            2.5, 0., -2.5;
            2.5, 0., -2.5;
            2.5, 0., -2.5;
        );
        assert_eq!(out_x, answer_x);
        assert_eq!(out_y, na::DMatrix::zeros(3, 3));
    }

    #[test]
    fn test_integration_range() {
        // Width and height are pixels. Coordinate (0, 0) means center of top-left
        // pixel. Thus (9, 9) is the center of the bottom-right pixel for 10x10
        // image.
        let image = Image {
            data: vec![],
            width: 10,
            height: 10,
        };
        assert_eq!(integration_range(&image, Vector2d::new(4.5, 4.5), 3, 0).unwrap(), [[-3, 3], [-3, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(1.5, 2.5), 3, 0).unwrap(), [[-1, 3], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(1.0, 2.0), 3, 0).unwrap(), [[-1, 3], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(0.9, 1.9), 3, 0).unwrap(), [[0, 3], [-1, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(0.9, 1.9), 3, 1).unwrap(), [[1, 3], [0, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(8.5, 2.0), 3, 0).unwrap(), [[-3, 0], [-2, 3]]);
        assert_eq!(integration_range(&image, Vector2d::new(9.5, 2.0), 3, 0), None);
    }
}
