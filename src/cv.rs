//! Strategies backed by the opencv tracker zoo and its optical flow.

use ndarray as nd;
use opencv as cv2;
use opencv::core::{Mat, Point2f, Rect, Size, TermCriteria, Vec2f, Vector};
use opencv::prelude::*;
use opencv::video::TrackerTrait;
use std::path::Path;

use crate::dense_flow::FlowField;
use crate::error::{InitError, StrategyFault};
use crate::frame::Frame;
use crate::image::Image;
use crate::locus::BoundingBox;
use crate::my_types::*;
use crate::strategy::{BoxTracker, Method, PointFlowTracker, PointUpdate, Strategy, Tracked};
use crate::video::frame_to_mat;

const DASIAMRPN_MODEL: &str = "bin/dasiamrpn_model.onnx";
const DASIAMRPN_KERNEL_CLS1: &str = "bin/dasiamrpn_kernel_cls1.onnx";
const DASIAMRPN_KERNEL_R1: &str = "bin/dasiamrpn_kernel_r1.onnx";
const NANO_BACKBONE: &str = "bin/nanotrack_backbone_sim.onnx";
const NANO_NECKHEAD: &str = "bin/nanotrack_head_sim.onnx";

pub fn build(method: Method) -> Result<Strategy, InitError> {
    Ok(match method {
        Method::Csrt => {
            let params = cv2::tracking::TrackerCSRT_Params::default()?;
            boxed(cv2::tracking::TrackerCSRT::create(&params)?)
        }
        Method::Kcf => {
            let params = cv2::tracking::TrackerKCF_Params::default()?;
            boxed(cv2::tracking::TrackerKCF::create(params)?)
        }
        Method::Mil => {
            let params = cv2::video::TrackerMIL_Params::default()?;
            boxed(cv2::video::TrackerMIL::create(params)?)
        }
        Method::DaSiamRpn => {
            let mut params = cv2::video::TrackerDaSiamRPN_Params::default()?;
            params.set_model(&asset(DASIAMRPN_MODEL)?);
            params.set_kernel_cls1(&asset(DASIAMRPN_KERNEL_CLS1)?);
            params.set_kernel_r1(&asset(DASIAMRPN_KERNEL_R1)?);
            boxed(cv2::video::TrackerDaSiamRPN::create(&params)?)
        }
        Method::Nano => {
            let mut params = cv2::video::TrackerNano_Params::default()?;
            params.set_backbone(&asset(NANO_BACKBONE)?);
            params.set_neckhead(&asset(NANO_NECKHEAD)?);
            boxed(cv2::video::TrackerNano::create(&params)?)
        }
        Method::Farneback => Strategy::Point(Box::new(Farneback)),
        Method::CvLucasKanade => Strategy::Point(Box::new(CvLucasKanade)),
        Method::Template | Method::LucasKanade | Method::DenseFlow => {
            return Err(InitError::Backend(format!("{method} is not an opencv strategy")))
        }
    })
}

fn asset(path: &str) -> Result<String, InitError> {
    if !Path::new(path).is_file() {
        return Err(InitError::MissingAsset(path.to_string()));
    }
    Ok(path.to_string())
}

fn boxed<P: TrackerTrait + 'static>(tracker: P) -> Strategy {
    Strategy::Box(Box::new(CvBoxTracker {
        tracker,
        initialized: false,
    }))
}

fn gray_to_mat(image: &Image) -> Result<Mat, cv2::Error> {
    Mat::from_slice(&image.data)?
        .reshape(1, image.height as i32)?
        .try_clone()
}

/// Any `cv::Tracker` behind the box tracker interface
pub struct CvBoxTracker<P> {
    tracker: P,
    initialized: bool,
}

impl<P: TrackerTrait> BoxTracker for CvBoxTracker<P> {
    fn init(&mut self, first: &Frame, bbox: BoundingBox) -> Result<(), InitError> {
        let mat = frame_to_mat(first).map_err(|err| InitError::Backend(err.to_string()))?;
        let rect = Rect::new(
            bbox.x as i32,
            bbox.y as i32,
            bbox.width as i32,
            bbox.height as i32,
        );
        self.tracker.init(&mat, rect)?;
        self.initialized = true;
        Ok(())
    }

    fn update(&mut self, frame: &Frame) -> Result<Tracked<BoundingBox>, StrategyFault> {
        if !self.initialized {
            return Err(StrategyFault::NotInitialized);
        }
        let mat = frame_to_mat(frame).map_err(|err| StrategyFault::Backend(err.to_string()))?;
        let mut rect = Rect::default();
        if !self.tracker.update(&mat, &mut rect)? {
            return Ok(Tracked::Lost);
        }
        Ok(Tracked::Found(BoundingBox {
            x: rect.x as f64,
            y: rect.y as f64,
            width: rect.width as f64,
            height: rect.height as f64,
        }))
    }
}

/// Gunnar Farneback dense flow, pyramid scale 0.5, 3 levels, window 15
pub struct Farneback;

impl PointFlowTracker for Farneback {
    fn init(&mut self, _first: &Frame, _point: Vector2d) -> Result<(), InitError> {
        Ok(())
    }

    fn update(
        &mut self,
        prev: &Frame,
        frame: &Frame,
        _prev_point: Vector2d,
    ) -> Result<Tracked<PointUpdate>, StrategyFault> {
        let prev_gray = gray_to_mat(&prev.to_gray())?;
        let gray = gray_to_mat(&frame.to_gray())?;
        let mut flow = Mat::default();
        cv2::video::calc_optical_flow_farneback(
            &prev_gray, &gray, &mut flow, 0.5, 3, 15, 4, 5, 1.2, 0,
        )?;

        let (w, h) = frame.size();
        let values = flow.data_typed::<Vec2f>()?;
        if values.len() != w * h {
            return Err(StrategyFault::Backend(format!(
                "flow of {} vectors for a {w}x{h} frame",
                values.len()
            )));
        }
        let flat: Vec<f32> = values.iter().flat_map(|v| [v[0], v[1]]).collect();
        let flow = nd::Array3::from_shape_vec((h, w, 2), flat)
            .map_err(|err| StrategyFault::Backend(err.to_string()))?;
        Ok(Tracked::Found(PointUpdate::Displacement(FlowField { flow })))
    }
}

/// opencv pyramidal Lucas-Kanade, window 15, two levels
pub struct CvLucasKanade;

impl PointFlowTracker for CvLucasKanade {
    fn init(&mut self, _first: &Frame, _point: Vector2d) -> Result<(), InitError> {
        Ok(())
    }

    fn update(
        &mut self,
        prev: &Frame,
        frame: &Frame,
        prev_point: Vector2d,
    ) -> Result<Tracked<PointUpdate>, StrategyFault> {
        let prev_gray = gray_to_mat(&prev.to_gray())?;
        let gray = gray_to_mat(&frame.to_gray())?;
        let prev_pts: Vector<Point2f> =
            Vector::from_iter([Point2f::new(prev_point.x as f32, prev_point.y as f32)]);
        let mut next_pts: Vector<Point2f> = Vector::new();
        let mut status: Vector<u8> = Vector::new();
        let mut err: Vector<f32> = Vector::new();
        let criteria = TermCriteria::new(
            cv2::core::TermCriteria_COUNT + cv2::core::TermCriteria_EPS,
            10,
            0.03,
        )?;
        cv2::video::calc_optical_flow_pyr_lk(
            &prev_gray,
            &gray,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            Size::new(15, 15),
            2,
            criteria,
            0,
            1e-4,
        )?;
        if status.get(0)? == 0 {
            return Ok(Tracked::Lost);
        }
        let p = next_pts.get(0)?;
        Ok(Tracked::Found(PointUpdate::Absolute(Vector2d::new(
            p.x as f64, p.y as f64,
        ))))
    }
}
