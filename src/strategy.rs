use std::fmt;
use std::str::FromStr;

use crate::dense_flow::{DenseFlow, FlowField};
use crate::error::{InitError, StrategyFault};
use crate::frame::Frame;
use crate::locus::{BoundingBox, Locus, LocusKind};
use crate::my_types::*;
use crate::optical_flow::{LkParams, LucasKanade};
use crate::template::TemplateTracker;

/// Per-frame tracking result. Losing the target is an ordinary outcome,
/// faults of the underlying primitive travel as `Err(StrategyFault)` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Tracked<T> {
    Found(T),
    Lost,
}

/// What a point flow strategy found for the tracked point.
#[derive(Debug, Clone, PartialEq)]
pub enum PointUpdate {
    /// The new position replaces the old one.
    Absolute(Vector2d),
    /// A dense displacement field, sampled by the locus under its current position.
    Displacement(FlowField),
}

/// Trackers that follow an appearance model and report a new box per frame.
pub trait BoxTracker {
    fn init(&mut self, first: &Frame, bbox: BoundingBox) -> Result<(), InitError>;

    fn update(&mut self, frame: &Frame) -> Result<Tracked<BoundingBox>, StrategyFault>;
}

/// Optical flow trackers, working on consecutive frame pairs.
pub trait PointFlowTracker {
    fn init(&mut self, first: &Frame, point: Vector2d) -> Result<(), InitError>;

    /// `prev_point` is a snapshot of the locus, the tracker never mutates it.
    fn update(
        &mut self,
        prev: &Frame,
        frame: &Frame,
        prev_point: Vector2d,
    ) -> Result<Tracked<PointUpdate>, StrategyFault>;
}

/// A concrete tracking strategy, resolved once from a [`Method`].
pub enum Strategy {
    Box(Box<dyn BoxTracker>),
    Point(Box<dyn PointFlowTracker>),
}

impl Strategy {
    pub fn locus_kind(&self) -> LocusKind {
        match self {
            Strategy::Box(_) => LocusKind::Box,
            Strategy::Point(_) => LocusKind::Point,
        }
    }

    /// One-time setup on the first frame. The locus must match the strategy family.
    pub fn init(&mut self, first: &Frame, locus: &Locus) -> Result<(), InitError> {
        match (self, locus) {
            (Strategy::Box(tracker), Locus::Box(bbox)) => tracker.init(first, *bbox),
            (Strategy::Point(tracker), Locus::Point(point)) => tracker.init(first, *point),
            (strategy, _) => Err(InitError::InvalidLocus(format!(
                "a {} strategy cannot start from a {} locus",
                strategy.locus_kind().name(),
                locus.kind().name()
            ))),
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Strategy::{}", self.locus_kind().name())
    }
}

/// Tracking methods selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// SSD template matching, pure Rust box tracker
    Template,
    /// pyramidal Lucas-Kanade, pure Rust point flow
    LucasKanade,
    /// block-wise dense flow sampled under the point, pure Rust
    DenseFlow,
    #[cfg(feature = "opencv")]
    Csrt,
    #[cfg(feature = "opencv")]
    Kcf,
    #[cfg(feature = "opencv")]
    Mil,
    #[cfg(feature = "opencv")]
    DaSiamRpn,
    #[cfg(feature = "opencv")]
    Nano,
    #[cfg(feature = "opencv")]
    Farneback,
    #[cfg(feature = "opencv")]
    CvLucasKanade,
}

impl Method {
    pub const ALL: &'static [Method] = &[
        Method::Template,
        Method::LucasKanade,
        Method::DenseFlow,
        #[cfg(feature = "opencv")]
        Method::Csrt,
        #[cfg(feature = "opencv")]
        Method::Kcf,
        #[cfg(feature = "opencv")]
        Method::Mil,
        #[cfg(feature = "opencv")]
        Method::DaSiamRpn,
        #[cfg(feature = "opencv")]
        Method::Nano,
        #[cfg(feature = "opencv")]
        Method::Farneback,
        #[cfg(feature = "opencv")]
        Method::CvLucasKanade,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Method::Template => "template",
            Method::LucasKanade => "lk",
            Method::DenseFlow => "dense-flow",
            #[cfg(feature = "opencv")]
            Method::Csrt => "csrt",
            #[cfg(feature = "opencv")]
            Method::Kcf => "kcf",
            #[cfg(feature = "opencv")]
            Method::Mil => "mil",
            #[cfg(feature = "opencv")]
            Method::DaSiamRpn => "dasiamrpn",
            #[cfg(feature = "opencv")]
            Method::Nano => "nano",
            #[cfg(feature = "opencv")]
            Method::Farneback => "farneback",
            #[cfg(feature = "opencv")]
            Method::CvLucasKanade => "cv-lk",
        }
    }

    pub fn locus_kind(self) -> LocusKind {
        match self {
            Method::Template => LocusKind::Box,
            Method::LucasKanade | Method::DenseFlow => LocusKind::Point,
            #[cfg(feature = "opencv")]
            Method::Csrt | Method::Kcf | Method::Mil | Method::DaSiamRpn | Method::Nano => {
                LocusKind::Box
            }
            #[cfg(feature = "opencv")]
            Method::Farneback | Method::CvLucasKanade => LocusKind::Point,
        }
    }

    /// Construct the strategy. Model backed trackers load their assets here,
    /// so a missing model is reported before the session starts.
    pub fn build(self) -> Result<Strategy, InitError> {
        Ok(match self {
            Method::Template => Strategy::Box(Box::new(TemplateTracker::default())),
            Method::LucasKanade => Strategy::Point(Box::new(LucasKanade::new(LkParams::default()))),
            Method::DenseFlow => Strategy::Point(Box::new(DenseFlow::default())),
            #[cfg(feature = "opencv")]
            method => crate::cv::build(method)?,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Method::ALL.iter().map(|m| m.name()).collect();
                format!("unknown method {s:?}, expected one of {}", names.join(", "))
            })
    }
}
