use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dense_flow::FlowField;
use crate::error::InitError;
use crate::my_types::*;

/// Left-top-width-height box in pixel coordinates
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, InitError> {
        let values = [x, y, width, height];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(InitError::InvalidLocus(format!(
                "box {values:?} has non-finite coordinates"
            )));
        }
        if width < 0. || height < 0. {
            return Err(InitError::InvalidLocus(format!(
                "box size {width} x {height} is negative"
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    #[inline]
    pub fn center(&self) -> Vector2d {
        Vector2d::new(self.x + self.width / 2., self.y + self.height / 2.)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1}, {:.1}, {:.1} x {:.1}]",
            self.x, self.y, self.width, self.height
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LocusKind {
    Point,
    Box,
}

impl LocusKind {
    pub fn name(self) -> &'static str {
        match self {
            LocusKind::Point => "point",
            LocusKind::Box => "box",
        }
    }
}

/// Where the target currently is.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Locus {
    Point(Vector2d),
    Box(BoundingBox),
}

impl Locus {
    pub fn point(x: f64, y: f64) -> Result<Self, InitError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(InitError::InvalidLocus(format!(
                "point ({x}, {y}) has non-finite coordinates"
            )));
        }
        Ok(Locus::Point(Vector2d::new(x, y)))
    }

    pub fn bbox(x: f64, y: f64, width: f64, height: f64) -> Result<Self, InitError> {
        Ok(Locus::Box(BoundingBox::new(x, y, width, height)?))
    }

    pub fn kind(&self) -> LocusKind {
        match self {
            Locus::Point(_) => LocusKind::Point,
            Locus::Box(_) => LocusKind::Box,
        }
    }

    /// The reported position: the point itself or the box center.
    pub fn position(&self) -> Vector2d {
        match self {
            Locus::Point(p) => *p,
            Locus::Box(b) => b.center(),
        }
    }

    /// Absolute update. The variant of a locus never changes during a
    /// session, a locus of the other kind is handed back as the error.
    pub fn replace(&mut self, new: Locus) -> Result<(), Locus> {
        if new.kind() != self.kind() {
            return Err(new);
        }
        *self = new;
        Ok(())
    }

    /// Delta update: add the displacement found in `field` under the
    /// integer-rounded point. The lookup is clamped to the field bounds so
    /// a point that drifted outside the frame keeps reading the border.
    ///
    /// Every call moves the point again, the result accumulates sub-pixel
    /// drift and is not idempotent. Returns the applied displacement, a box
    /// locus is left untouched and yields `None`.
    pub fn apply_displacement(&mut self, field: &FlowField) -> Option<Vector2d> {
        let Locus::Point(p) = self else {
            return None;
        };
        let d = field.sample_clamped(p.x.round(), p.y.round())?;
        *p += d;
        Some(d)
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locus::Point(p) => write!(f, "({:.2}, {:.2})", p.x, p.y),
            Locus::Box(b) => b.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_center() {
        let locus = Locus::bbox(10., 20., 40., 60.).unwrap();
        assert_eq!(locus.position(), Vector2d::new(30., 50.));
    }

    #[test]
    fn test_negative_box_rejected() {
        assert!(matches!(
            Locus::bbox(0., 0., -1., 5.),
            Err(InitError::InvalidLocus(_))
        ));
        assert!(Locus::point(f64::NAN, 1.).is_err());
        assert!(Locus::bbox(0., 0., 0., 0.).is_ok());
    }

    #[test]
    fn test_replace_keeps_variant() {
        let mut locus = Locus::point(1., 2.).unwrap();
        let other = Locus::bbox(0., 0., 4., 4.).unwrap();
        assert_eq!(locus.replace(other), Err(other));
        assert_eq!(locus, Locus::point(1., 2.).unwrap());

        locus.replace(Locus::point(5., 6.).unwrap()).unwrap();
        assert_eq!(locus.position(), Vector2d::new(5., 6.));

        let mut locus = Locus::bbox(0., 0., 2., 2.).unwrap();
        locus.replace(Locus::bbox(4., 4., 2., 6.).unwrap()).unwrap();
        assert_eq!(locus.position(), Vector2d::new(5., 7.));
    }

    #[test]
    fn test_displacement_is_not_idempotent() {
        let field = FlowField::uniform(16, 16, 0.75, -0.5);
        let mut locus = Locus::point(4.2, 8.4).unwrap();
        locus.apply_displacement(&field);
        let once = locus.position();
        locus.apply_displacement(&field);
        let twice = locus.position();
        assert!((once - Vector2d::new(4.95, 7.9)).norm() < 1e-6);
        assert!((twice - Vector2d::new(5.7, 7.4)).norm() < 1e-6);
        assert_ne!(once, twice);
    }

    #[test]
    fn test_zero_displacement_is_fixed_point() {
        let field = FlowField::zeros(8, 8);
        let mut locus = Locus::point(3.3, 2.7).unwrap();
        for _ in 0..5 {
            locus.apply_displacement(&field);
        }
        assert_eq!(locus.position(), Vector2d::new(3.3, 2.7));
    }

    #[test]
    fn test_displacement_lookup_is_clamped() {
        let mut field = FlowField::zeros(4, 4);
        field.set(3, 0, 2., 1.);
        let mut locus = Locus::point(40., -7.).unwrap();
        assert_eq!(locus.apply_displacement(&field), Some(Vector2d::new(2., 1.)));
        assert_eq!(locus.position(), Vector2d::new(42., -6.));
    }

    #[test]
    fn test_box_ignores_displacement() {
        let field = FlowField::uniform(4, 4, 1., 1.);
        let mut locus = Locus::bbox(0., 0., 2., 2.).unwrap();
        assert_eq!(locus.apply_displacement(&field), None);
        assert_eq!(locus.position(), Vector2d::new(1., 1.));
    }
}
