use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::my_types::*;

/// One recorded position.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// index among successfully tracked frames, zero based
    pub t: u64,
    /// index of the frame in the input stream, failed frames included
    pub frame: u64,
    pub x: f64,
    pub y: f64,
}

/// Append-only time series of target positions. Only successful frames are
/// recorded, so `t` has no gaps while `frame` skips the failed frames.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    samples: Vec<Sample>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the position found in stream frame `frame`. The sample gets the next `t`.
    pub fn record(&mut self, frame: u64, position: Vector2d) -> Sample {
        debug_assert!(self.samples.last().map_or(true, |s| s.frame < frame));
        let sample = Sample {
            t: self.samples.len() as u64,
            frame,
            x: position.x,
            y: position.y,
        };
        self.samples.push(sample);
        sample
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// `(t, x, y)` columns, the layout a plotter wants
    pub fn to_columns(&self) -> (Vec<u64>, Vec<f64>, Vec<f64>) {
        let t = self.samples.iter().map(|s| s.t).collect();
        let x = self.samples.iter().map(|s| s.x).collect();
        let y = self.samples.iter().map(|s| s.y).collect();
        (t, x, y)
    }

    pub fn write_json<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, &self.samples)
    }

    pub fn write_csv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "t,frame,x,y")?;
        for s in &self.samples {
            writeln!(writer, "{},{},{},{}", s.t, s.frame, s.x, s.y)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
