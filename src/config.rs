use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::SessionConfig;
use crate::error::InitError;
use crate::locus::{Locus, LocusKind};
use crate::strategy::Method;

#[derive(Debug, Clone, Parser)]
#[clap(name = "trackbox", about = "Track one target through a video and record its trajectory")]
pub struct Config {
    /// tracking method: template, lk, dense-flow (opencv builds add csrt, kcf, mil, dasiamrpn, nano, farneback, cv-lk)
    #[clap(short, long, default_value = "template", value_parser = Method::from_str)]
    pub method: Method,

    /// input video, needs the opencv feature
    #[clap(short, long, conflicts_with = "synthetic")]
    pub input: Option<PathBuf>,

    /// track a generated moving square instead of a video
    #[clap(long)]
    pub synthetic: bool,

    /// annotated output: a video file with the opencv feature, otherwise a directory of ppm frames
    #[clap(short, long, default_value = "output_video")]
    pub output: PathBuf,

    /// trajectory file, json or csv by extension
    #[clap(short, long)]
    pub trajectory: Option<PathBuf>,

    /// initial point for flow methods, "x,y"
    #[clap(long, value_parser = parse_point, conflicts_with = "bbox")]
    pub point: Option<Locus>,

    /// initial box for box trackers, "x,y,width,height"
    #[clap(long, value_parser = parse_bbox)]
    pub bbox: Option<Locus>,

    /// stop after this many output frames, lost frames included
    #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_frames: Option<u64>,

    /// frames in the synthetic sequence
    #[clap(long, default_value = "120")]
    pub frames: u64,

    #[clap(long, default_value = "0")]
    pub seed: u64,

    /// also log frames and trajectory to this rerun recording
    #[cfg(feature = "rerun")]
    #[clap(long)]
    pub rerun: Option<PathBuf>,

    /// -v for debug, -vv for trace
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: u8,
}

impl Config {
    /// Pair the method with the given locus. `fallback` is used when no locus was given.
    pub fn session(&self, fallback: Option<Locus>) -> Result<SessionConfig, InitError> {
        let locus = match (self.point.or(self.bbox), fallback) {
            (Some(locus), _) => locus,
            (None, Some(fallback)) => fallback,
            (None, None) => {
                let flag = match self.method.locus_kind() {
                    LocusKind::Point => "--point",
                    LocusKind::Box => "--bbox",
                };
                return Err(InitError::InvalidLocus(format!(
                    "{flag} is required for {}",
                    self.method
                )));
            }
        };
        SessionConfig::new(self.method, locus)
    }
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|err| format!("{v:?}: {err}")))
        .collect::<Result<Vec<_>, _>>()?;
    values
        .try_into()
        .map_err(|values: Vec<f64>| format!("expected {N} numbers, got {}", values.len()))
}

fn parse_point(s: &str) -> Result<Locus, String> {
    let [x, y] = parse_numbers::<2>(s)?;
    Locus::point(x, y).map_err(|err| err.to_string())
}

fn parse_bbox(s: &str) -> Result<Locus, String> {
    let [x, y, w, h] = parse_numbers::<4>(s)?;
    Locus::bbox(x, y, w, h).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locus() {
        assert_eq!(parse_point("3, 4.5").unwrap(), Locus::point(3., 4.5).unwrap());
        assert_eq!(
            parse_bbox("10,20,40,60").unwrap(),
            Locus::bbox(10., 20., 40., 60.).unwrap()
        );
        assert!(parse_point("1,2,3").is_err());
        assert!(parse_bbox("1,2,-3,4").is_err());
        assert!(parse_point("a,2").is_err());
    }

    #[test]
    fn test_cli() {
        let config = Config::parse_from([
            "trackbox", "--method", "lk", "--synthetic", "--point", "12,34", "-t", "out.csv",
        ]);
        assert_eq!(config.method, Method::LucasKanade);
        assert!(config.synthetic);
        let session = config.session(None).unwrap();
        assert_eq!(session.initial, Locus::point(12., 34.).unwrap());
    }

    #[test]
    fn test_locus_is_required() {
        let config = Config::parse_from(["trackbox", "--synthetic"]);
        assert!(matches!(
            config.session(None),
            Err(InitError::InvalidLocus(_))
        ));
        let fallback = Locus::bbox(1., 1., 8., 8.).unwrap();
        assert_eq!(config.session(Some(fallback)).unwrap().initial, fallback);
    }

    #[test]
    fn test_max_frames_must_be_positive() {
        assert!(Config::try_parse_from(["trackbox", "--synthetic", "--max-frames", "0"]).is_err());
        let config = Config::parse_from(["trackbox", "--synthetic", "--max-frames", "3"]);
        assert_eq!(config.max_frames, Some(3));
    }

    #[test]
    fn test_wrong_locus_for_method() {
        let config = Config::parse_from(["trackbox", "--synthetic", "--point", "1,1"]);
        assert!(matches!(
            config.session(None),
            Err(InitError::LocusMismatch { .. })
        ));
    }
}
