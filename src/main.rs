use anyhow::{bail, Context as AnyhowContext, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tracing::{info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use trackbox::config::Config;
use trackbox::engine::{track, Interrupt};
use trackbox::error::IoFault;
use trackbox::frame::Frame;
use trackbox::locus::{Locus, LocusKind};
use trackbox::my_types::*;
use trackbox::synthetic::{SyntheticScene, SyntheticSource};
use trackbox::trajectory::Trajectory;
use trackbox::video::{FrameSink, FrameSource, MultiSink, PpmSequence};

const SYNTHETIC_WIDTH: usize = 320;
const SYNTHETIC_HEIGHT: usize = 240;
const SYNTHETIC_TARGET: usize = 32;

/// Raises the interrupt once `limit` frames went through
struct StopAfter {
    inner: Box<dyn FrameSink>,
    limit: u64,
    written: u64,
    interrupt: Interrupt,
}

impl FrameSink for StopAfter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), IoFault> {
        self.inner.write_frame(frame)?;
        self.written += 1;
        if self.written >= self.limit {
            self.interrupt.raise();
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), IoFault> {
        self.inner.finish()
    }
}

/// The source, the frame rate to encode with, and a locus to start from when none was given
fn open_source(config: &Config) -> Result<(Box<dyn FrameSource>, f64, Option<Locus>)> {
    if let Some(path) = &config.input {
        #[cfg(feature = "opencv")]
        {
            let input = trackbox::video::VideoInput::new(path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            let fps = input.fps()?;
            return Ok((Box::new(input), fps, None));
        }
        #[cfg(not(feature = "opencv"))]
        bail!(
            "cannot decode {}: built without the opencv feature, try --synthetic",
            path.display()
        );
    }
    if !config.synthetic {
        bail!("no input, pass --input <video> or --synthetic");
    }

    let scene = SyntheticScene::new(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, config.seed);
    let start = Vector2d::new(40., 60.);
    let source = SyntheticSource::new(
        scene,
        start,
        Vector2d::new(2., 1.),
        SYNTHETIC_TARGET,
        config.frames,
    );
    let size = SYNTHETIC_TARGET as f64;
    let fallback = match config.method.locus_kind() {
        LocusKind::Box => Locus::bbox(start.x, start.y, size, size)?,
        LocusKind::Point => Locus::point(start.x + size / 2., start.y + size / 2.)?,
    };
    Ok((Box::new(source), 30., Some(fallback)))
}

fn open_sink(path: &Path, fps: f64) -> Result<Box<dyn FrameSink>> {
    let is_video = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("mp4" | "avi" | "mov" | "mkv")
    );
    if is_video {
        #[cfg(feature = "opencv")]
        return Ok(Box::new(trackbox::video::VideoOutput::new(path, fps)));
        #[cfg(not(feature = "opencv"))]
        bail!(
            "cannot encode {} at {fps} fps: built without the opencv feature",
            path.display()
        );
    }
    Ok(Box::new(PpmSequence::create(path)?))
}

fn save_trajectory(path: &Path, trajectory: &Trajectory) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let writer = BufWriter::new(file);
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => trajectory.write_csv(writer)?,
        _ => trajectory.write_json(writer)?,
    }
    info!("saved {} samples to {}", trajectory.len(), path.display());
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::parse();

    // setup logging
    let level = match config.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(indicatif_layer.get_stdout_writer())
                .with_filter(level),
        )
        .with(indicatif_layer)
        .init();

    let (mut source, fps, fallback) = open_source(&config)?;
    let session = config.session(fallback)?;
    info!("tracking with {} from {}", session.method, session.initial);

    let mut sink = MultiSink::default();
    sink.push(open_sink(&config.output, fps)?);
    #[cfg(feature = "rerun")]
    let recorder = match &config.rerun {
        Some(path) => {
            let rerun_sink = trackbox::visualization::RerunSink::new(path)?;
            let recorder = rerun_sink.recorder();
            sink.push(Box::new(rerun_sink));
            Some(recorder)
        }
        None => None,
    };

    let interrupt = Interrupt::new();
    let mut sink: Box<dyn FrameSink> = match config.max_frames {
        Some(limit) => Box::new(StopAfter {
            inner: Box::new(sink),
            limit,
            written: 0,
            interrupt: interrupt.clone(),
        }),
        None => Box::new(sink),
    };

    let report = track(&session, source.as_mut(), sink.as_mut(), &interrupt)?;
    let finished = sink.finish();

    info!(
        "{}: {} frames, {} samples, {} failures",
        report.status,
        report.frames_processed,
        report.trajectory.len(),
        report.failures
    );
    if let Some(path) = &config.trajectory {
        save_trajectory(path, &report.trajectory)?;
    }
    #[cfg(feature = "rerun")]
    if let Some(recorder) = &recorder {
        trackbox::visualization::log_trajectory(recorder, &report.trajectory)?;
    }

    finished.context("cannot finish the output")?;
    if let Some(err) = report.error {
        warn!("trajectory is partial");
        return Err(err).context(format!("session {}", report.status));
    }
    Ok(())
}
