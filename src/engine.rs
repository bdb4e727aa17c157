use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::ProgressStyle;
use tracing::{debug, info, info_span, warn, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::annotate::{annotate, Mark};
use crate::error::{InitError, SessionError, StrategyFault};
use crate::frame::Frame;
use crate::locus::{BoundingBox, Locus};
use crate::strategy::{Method, PointUpdate, Strategy, Tracked};
use crate::trajectory::{Sample, Trajectory};
use crate::video::{FrameSink, FrameSource};

/// Immutable description of one tracking session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub method: Method,
    pub initial: Locus,
}

impl SessionConfig {
    pub fn new(method: Method, initial: Locus) -> Result<Self, InitError> {
        if method.locus_kind() != initial.kind() {
            return Err(InitError::LocusMismatch {
                method: method.to_string(),
                expected: method.locus_kind().name(),
            });
        }
        Ok(Self { method, initial })
    }
}

/// Cooperative stop request, checked once per frame after the frame is written.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// the frame stream is exhausted
    Completed,
    /// a strategy or io fault stopped the session
    Aborted,
    /// stopped on request
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::Completed => "completed",
            Termination::Aborted => "aborted",
            Termination::Interrupted => "interrupted",
        })
    }
}

/// What a finished session hands back. The trajectory is kept on every termination.
#[derive(Debug)]
pub struct SessionReport {
    pub status: Termination,
    pub trajectory: Trajectory,
    /// frames pulled from the source after the first one, the faulting frame included
    pub frames_processed: u64,
    pub failures: u64,
    pub error: Option<SessionError>,
}

/// Result of one processed frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Tracked(Sample),
    Lost,
}

/// Owns the locus and the trajectory of one session and drives the strategy frame by frame.
pub struct Session {
    strategy: Strategy,
    locus: Locus,
    trajectory: Trajectory,
    /// last frame seen, unannotated, input of the point flow strategies
    prev: Frame,
    frame_index: u64,
    failures: u64,
}

impl Session {
    /// Initialize `strategy` on the first frame. Nothing is recorded for that frame.
    pub fn start(mut strategy: Strategy, first: Frame, initial: Locus) -> Result<Self, InitError> {
        if first.width == 0 || first.height == 0 {
            return Err(InitError::EmptyStream);
        }
        strategy.init(&first, &initial)?;
        info!("strategy initialized at {initial} on a {}x{} frame", first.width, first.height);
        Ok(Self {
            strategy,
            locus: initial,
            trajectory: Trajectory::new(),
            prev: first,
            frame_index: 0,
            failures: 0,
        })
    }

    /// Build the configured strategy and initialize it on the first frame of `source`.
    pub fn open(config: &SessionConfig, source: &mut dyn FrameSource) -> Result<Self, InitError> {
        let strategy = config.method.build()?;
        let first = source.next_frame()?.ok_or(InitError::EmptyStream)?;
        Self::start(strategy, first, config.initial)
    }

    pub fn locus(&self) -> &Locus {
        &self.locus
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Track the target in `frame` and annotate it. On a fault the locus and
    /// the trajectory stay as they were.
    pub fn step(&mut self, mut frame: Frame) -> Result<(Frame, Outcome), StrategyFault> {
        let found = match &mut self.strategy {
            Strategy::Box(tracker) => match tracker.update(&frame)? {
                Tracked::Found(bbox) => Some(checked_box(bbox)?),
                Tracked::Lost => None,
            },
            Strategy::Point(tracker) => {
                let prev_point = self.locus.position();
                let update = tracker.update(&self.prev, &frame, prev_point)?;
                self.prev.clone_from(&frame);
                match update {
                    Tracked::Found(PointUpdate::Absolute(p)) => Some(Locus::Point(p)),
                    Tracked::Found(PointUpdate::Displacement(field)) => {
                        let mut moved = self.locus;
                        moved.apply_displacement(&field).ok_or_else(|| {
                            StrategyFault::Backend("empty displacement field".to_string())
                        })?;
                        Some(moved)
                    }
                    Tracked::Lost => None,
                }
            }
        };

        let outcome = match found {
            Some(locus) => {
                let position = locus.position();
                if !position.x.is_finite() || !position.y.is_finite() {
                    return Err(StrategyFault::Backend(format!(
                        "non-finite position {locus}"
                    )));
                }
                self.locus.replace(locus).map_err(|got| StrategyFault::LocusKind {
                    want: self.locus.kind().name(),
                    got: got.kind().name(),
                })?;
                let sample = self.trajectory.record(self.frame_index, position);
                debug!(t = sample.t, frame = sample.frame, "target at {}", self.locus);
                annotate(&mut frame, &Mark::Position(self.locus));
                Outcome::Tracked(sample)
            }
            None => {
                self.failures += 1;
                warn!(frame = self.frame_index, "tracking failure, holding {}", self.locus);
                annotate(&mut frame, &Mark::Failure);
                Outcome::Lost
            }
        };
        self.frame_index += 1;
        Ok((frame, outcome))
    }

    /// Drive the loop until the source is exhausted, a fault occurs or
    /// `interrupt` is raised. Frames are written whether tracked or lost.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        interrupt: &Interrupt,
    ) -> SessionReport {
        let span = info_span!("session", locus = %self.locus);
        span.pb_set_style(&ProgressStyle::default_bar());
        if let Some(count) = source.frame_count() {
            span.pb_set_length(count);
        }
        let _enter = span.enter();

        let (status, error) = loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break (Termination::Completed, None),
                Err(source) => {
                    let frame = self.frame_index;
                    break (Termination::Aborted, Some(SessionError::Source { frame, source }));
                }
            };

            let frame_number = self.frame_index;
            let annotated = match self.step(frame) {
                Ok((annotated, _)) => annotated,
                Err(source) => {
                    // the faulting frame counts as processed but is not written
                    self.frame_index += 1;
                    let frame = frame_number;
                    break (Termination::Aborted, Some(SessionError::Strategy { frame, source }));
                }
            };

            if let Err(source) = sink.write_frame(&annotated) {
                let frame = frame_number;
                break (Termination::Aborted, Some(SessionError::Sink { frame, source }));
            }
            Span::current().pb_inc(1);

            if interrupt.is_raised() {
                break (Termination::Interrupted, None);
            }
        };

        match &error {
            Some(err) => warn!("session {status}: {err}"),
            None => info!(
                "session {status} after {} frames, {} samples, {} failures",
                self.frame_index,
                self.trajectory.len(),
                self.failures
            ),
        }

        SessionReport {
            status,
            trajectory: self.trajectory,
            frames_processed: self.frame_index,
            failures: self.failures,
            error,
        }
    }
}

fn checked_box(bbox: BoundingBox) -> Result<Locus, StrategyFault> {
    Locus::bbox(bbox.x, bbox.y, bbox.width, bbox.height)
        .map_err(|err| StrategyFault::Backend(format!("strategy returned {bbox}: {err}")))
}

/// Open a session from `config` and run it over the rest of `source`.
pub fn track(
    config: &SessionConfig,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    interrupt: &Interrupt,
) -> Result<SessionReport, InitError> {
    let session = Session::open(config, source)?;
    Ok(session.run(source, sink, interrupt))
}
