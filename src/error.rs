use thiserror::Error;

/// Setup failure of a tracking strategy. Fatal, raised before any frame is processed.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid initial locus: {0}")]
    InvalidLocus(String),
    #[error("method {method} expects a {expected} locus")]
    LocusMismatch {
        method: String,
        expected: &'static str,
    },
    #[error("missing model asset {0}")]
    MissingAsset(String),
    #[error("the frame stream is empty")]
    EmptyStream,
    #[error("cannot read the first frame: {0}")]
    Source(#[from] IoFault),
    #[error("strategy backend failed during init: {0}")]
    Backend(String),
}

/// Unexpected fault inside a vision primitive. Ordinary target loss is not a fault.
#[derive(Debug, Error)]
pub enum StrategyFault {
    #[error("frame of {got_w}x{got_h} does not match the session size {want_w}x{want_h}")]
    FrameSize {
        want_w: usize,
        want_h: usize,
        got_w: usize,
        got_h: usize,
    },
    #[error("strategy returned a {got} locus for a {want} session")]
    LocusKind {
        want: &'static str,
        got: &'static str,
    },
    #[error("strategy was updated before init")]
    NotInitialized,
    #[error("strategy backend fault: {0}")]
    Backend(String),
}

/// Failure of the frame stream or of the output sink.
#[derive(Debug, Error)]
pub enum IoFault {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("video backend error: {0}")]
    Backend(String),
}

/// Reason a session stopped early, reported next to the partial trajectory.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("tracking strategy fault at frame {frame}: {source}")]
    Strategy {
        frame: u64,
        #[source]
        source: StrategyFault,
    },
    #[error("frame stream fault at frame {frame}: {source}")]
    Source {
        frame: u64,
        #[source]
        source: IoFault,
    },
    #[error("output sink fault at frame {frame}: {source}")]
    Sink {
        frame: u64,
        #[source]
        source: IoFault,
    },
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for StrategyFault {
    fn from(err: opencv::Error) -> Self {
        StrategyFault::Backend(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for IoFault {
    fn from(err: opencv::Error) -> Self {
        IoFault::Backend(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for InitError {
    fn from(err: opencv::Error) -> Self {
        InitError::Backend(err.to_string())
    }
}
