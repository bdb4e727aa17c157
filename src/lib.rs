pub mod annotate;
pub mod config;
pub mod dense_flow;
pub mod engine;
pub mod error;
pub mod frame;
pub mod image;
pub mod locus;
pub mod my_types;
pub mod optical_flow;
pub mod pyramid;
pub mod strategy;
pub mod synthetic;
pub mod template;
pub mod trajectory;
pub mod video;

#[cfg(feature = "opencv")]
pub mod cv;
#[cfg(feature = "rerun")]
pub mod visualization;

pub use engine::{track, Interrupt, Session, SessionConfig, SessionReport, Termination};
pub use locus::{BoundingBox, Locus};
pub use strategy::Method;
pub use trajectory::{Sample, Trajectory};
