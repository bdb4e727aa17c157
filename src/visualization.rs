use anyhow::Result;
use ndarray as nd;
use rerun::{RecordingStream, RecordingStreamBuilder};
use std::path::Path;

use crate::error::IoFault;
use crate::frame::Frame;
use crate::trajectory::Trajectory;
use crate::video::FrameSink;

pub fn frame_to_array(frame: &Frame) -> Result<nd::Array3<u8>> {
    let a = nd::ArrayView3::from_shape((frame.height, frame.width, 3), &frame.data)?;
    Ok(a.to_owned())
}

/// Logs annotated frames, and the trajectory once the session is over, to a rerun recording
pub struct RerunSink {
    recorder: RecordingStream,
    index: i64,
}

impl RerunSink {
    pub fn new(path: &Path) -> Result<Self> {
        let recorder = RecordingStreamBuilder::new("trackbox").save(path)?;
        Ok(Self { recorder, index: 0 })
    }

    /// Handle on the same recording, still usable once the sink is boxed
    pub fn recorder(&self) -> RecordingStream {
        self.recorder.clone()
    }

    fn log_frame(&mut self, frame: &Frame) -> Result<()> {
        self.recorder.set_time_sequence("frame", self.index);
        self.recorder
            .log("video/frame", &rerun::Image::try_from(frame_to_array(frame)?)?)?;
        self.index += 1;
        Ok(())
    }
}

impl FrameSink for RerunSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), IoFault> {
        self.log_frame(frame)
            .map_err(|err| IoFault::Backend(format!("{err:#}")))
    }

    fn finish(&mut self) -> Result<(), IoFault> {
        self.recorder.flush_blocking();
        Ok(())
    }
}

/// x and y over t, plotted next to the video
pub fn log_trajectory(recorder: &RecordingStream, trajectory: &Trajectory) -> Result<()> {
    for sample in trajectory {
        recorder.set_time_sequence("t", sample.t as i64);
        recorder.log("trajectory/x", &rerun::Scalar::new(sample.x))?;
        recorder.log("trajectory/y", &rerun::Scalar::new(sample.y))?;
    }
    recorder.flush_blocking();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_to_array() {
        let mut frame = Frame::filled(3, 2, [1, 2, 3]);
        frame.put_pixel(2, 1, [7, 8, 9]);
        let a = frame_to_array(&frame).unwrap();
        assert_eq!(a.dim(), (2, 3, 3));
        assert_eq!(a[(1, 2, 0)], 7);
        assert_eq!(a[(0, 0, 2)], 3);
    }
}
