use log::{debug, info};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::IoFault;
use crate::frame::Frame;

/// Sequential frame decoder. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, IoFault>;

    /// Number of frames left to decode, when the container knows it
    fn frame_count(&self) -> Option<u64> {
        None
    }
}

/// Sequential frame encoder.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), IoFault>;

    /// Flush and close the underlying stream
    fn finish(&mut self) -> Result<(), IoFault> {
        Ok(())
    }
}

/// In-memory source, counts the frames handed out.
#[derive(Debug, Default)]
pub struct VecSource {
    frames: VecDeque<Frame>,
    pub read: u64,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            read: 0,
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, IoFault> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.read += 1;
        }
        Ok(frame)
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }
}

/// In-memory sink keeping every written frame.
#[derive(Debug, Default)]
pub struct VecSink {
    pub frames: Vec<Frame>,
}

impl FrameSink for VecSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), IoFault> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Fans every frame out to several sinks, stopping at the first error.
#[derive(Default)]
pub struct MultiSink {
    pub sinks: Vec<Box<dyn FrameSink>>,
}

impl MultiSink {
    pub fn push(&mut self, sink: Box<dyn FrameSink>) {
        self.sinks.push(sink);
    }
}

impl FrameSink for MultiSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), IoFault> {
        for sink in self.sinks.iter_mut() {
            sink.write_frame(frame)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), IoFault> {
        for sink in self.sinks.iter_mut() {
            sink.finish()?;
        }
        Ok(())
    }
}

/// Writes each frame as a numbered binary PPM (P6) file into a directory.
#[derive(Debug)]
pub struct PpmSequence {
    dir: PathBuf,
    index: u64,
}

impl PpmSequence {
    pub fn create(dir: &Path) -> Result<Self, IoFault> {
        fs::create_dir_all(dir)?;
        info!("writing annotated frames to {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            index: 0,
        })
    }

    pub fn path_of(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.ppm"))
    }
}

impl FrameSink for PpmSequence {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), IoFault> {
        if frame.data.len() != frame.width * frame.height * 3 {
            return Err(IoFault::Malformed(format!(
                "{} bytes for a {}x{} rgb frame",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }
        let path = self.path_of(self.index);
        let mut writer = BufWriter::new(File::create(&path)?);
        write!(writer, "P6\n{} {}\n255\n", frame.width, frame.height)?;
        writer.write_all(&frame.data)?;
        writer.flush()?;
        debug!("wrote {}", path.display());
        self.index += 1;
        Ok(())
    }
}

#[cfg(feature = "opencv")]
mod cv_io {
    use log::{info, warn};
    use opencv as cv2;
    use opencv::prelude::*;
    use std::path::Path;

    use super::{FrameSink, FrameSource};
    use crate::error::IoFault;
    use crate::frame::Frame;

    /// Video file decoder
    pub struct VideoInput {
        capture: cv2::videoio::VideoCapture,
        mat: cv2::core::Mat,
        remaining: Option<u64>,
    }

    impl VideoInput {
        pub fn new(path: &Path) -> Result<Self, IoFault> {
            let capture =
                cv2::videoio::VideoCapture::from_file(&path.to_string_lossy(), cv2::videoio::CAP_ANY)?;
            if !capture.is_opened()? {
                return Err(IoFault::Backend(format!("cannot open {}", path.display())));
            }
            let count = capture.get(cv2::videoio::CAP_PROP_FRAME_COUNT)?;
            info!("opened {} ({} frames)", path.display(), count);
            Ok(Self {
                capture,
                mat: cv2::core::Mat::default(),
                remaining: (count > 0.).then_some(count as u64),
            })
        }

        pub fn fps(&self) -> Result<f64, IoFault> {
            Ok(self.capture.get(cv2::videoio::CAP_PROP_FPS)?)
        }
    }

    impl FrameSource for VideoInput {
        fn next_frame(&mut self) -> Result<Option<Frame>, IoFault> {
            if !self.capture.read(&mut self.mat)? || self.mat.rows() == 0 {
                return Ok(None);
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            Ok(Some(mat_to_frame(&self.mat)?))
        }

        fn frame_count(&self) -> Option<u64> {
            self.remaining
        }
    }

    /// mp4v encoder, opened lazily with the size of the first frame
    pub struct VideoOutput {
        writer: Option<cv2::videoio::VideoWriter>,
        size: Option<(usize, usize)>,
        path: String,
        fps: f64,
    }

    impl VideoOutput {
        pub fn new(path: &Path, fps: f64) -> Self {
            Self {
                writer: None,
                size: None,
                path: path.to_string_lossy().into_owned(),
                fps: if fps > 0. { fps } else { 30. },
            }
        }
    }

    impl FrameSink for VideoOutput {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), IoFault> {
            let size = frame.size();
            if self.size.is_some() && self.size != Some(size) {
                return Err(IoFault::Malformed(format!(
                    "frame size {size:?} differs from the stream size {:?}",
                    self.size
                )));
            }
            if self.writer.is_none() {
                let fourcc = cv2::videoio::VideoWriter::fourcc('m', 'p', '4', 'v')?;
                let writer = cv2::videoio::VideoWriter::new(
                    &self.path,
                    fourcc,
                    self.fps,
                    cv2::core::Size::new(size.0 as i32, size.1 as i32),
                    true,
                )?;
                if !writer.is_opened()? {
                    return Err(IoFault::Backend(format!("cannot open {} for writing", self.path)));
                }
                self.writer = Some(writer);
                self.size = Some(size);
            }
            let mat = frame_to_mat(frame)?;
            if let Some(writer) = self.writer.as_mut() {
                writer.write(&mat)?;
            }
            Ok(())
        }

        fn finish(&mut self) -> Result<(), IoFault> {
            match self.writer.take() {
                Some(mut writer) => writer.release()?,
                None => warn!("no frame was written to {}", self.path),
            }
            Ok(())
        }
    }

    /// BGR8 mat to rgb frame
    pub fn mat_to_frame(mat: &cv2::core::Mat) -> Result<Frame, IoFault> {
        let mut rgb = cv2::core::Mat::default();
        cv2::imgproc::cvt_color(mat, &mut rgb, cv2::imgproc::COLOR_BGR2RGB, 0)?;
        let size = rgb.size()?;
        let data = rgb.data_bytes()?.to_vec();
        Ok(Frame {
            data,
            width: size.width as usize,
            height: size.height as usize,
        })
    }

    /// rgb frame to an owned BGR8 mat
    pub fn frame_to_mat(frame: &Frame) -> Result<cv2::core::Mat, IoFault> {
        let rgb = cv2::core::Mat::from_slice(&frame.data)?
            .reshape(3, frame.height as i32)?
            .try_clone()?;
        let mut bgr = cv2::core::Mat::default();
        cv2::imgproc::cvt_color(&rgb, &mut bgr, cv2::imgproc::COLOR_RGB2BGR, 0)?;
        Ok(bgr)
    }
}

#[cfg(feature = "opencv")]
pub use cv_io::{frame_to_mat, mat_to_frame, VideoInput, VideoOutput};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_vec_source_counts_reads() {
        let mut source = VecSource::new(vec![Frame::filled(2, 2, [1, 2, 3]); 2]);
        assert_eq!(source.frame_count(), Some(2));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.read, 2);
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let mut multi = MultiSink::default();
        multi.push(Box::new(VecSink::default()));
        multi.push(Box::new(VecSink::default()));
        multi.write_frame(&Frame::filled(1, 1, [0, 0, 0])).unwrap();
        multi.finish().unwrap();
        assert_eq!(multi.sinks.len(), 2);
    }

    #[test]
    fn test_ppm_sequence() {
        let dir = std::env::temp_dir().join(format!("trackbox-ppm-{}", std::process::id()));
        let mut sink = PpmSequence::create(&dir).unwrap();
        sink.write_frame(&Frame::filled(3, 2, [9, 8, 7])).unwrap();
        sink.write_frame(&Frame::filled(3, 2, [1, 1, 1])).unwrap();

        let mut bytes = vec![];
        File::open(sink.path_of(0))
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        let header = b"P6\n3 2\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..header.len() + 3], &[9, 8, 7]);
        assert_eq!(bytes.len(), header.len() + 18);
        assert!(sink.path_of(1).exists());

        let broken = Frame {
            data: vec![0; 5],
            width: 3,
            height: 2,
        };
        assert!(matches!(
            sink.write_frame(&broken),
            Err(IoFault::Malformed(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
