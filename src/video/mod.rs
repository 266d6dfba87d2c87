// Video module
// Frame decoding and strided frame sampling for captioning

pub mod ffmpeg;
pub mod sampler;


use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use ffmpeg::FfmpegDecoder;
pub use sampler::{FrameSampler, SampledFrame, SampledFrames};

/// A decoded frame: a 2-D grid of pixels in RGB channel order
pub type Frame = image::RgbImage;

/// Receives the fraction of the video processed so far, in `[0, 1]`
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(f64) + Send);

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open video {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to probe video {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    #[error("Failed to read frame {index} of {path}: {reason}")]
    FrameRead {
        path: PathBuf,
        index: u64,
        reason: String,
    },
}

/// Stream properties needed to plan sampling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    /// Length of the video in seconds, derived from frame count and frame rate
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }

    #[inline]
    pub fn stride_for(&self, interval_secs: f64) -> u64 {
        compute_stride(self.fps, interval_secs)
    }
}

/// Number of source frames between two sampled frames, never less than one
#[inline]
pub fn compute_stride(fps: f64, interval_secs: f64) -> u64 {
    let frames = (fps * interval_secs).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

/// How many frames a strided pass over `total_frames` yields
#[inline]
pub fn expected_sample_count(total_frames: u64, stride: u64) -> u64 {
    total_frames.div_ceil(stride.max(1))
}

/// Opens video containers and decodes their frames
pub trait VideoDecoder: Send + Sync {
    /// Read stream properties without decoding any frame
    fn probe(&self, path: &Path) -> Result<VideoInfo, DecodeError>;

    /// Start decoding frames `0, stride, 2 * stride, ...` of the first video stream
    fn open(
        &self,
        path: &Path,
        info: &VideoInfo,
        stride: u64,
    ) -> Result<Box<dyn FrameReader>, DecodeError>;
}

/// A live decoding session. Dropping it releases the decoder.
pub trait FrameReader: Send {
    /// The next sampled frame, or `None` once the stream is exhausted
    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError>;
}
