
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{DecodeError, Frame, FrameReader, ProgressCallback, VideoDecoder, VideoInfo};

/// Pulls one frame every `interval` seconds of video out of a container
#[derive(Clone, Copy)]
pub struct FrameSampler<'a> {
    decoder: &'a dyn VideoDecoder,
}

/// A frame picked by the sampler
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Position of the frame in the source stream
    pub index: u64,
    /// Presentation time in seconds
    pub timestamp_secs: f64,
    pub image: Frame,
}

impl<'a> FrameSampler<'a> {
    #[inline]
    pub fn new(decoder: &'a dyn VideoDecoder) -> Self {
        Self { decoder }
    }

    /// Start sampling `path`, one frame every `interval_secs` of video.
    ///
    /// The returned sequence is lazy and can only be consumed once. The decoder is
    /// released when the sequence is exhausted, hits an error, or is dropped early.
    #[inline]
    pub fn sample<'p>(
        &self,
        path: &Path,
        interval_secs: f64,
        mut progress: Option<ProgressCallback<'p>>,
    ) -> Result<SampledFrames<'p>, DecodeError> {
        let info = self.decoder.probe(path)?;
        let stride = info.stride_for(interval_secs);

        info!(
            "Sampling {} (duration: {:.2}s, {} frames at {:.3} fps, interval: {}s, stride: {})",
            path.display(),
            info.duration_secs(),
            info.total_frames,
            info.fps,
            interval_secs,
            stride
        );

        let reader = if info.total_frames == 0 {
            debug!("{} has no frames to decode", path.display());
            if let Some(callback) = progress.as_deref_mut() {
                callback(1.0);
            }
            None
        } else {
            Some(self.decoder.open(path, &info, stride)?)
        };

        Ok(SampledFrames {
            reader,
            path: path.to_path_buf(),
            info,
            stride,
            next_index: 0,
            yielded: 0,
            progress,
        })
    }
}

/// Lazy, finite sequence of sampled frames in temporal order
pub struct SampledFrames<'p> {
    reader: Option<Box<dyn FrameReader>>,
    path: PathBuf,
    info: VideoInfo,
    stride: u64,
    next_index: u64,
    yielded: u64,
    progress: Option<ProgressCallback<'p>>,
}

impl SampledFrames<'_> {
    #[inline]
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Whether the underlying decoder is still held
    #[inline]
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn report(&mut self, fraction: f64) {
        if let Some(callback) = self.progress.as_deref_mut() {
            callback(fraction.clamp(0.0, 1.0));
        }
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!(
                "Released decoder for {} after {} frames",
                self.path.display(),
                self.yielded
            );
        }
    }
}

impl Iterator for SampledFrames<'_> {
    type Item = Result<SampledFrame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;

        match reader.next_frame() {
            Ok(Some(image)) => {
                let index = self.next_index;
                self.next_index = self.next_index.saturating_add(self.stride);
                self.yielded += 1;

                let timestamp_secs = if self.info.fps > 0.0 {
                    index as f64 / self.info.fps
                } else {
                    0.0
                };
                let fraction = index as f64 / self.info.total_frames as f64;
                self.report(fraction);

                Some(Ok(SampledFrame {
                    index,
                    timestamp_secs,
                    image,
                }))
            }
            Ok(None) => {
                self.release();
                self.report(1.0);
                None
            }
            Err(e) => {
                self.release();
                Some(Err(e))
            }
        }
    }
}

impl fmt::Debug for SampledFrames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampledFrames")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("stride", &self.stride)
            .field("next_index", &self.next_index)
            .field("open", &self.reader.is_some())
            .finish_non_exhaustive()
    }
}
