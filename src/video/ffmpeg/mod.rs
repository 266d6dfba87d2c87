#[cfg(test)]
mod tests;

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{DecodeError, Frame, FrameReader, VideoDecoder, VideoInfo};
use crate::config::SamplingConfig;

const BYTES_PER_PIXEL: usize = 3;

/// Decodes videos by driving the `ffprobe` and `ffmpeg` executables
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl FfmpegDecoder {
    #[inline]
    pub fn new(config: &SamplingConfig) -> Self {
        Self::with_binaries(&config.ffmpeg_path, &config.ffprobe_path)
    }

    #[inline]
    pub fn with_binaries(ffmpeg: &Path, ffprobe: &Path) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            ffprobe: ffprobe.to_path_buf(),
        }
    }

    /// Check that both executables can be started
    #[inline]
    pub fn is_available(&self) -> bool {
        [&self.ffmpeg, &self.ffprobe].iter().all(|program| {
            Command::new(program)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|status| status.success())
        })
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn probe(&self, path: &Path) -> Result<VideoInfo, DecodeError> {
        std::fs::File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DecodeError::Spawn {
                program: self.ffprobe.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeError::Open {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidData, stderr.trim().to_string()),
            });
        }

        parse_probe_output(&output.stdout, path)
    }

    fn open(
        &self,
        path: &Path,
        info: &VideoInfo,
        stride: u64,
    ) -> Result<Box<dyn FrameReader>, DecodeError> {
        if info.width == 0 || info.height == 0 {
            return Err(DecodeError::Probe {
                path: path.to_path_buf(),
                reason: format!("invalid frame size {}x{}", info.width, info.height),
            });
        }

        let mut child = Command::new(&self.ffmpeg)
            .args(frame_extraction_args(path, stride))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DecodeError::Spawn {
                program: self.ffmpeg.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| DecodeError::FrameRead {
            path: path.to_path_buf(),
            index: 0,
            reason: "ffmpeg stdout was not captured".to_string(),
        })?;

        // stderr is drained concurrently with frame reads
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        debug!(
            "Started ffmpeg for {} ({}x{}, stride {})",
            path.display(),
            info.width,
            info.height,
            stride
        );

        Ok(Box::new(FfmpegFrameReader {
            child,
            stdout,
            stderr_reader,
            path: path.to_path_buf(),
            width: info.width,
            height: info.height,
            stride,
            frames_read: 0,
            finished: false,
        }))
    }
}

/// Arguments that make ffmpeg write every `stride`-th frame as packed RGB to stdout
fn frame_extraction_args(path: &Path, stride: u64) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(
        [
            "-map".to_string(),
            "0:v:0".to_string(),
            "-vf".to_string(),
            format!("select=not(mod(n\\,{}))", stride.max(1)),
            "-fps_mode".to_string(),
            "passthrough".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "pipe:1".to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    args
}

fn parse_probe_output(stdout: &[u8], path: &Path) -> Result<VideoInfo, DecodeError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout).map_err(|e| DecodeError::Probe {
        path: path.to_path_buf(),
        reason: format!("unreadable ffprobe output: {}", e),
    })?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| DecodeError::NoVideoStream(path.to_path_buf()))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| DecodeError::Probe {
            path: path.to_path_buf(),
            reason: "frame rate is unknown".to_string(),
        })?;

    let total_frames = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(count) => count,
        None => {
            let duration = stream
                .duration
                .as_deref()
                .or_else(|| probe.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d >= 0.0)
                .ok_or_else(|| DecodeError::Probe {
                    path: path.to_path_buf(),
                    reason: "neither frame count nor duration is known".to_string(),
                })?;
            warn!(
                "{} does not report a frame count, estimating from {:.2}s duration",
                path.display(),
                duration
            );
            (duration * fps).round() as u64
        }
    };

    Ok(VideoInfo {
        fps,
        total_frames,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

/// Parse an ffprobe rational such as `30000/1001` or a plain number
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };

    (value.is_finite() && value > 0.0).then_some(value)
}

struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    stderr_reader: Option<JoinHandle<String>>,
    path: PathBuf,
    width: u32,
    height: u32,
    stride: u64,
    frames_read: u64,
    finished: bool,
}

impl FfmpegFrameReader {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    fn current_index(&self) -> u64 {
        self.frames_read.saturating_mul(self.stride)
    }

    fn read_error(&self, reason: String) -> DecodeError {
        DecodeError::FrameRead {
            path: self.path.clone(),
            index: self.current_index(),
            reason,
        }
    }

    /// Reap the child after end of stream and surface a non-zero exit
    fn finish(&mut self) -> Result<(), DecodeError> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| self.read_error(format!("failed to wait for ffmpeg: {}", e)))?;
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            debug!(
                "ffmpeg finished {} after {} frames",
                self.path.display(),
                self.frames_read
            );
            Ok(())
        } else {
            Err(self.read_error(format!("ffmpeg exited with {}: {}", status, stderr.trim())))
        }
    }
}

impl FrameReader for FfmpegFrameReader {
    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        let mut buffer = vec![0_u8; self.frame_len()];
        let filled = read_full(&mut self.stdout, &mut buffer)
            .map_err(|e| self.read_error(format!("pipe read failed: {}", e)))?;

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }

        if filled < buffer.len() {
            let reason = format!("truncated frame ({} of {} bytes)", filled, buffer.len());
            self.finish()?;
            return Err(self.read_error(reason));
        }

        let frame = Frame::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| self.read_error("frame buffer has the wrong size".to_string()))?;
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Stopping ffmpeg for {} early", self.path.display());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        if let Some(handle) = self.stderr_reader.take() {
            let _ = handle.join();
        }
    }
}

/// Fill `buffer` from `reader`, stopping early only at end of stream
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
