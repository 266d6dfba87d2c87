#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Decoder tests against real ffmpeg/ffprobe binaries.
// Skipped when ffmpeg is not installed.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;
use video_search::config::SamplingConfig;
use video_search::video::{DecodeError, FfmpegDecoder, FrameSampler, VideoDecoder};

fn available_decoder() -> Option<FfmpegDecoder> {
    let decoder = FfmpegDecoder::new(&SamplingConfig::default());
    if decoder.is_available() {
        Some(decoder)
    } else {
        eprintln!("ffmpeg/ffprobe not found, skipping");
        None
    }
}

/// Render a synthetic test pattern clip of `seconds` at `fps`
fn generate_clip(dir: &Path, seconds: u32, fps: u32) -> PathBuf {
    let output = dir.join("pattern.mp4");
    let status = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=duration={}:size=64x48:rate={}", seconds, fps))
        .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
        .arg(&output)
        .stdin(Stdio::null())
        .status()
        .expect("ffmpeg should start");
    assert!(status.success(), "ffmpeg failed to render test clip");
    output
}

#[test]
fn probe_reads_geometry_and_frame_count() {
    let Some(decoder) = available_decoder() else {
        return;
    };
    let temp_dir = TempDir::new().expect("should create temp dir");
    let clip = generate_clip(temp_dir.path(), 3, 10);

    let info = decoder.probe(&clip).expect("should probe clip");

    assert_eq!((info.width, info.height), (64, 48));
    assert!((info.fps - 10.0).abs() < 1e-6);
    assert_eq!(info.total_frames, 30);
    assert!((info.duration_secs() - 3.0).abs() < 1e-6);
}

#[test]
fn sampler_yields_one_frame_per_interval() {
    let Some(decoder) = available_decoder() else {
        return;
    };
    let temp_dir = TempDir::new().expect("should create temp dir");
    let clip = generate_clip(temp_dir.path(), 3, 10);
    let sampler = FrameSampler::new(&decoder);

    let mut reported = Vec::new();
    let mut record = |fraction: f64| reported.push(fraction);
    let frames: Vec<_> = sampler
        .sample(&clip, 1.0, Some(&mut record))
        .expect("should open clip")
        .collect::<Result<_, _>>()
        .expect("should decode frames");

    let indices: Vec<u64> = frames.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 10, 20]);
    assert!(
        frames
            .iter()
            .all(|f| f.image.dimensions() == (64, 48))
    );
    assert_eq!(reported.last(), Some(&1.0));
}

#[test]
fn early_drop_releases_the_decoder() {
    let Some(decoder) = available_decoder() else {
        return;
    };
    let temp_dir = TempDir::new().expect("should create temp dir");
    let clip = generate_clip(temp_dir.path(), 10, 25);
    let sampler = FrameSampler::new(&decoder);

    let mut frames = sampler.sample(&clip, 0.04, None).expect("should open clip");
    let first = frames
        .next()
        .expect("clip has frames")
        .expect("first frame decodes");
    assert_eq!(first.index, 0);
    assert!(frames.is_open());
    drop(frames);

    // The clip can be opened again right away
    let again = sampler
        .sample(&clip, 5.0, None)
        .expect("should reopen clip")
        .count();
    assert_eq!(again, 2);
}

#[test]
fn missing_file_is_an_open_error() {
    let decoder = FfmpegDecoder::new(&SamplingConfig::default());
    let sampler = FrameSampler::new(&decoder);

    let result = sampler.sample(Path::new("/no/such/video.mp4"), 1.0, None);
    assert!(matches!(result, Err(DecodeError::Open { .. })));
}

#[test]
fn non_video_file_is_rejected() {
    let Some(decoder) = available_decoder() else {
        return;
    };
    let temp_dir = TempDir::new().expect("should create temp dir");
    let text = temp_dir.path().join("notes.mp4");
    std::fs::write(&text, "definitely not a video").expect("should write file");

    let result = decoder.probe(&text);
    assert!(result.is_err(), "probe should fail: {:?}", result);
}
