use super::*;
use crate::video::{Frame, FrameReader, VideoInfo};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Solid frames whose red channel carries the source frame index
struct MarkerDecoder {
    info: VideoInfo,
    open_readers: Arc<AtomicUsize>,
}

struct MarkerReader {
    total_frames: u64,
    stride: u64,
    next_index: u64,
    open_readers: Arc<AtomicUsize>,
}

impl MarkerDecoder {
    fn new(fps: f64, total_frames: u64) -> Self {
        Self {
            info: VideoInfo {
                fps,
                total_frames,
                width: 2,
                height: 2,
            },
            open_readers: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl VideoDecoder for MarkerDecoder {
    fn probe(&self, path: &Path) -> Result<VideoInfo, DecodeError> {
        if path.ends_with("broken.mp4") {
            return Err(DecodeError::Open {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(self.info)
    }

    fn open(
        &self,
        _path: &Path,
        info: &VideoInfo,
        stride: u64,
    ) -> Result<Box<dyn FrameReader>, DecodeError> {
        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MarkerReader {
            total_frames: info.total_frames,
            stride,
            next_index: 0,
            open_readers: Arc::clone(&self.open_readers),
        }))
    }
}

impl FrameReader for MarkerReader {
    fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.next_index >= self.total_frames {
            return Ok(None);
        }
        let marker = (self.next_index % 256) as u8;
        self.next_index += self.stride;
        Ok(Some(Frame::from_pixel(2, 2, image::Rgb([marker, 0, 0]))))
    }
}

impl Drop for MarkerReader {
    fn drop(&mut self) {
        self.open_readers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Captions each frame with a scripted line chosen by its marker, recording call order
struct ScriptedCaptioner {
    script: Vec<(u8, &'static str)>,
    fail_on: Option<u8>,
    seen: Mutex<Vec<u8>>,
}

impl ScriptedCaptioner {
    fn new(script: Vec<(u8, &'static str)>) -> Self {
        Self {
            script,
            fail_on: None,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl FrameCaptioner for ScriptedCaptioner {
    fn caption(&self, frame: &Frame) -> Result<String, ModelError> {
        let marker = frame.get_pixel(0, 0).0[0];
        self.seen.lock().expect("lock poisoned").push(marker);

        if self.fail_on == Some(marker) {
            return Err(ModelError::Request("vision model crashed".to_string()));
        }

        Ok(self
            .script
            .iter()
            .find(|(m, _)| *m == marker)
            .map_or_else(|| format!("frame {}", marker), |(_, line)| (*line).to_string()))
    }
}

/// Counts bytes into a tiny vector; rejects empty input like some hosted models do
struct LengthEmbedder {
    reject_empty: bool,
    output_len: usize,
}

impl TextEmbedder for LengthEmbedder {
    fn dimension(&self) -> usize {
        3
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        if self.reject_empty && text.is_empty() {
            return Err(ModelError::EmptyEmbedding);
        }
        let mut vector = vec![text.len() as f32, text.matches(' ').count() as f32, 1.0];
        vector.resize(self.output_len, 0.0);
        Ok(vector)
    }
}

const EMBEDDER: LengthEmbedder = LengthEmbedder {
    reject_empty: false,
    output_len: 3,
};

#[test]
fn summary_joins_captions_in_order() {
    assert_eq!(
        synthesize_summary(&["a cat sleeping", "a cat sleeping", "a cat waking up"]),
        "a cat sleeping. a cat sleeping. a cat waking up"
    );
    assert_eq!(synthesize_summary(&["only one"]), "only one");
    assert_eq!(synthesize_summary::<&str>(&[]), "");
}

#[test]
fn process_captions_every_sampled_frame_in_order() {
    let decoder = MarkerDecoder::new(10.0, 50);
    let captioner = ScriptedCaptioner::new(vec![
        (0, "a cat sleeping"),
        (20, "a cat sleeping"),
        (40, "a cat waking up"),
    ]);
    let indexer = VideoIndexer::new(&decoder, &captioner, &EMBEDDER);

    let indexed = indexer
        .process(Path::new("cat.mp4"), 2.0, None)
        .expect("should process video");

    assert_eq!(
        indexed.summary,
        "a cat sleeping. a cat sleeping. a cat waking up"
    );
    assert_eq!(indexed.frames_captioned, 3);
    assert_eq!(
        *captioner.seen.lock().expect("lock poisoned"),
        vec![0, 20, 40]
    );
    assert_eq!(
        indexed.embedding,
        EMBEDDER.embed(&indexed.summary).expect("should embed")
    );
    assert_eq!(decoder.open_readers.load(Ordering::SeqCst), 0);
}

#[test]
fn progress_reaches_completion() {
    let decoder = MarkerDecoder::new(10.0, 40);
    let captioner = ScriptedCaptioner::new(Vec::new());
    let indexer = VideoIndexer::new(&decoder, &captioner, &EMBEDDER);

    let mut reported = Vec::new();
    let mut record = |fraction: f64| reported.push(fraction);
    indexer
        .process(Path::new("clip.mp4"), 1.0, Some(&mut record))
        .expect("should process video");

    assert_eq!(reported.last(), Some(&1.0));
    assert!(reported.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn caption_failure_releases_decoder_and_stops() {
    let decoder = MarkerDecoder::new(10.0, 100);
    let mut captioner = ScriptedCaptioner::new(Vec::new());
    captioner.fail_on = Some(20);
    let indexer = VideoIndexer::new(&decoder, &captioner, &EMBEDDER);

    let result = indexer.process(Path::new("clip.mp4"), 1.0, None);

    assert!(matches!(
        result,
        Err(ProcessingError::Model {
            source: ModelError::Request(_),
            ..
        })
    ));
    assert_eq!(*captioner.seen.lock().expect("lock poisoned"), vec![0, 10, 20]);
    assert_eq!(decoder.open_readers.load(Ordering::SeqCst), 0);
}

#[test]
fn unreadable_container_is_a_decode_error() {
    let decoder = MarkerDecoder::new(10.0, 100);
    let captioner = ScriptedCaptioner::new(Vec::new());
    let indexer = VideoIndexer::new(&decoder, &captioner, &EMBEDDER);

    let result = indexer.process(Path::new("uploads/broken.mp4"), 1.0, None);
    assert!(matches!(
        result,
        Err(ProcessingError::Decode(DecodeError::Open { .. }))
    ));
    assert!(captioner.seen.lock().expect("lock poisoned").is_empty());
}

#[test]
fn empty_video_embeds_empty_summary() {
    let decoder = MarkerDecoder::new(30.0, 0);
    let captioner = ScriptedCaptioner::new(Vec::new());
    let indexer = VideoIndexer::new(&decoder, &captioner, &EMBEDDER);

    let indexed = indexer
        .process(Path::new("empty.mp4"), 2.0, None)
        .expect("empty summary is still embeddable");
    assert_eq!(indexed.summary, "");
    assert_eq!(indexed.frames_captioned, 0);
}

#[test]
fn empty_summary_rejected_by_embedder_is_reported() {
    let decoder = MarkerDecoder::new(30.0, 0);
    let captioner = ScriptedCaptioner::new(Vec::new());
    let embedder = LengthEmbedder {
        reject_empty: true,
        output_len: 3,
    };
    let indexer = VideoIndexer::new(&decoder, &captioner, &embedder);

    let result = indexer.process(Path::new("empty.mp4"), 2.0, None);
    assert!(matches!(
        result,
        Err(ProcessingError::EmptySummary {
            source: ModelError::EmptyEmbedding,
            ..
        })
    ));
}

#[test]
fn embedding_of_wrong_dimension_is_rejected() {
    let decoder = MarkerDecoder::new(10.0, 10);
    let captioner = ScriptedCaptioner::new(Vec::new());
    let embedder = LengthEmbedder {
        reject_empty: false,
        output_len: 5,
    };
    let indexer = VideoIndexer::new(&decoder, &captioner, &embedder);

    let result = indexer.process(Path::new("clip.mp4"), 1.0, None);
    assert!(matches!(
        result,
        Err(ProcessingError::Model {
            source: ModelError::DimensionMismatch {
                expected: 3,
                actual: 5
            },
            ..
        })
    ));
}

#[test]
fn invalid_interval_is_rejected_before_decoding() {
    let decoder = MarkerDecoder::new(10.0, 10);
    let captioner = ScriptedCaptioner::new(Vec::new());
    let indexer = VideoIndexer::new(&decoder, &captioner, &EMBEDDER);

    for interval in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let result = indexer.process(Path::new("clip.mp4"), interval, None);
        assert!(matches!(result, Err(ProcessingError::InvalidInterval(_))));
    }
    assert!(captioner.seen.lock().expect("lock poisoned").is_empty());
}
