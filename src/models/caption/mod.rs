
use std::io::Cursor;
use std::sync::LazyLock;

use fancy_regex::Regex;
use image::ImageFormat;
use image::imageops::FilterType;

use super::ModelError;
use crate::video::Frame;

/// The single question asked of the vision model for every frame
pub const CAPTION_QUESTION: &str = "describe the image in detail";

static CONTROL_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\|[^|>]*\|>|</?s>|<pad>|<unk>|\[(?:PAD|CLS|SEP|UNK|MASK)\]")
        .expect("control token pattern is valid")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Strip model control tokens from generated text and collapse whitespace
#[inline]
pub fn clean_caption(raw: &str) -> String {
    let without_tokens = CONTROL_TOKENS.replace_all(raw, " ");
    WHITESPACE
        .replace_all(&without_tokens, " ")
        .trim()
        .to_string()
}

/// PNG-encode a frame, downscaling it first so its longest side is at most `max_dimension`
#[inline]
pub fn encode_frame_png(frame: &Frame, max_dimension: u32) -> Result<Vec<u8>, ModelError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(ModelError::FrameEncoding("frame has no pixels".to_string()));
    }

    let mut png = Vec::new();
    let longest = frame.width().max(frame.height());

    if max_dimension > 0 && longest > max_dimension {
        let scale = f64::from(max_dimension) / f64::from(longest);
        let width = ((f64::from(frame.width()) * scale).round() as u32).max(1);
        let height = ((f64::from(frame.height()) * scale).round() as u32).max(1);
        let resized = image::imageops::resize(frame, width, height, FilterType::Triangle);
        resized
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| ModelError::FrameEncoding(e.to_string()))?;
    } else {
        frame
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| ModelError::FrameEncoding(e.to_string()))?;
    }

    Ok(png)
}
