use std::path::Path;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::errors::PilotResult;

/// Neither screenshot dimension may exceed this after encoding. A token and
/// bandwidth budget, not a correctness requirement.
pub const MAX_WIDTH: u32 = 1920;
pub const MAX_HEIGHT: u32 = 1080;
pub const JPEG_QUALITY: u8 = 85;

/// Reads the screenshot at `path` and returns it as base64: downscaled to fit
/// the dimension budget, flattened to RGB, and re-encoded as JPEG. If any of
/// that fails the original file bytes are base64-encoded unmodified —
/// correctness over optimization. Only an unreadable file is an error.
pub fn encode_screenshot(path: &Path) -> PilotResult<String> {
    match optimize(path) {
        Ok(encoded) => Ok(encoded),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "optimization failed, falling back to raw bytes");
            let bytes = std::fs::read(path)?;
            Ok(B64.encode(bytes))
        }
    }
}

fn optimize(path: &Path) -> PilotResult<String> {
    let mut img = image::open(path)?;

    if img.width() > MAX_WIDTH || img.height() > MAX_HEIGHT {
        img = img.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3);
    }

    // JPEG has no alpha or palette; flatten to 3-channel color.
    let rgb = img.to_rgb8();

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;

    Ok(B64.encode(&buffer))
}
