use async_trait::async_trait;
use image::GrayImage;
use loyalty_client_common::frame::Frame;
use tracing::{debug, error};

use super::{Decoder, ScanResult};

/// In-process decoder built on `rqrr`.
///
/// Tries the frame as captured first and, when `enhance` is set, once more
/// on a copy with its grey levels stretched to the full range. Grids that are
/// detected but fail to decode are common while a code is moving into view
/// and are reported as [`ScanResult::NotFound`].
pub struct LocalDecoder {
    enhance: bool,
}

impl LocalDecoder {
    pub fn new(enhance: bool) -> Self {
        Self { enhance }
    }

    fn decode_luma(&self, gray: &GrayImage) -> ScanResult {
        if let Some(payload) = find_code(gray) {
            return ScanResult::found(payload, "rqrr");
        }
        if self.enhance {
            if let Some(payload) = stretch_levels(gray).and_then(|g| find_code(&g)) {
                return ScanResult::found(payload, "rqrr+enhance");
            }
        }
        ScanResult::NotFound
    }
}

/// Map the darkest pixel to 0 and the brightest to 255. `None` for a flat
/// image or one that already spans the full range.
fn stretch_levels(gray: &GrayImage) -> Option<GrayImage> {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max <= min || (min == 0 && max == u8::MAX) {
        return None;
    }
    let span = u32::from(max - min);
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = (u32::from(p.0[0] - min) * 255 / span) as u8;
    }
    Some(out)
}

fn find_code(gray: &GrayImage) -> Option<String> {
    let (width, height) = gray.dimensions();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            gray.get_pixel(x as u32, y as u32).0[0]
        });
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_, content)) => return Some(content),
            Err(e) => debug!(error = ?e, "grid failed to decode, discarding"),
        }
    }
    None
}

#[async_trait]
impl Decoder for LocalDecoder {
    async fn decode(&self, frame: Frame) -> ScanResult {
        if frame.is_empty() {
            return ScanResult::NotFound;
        }
        let gray = frame.to_luma();
        drop(frame);
        let decoder = LocalDecoder::new(self.enhance);
        match tokio::task::spawn_blocking(move || decoder.decode_luma(&gray)).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "spawn_blocking failed");
                ScanResult::error(format!("local decode task failed: {e}"))
            }
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}
