use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, RgbaImage};

const BYTES_PER_PIXEL: usize = 4;
const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// A single picture sampled from a live video source.
///
/// Pixels are tightly packed RGBA8, row-major, `width * height * 4` bytes.
/// A frame is owned by whoever captured it until it is handed to a decoder
/// and is not kept after decoding.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        captured_at_ms: i64,
        seq: u64,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(FrameError::PixelLength {
                got: pixels.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            captured_at_ms,
            seq,
        })
    }

    /// Take ownership of an already-rendered RGBA image.
    pub fn from_rgba(image: RgbaImage, captured_at_ms: i64, seq: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
            captured_at_ms,
            seq,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grayscale copy used by in-process decoders.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
            let (r, g, b) = (
                self.pixels[i] as u32,
                self.pixels[i + 1] as u32,
                self.pixels[i + 2] as u32,
            );
            // ITU-R BT.601 luma, integer weights summing to 1000.
            image::Luma([((r * 299 + g * 587 + b * 114) / 1000) as u8])
        })
    }

    // -- Encoding ---------------------------------------------------------------

    /// Compress to JPEG. Alpha is dropped; `quality` must be in 1..=100.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        if quality == 0 || quality > 100 {
            return Err(FrameError::Quality(quality));
        }
        if self.is_empty() {
            return Err(FrameError::Empty);
        }
        let rgba = RgbaImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or(
            FrameError::PixelLength {
                got: self.pixels.len(),
                expected: self.width as usize * self.height as usize * BYTES_PER_PIXEL,
            },
        )?;
        let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

        let mut out = Vec::with_capacity(self.pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode_image(&rgb)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out)
    }

    /// JPEG wrapped as a `data:image/jpeg;base64,...` URL, the shape the
    /// decode endpoint expects in its `image` field.
    pub fn to_data_url(&self, quality: u8) -> Result<String, FrameError> {
        let jpeg = self.encode_jpeg(quality)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
        Ok(format!("{DATA_URL_PREFIX}{encoded}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("pixel buffer has {got} bytes, expected {expected}")]
    PixelLength { got: usize, expected: usize },
    #[error("frame has zero width or height")]
    Empty,
    #[error("jpeg quality {0} outside 1..=100")]
    Quality(u8),
    #[error("jpeg encoding failed: {0}")]
    Encode(String),
}
