use crate::errors::ScanError;
use crate::region::{NormalizedRegion, PixelRect};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel
    Rgb8,
    /// Packed 8-bit BGRA, 4 bytes per pixel (typical camera output)
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Bgra8 => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgra8 => "BGRA8",
        }
    }
}

/// One video frame as delivered by the capture side.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            sequence: 0,
            timestamp_us: 0,
            width,
            height,
            format,
            data,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_timestamp_us(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Buffer length implied by the dimensions and pixel format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::InvalidFrame(format!(
                "frame {} has zero dimension {}x{}",
                self.sequence, self.width, self.height
            )));
        }
        if self.data.len() != self.expected_len() {
            return Err(ScanError::InvalidFrame(format!(
                "frame {} carries {} bytes, expected {} for {}x{} {}",
                self.sequence,
                self.data.len(),
                self.expected_len(),
                self.width,
                self.height,
                self.format.as_str()
            )));
        }
        Ok(())
    }

    /// Copy the pixels under `region` into an owned RGB image.
    pub fn crop(&self, region: &NormalizedRegion) -> Result<CardImage, ScanError> {
        self.validate()?;

        let rect = region.to_pixel_rect(self.width, self.height);
        let bpp = self.format.bytes_per_pixel();
        let stride = self.width as usize * bpp;
        let data = &self.data;
        let format = self.format;

        let image = RgbImage::from_fn(rect.width, rect.height, |x, y| {
            let idx = (rect.y + y) as usize * stride + (rect.x + x) as usize * bpp;
            match format {
                PixelFormat::Rgb8 => Rgb([data[idx], data[idx + 1], data[idx + 2]]),
                PixelFormat::Bgra8 => Rgb([data[idx + 2], data[idx + 1], data[idx]]),
            }
        });

        Ok(CardImage {
            frame_sequence: self.sequence,
            source_rect: rect,
            image,
        })
    }
}

/// The card surface cut out of a frame, handed to text recognition.
#[derive(Debug, Clone)]
pub struct CardImage {
    pub frame_sequence: u64,
    pub source_rect: PixelRect,
    pub image: RgbImage,
}

impl CardImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One ranked reading of a text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCandidate {
    pub text: String,
    /// Recognizer confidence (0.0-1.0)
    pub confidence: f32,
}

/// A unit of recognized text with its alternates, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextFragment {
    pub candidates: Vec<TextCandidate>,
    /// Location within the cropped card image
    pub region: NormalizedRegion,
}

impl RawTextFragment {
    pub fn new(candidates: Vec<TextCandidate>, region: NormalizedRegion) -> Self {
        Self { candidates, region }
    }

    /// A fragment with a single reading.
    pub fn single(text: impl Into<String>, confidence: f32, region: NormalizedRegion) -> Self {
        Self {
            candidates: vec![TextCandidate {
                text: text.into(),
                confidence,
            }],
            region,
        }
    }

    pub fn best(&self) -> Option<&str> {
        self.candidates.first().map(|c| c.text.as_str())
    }
}

/// Closed range of acceptable width/height ratios for a card outline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectRatioWindow {
    pub min: f32,
    pub max: f32,
}

impl AspectRatioWindow {
    pub fn contains(&self, ratio: f32) -> bool {
        ratio >= self.min && ratio <= self.max
    }
}

/// Speed/precision trade-off requested from a rectangle tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingLevel {
    #[default]
    Fast,
    Accurate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32, format: PixelFormat) -> Frame {
        let bpp = format.bytes_per_pixel();
        let mut data = vec![0u8; width as usize * height as usize * bpp];
        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize * bpp;
                let (r, g, b) = (x as u8, y as u8, 7u8);
                match format {
                    PixelFormat::Rgb8 => data[idx..idx + 3].copy_from_slice(&[r, g, b]),
                    PixelFormat::Bgra8 => data[idx..idx + 4].copy_from_slice(&[b, g, r, 255]),
                }
            }
        }
        Frame::new(data, width, height, format)
    }

    #[test]
    fn test_validate_rejects_short_buffer() {
        let frame = Frame::new(vec![0; 10], 4, 4, PixelFormat::Rgb8);
        assert!(matches!(frame.validate(), Err(ScanError::InvalidFrame(_))));
    }

    #[test]
    fn test_crop_rgb_reads_expected_pixels() {
        let frame = gradient_frame(100, 50, PixelFormat::Rgb8);
        let region = NormalizedRegion::new(0.5, 0.2, 0.25, 0.4).unwrap();
        let card = frame.crop(&region).unwrap();

        assert_eq!(card.source_rect.x, 50);
        assert_eq!(card.source_rect.y, 10);
        assert_eq!(card.width(), 25);
        assert_eq!(card.height(), 20);
        assert_eq!(card.image.get_pixel(0, 0), &Rgb([50, 10, 7]));
        assert_eq!(card.image.get_pixel(24, 19), &Rgb([74, 29, 7]));
    }

    #[test]
    fn test_crop_bgra_swaps_channels() {
        let frame = gradient_frame(40, 40, PixelFormat::Bgra8);
        let card = frame.crop(&NormalizedRegion::full()).unwrap();
        assert_eq!(card.image.get_pixel(3, 5), &Rgb([3, 5, 7]));
    }

    #[test]
    fn test_fragment_best_is_first_candidate() {
        let fragment = RawTextFragment::new(
            vec![
                TextCandidate {
                    text: "4S39".to_string(),
                    confidence: 0.8,
                },
                TextCandidate {
                    text: "4539".to_string(),
                    confidence: 0.6,
                },
            ],
            NormalizedRegion::full(),
        );
        assert_eq!(fragment.best(), Some("4S39"));
    }

    #[test]
    fn test_tracking_level_defaults_to_fast() {
        assert_eq!(TrackingLevel::default(), TrackingLevel::Fast);
    }
}
