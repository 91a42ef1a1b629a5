//! Text recognition through the system `tesseract` binary (feature `tesseract`)

use crate::errors::ProviderError;
use crate::providers::TextRecognizer;
use crate::region::{NormalizedRegion, PixelRect};
use crate::types::{CardImage, RawTextFragment};
use rusty_tesseract::{Args, Image};
use std::collections::HashMap;

/// Crops whose short side is below this are upscaled before recognition.
const MIN_TEXT_DIMENSION: u32 = 200;

/// [`TextRecognizer`] backed by rusty-tesseract.
///
/// Tesseract reports a single reading per word, so every fragment carries one
/// candidate. Words come back ordered by block, line and word number.
pub struct TesseractRecognizer {
    args: Args,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        let mut config_variables = HashMap::new();
        config_variables.insert("tessedit_char_whitelist".to_string(), "0123456789".to_string());
        Self {
            args: Args {
                lang: "eng".to_string(),
                config_variables,
                dpi: Some(300),
                psm: Some(11), // sparse text
                oem: Some(3),
            },
        }
    }
}

impl TesseractRecognizer {
    pub fn new(args: Args) -> Self {
        Self { args }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, image: &CardImage) -> Result<Vec<RawTextFragment>, ProviderError> {
        let dynamic = image::DynamicImage::ImageRgb8(image.image.clone());

        let min_dimension = image.width().min(image.height());
        let scale = if min_dimension < MIN_TEXT_DIMENSION / 2 {
            4
        } else if min_dimension < MIN_TEXT_DIMENSION {
            2
        } else {
            1
        };
        let processed = if scale > 1 {
            dynamic.resize(
                image.width() * scale,
                image.height() * scale,
                image::imageops::FilterType::Lanczos3,
            )
        } else {
            dynamic
        };
        let (width, height) = (processed.width(), processed.height());

        let tess_image = Image::from_dynamic_image(&processed)
            .map_err(|e| ProviderError::unsupported_input(format!("tesseract image: {}", e)))?;
        let output = rusty_tesseract::image_to_data(&tess_image, &self.args)
            .map_err(|e| ProviderError::backend(format!("tesseract: {}", e)))?;

        let mut words: Vec<_> = output
            .data
            .into_iter()
            .filter(|d| !d.text.trim().is_empty() && d.conf > 0.0)
            .collect();
        words.sort_by(|a, b| {
            a.block_num
                .cmp(&b.block_num)
                .then(a.line_num.cmp(&b.line_num))
                .then(a.word_num.cmp(&b.word_num))
        });

        log::debug!(
            "Tesseract read {} words from frame {} crop",
            words.len(),
            image.frame_sequence
        );

        Ok(words
            .into_iter()
            .filter_map(|word| {
                let rect = PixelRect {
                    x: word.left.max(0) as u32,
                    y: word.top.max(0) as u32,
                    width: word.width.max(1) as u32,
                    height: word.height.max(1) as u32,
                };
                let region = NormalizedRegion::from_pixel_rect(rect, width, height).ok()?;
                let text: String = word.text.split_whitespace().collect();
                Some(RawTextFragment::single(text, word.conf / 100.0, region))
            })
            .collect())
    }
}
