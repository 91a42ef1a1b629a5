//! Card outline detection
//!
//! A frame holds a card when the shape detector reports a card-proportioned
//! rectangle and the text detector reports at least one text region lying
//! entirely inside it. The text check is what separates a card from any other
//! rectangular object in view.

use crate::providers::{RectangleDetector, TextRegionDetector};
use crate::region::NormalizedRegion;
use crate::types::{AspectRatioWindow, Frame};

/// ISO/IEC 7810 ID-1 card width over height (85.60mm / 53.98mm).
pub const CARD_ASPECT_RATIO: f32 = 85.60 / 53.98;

/// Accepted card proportions: 5% narrower to 10% wider than ID-1.
pub const CARD_ASPECT_RATIO_WINDOW: AspectRatioWindow = AspectRatioWindow {
    min: CARD_ASPECT_RATIO * 0.95,
    max: CARD_ASPECT_RATIO * 1.10,
};

/// Per-frame card detection over two capability providers.
pub struct CardGeometryDetector {
    rectangles: Box<dyn RectangleDetector>,
    text_regions: Box<dyn TextRegionDetector>,
}

impl CardGeometryDetector {
    pub fn new(
        rectangles: Box<dyn RectangleDetector>,
        text_regions: Box<dyn TextRegionDetector>,
    ) -> Self {
        Self {
            rectangles,
            text_regions,
        }
    }

    /// Region of the card in `frame`, if one is visible.
    ///
    /// Provider failures count as "nothing found" for this frame.
    pub fn detect(&mut self, frame: &Frame) -> Option<NormalizedRegion> {
        let rectangles = match self
            .rectangles
            .detect_rectangles(frame, &CARD_ASPECT_RATIO_WINDOW)
        {
            Ok(rectangles) => rectangles,
            Err(e) => {
                log::debug!("Rectangle detection failed on frame {}: {}", frame.sequence, e);
                return None;
            }
        };

        let candidate = rectangles.into_iter().next()?;

        let text_regions = match self.text_regions.detect_text_regions(frame) {
            Ok(regions) => regions,
            Err(e) => {
                log::debug!("Text region detection failed on frame {}: {}", frame.sequence, e);
                return None;
            }
        };

        log::trace!(
            "Frame {}: rectangle {:?}, {} text regions",
            frame.sequence,
            candidate,
            text_regions.len()
        );

        if text_regions.iter().any(|text| candidate.contains(text)) {
            Some(candidate)
        } else {
            None
        }
    }
}
