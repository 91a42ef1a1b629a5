//! Capability providers consumed by the scanning core
//!
//! Shape detection, text-region detection, rectangle tracking and text
//! recognition are supplied by the environment (a platform vision framework,
//! an OCR engine, or scripted fakes in tests). The core only sees these traits.

use crate::errors::ProviderError;
use crate::region::NormalizedRegion;
use crate::types::{AspectRatioWindow, CardImage, Frame, RawTextFragment, TrackingLevel};

/// Finds rectangular outlines whose aspect ratio falls inside a window.
pub trait RectangleDetector: Send {
    fn detect_rectangles(
        &mut self,
        frame: &Frame,
        window: &AspectRatioWindow,
    ) -> Result<Vec<NormalizedRegion>, ProviderError>;
}

/// Finds regions of a frame that hold text, without reading it.
pub trait TextRegionDetector: Send {
    fn detect_text_regions(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<NormalizedRegion>, ProviderError>;
}

/// Follows a known rectangle into a new frame.
///
/// `Ok(None)` means the rectangle was lost.
pub trait RectangleTracker: Send {
    fn track_rectangle(
        &mut self,
        previous: &NormalizedRegion,
        frame: &Frame,
        level: TrackingLevel,
    ) -> Result<Option<NormalizedRegion>, ProviderError>;
}

/// Reads text off a cropped card image, fragments in detected order.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &CardImage) -> Result<Vec<RawTextFragment>, ProviderError>;
}

/// The full set of providers a scan session needs.
pub struct Capabilities {
    pub rectangles: Box<dyn RectangleDetector>,
    pub text_regions: Box<dyn TextRegionDetector>,
    pub tracker: Box<dyn RectangleTracker>,
    pub recognizer: Box<dyn TextRecognizer>,
}

impl Capabilities {
    pub fn new(
        rectangles: impl RectangleDetector + 'static,
        text_regions: impl TextRegionDetector + 'static,
        tracker: impl RectangleTracker + 'static,
        recognizer: impl TextRecognizer + 'static,
    ) -> Self {
        Self {
            rectangles: Box::new(rectangles),
            text_regions: Box::new(text_regions),
            tracker: Box::new(tracker),
            recognizer: Box::new(recognizer),
        }
    }
}
