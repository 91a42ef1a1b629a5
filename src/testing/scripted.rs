//! Scripted capability providers
//!
//! Each provider answers from a queue filled by the test. An empty queue is
//! reported as a provider failure, which the pipeline treats as "nothing this
//! frame". All four providers share one script, so a test keeps its
//! [`ScriptedProviders`] to push responses and inspect calls after handing
//! the providers to a session.

use crate::errors::ProviderError;
use crate::providers::{
    Capabilities, RectangleDetector, RectangleTracker, TextRecognizer, TextRegionDetector,
};
use crate::region::NormalizedRegion;
use crate::types::{AspectRatioWindow, CardImage, Frame, RawTextFragment, TrackingLevel};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted answer for one detection call.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectStep {
    /// Card-shaped rectangle with text inside it
    Card(NormalizedRegion),
    /// Card-shaped rectangle with no text inside
    Blank(NormalizedRegion),
    /// No rectangle at all
    Nothing,
}

/// Scripted answer for one tracking call.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStep {
    Moved(NormalizedRegion),
    Lost,
    Fail,
}

#[derive(Default)]
struct Script {
    detections: VecDeque<DetectStep>,
    tracks: VecDeque<TrackStep>,
    recognitions: VecDeque<Result<Vec<RawTextFragment>, ProviderError>>,
    pending_text: Option<Vec<NormalizedRegion>>,
    recognition_delay: Duration,
    recognized: Vec<CardImage>,
    track_levels: Vec<TrackingLevel>,
}

/// Shared script behind a set of fake providers.
#[derive(Clone, Default)]
pub struct ScriptedProviders {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProviders {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_detect_step(&self, step: DetectStep) {
        self.lock().detections.push_back(step);
    }

    /// `Some(card)` detects a card with text inside, `None` detects nothing.
    pub fn push_detection(&self, card: Option<NormalizedRegion>) {
        self.push_detect_step(card.map_or(DetectStep::Nothing, DetectStep::Card));
    }

    pub fn push_track(&self, step: TrackStep) {
        self.lock().tracks.push_back(step);
    }

    /// One recognition call returning `texts` as single-reading fragments laid
    /// out left to right.
    pub fn push_fragments(&self, texts: &[&str]) {
        self.push_recognition(fragments(texts));
    }

    pub fn push_recognition(&self, fragments: Vec<RawTextFragment>) {
        self.lock().recognitions.push_back(Ok(fragments));
    }

    pub fn push_recognition_error(&self, error: ProviderError) {
        self.lock().recognitions.push_back(Err(error));
    }

    /// Make every recognition call sleep first.
    pub fn set_recognition_delay(&self, delay: Duration) {
        self.lock().recognition_delay = delay;
    }

    /// Crops handed to the recognizer, in call order.
    pub fn recognized_crops(&self) -> Vec<CardImage> {
        self.lock().recognized.clone()
    }

    pub fn recognition_calls(&self) -> usize {
        self.lock().recognized.len()
    }

    /// Tracking levels the tracker was asked for, in call order.
    pub fn track_levels(&self) -> Vec<TrackingLevel> {
        self.lock().track_levels.clone()
    }

    /// Scripted responses not yet consumed: (detections, tracks, recognitions).
    pub fn remaining(&self) -> (usize, usize, usize) {
        let script = self.lock();
        (
            script.detections.len(),
            script.tracks.len(),
            script.recognitions.len(),
        )
    }

    /// Providers reading from this script.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::new(
            ScriptedRectangles(self.clone()),
            ScriptedTextRegions(self.clone()),
            ScriptedTracker(self.clone()),
            ScriptedRecognizer(self.clone()),
        )
    }
}

/// Single-reading fragments for `texts`, laid out left to right across the
/// number band of a card.
pub fn fragments(texts: &[&str]) -> Vec<RawTextFragment> {
    let count = texts.len().max(1) as f32;
    let width = 0.8 / count;
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let region = NormalizedRegion::new(0.1 + width * i as f32, 0.5, width, 0.1)
                .unwrap_or_else(|_| NormalizedRegion::full());
            RawTextFragment::single(*text, 0.9, region)
        })
        .collect()
}

fn number_band(card: &NormalizedRegion) -> Option<NormalizedRegion> {
    NormalizedRegion::new(
        card.x() + card.width() * 0.1,
        card.y() + card.height() * 0.45,
        card.width() * 0.8,
        card.height() * 0.15,
    )
    .ok()
}

struct ScriptedRectangles(ScriptedProviders);

impl RectangleDetector for ScriptedRectangles {
    fn detect_rectangles(
        &mut self,
        _frame: &Frame,
        _window: &AspectRatioWindow,
    ) -> Result<Vec<NormalizedRegion>, ProviderError> {
        let mut script = self.0.lock();
        let step = script
            .detections
            .pop_front()
            .ok_or_else(|| ProviderError::exhausted("rectangle detector"))?;

        let (rectangles, text) = match step {
            DetectStep::Card(card) => (vec![card], number_band(&card).into_iter().collect()),
            DetectStep::Blank(card) => (vec![card], Vec::new()),
            DetectStep::Nothing => (Vec::new(), Vec::new()),
        };
        script.pending_text = Some(text);
        Ok(rectangles)
    }
}

struct ScriptedTextRegions(ScriptedProviders);

impl TextRegionDetector for ScriptedTextRegions {
    fn detect_text_regions(
        &mut self,
        _frame: &Frame,
    ) -> Result<Vec<NormalizedRegion>, ProviderError> {
        self.0
            .lock()
            .pending_text
            .take()
            .ok_or_else(|| ProviderError::exhausted("text region detector"))
    }
}

struct ScriptedTracker(ScriptedProviders);

impl RectangleTracker for ScriptedTracker {
    fn track_rectangle(
        &mut self,
        _previous: &NormalizedRegion,
        _frame: &Frame,
        level: TrackingLevel,
    ) -> Result<Option<NormalizedRegion>, ProviderError> {
        let mut script = self.0.lock();
        script.track_levels.push(level);
        match script.tracks.pop_front() {
            Some(TrackStep::Moved(region)) => Ok(Some(region)),
            Some(TrackStep::Lost) => Ok(None),
            Some(TrackStep::Fail) => Err(ProviderError::backend("scripted tracking failure")),
            None => Err(ProviderError::exhausted("rectangle tracker")),
        }
    }
}

struct ScriptedRecognizer(ScriptedProviders);

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, image: &CardImage) -> Result<Vec<RawTextFragment>, ProviderError> {
        let (delay, response) = {
            let mut script = self.0.lock();
            script.recognized.push(image.clone());
            (script.recognition_delay, script.recognitions.pop_front())
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        response.unwrap_or_else(|| Err(ProviderError::exhausted("text recognizer")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderErrorKind;
    use crate::testing::card_frame;

    #[test]
    fn test_empty_script_is_exhausted() {
        let script = ScriptedProviders::new();
        let mut caps = script.capabilities();
        let window = crate::detector::CARD_ASPECT_RATIO_WINDOW;
        let err = caps
            .rectangles
            .detect_rectangles(&card_frame(1), &window)
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Exhausted);
    }

    #[test]
    fn test_card_step_reports_text_inside() {
        let card = NormalizedRegion::new(0.1, 0.2, 0.8, 0.5).unwrap();
        let script = ScriptedProviders::new();
        script.push_detection(Some(card));
        let mut caps = script.capabilities();
        let frame = card_frame(1);

        let rects = caps
            .rectangles
            .detect_rectangles(&frame, &crate::detector::CARD_ASPECT_RATIO_WINDOW)
            .unwrap();
        assert_eq!(rects, vec![card]);
        let text = caps.text_regions.detect_text_regions(&frame).unwrap();
        assert_eq!(text.len(), 1);
        assert!(card.contains(&text[0]));
    }

    #[test]
    fn test_fragments_are_ordered_left_to_right() {
        let parts = fragments(&["4539", "1488", "0343", "6467"]);
        assert_eq!(parts.len(), 4);
        assert!(parts.windows(2).all(|w| w[0].region.x() < w[1].region.x()));
        assert_eq!(parts[3].best(), Some("6467"));
    }
}
