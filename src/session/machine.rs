use crate::assert_invariant;
use crate::detector::CardGeometryDetector;
use crate::errors::ProviderError;
use crate::parser::ParseOutcome;
use crate::region::NormalizedRegion;
use crate::tracker::CardTracker;
use crate::types::{CardImage, Frame};

use super::{CancelHandle, ScanResult, SessionCallbacks, SessionId, SessionState, SessionStats};
use std::time::Instant;

/// The per-session state machine.
///
/// Only the lane that owns it mutates it. Extraction results re-enter through
/// [`SessionMachine::resolve`], which is the single place a session completes.
pub(crate) struct SessionMachine {
    id: SessionId,
    state: SessionState,
    detector: CardGeometryDetector,
    tracker: CardTracker,
    callbacks: SessionCallbacks,
    cancel: CancelHandle,
    stats: SessionStats,
    result: Option<ScanResult>,
    // Bumped on every tracking loss; a crop belongs to the generation it was taken in.
    tracking_generation: u64,
    in_flight_generation: Option<u64>,
    started_at: Instant,
}

impl SessionMachine {
    pub(crate) fn new(
        detector: CardGeometryDetector,
        tracker: CardTracker,
        callbacks: SessionCallbacks,
    ) -> Self {
        let id = SessionId::new();
        log::info!("Scan session {} started ({:?} tracking)", id, tracker.level());
        Self {
            id,
            state: SessionState::Searching,
            detector,
            tracker,
            callbacks,
            cancel: CancelHandle::new(),
            stats: SessionStats::default(),
            result: None,
            tracking_generation: 0,
            in_flight_generation: None,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub(crate) fn result(&self) -> Option<&ScanResult> {
        self.result.as_ref()
    }

    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub(crate) fn extraction_in_flight(&self) -> bool {
        self.in_flight_generation.is_some()
    }

    pub(crate) fn is_finished(&mut self) -> bool {
        self.observe_cancellation();
        self.state.is_terminal()
    }

    /// Advance by one frame.
    ///
    /// Returns the card crop to extract from when the card was tracked into
    /// this frame and no extraction is already running.
    pub(crate) fn advance(&mut self, frame: &Frame) -> Option<CardImage> {
        if self.is_finished() {
            return None;
        }
        self.stats.frames_processed += 1;

        match self.state.clone() {
            SessionState::Searching => {
                if let Some(region) = self.detector.detect(frame) {
                    self.stats.detections += 1;
                    self.transition(SessionState::Tracking(region), frame.sequence);
                    self.emit_region(Some(region));
                }
                None
            }
            SessionState::Tracking(previous) => match self.tracker.track(&previous, frame) {
                None => {
                    self.stats.tracking_losses += 1;
                    self.tracking_generation += 1;
                    self.transition(SessionState::Searching, frame.sequence);
                    self.emit_region(None);
                    None
                }
                Some(updated) => {
                    self.state = SessionState::Tracking(updated);
                    self.emit_region(Some(updated));

                    if self.extraction_in_flight() {
                        log::trace!(
                            "Frame {}: extraction still running, skipping",
                            frame.sequence
                        );
                        return None;
                    }

                    // The crop uses the region the tracker was seeded with.
                    match frame.crop(&previous) {
                        Ok(image) => {
                            self.in_flight_generation = Some(self.tracking_generation);
                            self.stats.extractions += 1;
                            Some(image)
                        }
                        Err(e) => {
                            log::warn!("Frame {} cannot be cropped: {}", frame.sequence, e);
                            None
                        }
                    }
                }
            },
            SessionState::Completed(_) | SessionState::Cancelled => None,
        }
    }

    /// Consume an extraction outcome for the crop taken from `frame_sequence`.
    ///
    /// Outcomes for a card that has since been lost are discarded, even if the
    /// session has found a card again by the time they arrive.
    pub(crate) fn resolve(
        &mut self,
        frame_sequence: u64,
        outcome: Result<ParseOutcome, ProviderError>,
    ) {
        let dispatched = self.in_flight_generation.take();

        if self.is_finished() {
            log::debug!(
                "Session {}: discarding extraction for frame {} ({})",
                self.id,
                frame_sequence,
                self.state.name()
            );
            return;
        }
        if dispatched != Some(self.tracking_generation) {
            log::debug!(
                "Session {}: discarding extraction for frame {}, card lost since dispatch",
                self.id,
                frame_sequence
            );
            return;
        }
        assert_invariant!(
            matches!(self.state, SessionState::Tracking(_)),
            "Extraction outcomes resolve only while tracking",
            "session"
        );

        match outcome {
            Ok(ParseOutcome::Accepted(number)) => {
                let result = ScanResult {
                    session_id: self.id,
                    number: number.clone(),
                    frame_sequence,
                    completed_at: chrono::Utc::now(),
                    elapsed_ms: self.started_at.elapsed().as_millis() as u64,
                };
                self.transition(SessionState::Completed(number.clone()), frame_sequence);
                log::info!(
                    "Scan session {} completed at frame {}: {}",
                    self.id,
                    frame_sequence,
                    number.masked()
                );
                self.result = Some(result);

                let on_result = self.callbacks.on_result.take();
                assert_invariant!(
                    on_result.is_some(),
                    "Result is emitted at most once",
                    "session"
                );
                if let Some(on_result) = on_result {
                    on_result(number.into_string());
                }
            }
            Ok(ParseOutcome::Malformed { quads }) => {
                self.stats.rejected_candidates += 1;
                log::debug!(
                    "Frame {}: no card number layout ({} four-digit groups)",
                    frame_sequence,
                    quads
                );
            }
            Ok(ParseOutcome::ChecksumFailed) => {
                self.stats.rejected_candidates += 1;
                log::debug!("Frame {}: candidate failed check digit", frame_sequence);
            }
            Err(e) => {
                self.stats.recognition_failures += 1;
                log::debug!("Frame {}: text recognition failed: {}", frame_sequence, e);
            }
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.cancel.cancel();
        self.observe_cancellation();
    }

    fn observe_cancellation(&mut self) {
        if self.cancel.is_cancelled() && !self.state.is_terminal() {
            self.state = SessionState::Cancelled;
            log::info!("Scan session {} cancelled", self.id);
        }
    }

    fn transition(&mut self, next: SessionState, frame_sequence: u64) {
        assert_invariant!(
            !self.state.is_terminal(),
            "Terminal session state never transitions",
            "session"
        );
        log::debug!(
            "Session {} frame {}: {} -> {}",
            self.id,
            frame_sequence,
            self.state.name(),
            next.name()
        );
        self.state = next;
    }

    fn emit_region(&mut self, region: Option<NormalizedRegion>) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(region) = &region {
            assert_invariant!(
                region.x() >= 0.0
                    && region.max_x() <= 1.0 + f32::EPSILON
                    && region.max_y() <= 1.0 + f32::EPSILON,
                "Emitted regions lie inside the unit square",
                "session"
            );
        }
        if let Some(on_region_update) = self.callbacks.on_region_update.as_mut() {
            on_region_update(region);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScannerConfig;
    use crate::parser::DigitCandidateParser;
    use crate::session::build_parts;
    use crate::testing::{card_frame, fragments, ScriptedProviders, TrackStep};
    use std::sync::{Arc, Mutex};

    fn card() -> NormalizedRegion {
        NormalizedRegion::new(0.1, 0.2, 0.8, 0.5).unwrap()
    }

    fn accepted() -> ParseOutcome {
        DigitCandidateParser::default().parse_detailed(&fragments(&["4539148803436467"]))
    }

    fn machine(script: &ScriptedProviders) -> (SessionMachine, Arc<Mutex<Vec<String>>>) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        let callbacks = SessionCallbacks::new(move |number| sink.lock().unwrap().push(number));
        let (machine, _extractor) =
            build_parts(script.capabilities(), &ScannerConfig::default(), callbacks).unwrap();
        (machine, results)
    }

    #[test]
    fn test_outcome_after_tracking_loss_is_discarded() {
        let script = ScriptedProviders::new();
        script.push_detection(Some(card()));
        script.push_track(TrackStep::Moved(card()));
        script.push_track(TrackStep::Lost);

        let (mut machine, results) = machine(&script);
        assert!(machine.advance(&card_frame(1)).is_none());
        let crop = machine.advance(&card_frame(2)).expect("crop dispatched");
        assert!(machine.advance(&card_frame(3)).is_none());
        assert_eq!(machine.state(), &SessionState::Searching);
        assert!(machine.extraction_in_flight());

        machine.resolve(crop.frame_sequence, Ok(accepted()));

        assert_eq!(machine.state(), &SessionState::Searching);
        assert!(machine.result().is_none());
        assert!(results.lock().unwrap().is_empty());
        assert!(!machine.extraction_in_flight());
    }

    #[test]
    fn test_outcome_from_earlier_card_discarded_after_redetection() {
        let script = ScriptedProviders::new();
        script.push_detection(Some(card()));
        script.push_track(TrackStep::Moved(card()));
        script.push_track(TrackStep::Lost);
        script.push_detection(Some(card()));

        let (mut machine, results) = machine(&script);
        machine.advance(&card_frame(1));
        let crop = machine.advance(&card_frame(2)).expect("crop dispatched");
        machine.advance(&card_frame(3));
        machine.advance(&card_frame(4));
        assert_eq!(machine.state(), &SessionState::Tracking(card()));

        machine.resolve(crop.frame_sequence, Ok(accepted()));

        assert_eq!(machine.state(), &SessionState::Tracking(card()));
        assert!(results.lock().unwrap().is_empty());
    }

    #[test]
    fn test_outcome_while_still_tracking_completes() {
        let script = ScriptedProviders::new();
        script.push_detection(Some(card()));
        script.push_track(TrackStep::Moved(card()));
        script.push_track(TrackStep::Moved(card()));

        let (mut machine, results) = machine(&script);
        machine.advance(&card_frame(1));
        let crop = machine.advance(&card_frame(2)).expect("crop dispatched");
        assert!(machine.advance(&card_frame(3)).is_none());

        machine.resolve(crop.frame_sequence, Ok(accepted()));

        assert!(matches!(machine.state(), SessionState::Completed(_)));
        assert_eq!(machine.result().map(|r| r.frame_sequence), Some(2));
        assert_eq!(*results.lock().unwrap(), vec!["4539148803436467".to_string()]);
    }
}
