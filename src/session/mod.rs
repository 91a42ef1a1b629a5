//! Scan sessions
//!
//! A session starts in `Searching`, moves to `Tracking` once a card is
//! detected, falls back to `Searching` when the tracker loses it, and ends in
//! `Completed` the first time a tracked frame yields a checksum-valid number.
//!
//! Two drivers share the same state machine:
//! - [`ScanSession`] runs everything, extraction included, on the caller's
//!   thread inside `submit_frame`.
//! - [`ScanLane`] owns the session on a dedicated thread, drops frames while
//!   busy and runs extraction on a separate worker.

pub mod lane;
mod machine;

pub use lane::{LaneHandle, ScanLane};

use crate::config::ScannerConfig;
use crate::detector::CardGeometryDetector;
use crate::errors::ScanError;
use crate::extract::CardTextExtractor;
use crate::parser::{CandidateNumber, DigitCandidateParser};
use crate::providers::Capabilities;
use crate::region::NormalizedRegion;
use crate::tracker::CardTracker;
use crate::types::Frame;
use machine::SessionMachine;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a session stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Searching,
    Tracking(NormalizedRegion),
    Completed(CandidateNumber),
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed(_) | SessionState::Cancelled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Searching => "searching",
            SessionState::Tracking(_) => "tracking",
            SessionState::Completed(_) => "completed",
            SessionState::Cancelled => "cancelled",
        }
    }
}

/// Identifier carried in every log line of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub detections: u64,
    pub tracking_losses: u64,
    pub extractions: u64,
    pub rejected_candidates: u64,
    pub recognition_failures: u64,
}

/// Record of a completed scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub session_id: SessionId,
    pub number: CandidateNumber,
    /// Frame whose crop produced the number
    pub frame_sequence: u64,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub elapsed_ms: u64,
}

type ResultCallback = Box<dyn FnOnce(String) + Send>;
type RegionCallback = Box<dyn FnMut(Option<NormalizedRegion>) + Send>;

/// Owner callbacks: the terminal result and overlay region updates.
pub struct SessionCallbacks {
    on_result: Option<ResultCallback>,
    on_region_update: Option<RegionCallback>,
}

impl SessionCallbacks {
    /// `on_result` receives the validated 16-digit number, exactly once.
    pub fn new(on_result: impl FnOnce(String) + Send + 'static) -> Self {
        Self {
            on_result: Some(Box::new(on_result)),
            on_region_update: None,
        }
    }

    /// Called with the tracked region whenever it changes, `None` when cleared.
    pub fn on_region_update(
        mut self,
        on_region_update: impl FnMut(Option<NormalizedRegion>) + Send + 'static,
    ) -> Self {
        self.on_region_update = Some(Box::new(on_region_update));
        self
    }
}

/// Cross-thread cancellation flag for a session.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) fn build_parts(
    capabilities: Capabilities,
    config: &ScannerConfig,
    callbacks: SessionCallbacks,
) -> Result<(SessionMachine, CardTextExtractor), ScanError> {
    config.validate()?;

    let Capabilities {
        rectangles,
        text_regions,
        tracker,
        recognizer,
    } = capabilities;

    let machine = SessionMachine::new(
        CardGeometryDetector::new(rectangles, text_regions),
        CardTracker::new(tracker, config.tracking.level),
        callbacks,
    );
    let extractor = CardTextExtractor::new(
        recognizer,
        DigitCandidateParser::new(config.parser.max_alternates),
    );
    Ok((machine, extractor))
}

/// Single-lane scan session: every call runs on the caller's thread.
pub struct ScanSession {
    machine: SessionMachine,
    extractor: CardTextExtractor,
}

impl ScanSession {
    pub fn start(
        capabilities: Capabilities,
        config: &ScannerConfig,
        callbacks: SessionCallbacks,
    ) -> Result<Self, ScanError> {
        let (machine, extractor) = build_parts(capabilities, config, callbacks)?;
        Ok(Self { machine, extractor })
    }

    /// Feed one frame. Ignored once the session is completed or cancelled.
    pub fn submit_frame(&mut self, frame: &Frame) {
        if let Some(image) = self.machine.advance(frame) {
            let outcome = self.extractor.extract(&image);
            self.machine.resolve(image.frame_sequence, outcome);
        }
    }

    /// Stop processing; no callback fires afterwards.
    pub fn cancel(&mut self) {
        self.machine.cancel();
    }

    /// Handle for cancelling from another thread between frames.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.machine.cancel_handle()
    }

    pub fn id(&self) -> SessionId {
        self.machine.id()
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn stats(&self) -> &SessionStats {
        self.machine.stats()
    }

    pub fn result(&self) -> Option<&ScanResult> {
        self.machine.result()
    }

    pub fn is_finished(&mut self) -> bool {
        self.machine.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{card_frame, ScriptedProviders, TrackStep};
    use std::sync::Mutex;

    fn region(x: f32, y: f32, w: f32, h: f32) -> NormalizedRegion {
        NormalizedRegion::new(x, y, w, h).unwrap()
    }

    fn recorder() -> (
        SessionCallbacks,
        Arc<Mutex<Vec<String>>>,
        Arc<Mutex<Vec<Option<NormalizedRegion>>>>,
    ) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let regions = Arc::new(Mutex::new(Vec::new()));
        let results_sink = results.clone();
        let regions_sink = regions.clone();
        let callbacks =
            SessionCallbacks::new(move |number| results_sink.lock().unwrap().push(number))
                .on_region_update(move |r| regions_sink.lock().unwrap().push(r));
        (callbacks, results, regions)
    }

    #[test]
    fn test_tracking_loss_returns_to_searching() {
        let card = region(0.1, 0.2, 0.8, 0.5);
        let script = ScriptedProviders::new();
        script.push_detection(Some(card));
        script.push_track(TrackStep::Lost);

        let (callbacks, results, regions) = recorder();
        let mut session =
            ScanSession::start(script.capabilities(), &ScannerConfig::default(), callbacks)
                .unwrap();

        session.submit_frame(&card_frame(1));
        assert_eq!(session.state(), &SessionState::Tracking(card));

        session.submit_frame(&card_frame(2));
        assert_eq!(session.state(), &SessionState::Searching);
        assert_eq!(*regions.lock().unwrap(), vec![Some(card), None]);
        assert!(results.lock().unwrap().is_empty());
        assert_eq!(session.stats().tracking_losses, 1);
    }

    #[test]
    fn test_crop_uses_region_before_tracking_update() {
        let detected = region(0.0, 0.0, 0.5, 0.5);
        let moved = region(0.5, 0.5, 0.5, 0.5);
        let script = ScriptedProviders::new();
        script.push_detection(Some(detected));
        script.push_track(TrackStep::Moved(moved));
        script.push_fragments(&["0000"]);

        let (callbacks, _results, _regions) = recorder();
        let mut session =
            ScanSession::start(script.capabilities(), &ScannerConfig::default(), callbacks)
                .unwrap();
        session.submit_frame(&card_frame(1));
        session.submit_frame(&card_frame(2));

        let crops = script.recognized_crops();
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].frame_sequence, 2);
        assert_eq!(crops[0].source_rect.x, 0);
        assert_eq!(crops[0].source_rect.y, 0);
        assert_eq!(session.state(), &SessionState::Tracking(moved));
    }

    #[test]
    fn test_recognition_failure_keeps_tracking() {
        let card = region(0.1, 0.2, 0.8, 0.5);
        let script = ScriptedProviders::new();
        script.push_detection(Some(card));
        script.push_track(TrackStep::Moved(card));

        let (callbacks, results, _regions) = recorder();
        let mut session =
            ScanSession::start(script.capabilities(), &ScannerConfig::default(), callbacks)
                .unwrap();
        session.submit_frame(&card_frame(1));
        session.submit_frame(&card_frame(2));

        assert_eq!(session.state(), &SessionState::Tracking(card));
        assert_eq!(session.stats().recognition_failures, 1);
        assert!(results.lock().unwrap().is_empty());
    }

    #[test]
    fn test_result_record_filled_on_completion() {
        let card = region(0.1, 0.2, 0.8, 0.5);
        let script = ScriptedProviders::new();
        script.push_detection(Some(card));
        script.push_track(TrackStep::Moved(card));
        script.push_fragments(&["4539148803436467"]);

        let (callbacks, results, _regions) = recorder();
        let mut session =
            ScanSession::start(script.capabilities(), &ScannerConfig::default(), callbacks)
                .unwrap();
        session.submit_frame(&card_frame(10));
        session.submit_frame(&card_frame(11));

        let result = session.result().unwrap();
        assert_eq!(result.number.as_str(), "4539148803436467");
        assert_eq!(result.frame_sequence, 11);
        assert_eq!(result.session_id, session.id());
        assert_eq!(*results.lock().unwrap(), vec!["4539148803436467".to_string()]);
        assert!(session.is_finished());
    }

    #[test]
    fn test_cancel_handle_from_other_thread() {
        let card = region(0.1, 0.2, 0.8, 0.5);
        let script = ScriptedProviders::new();
        script.push_detection(Some(card));

        let (callbacks, _results, regions) = recorder();
        let mut session =
            ScanSession::start(script.capabilities(), &ScannerConfig::default(), callbacks)
                .unwrap();
        let handle = session.cancel_handle();
        std::thread::spawn(move || handle.cancel()).join().unwrap();

        session.submit_frame(&card_frame(1));
        assert_eq!(session.state(), &SessionState::Cancelled);
        assert!(regions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ScannerConfig::default();
        config.parser.max_alternates = 0;
        let (callbacks, _, _) = recorder();
        let result =
            ScanSession::start(ScriptedProviders::new().capabilities(), &config, callbacks);
        assert!(matches!(result, Err(ScanError::InvalidConfig(_))));
    }

    #[test]
    fn contract_session_invariants() {
        crate::invariant_ppt::clear_invariant_log();
        let card = region(0.1, 0.2, 0.8, 0.5);
        let script = ScriptedProviders::new();
        script.push_detection(Some(card));
        script.push_track(TrackStep::Moved(card));
        script.push_fragments(&["4539", "1488", "0343", "6467"]);

        let (callbacks, _, _) = recorder();
        let mut session =
            ScanSession::start(script.capabilities(), &ScannerConfig::default(), callbacks)
                .unwrap();
        session.submit_frame(&card_frame(1));
        session.submit_frame(&card_frame(2));

        crate::invariant_ppt::contract_test(
            "session",
            &[
                "Terminal session state never transitions",
                "Result is emitted at most once",
                "Emitted regions lie inside the unit square",
            ],
        );
    }
}
