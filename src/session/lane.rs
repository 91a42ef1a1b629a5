//! Threaded scan lane
//!
//! The session state machine runs on its own thread ("cardscan-lane") and is
//! fed through a bounded queue. A frame that arrives while the queue is full is
//! dropped, never buffered. Extraction optionally runs on a second thread
//! ("cardscan-extraction"); its outcome re-enters the lane, which is the only
//! place the session state changes.

use super::{
    build_parts, CancelHandle, ScanResult, SessionCallbacks, SessionId, SessionState, SessionStats,
};
use crate::config::ScannerConfig;
use crate::errors::{ProviderError, ScanError};
use crate::extract::CardTextExtractor;
use crate::parser::ParseOutcome;
use crate::providers::Capabilities;
use crate::session::machine::SessionMachine;
use crate::types::{CardImage, Frame};
use crossbeam_channel::{bounded, never, select, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct ExtractionOutcome {
    frame_sequence: u64,
    result: Result<ParseOutcome, ProviderError>,
}

/// Snapshot published by the lane after every event.
#[derive(Debug, Clone)]
struct LaneStatus {
    state: SessionState,
    stats: SessionStats,
    result: Option<ScanResult>,
    extraction_in_flight: bool,
    frames_received: u64,
    finished: bool,
}

type SharedStatus = Arc<(Mutex<LaneStatus>, Condvar)>;

/// Entry point for threaded sessions.
pub struct ScanLane;

impl ScanLane {
    /// Spawn the lane (and the extraction worker when offloading is enabled).
    pub fn start(
        capabilities: Capabilities,
        config: &ScannerConfig,
        callbacks: SessionCallbacks,
    ) -> Result<LaneHandle, ScanError> {
        let (machine, extractor) = build_parts(capabilities, config, callbacks)?;
        let cancel = machine.cancel_handle();
        let id = machine.id();

        let status: SharedStatus = Arc::new((
            Mutex::new(LaneStatus {
                state: machine.state().clone(),
                stats: machine.stats().clone(),
                result: None,
                extraction_in_flight: false,
                frames_received: 0,
                finished: false,
            }),
            Condvar::new(),
        ));

        let (frame_tx, frame_rx) = bounded::<Frame>(config.lane.frame_queue_depth);
        let (wake_tx, wake_rx) = bounded::<()>(1);

        let mut extraction_thread = None;
        let mut inline_extractor = None;
        let mut jobs_tx = None;
        let mut outcomes_rx = None;

        if config.lane.offload_extraction {
            let (job_tx, job_rx) = bounded::<CardImage>(1);
            let (outcome_tx, outcome_rx) = bounded::<ExtractionOutcome>(1);
            let worker_cancel = cancel.clone();
            let handle = std::thread::Builder::new()
                .name("cardscan-extraction".to_string())
                .spawn(move || extraction_loop(extractor, job_rx, outcome_tx, worker_cancel))
                .map_err(|e| {
                    ScanError::LaneError(format!("Failed to spawn extraction thread: {}", e))
                })?;
            extraction_thread = Some(handle);
            jobs_tx = Some(job_tx);
            outcomes_rx = Some(outcome_rx);
        } else {
            inline_extractor = Some(extractor);
        }

        let lane_status = Arc::clone(&status);
        let lane_thread = std::thread::Builder::new()
            .name("cardscan-lane".to_string())
            .spawn(move || {
                lane_loop(
                    machine,
                    frame_rx,
                    wake_rx,
                    Extraction {
                        inline: inline_extractor,
                        jobs: jobs_tx,
                        outcomes: outcomes_rx,
                    },
                    lane_status,
                )
            })
            .map_err(|e| ScanError::LaneError(format!("Failed to spawn lane thread: {}", e)))?;

        log::info!(
            "Scan lane started (queue depth {}, extraction {})",
            config.lane.frame_queue_depth,
            if config.lane.offload_extraction { "offloaded" } else { "inline" }
        );

        Ok(LaneHandle {
            id,
            frames: Some(frame_tx),
            wake: wake_tx,
            cancel,
            status,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            lane_thread: Some(lane_thread),
            extraction_thread,
        })
    }
}

/// Owner-side handle of a running lane. Dropping it stops the lane.
pub struct LaneHandle {
    id: SessionId,
    frames: Option<Sender<Frame>>,
    wake: Sender<()>,
    cancel: CancelHandle,
    status: SharedStatus,
    accepted: AtomicU64,
    dropped: AtomicU64,
    lane_thread: Option<JoinHandle<()>>,
    extraction_thread: Option<JoinHandle<()>>,
}

impl LaneHandle {
    /// Offer a frame without blocking. Returns false if it was dropped.
    pub fn submit_frame(&self, frame: Frame) -> bool {
        let Some(frames) = self.frames.as_ref() else {
            return false;
        };
        match frames.try_send(frame) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("Lane busy, dropping frame {}", frame.sequence);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Offer a frame, waiting up to `timeout` for queue space.
    pub fn submit_frame_timeout(&self, frame: Frame, timeout: Duration) -> bool {
        let Some(frames) = self.frames.as_ref() else {
            return false;
        };
        match frames.send_timeout(frame, timeout) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Request cancellation. Callbacks already running may finish; none start
    /// afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let _ = self.wake.try_send(());
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Frames refused because the lane was busy.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SessionState {
        self.snapshot().state
    }

    pub fn stats(&self) -> SessionStats {
        self.snapshot().stats
    }

    pub fn result(&self) -> Option<ScanResult> {
        self.snapshot().result
    }

    pub fn is_finished(&self) -> bool {
        self.snapshot().finished
    }

    /// Block until every accepted frame has been processed and no extraction
    /// is running, or the lane has finished. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.status;
        let mut status = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let accepted = self.accepted.load(Ordering::SeqCst);
            if status.finished
                || (status.frames_received >= accepted && !status.extraction_in_flight)
            {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            status = cvar
                .wait_timeout(status, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Close the frame queue and join both threads.
    pub fn stop(&mut self, join_timeout: Duration) -> Result<(), ScanError> {
        self.frames.take();
        let _ = self.wake.try_send(());

        join_with_timeout(&mut self.lane_thread, join_timeout, "lane")?;
        join_with_timeout(&mut self.extraction_thread, join_timeout, "extraction")?;
        Ok(())
    }

    fn snapshot(&self) -> LaneStatus {
        let (lock, _) = &*self.status;
        lock.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Drop for LaneHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop(Duration::from_millis(100)) {
            log::warn!("Error stopping scan lane in drop: {}", e);
        }
    }
}

fn join_with_timeout(
    slot: &mut Option<JoinHandle<()>>,
    join_timeout: Duration,
    name: &str,
) -> Result<(), ScanError> {
    let Some(handle) = slot.take() else {
        return Ok(());
    };
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            if handle.join().is_err() {
                log::error!("Scan {} thread panicked", name);
            }
            return Ok(());
        }
        if start.elapsed() >= join_timeout {
            // Keep the handle so a later stop can retry.
            *slot = Some(handle);
            return Err(ScanError::LaneError(format!(
                "{} thread did not stop within {:?}",
                name, join_timeout
            )));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

struct Extraction {
    inline: Option<CardTextExtractor>,
    jobs: Option<Sender<CardImage>>,
    outcomes: Option<Receiver<ExtractionOutcome>>,
}

fn lane_loop(
    mut machine: SessionMachine,
    frames: Receiver<Frame>,
    wake: Receiver<()>,
    mut extraction: Extraction,
    status: SharedStatus,
) {
    let mut outcomes = extraction.outcomes.take().unwrap_or_else(never);
    let mut frames_received = 0u64;

    loop {
        select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => {
                    frames_received += 1;
                    if let Some(image) = machine.advance(&frame) {
                        dispatch(&mut machine, &mut extraction, image);
                    }
                }
                Err(_) => break,
            },
            recv(outcomes) -> msg => match msg {
                Ok(outcome) => machine.resolve(outcome.frame_sequence, outcome.result),
                Err(_) => {
                    log::warn!("Extraction worker exited");
                    outcomes = never();
                    if machine.extraction_in_flight() {
                        machine.resolve(
                            0,
                            Err(ProviderError::backend("extraction worker exited")),
                        );
                    }
                }
            },
            recv(wake) -> _ => {}
        }

        let finished = machine.is_finished();
        publish(&status, &machine, frames_received, finished);
        if finished {
            break;
        }
    }

    publish(&status, &machine, frames_received, true);
    log::debug!(
        "Scan lane for session {} exiting ({})",
        machine.id(),
        machine.state().name()
    );
}

fn dispatch(machine: &mut SessionMachine, extraction: &mut Extraction, image: CardImage) {
    let frame_sequence = image.frame_sequence;

    if let Some(extractor) = extraction.inline.as_mut() {
        let outcome = extractor.extract(&image);
        machine.resolve(frame_sequence, outcome);
        return;
    }

    let sent = match extraction.jobs.as_ref() {
        Some(jobs) => jobs.send(image).is_ok(),
        None => false,
    };
    if !sent {
        machine.resolve(
            frame_sequence,
            Err(ProviderError::backend("extraction worker unavailable")),
        );
    }
}

fn publish(status: &SharedStatus, machine: &SessionMachine, frames_received: u64, finished: bool) {
    let (lock, cvar) = &**status;
    let mut status = lock.lock().unwrap_or_else(|e| e.into_inner());
    status.state = machine.state().clone();
    status.stats = machine.stats().clone();
    status.result = machine.result().cloned();
    status.extraction_in_flight = machine.extraction_in_flight();
    status.frames_received = frames_received;
    status.finished = finished;
    cvar.notify_all();
}

fn extraction_loop(
    mut extractor: CardTextExtractor,
    jobs: Receiver<CardImage>,
    outcomes: Sender<ExtractionOutcome>,
    cancel: CancelHandle,
) {
    while let Ok(image) = jobs.recv() {
        if cancel.is_cancelled() {
            break;
        }
        let result = extractor.extract(&image);
        let outcome = ExtractionOutcome {
            frame_sequence: image.frame_sequence,
            result,
        };
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
    log::debug!("Extraction worker exiting");
}
