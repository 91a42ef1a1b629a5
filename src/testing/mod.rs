//! Testing utilities for cardscan
//!
//! Scripted capability providers and synthetic frames, so the whole pipeline
//! runs offline without a camera or a recognition backend.

pub mod scripted;
pub mod synthetic_data;

pub use scripted::{fragments, DetectStep, ScriptedProviders, TrackStep};
pub use synthetic_data::{card_frame, synthetic_card_number, synthetic_frame, CARD_FRAME_SIZE};
