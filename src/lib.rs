//! cardscan: payment card number scanning from live video
//!
//! Frames flow through four stages: find a card-shaped rectangle that holds
//! text, follow it across frames, read the digits off the cropped card, and
//! accept the first 16-digit number whose check digit is valid. Shape
//! detection, tracking and text recognition are supplied by the caller as
//! [`providers`]; this crate owns the state machine, parsing and validation.
//!
//! # Usage
//! ```rust,ignore
//! use cardscan::{Capabilities, ScanSession, ScannerConfig, SessionCallbacks};
//!
//! let callbacks = SessionCallbacks::new(|number| println!("card: {number}"))
//!     .on_region_update(|region| overlay.update(region));
//! let mut session = ScanSession::start(capabilities, &ScannerConfig::default(), callbacks)?;
//! for frame in camera {
//!     session.submit_frame(&frame);
//! }
//! ```
//!
//! For capture callbacks that must never block, [`ScanLane`] runs the session
//! on its own thread and drops frames while it is busy.

pub mod checksum;
pub mod config;
pub mod detector;
pub mod errors;
pub mod extract;
pub mod invariant_ppt;
pub mod parser;
pub mod providers;
pub mod region;
pub mod session;
pub mod tracker;
pub mod types;

#[cfg(feature = "tesseract")]
pub mod tesseract;

// Testing utilities - scripted providers and synthetic frames
pub mod testing;

// Re-exports for convenience
pub use checksum::is_valid;
pub use config::ScannerConfig;
pub use errors::{ProviderError, ProviderErrorKind, ScanError};
pub use parser::{CandidateNumber, DigitCandidateParser, ParseOutcome};
pub use providers::{
    Capabilities, RectangleDetector, RectangleTracker, TextRecognizer, TextRegionDetector,
};
pub use region::NormalizedRegion;
pub use session::{
    CancelHandle, LaneHandle, ScanLane, ScanResult, ScanSession, SessionCallbacks, SessionId,
    SessionState, SessionStats,
};
pub use types::{CardImage, Frame, PixelFormat, RawTextFragment, TextCandidate, TrackingLevel};

/// Initialize logging for the scanner
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "cardscan=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        recognition_backends: recognition_backends(),
    }
}

fn recognition_backends() -> Vec<String> {
    let mut backends = vec!["scripted".to_string()];
    if cfg!(feature = "tesseract") {
        backends.push("tesseract".to_string());
    }
    backends
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub recognition_backends: Vec<String>,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "cardscan");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert!(info.recognition_backends.contains(&"scripted".to_string()));
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
