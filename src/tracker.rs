use crate::providers::RectangleTracker;
use crate::region::NormalizedRegion;
use crate::types::{Frame, TrackingLevel};

/// Follows the card between frames through a tracking provider.
pub struct CardTracker {
    provider: Box<dyn RectangleTracker>,
    level: TrackingLevel,
}

impl CardTracker {
    pub fn new(provider: Box<dyn RectangleTracker>, level: TrackingLevel) -> Self {
        Self { provider, level }
    }

    pub fn level(&self) -> TrackingLevel {
        self.level
    }

    /// Updated card region, or `None` once the card is lost.
    pub fn track(
        &mut self,
        previous: &NormalizedRegion,
        frame: &Frame,
    ) -> Option<NormalizedRegion> {
        match self.provider.track_rectangle(previous, frame, self.level) {
            Ok(Some(region)) => Some(region),
            Ok(None) => {
                log::debug!("Card lost at frame {}", frame.sequence);
                None
            }
            Err(e) => {
                log::debug!("Tracking failed on frame {}: {}", frame.sequence, e);
                None
            }
        }
    }
}
