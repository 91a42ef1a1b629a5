//! Resolution-independent card regions
//!
//! A [`NormalizedRegion`] locates the card in the unit square with the origin
//! at the top-left corner, `x` growing right and `y` growing down.

use crate::errors::ScanError;
use serde::{Deserialize, Serialize};

const PIXEL_EPSILON: f32 = 1e-3;
const EDGE_TOLERANCE: f32 = 1e-5;

/// Rectangle in normalized [0,1] coordinates.
///
/// The invariant `0 <= x`, `0 <= y`, `x + width <= 1`, `y + height <= 1`,
/// `width > 0`, `height > 0` holds for every value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegionRepr", into = "RegionRepr")]
pub struct NormalizedRegion {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RegionRepr {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl TryFrom<RegionRepr> for NormalizedRegion {
    type Error = ScanError;

    fn try_from(repr: RegionRepr) -> Result<Self, Self::Error> {
        NormalizedRegion::new(repr.x, repr.y, repr.width, repr.height)
    }
}

impl From<NormalizedRegion> for RegionRepr {
    fn from(region: NormalizedRegion) -> Self {
        Self {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
        }
    }
}

/// Integer pixel rectangle inside a concrete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl NormalizedRegion {
    /// Build a region, rejecting anything outside the unit square.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self, ScanError> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return Err(ScanError::InvalidRegion(
                "coordinates must be finite".to_string(),
            ));
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(ScanError::InvalidRegion(format!(
                "width and height must be positive, got {}x{}",
                width, height
            )));
        }
        if x < 0.0
            || y < 0.0
            || x + width > 1.0 + EDGE_TOLERANCE
            || y + height > 1.0 + EDGE_TOLERANCE
        {
            return Err(ScanError::InvalidRegion(format!(
                "region ({}, {}, {}x{}) exceeds the unit square",
                x, y, width, height
            )));
        }
        // Trim float overshoot at the far edges back onto the unit square.
        let width = width.min(1.0 - x);
        let height = height.min(1.0 - y);
        if width <= 0.0 || height <= 0.0 {
            return Err(ScanError::InvalidRegion(format!(
                "region ({}, {}) has no area inside the unit square",
                x, y
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// The whole frame.
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    /// Normalize a pixel rectangle against the frame it was measured in.
    pub fn from_pixel_rect(
        rect: PixelRect,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Self, ScanError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(ScanError::InvalidRegion(
                "frame dimensions must be non-zero".to_string(),
            ));
        }
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        Self::new(
            rect.x as f32 / fw,
            rect.y as f32 / fh,
            rect.width as f32 / fw,
            rect.height as f32 / fh,
        )
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    /// True when `other` lies entirely inside `self` (edges may touch).
    pub fn contains(&self, other: &NormalizedRegion) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Map onto a `frame_width` x `frame_height` pixel grid.
    ///
    /// The result always covers at least one pixel and never leaves the frame.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> PixelRect {
        let fw = frame_width as f32;
        let fh = frame_height as f32;

        // Absorb f32 rounding so edges that sit on the pixel grid stay there.
        let left =
            ((self.x * fw + PIXEL_EPSILON).floor() as u32).min(frame_width.saturating_sub(1));
        let top =
            ((self.y * fh + PIXEL_EPSILON).floor() as u32).min(frame_height.saturating_sub(1));
        let right = (((self.max_x() * fw - PIXEL_EPSILON).ceil()) as u32)
            .clamp(left + 1, frame_width.max(1));
        let bottom = (((self.max_y() * fh - PIXEL_EPSILON).ceil()) as u32)
            .clamp(top + 1, frame_height.max(1));

        PixelRect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }
}
