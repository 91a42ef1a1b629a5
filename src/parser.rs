//! Digit candidate assembly from recognized text fragments
//!
//! A frame's fragments yield a card number either from one 16-digit reading
//! or from exactly four 4-digit readings taken in detected order. Anything
//! else, and anything failing the check digit, is a non-result.

use crate::checksum::{self, CARD_NUMBER_LEN};
use crate::types::RawTextFragment;
use serde::{Serialize, Serializer};

/// Upper bound on alternates consulted per fragment.
pub const MAX_ALTERNATES: usize = 10;

const GROUP_LEN: usize = 4;
const GROUP_COUNT: usize = 4;

/// A checksum-valid 16-digit card number.
///
/// Only the parser builds these. `Debug` masks everything but the last group.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CandidateNumber(String);

impl CandidateNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// `**** **** **** 6467` form, safe for logs.
    pub fn masked(&self) -> String {
        let tail = &self.0[CARD_NUMBER_LEN - GROUP_LEN..];
        format!("**** **** **** {}", tail)
    }
}

impl std::fmt::Debug for CandidateNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CandidateNumber").field(&self.masked()).finish()
    }
}

impl Serialize for CandidateNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Why a frame's text did or did not produce a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Accepted(CandidateNumber),
    /// No 16-digit reading and not exactly four 4-digit readings
    Malformed { quads: usize },
    /// Digits assembled cleanly but the check digit is wrong
    ChecksumFailed,
}

impl ParseOutcome {
    pub fn into_candidate(self) -> Option<CandidateNumber> {
        match self {
            ParseOutcome::Accepted(number) => Some(number),
            _ => None,
        }
    }
}

/// Stateless fragment-to-number parser.
#[derive(Debug, Clone)]
pub struct DigitCandidateParser {
    max_alternates: usize,
}

impl Default for DigitCandidateParser {
    fn default() -> Self {
        Self {
            max_alternates: MAX_ALTERNATES,
        }
    }
}

impl DigitCandidateParser {
    /// `max_alternates` is clamped to 1..=MAX_ALTERNATES.
    pub fn new(max_alternates: usize) -> Self {
        Self {
            max_alternates: max_alternates.clamp(1, MAX_ALTERNATES),
        }
    }

    pub fn max_alternates(&self) -> usize {
        self.max_alternates
    }

    pub fn parse(&self, fragments: &[RawTextFragment]) -> Option<CandidateNumber> {
        self.parse_detailed(fragments).into_candidate()
    }

    pub fn parse_detailed(&self, fragments: &[RawTextFragment]) -> ParseOutcome {
        let readings: Vec<&str> = fragments
            .iter()
            .filter_map(|fragment| self.reading(fragment))
            .collect();

        let full = readings.iter().find(|r| r.len() == CARD_NUMBER_LEN);
        let quads: Vec<&str> = readings
            .iter()
            .copied()
            .filter(|r| r.len() == GROUP_LEN)
            .collect();

        let assembled = match full {
            Some(full) => (*full).to_string(),
            None if quads.len() == GROUP_COUNT => quads.concat(),
            None => return ParseOutcome::Malformed { quads: quads.len() },
        };

        if checksum::is_valid(&assembled) {
            ParseOutcome::Accepted(CandidateNumber(assembled))
        } else {
            ParseOutcome::ChecksumFailed
        }
    }

    /// Best-ranked alternate that is all digits and shaped like a whole
    /// number or a group.
    fn reading<'a>(&self, fragment: &'a RawTextFragment) -> Option<&'a str> {
        fragment
            .candidates
            .iter()
            .take(self.max_alternates)
            .map(|candidate| candidate.text.trim())
            .filter(|text| is_digit_string(text))
            .find(|text| text.len() == CARD_NUMBER_LEN || text.len() == GROUP_LEN)
    }
}

fn is_digit_string(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
