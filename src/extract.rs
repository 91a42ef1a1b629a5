use crate::errors::ProviderError;
use crate::parser::{DigitCandidateParser, ParseOutcome};
use crate::providers::TextRecognizer;
use crate::types::CardImage;

/// Text recognition followed by candidate parsing, for one cropped card.
///
/// Owned by whichever lane runs extraction: the session itself when
/// extraction is inline, the extraction worker otherwise.
pub struct CardTextExtractor {
    recognizer: Box<dyn TextRecognizer>,
    parser: DigitCandidateParser,
}

impl CardTextExtractor {
    pub fn new(recognizer: Box<dyn TextRecognizer>, parser: DigitCandidateParser) -> Self {
        Self { recognizer, parser }
    }

    pub fn extract(&mut self, image: &CardImage) -> Result<ParseOutcome, ProviderError> {
        let fragments = self.recognizer.recognize(image)?;
        log::trace!(
            "Frame {}: {} text fragments from {}x{} crop",
            image.frame_sequence,
            fragments.len(),
            image.width(),
            image.height()
        );
        Ok(self.parser.parse_detailed(&fragments))
    }
}
