use thiserror::Error;

/// Errors surfaced to the owner of a scanner.
///
/// Per-frame failures (no detection, tracking loss, rejected candidates and
/// provider failures) never show up here; they are non-results.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Configuration I/O error: {0}")]
    ConfigIo(String),
    #[error("Lane error: {0}")]
    LaneError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    UnsupportedInput,
    Backend,
    Exhausted,
}

/// Failure reported by a capability provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn unsupported_input(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::UnsupportedInput,
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Backend,
            message: message.into(),
        }
    }

    /// A scripted provider ran out of scripted responses.
    pub fn exhausted(provider: &str) -> Self {
        Self {
            kind: ProviderErrorKind::Exhausted,
            message: format!("{provider} has no scripted response left"),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::InvalidRegion("width must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid region: width must be positive");

        let err = ScanError::InvalidConfig("max_alternates".to_string());
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[test]
    fn test_provider_error_constructors() {
        let err = ProviderError::unsupported_input("odd dimensions");
        assert_eq!(err.kind, ProviderErrorKind::UnsupportedInput);
        assert_eq!(err.to_string(), "odd dimensions");

        let err = ProviderError::exhausted("tracker");
        assert_eq!(err.kind, ProviderErrorKind::Exhausted);
        assert!(err.message.contains("tracker"));
    }
}
