//! Error taxonomy for the preview pipeline.
//!
//! Only failures that stop a preview from being produced are errors here.
//! Validation findings travel as [`crate::validate::ValidationIssue`] values and
//! syntax/runtime failures are recovered inside the generated document.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification shared by validation issues, wire responses and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Input,
    Security,
    Syntax,
    Runtime,
    UnresolvedSymbol,
    Transport,
    Quality,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "InputError",
            ErrorKind::Security => "SecurityError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::UnresolvedSymbol => "UnresolvedSymbolError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Quality => "QualityWarning",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    #[error("{0}")]
    Input(String),

    #[error("Security violation: {0}")]
    Security(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Unresolved symbol '{0}'")]
    UnresolvedSymbol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PreviewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PreviewError::Input(_) | PreviewError::Config(_) => ErrorKind::Input,
            PreviewError::Security(_) => ErrorKind::Security,
            PreviewError::Syntax(_) => ErrorKind::Syntax,
            PreviewError::Runtime(_) => ErrorKind::Runtime,
            PreviewError::UnresolvedSymbol(_) => ErrorKind::UnresolvedSymbol,
            PreviewError::Transport(_) => ErrorKind::Transport,
        }
    }
}

impl From<serde_json::Error> for PreviewError {
    fn from(err: serde_json::Error) -> Self {
        PreviewError::Transport(format!("malformed payload: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(PreviewError::Input("x".into()).kind(), ErrorKind::Input);
        assert_eq!(PreviewError::Config("x".into()).kind(), ErrorKind::Input);
        assert_eq!(
            PreviewError::Transport("down".into()).kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_display() {
        let err = PreviewError::Security("eval() call".into());
        assert_eq!(err.to_string(), "Security violation: eval() call");
        assert_eq!(ErrorKind::Security.to_string(), "SecurityError");
    }
}
