//! Error types.
//!
//! None of these ever reach the person reading the email: the bridge and the
//! pipeline log them and carry on with whatever state they had.

use mailframe_dom::SheetError;

use crate::bridge::EventKind;

/// Failure decoding something that crossed the host/page bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("malformed bridge message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("empty payload")]
    EmptyPayload,
    #[error("not a bridge call: {0:?}")]
    MalformedScript(String),
    #[error("no entry point registered under {0:?}")]
    UnknownEntryPoint(String),
    #[error("unexpected data for {kind:?} event")]
    UnexpectedData { kind: EventKind },
}

/// Failure of a single smart-resize step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResizeError {
    #[error("document has no body")]
    MissingBody,
    #[error("content container is missing")]
    MissingContainer,
    #[error(transparent)]
    Stylesheet(#[from] SheetError),
}

/// Invalid pipeline configuration.
#[derive(Debug, thiserror::Error)]
#[error("invalid pipeline configuration: {0}")]
pub struct ConfigError(#[from] serde_json::Error);
