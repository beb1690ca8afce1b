//! Encode/decode helpers for socket frames.
//!
//! The realtime connection carries JSON text frames. These helpers wrap
//! `serde_json` with a dedicated error type so transport code can treat
//! malformed frames uniformly (drop and log, never disconnect).

use crate::frame::{ClientFrame, ServerFrame};

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("frame codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes a client frame into JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes a server frame from JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the text is not a valid frame.
pub fn decode_server(text: &str) -> Result<ServerFrame, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a server frame into JSON text (used by the hub).
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes a client frame from JSON text (used by the hub).
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the text is not a valid frame.
pub fn decode_client(text: &str) -> Result<ClientFrame, CodecError> {
    Ok(serde_json::from_str(text)?)
}
