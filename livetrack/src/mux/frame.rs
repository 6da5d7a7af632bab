//! Inbound frames and buffer expansion.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// `source` of a frame bundling other frames.
pub const BUFFER_SOURCE: &str = "buffer";

/// A frame that could not be decoded. Logged and dropped, never propagated.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not a JSON object with a `source` string.
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A `buffer` frame whose content is not a list.
    #[error("Buffer frame content is not a list")]
    BufferNotList,
}

/// One server → client frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Frame {
    /// Channel the frame belongs to (`name` or `name args`).
    pub source: String,

    /// Payload. `null` when absent.
    #[serde(default)]
    pub content: Value,

    /// Request correlation id echoed by the server, number or numeric string.
    #[serde(default)]
    pub client_reference: Option<Value>,
}

impl Frame {
    /// Build a frame (mostly useful in tests).
    pub fn new(source: impl Into<String>, content: Value) -> Self {
        Self {
            source: source.into(),
            content,
            client_reference: None,
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Correlation id, if the server sent one.
    pub fn request_id(&self) -> Option<u64> {
        match self.client_reference.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether this frame bundles other frames.
    pub fn is_buffer(&self) -> bool {
        self.source == BUFFER_SOURCE
    }

    /// Whether the payload is missing.
    pub fn is_empty(&self) -> bool {
        match &self.content {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

/// Flatten `frame` into the frames to dispatch.
///
/// Non-buffer frames come back unchanged. A buffer's inner frames are returned
/// in order (nested buffers flattened too); `null` elements and elements that
/// do not decode are skipped.
pub fn expand(frame: Frame) -> Result<Vec<Frame>, FrameError> {
    if !frame.is_buffer() {
        return Ok(vec![frame]);
    }

    let Value::Array(items) = frame.content else {
        return Err(FrameError::BufferNotList);
    };

    let mut frames = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if item.is_null() {
            debug!(index, "Skipping null element in buffer frame");
            continue;
        }
        match serde_json::from_value::<Frame>(item) {
            Ok(inner) if inner.is_buffer() => match expand(inner) {
                Ok(nested) => frames.extend(nested),
                Err(e) => warn!(index, error = %e, "Skipping malformed nested buffer"),
            },
            Ok(inner) => frames.push(inner),
            Err(e) => warn!(index, error = %e, "Skipping malformed element in buffer frame"),
        }
    }
    Ok(frames)
}
