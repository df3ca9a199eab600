use super::ports::AppPort;

/// Codec failures. All of them are recoverable: the offending message is
/// logged and dropped, the node keeps running.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("frame declares {declared} body bytes but {available} follow the header")]
    TrailingBytes { declared: usize, available: usize },

    #[error("body of {size} bytes exceeds limit of {max}")]
    Oversize { size: usize, max: usize },

    #[error("unknown application port {0}")]
    UnknownPort(u8),

    #[error("unknown message subtype {value} for port {port}")]
    UnknownSubtype { port: AppPort, value: u8 },

    #[error("payload layout does not belong to source port {port}")]
    LayoutMismatch { port: AppPort },

    #[error("malformed body for port {port}: {reason}")]
    MalformedBody { port: AppPort, reason: &'static str },

    #[error("JSON field '{0}' missing")]
    MissingField(&'static str),

    #[error("JSON field '{field}' invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
