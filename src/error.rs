use thiserror::Error;

/// A frame that could not be decoded into a known message shape.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("provider credential not configured")]
    NotConfigured,

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider response malformed: {0}")]
    Malformed(String),
}

impl FallbackError {
    /// True when the provider itself answered badly, as opposed to the call
    /// never completing.
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Malformed(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to read profile file {path}: {source}")]
    Profile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
