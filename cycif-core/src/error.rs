use thiserror::Error;

/// Errors raised while configuring the viewer or ingesting tiles.
///
/// Conditions the renderer is expected to ride out (absent tiles, no active
/// channel, degenerate transfer domains) are not errors and never show up here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed tile address: {0}")]
    MalformedAddress(String),

    #[error("png decode failed: {0}")]
    Png(#[from] png::DecodingError),

    #[error("unsupported tile layout: {0}")]
    UnsupportedLayout(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("config parse failed: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of an out-of-band tile fetch. Never surfaced past the compositor.
#[derive(Debug, Clone, Error)]
#[error("tile fetch failed for {address}: {reason}")]
pub struct FetchError {
    pub address: String,
    pub reason: String,
}
