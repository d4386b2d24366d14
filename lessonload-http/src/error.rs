use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure class, recorded as the `error` tag on failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    InvalidUrl,
    InvalidRequest,
    Connect,
    Timeout,
    Body,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("unsupported url scheme, expected http or https: {0}")]
    UnsupportedScheme(String),

    #[error("could not build request: {0}")]
    Build(#[from] http::Error),

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    #[error("connection failed: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("response body read failed: {0}")]
    Body(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::InvalidUrl(_) | Self::UnsupportedScheme(_) => TransportErrorKind::InvalidUrl,
            Self::Build(_) | Self::InvalidHeader { .. } => TransportErrorKind::InvalidRequest,
            Self::Connect(_) => TransportErrorKind::Connect,
            Self::Timeout(_) => TransportErrorKind::Timeout,
            Self::Body(_) => TransportErrorKind::Body,
        }
    }
}
