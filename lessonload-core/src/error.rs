pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("setup failed: {0}")]
    Setup(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("`stages` must be a non-empty array of {{ duration, target }} with a positive total duration")]
    InvalidStages,

    #[error("at least one stage must target a positive number of VUs")]
    InvalidVus,

    #[error("invalid threshold expression `{expression}`: {reason}")]
    InvalidThreshold { expression: String, reason: String },

    #[error("metric `{name}` is already registered as a {existing}")]
    MetricKindConflict {
        name: String,
        existing: crate::MetricKind,
    },

    #[error("failed to create histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("result log writer stopped before the run finished")]
    ResultLogClosed,

    #[error("failed to encode result log line: {0}")]
    Encode(#[from] serde_json::Error),
}
