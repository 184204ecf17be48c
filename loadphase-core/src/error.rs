use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("invalid `executor` `{0}` (expected `constant-vus` or `ramping-vus`)")]
    InvalidExecutor(String),

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    EmptyStages,

    #[error("load profile must run for a non-zero duration")]
    ZeroDuration,

    #[error("invalid threshold for `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("invalid check `{0}` (expected `expected_status`, `no_server_error` or `latency<DURATION`)")]
    InvalidCheck(String),

    #[error("invalid expected status mapping: {0}")]
    InvalidStatusMapping(String),

    #[error(
        "identity space {space} is invalid for worker indices up to {max_index} (must be >= 1 and keep every identity within u64)"
    )]
    InvalidIdentitySpace { space: u64, max_index: u64 },

    #[error("invalid identity mode `{0}` (expected `unique` or `repeat`)")]
    InvalidIdentityMode(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("tick must be between 1ms and 1s, got {0:?}")]
    InvalidTick(Duration),
}

impl Error {
    /// Whether the error stems from the run configuration rather than from execution.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Join(_))
    }
}
