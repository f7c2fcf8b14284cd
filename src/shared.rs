use chrono::Utc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid player name: {0:?}")]
    InvalidPlayerName(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Current wall-clock time as epoch milliseconds, the unit every event
/// timestamp and vote clock uses.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
