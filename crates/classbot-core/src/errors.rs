/// Core error type for the bot.
///
/// Adapter crates map their SDK errors into this type so the core can handle
/// failures consistently (user-facing message vs log-and-swallow).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("completion error: {0}")]
    Completion(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
