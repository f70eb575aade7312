/// Shared error type used across all Acre crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// An emitter or UI stream was mutated after `done()`.
    #[error("already finalized: {0}")]
    Finalized(&'static str),

    /// An `accumulate` call tried to shrink the message list.
    #[error("state regression: {0}")]
    StateRegression(String),

    /// A second choice prompt was presented for a conversation that
    /// already has one pending.
    #[error("choice gate busy for conversation {0}")]
    GateBusy(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
