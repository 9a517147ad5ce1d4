use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unresolved placeholder `{token}` at byte {offset}")]
    UnresolvedPlaceholder { token: String, offset: usize },

    #[error("parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("shape mismatch for `{symbol}`: {message}")]
    ShapeMismatch { symbol: String, message: String },

    #[error("unsupported kernel: {0}")]
    Unsupported(String),

    #[error("invalid layer {name}: {reason}")]
    InvalidLayer { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tensor of shape {shape:?} exceeds {limit} elements")]
    TooLarge { shape: Vec<usize>, limit: usize },

    #[error("unknown network `{0}`")]
    UnknownNetwork(String),

    #[error("unknown kernel handle {0}")]
    UnknownHandle(usize),

    #[error("{device} backend unavailable: {reason}")]
    BackendUnavailable { device: String, reason: String },

    #[error("cuda error {code}: {message}")]
    Cuda { code: i32, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}
