use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate target name: {0}")]
    DuplicateTarget(String),

    #[error("target with url {0} has an empty name")]
    EmptyTargetName(String),

    #[error("invalid target entry {0:?}, expected name=url")]
    InvalidTargetSpec(String),

    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),

    #[error("{0} must not exceed {1} seconds")]
    IntervalTooLarge(&'static str, u64),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("api error: {0}")]
    Api(String),
}
