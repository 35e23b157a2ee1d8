use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid agent option '{0}' -- expected key:value")]
    InvalidOption(String),

    #[error("unknown agent option key '{0}' (expected p, t, d, i or n)")]
    UnknownOption(String),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid number '{value}' for option '{key}': {source}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("failed to read script {}: {source}", path.display())]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script line {line}: {reason}")]
    ScriptParse { line: usize, reason: String },

    #[error("failed to start statistics reporter: {0}")]
    ReporterSpawn(#[source] std::io::Error),

    #[error("no routines matched -- check the package pattern (-p)")]
    NoRoutinesSelected,

    #[error("replay thread '{0}' panicked")]
    ReplayThreadPanicked(String),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
