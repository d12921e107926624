use std::path::PathBuf;

/// Failure kinds that terminate a slurp run.
///
/// Functions in this crate return `anyhow::Result`; every failure belonging to one of these
/// kinds starts out as a `SlurpError`, so callers can recover it with
/// `error.downcast_ref::<SlurpError>()` even after context has been attached.
#[derive(Debug, thiserror::Error)]
pub enum SlurpError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("unexpected remote markup: {0}")]
    Parse(String),

    #[error("failed to persist {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("repository command `{command}` failed: {message}")]
    Replay { command: String, message: String },
}

impl SlurpError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Parse(_) => "parse",
            Self::Persistence { .. } => "persistence",
            Self::Replay { .. } => "replay",
        }
    }
}
