use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sheet {0} does not exist")]
    MissingSheet(String),

    #[error("row has {got} cells but sheet {sheet} has {expected} columns")]
    RowWidth {
        sheet: String,
        expected: usize,
        got: usize,
    },

    #[error("transport {transport} failed: {reason}")]
    Transport { transport: String, reason: String },
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
