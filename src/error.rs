use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;
