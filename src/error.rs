use thiserror::Error;

/// Main error type for Docprobe operations
#[derive(Error, Debug)]
pub enum DocprobeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Syntax error in {origin}: {message}")]
    Syntax { origin: String, message: String },

    #[error("This type ({0}) of object is not supported")]
    UnsupportedObject(String),

    #[error("Cannot import module {name}: {reason}")]
    Import { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Documentation tree error: {0}")]
    DocTree(String),

    #[error("Documentation build failed: {0}")]
    Build(String),

    #[error("Parser suite '{0}' is not supported")]
    UnknownParserSuite(String),
}

impl DocprobeError {
    pub fn syntax(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Syntax {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocprobeError>;
