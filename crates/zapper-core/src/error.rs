use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Could not resolve path \"{}\"", .0.display())]
    PathResolution(PathBuf),

    #[error("\"{}\" has already been crawled", .0.display())]
    AlreadyIndexed(PathBuf),

    /// A digest committed in this batch could not be read back from `file_hash`.
    #[error("Could not resolve hash {0}")]
    HashUnresolved(String),

    /// A MIME type committed in this batch could not be read back from `file_type`.
    #[error("Could not resolve file type \"{0}\"")]
    FileTypeUnresolved(String),

    #[error("The destination path \"{}\" is not empty", .0.display())]
    DestinationNotEmpty(PathBuf),

    #[error("Could not decode hash \"{0}\"")]
    HashDecode(String),

    #[error("Type detection failed: {0}")]
    TypeDetection(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Invariant violations stop a run; everything else is reported per command.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::HashUnresolved(_) | Error::FileTypeUnresolved(_))
    }
}
