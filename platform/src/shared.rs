//! Exceptions and other common elements.

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("The directory {0} could not be created: {1}")]
    DirectoryCreationError(std::path::PathBuf, anyhow::Error),
    #[error("The directory {0} has unexpected permission: {1}")]
    DirectoryPermissionError(std::path::PathBuf, anyhow::Error),
    #[error("The file {0} could not be written: {1}")]
    FileWriteError(std::path::PathBuf, anyhow::Error),
    #[error("The file {0} is readable by others: {1}")]
    FilePermissionError(std::path::PathBuf, anyhow::Error),
}
