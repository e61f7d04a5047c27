use thiserror::Error;

/// Errors raised while printing a single image.
/// 列印單一影像時可能發生的錯誤。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PrintError {
    /// The content could not be fetched or rendered.
    #[error("Failed to load content: {0}")]
    LoadFailure(String),
    /// The print subsystem declined the job; carries its reason verbatim.
    #[error("Print failed: {0}")]
    PrintFailure(String),
    #[error("render surface unavailable: {0}")]
    Surface(String),
}

impl PrintError {
    /// Description or reason reported by the failing subsystem.
    pub fn detail(&self) -> &str {
        match self {
            PrintError::LoadFailure(detail)
            | PrintError::PrintFailure(detail)
            | PrintError::Surface(detail) => detail,
        }
    }
}
