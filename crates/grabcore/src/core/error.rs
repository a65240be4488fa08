use thiserror::Error;

/// Centralized error types for infrastructure failures
///
/// Covers everything below the download taxonomy: filesystem, JSON, configuration
/// loading and external process execution. Download-level failures that are shown
/// to the user live in [`crate::download::error::DownloadError`].
///
/// # Example
///
/// ```no_run
/// use grabcore::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// External process errors (spawn failure, bad exit code, unexpected output)
    #[error("Process error: {0}")]
    Process(String),

    /// Process did not finish within its deadline
    #[error("Process timed out after {0}s")]
    Timeout(u64),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(Box::new(err))
    }
}
