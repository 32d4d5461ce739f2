use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Filter with URL {0} already exists")]
    DuplicateUrl(String),

    #[error("Filter not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Got status code != 200: {0}")]
    HttpStatus(u16),

    #[error("Content rejected: {0}")]
    ContentRejected(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Filters update procedure is already running")]
    AlreadyRunning,
}

impl FilterError {
    /// Errors that come from reaching the source rather than from local state.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            FilterError::Transport(_) | FilterError::HttpStatus(_) | FilterError::ContentRejected(_)
        )
    }
}

pub type FilterResult<T> = Result<T, FilterError>;
