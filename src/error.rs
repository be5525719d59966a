use thiserror::Error;

/// Failures of the acquisition pipeline.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("required control not found: {control}")]
    ControlNotFound { control: String },
    #[error("no listing row matches '{key}'")]
    RowNotFound { key: String },
    #[error("record {code} has no report attached")]
    MissingReport { code: String },
    #[error("store failure: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("report writer has shut down")]
    SinkClosed,
    #[error("browser session failure: {0}")]
    Session(#[from] anyhow::Error),
}

impl CrawlError {
    pub fn control(control: impl Into<String>) -> Self {
        CrawlError::ControlNotFound {
            control: control.into(),
        }
    }
}

pub type CrawlResult<T> = std::result::Result<T, CrawlError>;
