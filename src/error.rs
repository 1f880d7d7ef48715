use thiserror::Error;

/// Failure of the HTTP transfer itself.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("sample cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(#[from] FetchError),
    #[error("measured duration {elapsed_secs}s is not positive")]
    ZeroDuration { elapsed_secs: f64 },
}

impl SampleError {
    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SampleError::Cancelled)
    }
}
