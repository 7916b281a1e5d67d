use serde::{Deserialize, Serialize};

/// Failure of a single marketplace API call, tagged at the point it happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("authentication rejected (HTTP {0})")]
    Authentication(u16),
    #[error("failed to parse response: {0}")]
    DataParse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Http,
    Timeout,
    Authentication,
    DataParse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Http { .. } => ErrorKind::Http,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::Authentication(_) => ErrorKind::Authentication,
            ApiError::DataParse(_) => ErrorKind::DataParse,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => Severity::Warning,
            ApiError::Authentication(_) | ApiError::DataParse(_) => Severity::Critical,
            ApiError::Http { status, .. } if *status >= 500 => Severity::Warning,
            ApiError::Http { .. } => Severity::Info,
        }
    }

    /// Transient failures worth another attempt after a backoff.
    /// 4xx, auth and parse failures are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Http { status, .. } => *status >= 500,
            ApiError::Authentication(_) | ApiError::DataParse(_) => false,
        }
    }

    /// Network or timeout trouble; repeated occurrences push the dashboard offline.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Timeout)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return ApiError::DataParse(e.to_string());
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            if code == 401 || code == 403 {
                return ApiError::Authentication(code);
            }
            return ApiError::Http {
                status: code,
                message: e.to_string(),
            };
        }
        ApiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::DataParse(e.to_string())
    }
}

/// Local persistence failures. Logged, never fatal to the dashboard.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
