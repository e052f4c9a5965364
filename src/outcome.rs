//! Tagged success/failure values.
//!
//! [`Outcome`] is a serializable counterpart of `Result` for report
//! sections that may fail independently: a failed section is reported in
//! place instead of failing the whole response.

use std::fmt::Display;
use std::future::Future;

use serde::{Deserialize, Serialize};

/// Success with data, or failure with a message.
///
/// Serializes as `{"status": "success", "data": ...}` or
/// `{"status": "failure", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome<T> {
    Success { data: T },
    Failure { error: String },
}

impl<T> Outcome<T> {
    pub fn success(data: T) -> Self {
        Self::Success { data }
    }

    pub fn failure(error: impl Display) -> Self {
        Self::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error),
        }
    }
}

impl<T, E: Display> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(e),
        }
    }
}

/// Await `fut` and capture its result as an [`Outcome`], logging failures.
pub async fn attempt<T, E, F>(label: &str, fut: F) -> Outcome<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match fut.await {
        Ok(data) => Outcome::success(data),
        Err(e) => {
            tracing::warn!(section = label, error = %e, "Section failed");
            Outcome::failure(e)
        }
    }
}
