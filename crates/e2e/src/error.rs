//! Error types for fixtures, lifecycle helpers and browser automation

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// Malformed fixture graph or fixture request; fatal before any test runs
    #[error("Fixture configuration error: {0}")]
    Configuration(String),

    #[error("Fixture `{fixture}` setup failed: {source}")]
    Setup {
        fixture: String,
        #[source]
        source: Box<E2eError>,
    },

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Compensating action failed; logged by the fixture layer, never rethrown
    #[error("Teardown of `{fixture}` failed: {reason}")]
    Teardown { fixture: String, reason: String },

    #[error("Timeout after {after:?} waiting for: {operation}")]
    Timeout { operation: String, after: Duration },

    #[error("Unexpected response to {method} {path} (status {status}): {reason}")]
    UnexpectedResponse {
        method: String,
        path: String,
        status: u16,
        reason: String,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Authenticated context already disposed: {0}")]
    Disposed(String),

    #[error("Authentication cache not found at {0}; run `appcheck-auth setup` first")]
    AuthCacheMissing(PathBuf),

    #[error("Application not reachable after {0} attempts")]
    AppUnreachable(usize),

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Panicked: {0}")]
    Panic(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] appcheck_common::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

impl E2eError {
    /// HTTP status behind this error, looking through setup wrappers
    pub fn status(&self) -> Option<u16> {
        match self {
            E2eError::UnexpectedResponse { status, .. } => Some(*status),
            E2eError::Setup { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Innermost error, with fixture setup wrappers removed
    pub fn root(&self) -> &E2eError {
        match self {
            E2eError::Setup { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn setup(fixture: &str, source: E2eError) -> Self {
        E2eError::Setup {
            fixture: fixture.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        E2eError::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
