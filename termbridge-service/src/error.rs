//! Host process errors.

use termbridge_core::TermBridgeError;
use thiserror::Error;

/// Errors that stop the host process.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    TermBridge(#[from] TermBridgeError),

    #[error("Failed to initialize telemetry: {0}")]
    Telemetry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
