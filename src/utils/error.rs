use std::path::PathBuf;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// No hosts to capture from and no capture files to reprocess
    #[error("no target hosts specified")]
    NoTargets,

    /// User-supplied content filter is not a valid regular expression
    #[error("invalid filter pattern: {0}")]
    InvalidFilter(#[from] regex::Error),

    /// Required local capture tool is not installed
    #[error("capture tool not found: {0}")]
    CaptureToolMissing(String),

    /// ssh or scp is not installed
    #[error("remote transport not found: {0}")]
    TransportMissing(String),

    /// Capture command failed on the remote host (or locally)
    #[error("capture on {host} failed: {message}")]
    RemoteExecution { host: String, message: String },

    /// Copying the capture file back failed
    #[error("copying capture from {host} failed: {message}")]
    TransferFailed { host: String, message: String },

    /// Acquisition reported success but left no file behind
    #[error("capture file missing: {}", .0.display())]
    CaptureFileMissing(PathBuf),

    /// Capture file could not be opened or read
    #[error("cannot read capture file {}: {source}", .path.display())]
    CaptureOpen {
        path: PathBuf,
        #[source]
        source: pcap::Error,
    },

    /// No secret available for elevated capture
    #[error("credential error: {0}")]
    CredentialError(String),

    /// Bad user config file or option value
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Error from pcap library
    #[error("PCAP error: {0}")]
    PcapError(#[from] pcap::Error),

    /// Error from I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// Process exit code for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::NoTargets => 2,
            AppError::InvalidFilter(_) => 3,
            AppError::CaptureToolMissing(_) => 4,
            AppError::TransportMissing(_) => 5,
            AppError::RemoteExecution { .. } => 6,
            AppError::TransferFailed { .. } => 7,
            AppError::CaptureFileMissing(_) => 8,
            AppError::CaptureOpen { .. } => 9,
            AppError::CredentialError(_) => 10,
            AppError::ConfigError(_) => 11,
            AppError::PcapError(_) | AppError::IoError(_) => 1,
        }
    }
}

/// Result type for application
pub type AppResult<T> = Result<T, AppError>;
