//! Error types for the viewer.

use std::ffi::NulError;
use std::io;
use thiserror::Error;

/// The main error type for viewer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// NDI runtime initialization failed.
    ///
    /// This typically occurs when the NDI SDK is not installed or cannot be loaded.
    #[error("Failed to initialize the NDI runtime: {0}")]
    InitializationFailed(String),

    /// A null pointer was returned by the NDI SDK.
    #[error("Encountered a null pointer in function: {0}")]
    NullPointer(String),

    /// Invalid UTF-8 data in a string from the NDI SDK.
    #[error("Invalid UTF-8 string in data: {0}")]
    InvalidUtf8(String),

    /// Failed to create a C string due to null bytes.
    #[error("Invalid CString: {0}")]
    InvalidCString(#[from] NulError),

    /// The transport refused to create a receive instance for this source.
    #[error("Failed to create a receive instance for '{name}'")]
    ConnectFailed { name: String },

    /// A receive instance is already active; disconnect first.
    #[error("Already connected to '{name}'")]
    AlreadyConnected { name: String },

    /// Frame capture operation failed.
    #[error("Failed to capture frame: {0}")]
    CaptureFailed(String),

    /// Frame data is invalid or corrupted.
    #[error("Invalid frame data: {0}")]
    InvalidFrame(String),

    /// The render surface could not be created or drawn to.
    #[error("Render surface error: {0}")]
    Surface(String),

    /// Configuration parameters are invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
