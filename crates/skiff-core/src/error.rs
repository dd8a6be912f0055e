// SPDX-License-Identifier: MIT
//
// Unified error types for Skiff.

use thiserror::Error;

/// Top-level error type for all Skiff operations.
#[derive(Debug, Error)]
pub enum SkiffError {
    // -- Request gateway --
    #[error("redirect chain exceeded {0} hops")]
    TooManyRedirects(u32),

    #[error("invalid response format: {0}")]
    InvalidResponseFormat(String),

    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    // -- Script engine / execution queue --
    #[error("script engine error: {0}")]
    Engine(String),

    #[error("execution queue is shut down")]
    QueueClosed,

    // -- Update manager --
    #[error("invalid bundle structure: {0}")]
    InvalidBundleStructure(String),

    #[error("update download failed: {0}")]
    DownloadFailed(String),

    #[error("update install failed: {0}")]
    InstallFailed(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SkiffError>;
