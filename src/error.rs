//! Unified error types for netapply

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for netapply operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("Failed to write '{path}': {source}")]
    WriteFile { path: PathBuf, source: io::Error },

    // Settings errors
    #[error("Failed to read settings file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse settings: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Input errors
    #[error("Generated configuration directory '{0}' not found, nothing to do")]
    MissingSourceDir(PathBuf),

    // Lock errors
    #[error("Failed to lock '{path}': {message}")]
    Lock { path: PathBuf, message: String },

    #[error("Could not acquire lock '{path}' after {attempts} attempts")]
    LockExhausted { path: PathBuf, attempts: u32 },

    // Network errors
    #[error("invalid netmask: '{0}'")]
    InvalidNetmask(String),

    #[error("invalid prefix length: '{0}'")]
    InvalidPrefixLength(String),

    // Command errors
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },
}

/// Result type alias for netapply operations
pub type Result<T> = std::result::Result<T, Error>;
