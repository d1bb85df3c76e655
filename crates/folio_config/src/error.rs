//! Errors raised while reading or validating `folio.toml`.

use std::path::PathBuf;

/// Why a project configuration could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A processor lists no file extensions.
    #[error("processor '{processor}' declares no extensions")]
    NoExtensions {
        /// Name of the processor.
        processor: String,
    },

    /// Two processors claim the same file extension.
    #[error("extension '{extension}' is claimed by both '{first}' and '{second}'")]
    DuplicateExtension {
        /// The extension, lower-cased and without a leading dot.
        extension: String,
        /// The processor declared first.
        first: String,
        /// The processor that claimed it again.
        second: String,
    },
}
