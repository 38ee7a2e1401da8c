//! Error types for dnssd-browser

use thiserror::Error;

/// Errors that can occur while observing DNS-SD records
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Browser executable not found
    #[error("discovery browser '{program}' is not installed or not in PATH")]
    BrowserUnavailable { program: String },

    /// Browser could not be started for another reason
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Browser ran but its output could not be read
    #[error("failed to read output of '{program}': {source}")]
    Output {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Instance name pattern is not a valid regular expression
    #[error("invalid instance pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Browser exited on its own with a failure status and no output
    #[error("'{program}' exited with {status} and produced no output: {stderr}")]
    BrowserFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

impl DiscoveryError {
    pub(crate) fn launch(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            DiscoveryError::BrowserUnavailable {
                program: program.to_string(),
            }
        } else {
            DiscoveryError::Launch {
                program: program.to_string(),
                source,
            }
        }
    }
}
