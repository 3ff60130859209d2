//! Replication error taxonomy.

use std::io;

use ctp_protocol::PromptError;
use thiserror::Error;

/// Failures surfaced while driving a device session.
///
/// Prompt failures and connection-level I/O abort the run; everything that
/// happens below the remote root during the walk is caught at the subtree
/// boundary and logged instead of propagated.
#[derive(Debug, Error)]
pub enum ReplicateError {
    /// Prompt discovery failed or the device model is unsupported.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The transfer-server address cannot form a valid push URL.
    #[error("invalid FTP server address `{address}`: {source}")]
    PushTarget {
        /// Address as supplied on the command line.
        address: String,
        /// Underlying URL parse failure.
        #[source]
        source: url::ParseError,
    },
    /// Console or output I/O failed.
    #[error("I/O failure: {source}")]
    Io {
        /// Underlying I/O failure.
        #[from]
        source: io::Error,
    },
}

impl ReplicateError {
    /// Reports whether this failure is the terminal unsupported-device
    /// condition, which callers announce with a distinct diagnostic.
    #[must_use]
    pub const fn is_unsupported_device(&self) -> bool {
        matches!(self, Self::Prompt(PromptError::UnsupportedDevice { .. }))
    }
}
