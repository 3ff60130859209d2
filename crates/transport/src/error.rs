//! Connection-phase error reporting.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failure to establish a device connection.
///
/// All variants are fatal: the caller reports a one-line diagnostic and
/// aborts before any replication starts.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The device address did not resolve to a usable socket address.
    #[error("unable to resolve device address `{address}`: {source}")]
    Resolve {
        /// Address as supplied on the command line.
        address: String,
        /// Underlying resolution failure.
        #[source]
        source: io::Error,
    },
    /// TCP connection to the CTP console port failed.
    #[error("unable to establish CTP session with {address}: {source}")]
    Console {
        /// Resolved device endpoint.
        address: SocketAddr,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// TCP connection for the SSH transport failed.
    #[error("unable to reach SSH service at {address}: {source}")]
    SshSocket {
        /// Resolved device endpoint.
        address: SocketAddr,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// SSH session setup or handshake failed.
    #[error("unable to establish SSH session with {address}: {source}")]
    SshHandshake {
        /// Resolved device endpoint.
        address: SocketAddr,
        /// Underlying library failure.
        #[source]
        source: ssh2::Error,
    },
    /// The device rejected the supplied SSH credentials.
    #[error("SSH authentication failed for `{username}`@{address}: {source}")]
    SshAuth {
        /// Resolved device endpoint.
        address: SocketAddr,
        /// Account name that was rejected.
        username: String,
        /// Underlying library failure.
        #[source]
        source: ssh2::Error,
    },
}
