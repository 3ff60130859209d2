#![deny(unsafe_code)]

//! # Overview
//!
//! `ctp-transport` binds a device session to exactly one of two wire
//! transports:
//!
//! - [`CtpStream`] - the proprietary console protocol on TCP port 41795.
//!   Raw bytes, echoed input, no framing; the protocol crate's polling
//!   machine does all completion detection.
//! - [`ExecChannel`] - SSH remote execution on port 22. Each command's full
//!   output is delivered atomically when the remote command terminates, so
//!   no polling heuristics apply.
//!
//! The [`Transport`] enum is selected once at connect time and owned by the
//! session for its whole lifetime.
//!
//! # Errors
//!
//! Connection failures (resolution, refusal, timeout, authentication) are
//! reported as [`ConnectError`] and never silently retried at this layer.
//! [`Transport::close`] is idempotent and infallible: teardown is attempted
//! even after errors and its own failures are only logged.

mod ctp;
mod error;
mod ssh;

pub use ctp::CtpStream;
pub use error::ConnectError;
pub use ssh::ExecChannel;

/// Fixed TCP port of the CTP console service.
pub const CTP_PORT: u16 = 41795;

/// Standard SSH port used by the exec transport.
pub const SSH_PORT: u16 = 22;

/// The two mutually exclusive wire transports a session can be bound to.
#[derive(Debug)]
pub enum Transport {
    /// Raw console stream; completion is inferred by polling.
    Console(CtpStream),
    /// SSH exec channel; completion is guaranteed by the protocol.
    Exec(ExecChannel),
}

impl Transport {
    /// Reports whether this is the exec variant.
    #[must_use]
    pub const fn is_exec(&self) -> bool {
        matches!(self, Self::Exec(_))
    }

    /// Human-readable transport name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Console(_) => "CTP",
            Self::Exec(_) => "SSH",
        }
    }

    /// Closes the underlying connection, best-effort.
    ///
    /// Safe to call repeatedly and after failures; a close that goes wrong
    /// is logged, never raised.
    pub fn close(&mut self) {
        match self {
            Self::Console(stream) => stream.close(),
            Self::Exec(channel) => channel.close(),
        }
    }
}
