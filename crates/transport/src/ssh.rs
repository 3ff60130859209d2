//! SSH exec-channel transport.
//!
//! Unlike the console stream, the remote-execution protocol delivers each
//! command's complete output when the remote command terminates, so no
//! prompt polling or stall heuristics apply to this variant.

use std::fmt;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::{ConnectError, SSH_PORT, ctp::resolve};

/// Authenticated SSH session issuing one exec request per command.
pub struct ExecChannel {
    session: Option<ssh2::Session>,
    peer: SocketAddr,
}

impl fmt::Debug for ExecChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecChannel")
            .field("peer", &self.peer)
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl ExecChannel {
    /// Connects, handshakes and password-authenticates against `host`.
    pub fn connect(
        host: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let peer = resolve(host, SSH_PORT)?;
        tracing::info!(%peer, %username, "establishing SSH session");
        let tcp = TcpStream::connect_timeout(&peer, timeout)
            .map_err(|source| ConnectError::SshSocket {
                address: peer,
                source,
            })?;

        let mut session =
            ssh2::Session::new().map_err(|source| ConnectError::SshHandshake {
                address: peer,
                source,
            })?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        session
            .handshake()
            .map_err(|source| ConnectError::SshHandshake {
                address: peer,
                source,
            })?;
        session
            .userauth_password(username, password)
            .map_err(|source| ConnectError::SshAuth {
                address: peer,
                username: username.to_owned(),
                source,
            })?;

        tracing::info!(%peer, "SSH session established");
        Ok(Self {
            session: Some(session),
            peer,
        })
    }

    /// Remote endpoint this channel is bound to.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Runs one remote command and returns its full captured output.
    ///
    /// Suspends the calling thread until the remote command terminates;
    /// output completeness is guaranteed by the protocol itself.
    pub fn execute(&mut self, command: &str) -> io::Result<String> {
        let session = self.session.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "SSH session is closed")
        })?;

        let mut channel = session.channel_session().map_err(io::Error::other)?;
        channel.exec(command).map_err(io::Error::other)?;

        let mut output = String::new();
        channel.read_to_string(&mut output)?;
        channel.wait_close().map_err(io::Error::other)?;
        Ok(output)
    }

    /// Disconnects, best-effort and idempotent.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(error) = session.disconnect(None, "session complete", None) {
                tracing::debug!(peer = %self.peer, %error, "SSH disconnect failed");
            } else {
                tracing::info!(peer = %self.peer, "closed SSH session");
            }
        }
    }
}
