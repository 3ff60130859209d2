//! Blocking CTP console socket.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use ctp_protocol::ConsoleChannel;

use crate::{CTP_PORT, ConnectError};

pub(crate) fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConnectError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|source| ConnectError::Resolve {
            address: host.to_owned(),
            source,
        })?
        .next()
        .ok_or_else(|| ConnectError::Resolve {
            address: host.to_owned(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        })
}

/// Raw stream connection to the device's console port.
///
/// Reads are bounded by a per-call timeout; a timeout yields an empty
/// buffer rather than an error, which the polling machine treats as "no
/// new data this round".
#[derive(Debug)]
pub struct CtpStream {
    stream: Option<TcpStream>,
    peer: SocketAddr,
}

impl CtpStream {
    /// Connects to the console port of `host`.
    pub fn connect(host: &str, timeout: Duration) -> Result<Self, ConnectError> {
        Self::connect_endpoint(resolve(host, CTP_PORT)?, timeout)
    }

    /// Connects to an explicit console endpoint.
    ///
    /// Production sessions use [`connect`](Self::connect), which always
    /// targets [`CTP_PORT`]; this entry point exists for consoles exposed
    /// on forwarded or ephemeral ports.
    pub fn connect_endpoint(peer: SocketAddr, timeout: Duration) -> Result<Self, ConnectError> {
        tracing::info!(%peer, "establishing CTP session");
        let stream = TcpStream::connect_timeout(&peer, timeout)
            .map_err(|source| ConnectError::Console {
                address: peer,
                source,
            })?;
        tracing::info!(%peer, "CTP session established");
        Ok(Self {
            stream: Some(stream),
            peer,
        })
    }

    /// Remote endpoint this stream is bound to.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "CTP session is closed"))
    }

    /// Shuts the connection down, best-effort and idempotent.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(error) = stream.shutdown(Shutdown::Both) {
                tracing::debug!(peer = %self.peer, %error, "CTP shutdown failed");
            } else {
                tracing::info!(peer = %self.peer, "closed CTP session");
            }
        }
    }
}

impl ConsoleChannel for CtpStream {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream_mut()?.write_all(bytes)
    }

    fn recv_timeout(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let stream = self.stream_mut()?;
        stream.set_read_timeout(Some(timeout))?;
        let mut buffer = vec![0u8; max_len];
        match stream.read(&mut buffer) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "device closed the console session",
            )),
            Ok(received) => {
                buffer.truncate(received);
                Ok(buffer)
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn connected_pair() -> (CtpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = listener.local_addr().unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        let ctp = CtpStream::connect_endpoint(peer, Duration::from_secs(1)).unwrap();
        (ctp, accept.join().unwrap())
    }

    #[test]
    fn timeout_yields_empty_buffer() {
        let (mut ctp, _remote) = connected_pair();
        let received = ctp
            .recv_timeout(64, Duration::from_millis(20))
            .expect("timeout is not an error");
        assert!(received.is_empty());
    }

    #[test]
    fn received_bytes_are_truncated_to_actual_length() {
        let (mut ctp, mut remote) = connected_pair();
        remote.write_all(b"AV3>").unwrap();
        let received = ctp.recv_timeout(64, Duration::from_secs(1)).unwrap();
        assert_eq!(received, b"AV3>");
    }

    #[test]
    fn peer_close_is_an_error() {
        let (mut ctp, remote) = connected_pair();
        drop(remote);
        let error = ctp.recv_timeout(64, Duration::from_secs(1)).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::ConnectionAborted);
    }

    #[test]
    fn close_is_idempotent_and_send_after_close_fails() {
        let (mut ctp, _remote) = connected_pair();
        ctp.close();
        ctp.close();
        let error = ctp.send(b"\r").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn refused_connection_reports_console_error() {
        // Bind-then-drop guarantees nothing listens on the port.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = CtpStream::connect_endpoint(addr, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(error, ConnectError::Console { .. }));
    }
}
