#![deny(unsafe_code)]

//! # Overview
//!
//! `ctp-ftpd` is the local transfer server: a small threaded FTP listener
//! that accepts the uploads a Crestron device performs in response to
//! `FPUTfile` commands and deposits them under the mirror root.
//!
//! # Design
//!
//! One accept thread spawns a worker per control connection; workers share
//! no mutable state with the replication engine (the engine pre-creates
//! directories, the workers write files). Passive-mode data listeners are
//! opened per transfer. [`FtpServer::stop`] wakes the accept loop with a
//! loopback connection and joins every worker, so shutdown never leaves
//! threads behind; its own failures are reported, never escalated.
//!
//! # Errors
//!
//! [`StartError`] is fatal and occurs before any device interaction.
//! [`StopError`] is logged by callers and otherwise ignored. Per-session
//! protocol errors only ever terminate their own connection.

mod session;

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

/// Account allowed to write into the transfer root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Fixed capability set granted to the authenticated (or anonymous) user.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Permissions {
    /// Allow downloads (`RETR`).
    pub read: bool,
    /// Allow uploads (`STOR`).
    pub write: bool,
    /// Allow directory creation (`MKD`).
    pub create: bool,
    /// Allow deletion (`DELE`).
    pub delete: bool,
}

impl Permissions {
    /// Every capability enabled; what a replication run needs.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            delete: true,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::full()
    }
}

/// Listener configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Interface to bind; an empty string binds every local interface.
    pub interface: String,
    /// Listener port.
    pub port: u16,
    /// Directory accepted uploads are rooted in.
    pub root: PathBuf,
    /// Required account; `None` allows unauthenticated (anonymous) access.
    pub credentials: Option<Credentials>,
    /// Capability set applied to every session.
    pub permissions: Permissions,
}

/// Failure to bring the transfer server up. Always fatal, and always
/// raised before the first device interaction.
#[derive(Debug, Error)]
pub enum StartError {
    /// The configured interface is not a parseable address.
    #[error("invalid FTP listener interface `{interface}`: {source}")]
    Interface {
        /// Interface string as configured.
        interface: String,
        /// Underlying parse failure.
        #[source]
        source: std::net::AddrParseError,
    },
    /// The transfer root cannot be created.
    #[error("transfer root `{}` is unavailable: {source}", root.display())]
    Root {
        /// Configured root directory.
        root: PathBuf,
        /// Underlying filesystem failure.
        #[source]
        source: io::Error,
    },
    /// Binding the listener failed.
    #[error("failed to start local FTP server on {address}: {source}")]
    Bind {
        /// Address that could not be bound.
        address: SocketAddr,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
}

/// Failure to tear the transfer server down. Reported, never escalated.
#[derive(Debug, Error)]
pub enum StopError {
    /// The accept loop could not be woken.
    #[error("failed to wake FTP listener at {address}: {source}")]
    Wake {
        /// Listener address the wake connection targeted.
        address: SocketAddr,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("FTP listener thread terminated abnormally")]
    Listener,
}

pub(crate) struct Shared {
    pub(crate) root: PathBuf,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) permissions: Permissions,
}

/// Running transfer server.
#[derive(Debug)]
pub struct FtpServer {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl FtpServer {
    /// Binds the listener and spawns the accept loop.
    pub fn start(config: ServerConfig) -> Result<Self, StartError> {
        let ip: IpAddr = if config.interface.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            config
                .interface
                .parse()
                .map_err(|source| StartError::Interface {
                    interface: config.interface.clone(),
                    source,
                })?
        };
        let requested = SocketAddr::new(ip, config.port);

        std::fs::create_dir_all(&config.root).map_err(|source| StartError::Root {
            root: config.root.clone(),
            source,
        })?;

        let listener = TcpListener::bind(requested).map_err(|source| StartError::Bind {
            address: requested,
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| StartError::Bind {
            address: requested,
            source,
        })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared {
            root: config.root,
            credentials: config.credentials,
            permissions: config.permissions,
        });

        let stopping = Arc::clone(&shutdown);
        let accept_thread = thread::spawn(move || accept_loop(&listener, &stopping, &shared));

        tracing::info!(address = %local_addr, "started local FTP server");
        Ok(Self {
            local_addr,
            shutdown,
            accept_thread: Some(accept_thread),
        })
    }

    /// Address the listener is actually bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address a loopback client can reach the listener on.
    fn wake_addr(&self) -> SocketAddr {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            other => other,
        };
        SocketAddr::new(ip, self.local_addr.port())
    }

    /// Stops accepting connections and joins every worker.
    pub fn stop(mut self) -> Result<(), StopError> {
        tracing::info!("stopping local FTP server");
        self.shutdown.store(true, Ordering::SeqCst);

        let wake = self.wake_addr();
        TcpStream::connect_timeout(&wake, Duration::from_secs(2)).map_err(|source| {
            StopError::Wake {
                address: wake,
                source,
            }
        })?;

        if let Some(handle) = self.accept_thread.take() {
            handle.join().map_err(|_| StopError::Listener)?;
        }
        tracing::info!("local FTP server stopped");
        Ok(())
    }
}

impl Drop for FtpServer {
    fn drop(&mut self) {
        // Covers paths where stop() was never reached; the wake connection
        // is best-effort here.
        if self.accept_thread.is_some() {
            self.shutdown.store(true, Ordering::SeqCst);
            let _ = TcpStream::connect_timeout(&self.wake_addr(), Duration::from_millis(200));
        }
    }
}

fn accept_loop(listener: &TcpListener, shutdown: &Arc<AtomicBool>, shared: &Arc<Shared>) {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let shared = Arc::clone(shared);
                workers.push(thread::spawn(move || {
                    if let Err(error) = session::serve(stream, peer, &shared) {
                        tracing::debug!(%peer, %error, "FTP session ended with error");
                    }
                }));
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                tracing::warn!(%error, "failed to accept FTP connection");
            }
        }
    }
    for worker in workers {
        let _ = worker.join();
    }
}
