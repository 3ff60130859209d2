//! Per-connection FTP protocol handling.
//!
//! Implements the slice of RFC 959 a pushing device actually exercises:
//! login, TYPE, passive-mode data connections and STOR, plus the
//! housekeeping verbs well-behaved clients send around them. Everything
//! else earns a 502.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Shared;

/// Idle limit between control commands.
const CONTROL_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// How long a passive data connection may take to arrive.
const DATA_ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

struct Session<'a> {
    control: TcpStream,
    peer: SocketAddr,
    shared: &'a Shared,
    authenticated: bool,
    pending_user: Option<String>,
    cwd: String,
    data: Option<TcpListener>,
}

pub(crate) fn serve(stream: TcpStream, peer: SocketAddr, shared: &Arc<Shared>) -> io::Result<()> {
    stream.set_read_timeout(Some(CONTROL_IDLE_TIMEOUT))?;
    stream.set_write_timeout(Some(CONTROL_IDLE_TIMEOUT))?;
    tracing::debug!(%peer, "FTP control connection accepted");

    let mut session = Session {
        control: stream.try_clone()?,
        peer,
        shared,
        authenticated: false,
        pending_user: None,
        cwd: "/".to_owned(),
        data: None,
    };
    let mut reader = BufReader::new(stream);

    session.reply(220, "Crestron replication FTP service ready")?;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let (verb, argument) = match trimmed.split_once(' ') {
            Some((verb, argument)) => (verb.to_ascii_uppercase(), argument.trim()),
            None => (trimmed.to_ascii_uppercase(), ""),
        };
        tracing::trace!(%peer, verb, "FTP command");
        if !session.dispatch(&verb, argument)? {
            break;
        }
    }
    tracing::debug!(%peer, "FTP control connection closed");
    Ok(())
}

impl Session<'_> {
    fn reply(&mut self, code: u16, text: &str) -> io::Result<()> {
        write!(self.control, "{code} {text}\r\n")?;
        self.control.flush()
    }

    /// Handles one command; returns `false` once the session should end.
    fn dispatch(&mut self, verb: &str, argument: &str) -> io::Result<bool> {
        match verb {
            "USER" => self.handle_user(argument)?,
            "PASS" => self.handle_pass(argument)?,
            "QUIT" => {
                self.reply(221, "Goodbye")?;
                return Ok(false);
            }
            "SYST" => self.reply(215, "UNIX Type: L8")?,
            "FEAT" => {
                write!(self.control, "211-Features:\r\n UTF8\r\n EPSV\r\n211 End\r\n")?;
                self.control.flush()?;
            }
            "NOOP" => self.reply(200, "Okay")?,
            "TYPE" => self.reply(200, "Type set")?,
            _ if !self.authenticated => self.reply(530, "Please login with USER and PASS")?,
            "PWD" => {
                let cwd = self.cwd.clone();
                self.reply(257, &format!("\"{cwd}\" is the current directory"))?;
            }
            "CWD" => self.handle_cwd(argument)?,
            "CDUP" => self.handle_cwd("..")?,
            "MKD" => self.handle_mkd(argument)?,
            "DELE" => self.handle_dele(argument)?,
            "PASV" => self.handle_pasv()?,
            "EPSV" => self.handle_epsv()?,
            "STOR" => self.handle_stor(argument)?,
            "RETR" => self.handle_retr(argument)?,
            _ => self.reply(502, "Command not implemented")?,
        }
        Ok(true)
    }

    fn handle_user(&mut self, name: &str) -> io::Result<()> {
        self.pending_user = Some(name.to_owned());
        match &self.shared.credentials {
            // Anonymous service: any account, any password.
            None => self.reply(331, "Any password will do"),
            Some(_) => self.reply(331, "Password required"),
        }
    }

    fn handle_pass(&mut self, password: &str) -> io::Result<()> {
        let accepted = match &self.shared.credentials {
            None => true,
            Some(credentials) => {
                self.pending_user.as_deref() == Some(credentials.username.as_str())
                    && password == credentials.password
            }
        };
        if accepted {
            self.authenticated = true;
            tracing::debug!(peer = %self.peer, user = ?self.pending_user, "FTP login");
            self.reply(230, "Login successful")
        } else {
            tracing::warn!(peer = %self.peer, user = ?self.pending_user, "FTP login rejected");
            self.reply(530, "Login incorrect")
        }
    }

    fn handle_cwd(&mut self, argument: &str) -> io::Result<()> {
        match self.virtual_join(argument) {
            Some(target) => {
                let resolved = self.resolve(&target);
                if resolved.is_dir() {
                    self.cwd = target;
                    self.reply(250, "Directory changed")
                } else {
                    self.reply(550, "No such directory")
                }
            }
            None => self.reply(550, "Path not allowed"),
        }
    }

    fn handle_mkd(&mut self, argument: &str) -> io::Result<()> {
        if !self.shared.permissions.create {
            return self.reply(550, "Permission denied");
        }
        match self.virtual_join(argument) {
            Some(target) => {
                let resolved = self.resolve(&target);
                match fs::create_dir_all(&resolved) {
                    Ok(()) => self.reply(257, &format!("\"{target}\" created")),
                    Err(error) => {
                        tracing::warn!(path = %resolved.display(), %error, "MKD failed");
                        self.reply(550, "Create failed")
                    }
                }
            }
            None => self.reply(550, "Path not allowed"),
        }
    }

    fn handle_dele(&mut self, argument: &str) -> io::Result<()> {
        if !self.shared.permissions.delete {
            return self.reply(550, "Permission denied");
        }
        match self.virtual_join(argument) {
            Some(target) => {
                let resolved = self.resolve(&target);
                match fs::remove_file(&resolved) {
                    Ok(()) => self.reply(250, "File deleted"),
                    Err(error) => {
                        tracing::warn!(path = %resolved.display(), %error, "DELE failed");
                        self.reply(550, "Delete failed")
                    }
                }
            }
            None => self.reply(550, "Path not allowed"),
        }
    }

    fn open_data_listener(&mut self) -> io::Result<SocketAddr> {
        let local_ip = self.control.local_addr()?.ip();
        let listener = TcpListener::bind(SocketAddr::new(local_ip, 0))?;
        let address = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        self.data = Some(listener);
        Ok(address)
    }

    fn handle_pasv(&mut self) -> io::Result<()> {
        let address = match self.open_data_listener() {
            Ok(address) => address,
            Err(error) => {
                tracing::warn!(%error, "failed to open passive listener");
                return self.reply(425, "Cannot open data connection");
            }
        };
        match address.ip() {
            IpAddr::V4(ip) => {
                let [a, b, c, d] = ip.octets();
                let port = address.port();
                self.reply(
                    227,
                    &format!(
                        "Entering Passive Mode ({a},{b},{c},{d},{},{})",
                        port >> 8,
                        port & 0xff
                    ),
                )
            }
            IpAddr::V6(_) => {
                self.data = None;
                self.reply(425, "Use EPSV for IPv6")
            }
        }
    }

    fn handle_epsv(&mut self) -> io::Result<()> {
        match self.open_data_listener() {
            Ok(address) => self.reply(
                229,
                &format!("Entering Extended Passive Mode (|||{}|)", address.port()),
            ),
            Err(error) => {
                tracing::warn!(%error, "failed to open passive listener");
                self.reply(425, "Cannot open data connection")
            }
        }
    }

    /// Waits for the client to connect to the passive listener.
    fn accept_data(&mut self) -> io::Result<TcpStream> {
        let listener = self.data.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no passive listener open")
        })?;
        let deadline = Instant::now() + DATA_ACCEPT_TIMEOUT;
        loop {
            match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(CONTROL_IDLE_TIMEOUT))?;
                    stream.set_write_timeout(Some(CONTROL_IDLE_TIMEOUT))?;
                    return Ok(stream);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "data connection never arrived",
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn handle_stor(&mut self, argument: &str) -> io::Result<()> {
        if !self.shared.permissions.write {
            return self.reply(550, "Permission denied");
        }
        let Some(target) = self.virtual_join(argument) else {
            return self.reply(550, "Path not allowed");
        };
        let resolved = self.resolve(&target);
        if let Some(parent) = resolved.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                tracing::warn!(path = %resolved.display(), %error, "cannot create upload directory");
                return self.reply(550, "Store failed");
            }
        }

        self.reply(150, "Ok to send data")?;
        let outcome = self.accept_data().and_then(|mut data| {
            let mut file = File::create(&resolved)?;
            io::copy(&mut data, &mut file)
        });
        match outcome {
            Ok(received) => {
                tracing::info!(
                    peer = %self.peer,
                    path = %resolved.display(),
                    bytes = received,
                    "stored pushed file"
                );
                self.reply(226, "Transfer complete")
            }
            Err(error) => {
                tracing::warn!(path = %resolved.display(), %error, "STOR failed");
                self.reply(426, "Transfer aborted")
            }
        }
    }

    fn handle_retr(&mut self, argument: &str) -> io::Result<()> {
        if !self.shared.permissions.read {
            return self.reply(550, "Permission denied");
        }
        let Some(target) = self.virtual_join(argument) else {
            return self.reply(550, "Path not allowed");
        };
        let resolved = self.resolve(&target);
        let mut file = match File::open(&resolved) {
            Ok(file) => file,
            Err(_) => return self.reply(550, "No such file"),
        };

        self.reply(150, "Opening data connection")?;
        let outcome = self
            .accept_data()
            .and_then(|mut data| io::copy(&mut file, &mut data));
        match outcome {
            Ok(_) => self.reply(226, "Transfer complete"),
            Err(error) => {
                tracing::warn!(path = %resolved.display(), %error, "RETR failed");
                self.reply(426, "Transfer aborted")
            }
        }
    }

    /// Normalises `argument` against the virtual working directory.
    ///
    /// Returns `None` when the path would step outside the transfer root.
    fn virtual_join(&self, argument: &str) -> Option<String> {
        let combined = if argument.starts_with('/') {
            argument.to_owned()
        } else {
            format!("{}/{argument}", self.cwd)
        };
        let mut stack: Vec<&str> = Vec::new();
        for component in combined.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    stack.pop()?;
                }
                other => stack.push(other),
            }
        }
        Some(format!("/{}", stack.join("/")))
    }

    /// Maps a normalised virtual path onto the transfer root.
    fn resolve(&self, virtual_path: &str) -> PathBuf {
        virtual_path
            .split('/')
            .filter(|component| !component.is_empty())
            .fold(self.shared.root.clone(), |path, component| {
                path.join(component)
            })
    }
}
