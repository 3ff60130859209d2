//! Recursive mirror walk and push-command construction.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ctp_protocol::parse_listing;
use url::Url;

use crate::{DeviceSession, ReplicateError};

/// Console verb instructing the device to upload a file over FTP.
pub const PUSH_VERB: &str = "FPUTfile";

/// Literal the device prints when an FTP upload finishes. The push itself
/// is asynchronous from the device's prompt, so completion is keyed on
/// this marker instead.
pub const PUSH_DONE_MARKER: &str = "End Progress";

/// Hard bound on walk depth. The remote filesystem is expected to be a
/// tree; this only stops a pathological loop from walking forever.
pub const MAX_WALK_DEPTH: usize = 64;

/// Account the device should present to the transfer server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FtpCredentials {
    /// Transfer-server account name.
    pub username: String,
    /// Transfer-server password.
    pub password: String,
}

/// Everything the walk needs besides the session itself.
#[derive(Clone, Debug)]
pub struct ReplicatorConfig {
    /// Address the device uploads to, as embedded in each push command.
    pub ftp_server: String,
    /// Credentials appended to each push command, when the server wants
    /// an authenticated account.
    pub ftp_credentials: Option<FtpCredentials>,
    /// Local mirror root; `None` when no local mirror is maintained (dry
    /// runs and external transfer servers).
    pub mirror_root: Option<PathBuf>,
    /// Print push commands without sending them or touching the local
    /// filesystem.
    pub dry_run: bool,
}

/// Joins a remote directory path and an entry name in console syntax.
#[must_use]
pub fn join_remote(current: &str, name: &str) -> String {
    format!("{current}\\{name}")
}

/// Builds the `/`-separated transfer destination for a file entry.
#[must_use]
pub fn join_destination(current: &str, name: &str) -> String {
    format!("{}/{name}", current.replace('\\', "/"))
}

/// Maps a remote path onto the local mirror tree.
///
/// Components are joined explicitly; empty, `.` and `..` components are
/// discarded so a hostile listing cannot step outside the mirror root.
#[must_use]
pub fn mirror_path(root: &Path, remote_path: &str) -> PathBuf {
    remote_path
        .split('\\')
        .filter(|component| {
            !component.is_empty() && *component != "." && *component != ".."
        })
        .fold(root.to_path_buf(), |path, component| path.join(component))
}

/// Resolves the local mirror root for a discovered device.
///
/// Prefers `<base>/Crestron_Device_<prompt>`, falling back to the device
/// address and finally to `base` itself when directories cannot be
/// created. Creation only happens when a local mirror is actually
/// required; the preferred name is still returned otherwise so logs and
/// dry runs show where files would land.
pub fn resolve_mirror_root(
    base: &Path,
    prompt: &str,
    device_address: &str,
    create: bool,
) -> PathBuf {
    let preferred = base.join(format!("Crestron_Device_{prompt}"));
    if !create || preferred.is_dir() {
        return preferred;
    }
    match fs::create_dir_all(&preferred) {
        Ok(()) => return preferred,
        Err(error) => tracing::warn!(
            path = %preferred.display(),
            %error,
            "cannot create mirror root; falling back to device address"
        ),
    }
    let fallback = base.join(format!("Crestron_Device_{device_address}"));
    match fs::create_dir_all(&fallback) {
        Ok(()) => return fallback,
        Err(error) => tracing::warn!(
            path = %fallback.display(),
            %error,
            "cannot create fallback mirror root; using output directory"
        ),
    }
    base.to_path_buf()
}

/// Builds one `FPUTfile` command.
///
/// The destination is percent-encoded into an `ftp://` URL; the source is
/// quoted when it contains whitespace; credentials, when present, are
/// appended as `user:password`.
pub fn build_push_command(
    server: &str,
    destination: &str,
    source_path: &str,
    credentials: Option<&FtpCredentials>,
) -> Result<String, ReplicateError> {
    let mut url =
        Url::parse(&format!("ftp://{server}/")).map_err(|error| ReplicateError::PushTarget {
            address: server.to_owned(),
            source: error,
        })?;
    url.set_path(destination);

    let source = if source_path.contains(char::is_whitespace) {
        format!("\"{source_path}\"")
    } else {
        source_path.to_owned()
    };
    let mut command = format!("{PUSH_VERB} {url} {source}");
    if let Some(credentials) = credentials {
        command.push_str(&format!(" {}:{}", credentials.username, credentials.password));
    }
    Ok(command)
}

/// Depth-first replication of the remote tree.
///
/// Push commands are printed to `out` as they are issued (the only output
/// of a dry run). Failures below the root are logged and isolated to
/// their subtree so siblings keep replicating.
pub struct Replicator<'a, W> {
    session: &'a mut DeviceSession,
    config: &'a ReplicatorConfig,
    out: &'a mut W,
}

impl<'a, W: Write> Replicator<'a, W> {
    /// Prepares a walk over `session` with the given configuration.
    pub fn new(
        session: &'a mut DeviceSession,
        config: &'a ReplicatorConfig,
        out: &'a mut W,
    ) -> Self {
        Self {
            session,
            config,
            out,
        }
    }

    /// Replicates the whole tree starting at the device root.
    ///
    /// A failure listing the root itself is fatal; anything deeper is
    /// contained.
    pub fn run(&mut self) -> Result<(), ReplicateError> {
        self.replicate_directory("", 0)
    }

    fn replicate_directory(
        &mut self,
        remote_path: &str,
        depth: usize,
    ) -> Result<(), ReplicateError> {
        if depth > MAX_WALK_DEPTH {
            tracing::warn!(path = %remote_path, "maximum walk depth exceeded; skipping");
            return Ok(());
        }

        if let Some(root) = &self.config.mirror_root {
            let local = mirror_path(root, remote_path);
            if !local.is_dir() {
                if let Err(error) = fs::create_dir_all(&local) {
                    tracing::error!(
                        path = %local.display(),
                        %error,
                        "cannot create mirror directory; skipping subtree"
                    );
                    return Ok(());
                }
            }
        }

        let listing = parse_listing(&self.session.dir_listing(remote_path)?);
        let listed = if remote_path.is_empty() { "\\" } else { remote_path };
        tracing::debug!(
            path = listed,
            directories = listing.directories.len(),
            files = listing.files.len(),
            "listed remote directory"
        );

        // Directories first, in device order; files of the current
        // directory are pushed only after every subtree finished.
        for directory in &listing.directories {
            let child = join_remote(remote_path, directory);
            if let Err(error) = self.replicate_directory(&child, depth + 1) {
                tracing::error!(path = %child, %error, "subtree replication failed; continuing");
            }
        }

        for file in &listing.files {
            let source = join_remote(remote_path, file);
            let destination = join_destination(remote_path, file);
            if let Err(error) = self.push_file(&destination, &source) {
                tracing::error!(path = %source, %error, "file push failed; continuing");
            }
        }
        Ok(())
    }

    fn push_file(&mut self, destination: &str, source: &str) -> Result<(), ReplicateError> {
        let command = build_push_command(
            &self.config.ftp_server,
            destination,
            source,
            self.config.ftp_credentials.as_ref(),
        )?;
        writeln!(self.out, "{command}")?;
        if self.config.dry_run {
            return Ok(());
        }
        self.session.run_command(&command, 0, Some(PUSH_DONE_MARKER))?;
        Ok(())
    }
}
