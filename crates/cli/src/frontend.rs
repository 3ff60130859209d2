//! Argument table and parsed options.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command as ClapCommand, value_parser};
use ctp_engine::FtpCredentials;

/// Program name used for usage output and diagnostics.
pub const PROGRAM_NAME: &str = "ctp-replicate";

/// Fully parsed command-line surface.
#[derive(Clone, Debug)]
pub(crate) struct Options {
    /// Address of the device to replicate.
    pub device_address: String,
    /// Address of the FTP server the device will export files to.
    pub ftp_server: String,
    /// Print push commands without transferring or touching the local
    /// filesystem.
    pub dry_run: bool,
    /// Use SSH instead of the CTP console port.
    pub force_ssh: bool,
    /// Device account name for SSH sessions.
    pub username: String,
    /// Device password; prompted for interactively when omitted on an SSH
    /// session.
    pub password: Option<String>,
    /// Directory transferred files are placed under; defaults to the
    /// current directory.
    pub ftp_dir: Option<PathBuf>,
    /// Transfer-server account name; empty or absent means anonymous.
    pub ftp_username: Option<String>,
    /// Transfer-server password.
    pub ftp_password: String,
    /// Run a local FTP server for the device to push to.
    pub local_ftp_server: bool,
    /// Interface the local FTP server binds; empty binds all interfaces.
    pub local_ftp_interface: String,
    /// Port the local FTP server listens on.
    pub local_ftp_port: u16,
    /// Per-read socket timeout in seconds.
    pub socket_timeout: u64,
}

impl Options {
    /// Credentials the device should present to the transfer server, when
    /// an account is configured.
    pub(crate) fn ftp_credentials(&self) -> Option<FtpCredentials> {
        self.ftp_username
            .as_ref()
            .filter(|username| !username.is_empty())
            .map(|username| FtpCredentials {
                username: username.clone(),
                password: self.ftp_password.clone(),
            })
    }
}

fn command() -> ClapCommand {
    ClapCommand::new(PROGRAM_NAME)
        .about("Replicates a Crestron control processor's filesystem over CTP or SSH")
        .arg(
            Arg::new("ip-address")
                .short('i')
                .long("ip-address")
                .value_name("ADDRESS")
                .required(true)
                .help("IP address of the Crestron device to replicate"),
        )
        .arg(
            Arg::new("ftp-server")
                .short('f')
                .long("ftp-server")
                .value_name("ADDRESS")
                .required(true)
                .help("Address of the FTP server the device will export files to"),
        )
        .arg(
            Arg::new("dry-run")
                .short('d')
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Walk the filesystem and print FPUTfile commands without transferring"),
        )
        .arg(
            Arg::new("force-ssh")
                .short('s')
                .long("force-ssh")
                .action(ArgAction::SetTrue)
                .help("Use SSH rather than the CTP console port"),
        )
        .arg(
            Arg::new("username")
                .short('u')
                .long("username")
                .value_name("NAME")
                .default_value("crestron")
                .help("Device authentication user name"),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .long("password")
                .value_name("PASSWORD")
                .help("Device authentication password (prompted for over SSH when omitted)"),
        )
        .arg(
            Arg::new("ftp-dir")
                .long("ftp-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory where transferred files are placed (defaults to the current directory)"),
        )
        .arg(
            Arg::new("ftp-username")
                .long("ftp-username")
                .value_name("NAME")
                .help("Local/remote FTP server user name (anonymous when omitted)"),
        )
        .arg(
            Arg::new("ftp-password")
                .long("ftp-password")
                .value_name("PASSWORD")
                .default_value("")
                .help("Local/remote FTP server password"),
        )
        .arg(
            Arg::new("local-ftp-server")
                .long("local-ftp-server")
                .action(ArgAction::SetTrue)
                .help("Start a local FTP server to receive the pushed files"),
        )
        .arg(
            Arg::new("local-ftp-interface")
                .long("local-ftp-interface")
                .value_name("ADDRESS")
                .default_value("")
                .help("Local FTP server interface (defaults to all local interfaces)"),
        )
        .arg(
            Arg::new("local-ftp-port")
                .long("local-ftp-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .default_value("21")
                .help("Local FTP server port"),
        )
        .arg(
            Arg::new("socket-timeout")
                .long("socket-timeout")
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .default_value("5")
                .help("Per-read console socket timeout in seconds"),
        )
}

pub(crate) fn parse<I, S>(arguments: I) -> Result<Options, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(arguments)?;
    Ok(Options {
        device_address: matches
            .get_one::<String>("ip-address")
            .cloned()
            .unwrap_or_default(),
        ftp_server: matches
            .get_one::<String>("ftp-server")
            .cloned()
            .unwrap_or_default(),
        dry_run: matches.get_flag("dry-run"),
        force_ssh: matches.get_flag("force-ssh"),
        username: matches
            .get_one::<String>("username")
            .cloned()
            .unwrap_or_default(),
        password: matches.get_one::<String>("password").cloned(),
        ftp_dir: matches.get_one::<PathBuf>("ftp-dir").cloned(),
        ftp_username: matches.get_one::<String>("ftp-username").cloned(),
        ftp_password: matches
            .get_one::<String>("ftp-password")
            .cloned()
            .unwrap_or_default(),
        local_ftp_server: matches.get_flag("local-ftp-server"),
        local_ftp_interface: matches
            .get_one::<String>("local-ftp-interface")
            .cloned()
            .unwrap_or_default(),
        local_ftp_port: matches
            .get_one::<u16>("local-ftp-port")
            .copied()
            .unwrap_or(21),
        socket_timeout: matches
            .get_one::<u64>("socket-timeout")
            .copied()
            .unwrap_or(5),
    })
}
