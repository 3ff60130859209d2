#![deny(unsafe_code)]

//! # Overview
//!
//! `ctp-cli` is the orchestration layer: it parses the command-line
//! surface, connects the chosen transport, discovers the prompt, brings up
//! the local transfer server when requested, runs the replication walk and
//! guarantees teardown on every exit path.
//!
//! # Exit codes
//!
//! Usage errors exit with 2 via clap's standard path. Every runtime
//! failure class maps to a single one-line diagnostic on stderr and exit
//! code 1; success is 0. No finer distinction is made.

mod frontend;

use std::env;
use std::ffi::OsString;
use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use is_terminal::IsTerminal;

use ctp_engine::{DeviceSession, Replicator, ReplicatorConfig, resolve_mirror_root};
use ctp_ftpd::{Credentials, FtpServer, Permissions, ServerConfig};
use ctp_protocol::ChannelConfig;
use ctp_transport::{CtpStream, ExecChannel, Transport};

pub use frontend::PROGRAM_NAME;
use frontend::Options;

/// Successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Any runtime failure: connection, prompt, server start, replication.
pub const EXIT_FAILURE: u8 = 1;
/// Command-line usage error.
pub const EXIT_USAGE: u8 = 2;

/// Installs the stderr diagnostics subscriber.
///
/// Honours `RUST_LOG`; defaults to `info`. Safe to call more than once -
/// later calls keep the first subscriber.
pub fn init_diagnostics() {
    use tracing_subscriber::EnvFilter;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Parses arguments and drives a full replication run.
///
/// All user-facing output goes through the supplied writers so binary
/// wrappers and tests share one execution path.
pub fn run<I, S, Out, ErrOut>(arguments: I, stdout: &mut Out, stderr: &mut ErrOut) -> u8
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    ErrOut: Write,
{
    match frontend::parse(arguments) {
        Ok(options) => execute(&options, stdout, stderr),
        Err(error) => report_usage(&error, stdout, stderr),
    }
}

fn report_usage<Out: Write, ErrOut: Write>(
    error: &clap::Error,
    stdout: &mut Out,
    stderr: &mut ErrOut,
) -> u8 {
    use clap::error::ErrorKind;

    let rendered = error.render();
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = write!(stdout, "{rendered}");
            EXIT_SUCCESS
        }
        _ => {
            let _ = write!(stderr, "{rendered}");
            EXIT_USAGE
        }
    }
}

fn fail<ErrOut: Write, E: Display>(stderr: &mut ErrOut, error: &E) -> u8 {
    let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
    EXIT_FAILURE
}

fn execute<Out: Write, ErrOut: Write>(
    options: &Options,
    stdout: &mut Out,
    stderr: &mut ErrOut,
) -> u8 {
    let _ = writeln!(stdout, "Crestron CTP Filesystem Replicator");

    let timeout = Duration::from_secs(options.socket_timeout);
    let channel = ChannelConfig {
        poll_timeout: timeout,
        ..ChannelConfig::default()
    };

    let transport = if options.force_ssh {
        let password = resolve_device_password(options);
        ExecChannel::connect(&options.device_address, &options.username, &password, timeout)
            .map(Transport::Exec)
    } else {
        CtpStream::connect(&options.device_address, timeout).map(Transport::Console)
    };
    let transport = match transport {
        Ok(transport) => transport,
        Err(error) => return fail(stderr, &error),
    };
    tracing::debug!(transport = transport.name(), "device transport selected");

    let mut session = DeviceSession::new(transport, channel);
    let code = drive(&mut session, options, stdout, stderr);
    // Teardown runs on every exit path; its failures are logged inside.
    session.close();
    code
}

fn drive<Out: Write, ErrOut: Write>(
    session: &mut DeviceSession,
    options: &Options,
    stdout: &mut Out,
    stderr: &mut ErrOut,
) -> u8 {
    let prompt = match session.discover_prompt() {
        Ok(prompt) => prompt,
        Err(error) => return fail(stderr, &error),
    };

    let mirror_required = options.local_ftp_server && !options.dry_run;
    let output_base = output_base(options);
    let mirror_root = resolve_mirror_root(
        &output_base,
        &prompt,
        &options.device_address,
        mirror_required,
    );
    tracing::info!(path = %mirror_root.display(), "local transfer directory");

    let server = if mirror_required {
        match FtpServer::start(ServerConfig {
            interface: options.local_ftp_interface.clone(),
            port: options.local_ftp_port,
            root: mirror_root.clone(),
            credentials: options.ftp_credentials().map(|account| Credentials {
                username: account.username,
                password: account.password,
            }),
            permissions: Permissions::full(),
        }) {
            Ok(server) => Some(server),
            Err(error) => return fail(stderr, &error),
        }
    } else {
        None
    };

    let config = ReplicatorConfig {
        ftp_server: options.ftp_server.clone(),
        ftp_credentials: options.ftp_credentials(),
        mirror_root: mirror_required.then(|| mirror_root.clone()),
        dry_run: options.dry_run,
    };
    let outcome = Replicator::new(session, &config, stdout).run();

    // The server is stopped regardless of how the walk ended; a stop
    // failure is reported but never escalated.
    if let Some(server) = server {
        if let Err(error) = server.stop() {
            tracing::warn!(%error, "transfer server shutdown failed");
        }
    }

    match outcome {
        Ok(()) => EXIT_SUCCESS,
        Err(error) => fail(stderr, &error),
    }
}

fn output_base(options: &Options) -> PathBuf {
    options
        .ftp_dir
        .clone()
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Device password for SSH sessions: the flag when given, otherwise an
/// interactive prompt on a terminal, otherwise empty.
fn resolve_device_password(options: &Options) -> String {
    if let Some(password) = &options.password {
        return password.clone();
    }
    if std::io::stdin().is_terminal() {
        let request = format!("{}@{} password: ", options.username, options.device_address);
        if let Ok(password) = rpassword::prompt_password(request) {
            return password;
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_prints_to_stdout_and_succeeds() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run([PROGRAM_NAME, "--help"], &mut stdout, &mut stderr);

        assert_eq!(code, EXIT_SUCCESS);
        let help = String::from_utf8(stdout).unwrap();
        assert!(help.contains("--ip-address"));
        assert!(help.contains("--ftp-server"));
        assert!(help.contains("--local-ftp-server"));
        assert!(stderr.is_empty());
    }

    #[test]
    fn missing_required_arguments_print_usage_and_fail() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run([PROGRAM_NAME], &mut stdout, &mut stderr);

        assert_eq!(code, EXIT_USAGE);
        let usage = String::from_utf8(stderr).unwrap();
        assert!(usage.contains("--ip-address"));
        assert!(stdout.is_empty());
    }

    #[test]
    fn unreachable_device_reports_one_line_diagnostic() {
        // Nothing listens on the loopback console port, so the connection
        // is refused immediately and must fail without a stack trace.
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(
            [
                PROGRAM_NAME,
                "-i",
                "127.0.0.1",
                "-f",
                "192.0.2.10",
                "--socket-timeout",
                "1",
            ],
            &mut stdout,
            &mut stderr,
        );

        assert_eq!(code, EXIT_FAILURE);
        let diagnostic = String::from_utf8(stderr).unwrap();
        assert!(diagnostic.starts_with(PROGRAM_NAME));
        assert_eq!(diagnostic.lines().count(), 1);
    }
}
