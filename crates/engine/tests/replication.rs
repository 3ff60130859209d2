//! End-to-end replication tests against a scripted console device.
//!
//! A local TCP listener stands in for the device: it answers each framed
//! command with a canned response, exactly as prompt-terminated console
//! output would arrive. This drives the real transport, polling machine
//! and walk together.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use ctp_engine::{
    DeviceSession, FtpCredentials, Replicator, ReplicatorConfig, resolve_mirror_root,
};
use ctp_protocol::ChannelConfig;
use ctp_transport::{CtpStream, Transport};

struct ScriptedDevice {
    address: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    worker: JoinHandle<()>,
}

/// Serves canned responses keyed by the bare command text. The empty
/// command is the discovery probe (a pair of line terminators).
fn scripted_device(responses: HashMap<String, String>) -> ScriptedDevice {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    let worker = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buffer = [0u8; 4096];
        loop {
            let count = match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(count) => count,
            };
            let command = String::from_utf8_lossy(&buffer[..count])
                .trim_matches('\r')
                .to_owned();
            log.lock().unwrap().push(command.clone());
            if let Some(response) = responses.get(&command) {
                stream.write_all(response.as_bytes()).unwrap();
            }
        }
    });

    ScriptedDevice {
        address,
        received,
        worker,
    }
}

fn fast_channel() -> ChannelConfig {
    ChannelConfig {
        poll_timeout: Duration::from_millis(500),
        settle: Duration::ZERO,
        ..ChannelConfig::default()
    }
}

fn connect(device: &ScriptedDevice) -> DeviceSession {
    let stream = CtpStream::connect_endpoint(device.address, Duration::from_secs(1)).unwrap();
    DeviceSession::new(Transport::Console(stream), fast_channel())
}

fn banner(prompt: &str) -> String {
    format!("\r\n{prompt}>")
}

/// A listing body long enough that the prompt lands past the `dir`
/// command's minimum completion offset, as real echoed output does.
fn listing(header: &str, lines: &[&str], prompt: &str) -> String {
    let mut body = format!("Directory of {header}\r\n\r\n");
    for line in lines {
        body.push_str(line);
        body.push_str("\r\n");
    }
    body.push_str("     0 Dir(s) 180224 bytes free\r\n");
    body.push_str(&format!("{prompt}>"));
    body
}

#[test]
fn dry_run_prints_push_commands_and_sends_none() {
    let mut responses = HashMap::new();
    responses.insert(String::new(), banner("AV3"));
    responses.insert(
        "dir \\".to_owned(),
        listing(
            "\\",
            &[
                "[DIR]        2019-02-12 09:14:05 Media",
                "[DIR]        2019-02-12 09:14:07 Sys",
                "     53280   2019-03-01 17:22:10 config.cfg",
            ],
            "AV3",
        ),
    );
    responses.insert(
        "dir \\Media".to_owned(),
        listing(
            "\\Media",
            &[
                "   1048576   2020-05-01 10:00:00 movie.mp4",
                "      8812   2020-05-01 10:00:01 intro.wav",
            ],
            "AV3",
        ),
    );
    responses.insert(
        "dir \\Sys".to_owned(),
        listing("\\Sys", &["       412   2019-03-01 17:22:11 bar.dat"], "AV3"),
    );
    let device = scripted_device(responses);

    let mut session = connect(&device);
    session.discover_prompt().unwrap();

    let config = ReplicatorConfig {
        ftp_server: "192.0.2.10".to_owned(),
        ftp_credentials: None,
        mirror_root: None,
        dry_run: true,
    };
    let mut out = Vec::new();
    Replicator::new(&mut session, &config, &mut out).run().unwrap();
    session.close();
    device.worker.join().unwrap();

    let printed = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = printed.lines().collect();
    assert_eq!(
        lines,
        [
            "FPUTfile ftp://192.0.2.10/Media/movie.mp4 \\Media\\movie.mp4",
            "FPUTfile ftp://192.0.2.10/Media/intro.wav \\Media\\intro.wav",
            "FPUTfile ftp://192.0.2.10/Sys/bar.dat \\Sys\\bar.dat",
            "FPUTfile ftp://192.0.2.10/config.cfg \\config.cfg",
        ]
    );

    // The device saw the probe and the listings, never a push.
    let received = device.received.lock().unwrap();
    assert_eq!(
        received.as_slice(),
        ["", "dir \\", "dir \\Media", "dir \\Sys"]
    );
}

#[test]
fn replication_creates_mirror_directories_and_pushes_files() {
    let push = "FPUTfile ftp://192.0.2.10/config.cfg \\config.cfg crestron:secret";

    let mut responses = HashMap::new();
    responses.insert(String::new(), banner("AV3"));
    responses.insert(
        "dir \\".to_owned(),
        listing(
            "\\",
            &[
                "[DIR]        2019-02-12 09:14:05 Media",
                "     53280   2019-03-01 17:22:10 config.cfg",
            ],
            "AV3",
        ),
    );
    responses.insert("dir \\Media".to_owned(), listing("\\Media", &[], "AV3"));
    responses.insert(
        push.to_owned(),
        "Transferring file...\r\nEnd Progress\r\nAV3>".to_owned(),
    );
    let device = scripted_device(responses);

    let scratch = tempfile::tempdir().unwrap();
    let mut session = connect(&device);
    let prompt = session.discover_prompt().unwrap();
    assert_eq!(prompt, "AV3");

    let mirror_root = resolve_mirror_root(scratch.path(), &prompt, "192.0.2.44", true);
    assert_eq!(mirror_root, scratch.path().join("Crestron_Device_AV3"));
    assert!(mirror_root.is_dir());

    let config = ReplicatorConfig {
        ftp_server: "192.0.2.10".to_owned(),
        ftp_credentials: Some(FtpCredentials {
            username: "crestron".to_owned(),
            password: "secret".to_owned(),
        }),
        mirror_root: Some(mirror_root.clone()),
        dry_run: false,
    };
    let mut out = Vec::new();
    Replicator::new(&mut session, &config, &mut out).run().unwrap();
    session.close();
    device.worker.join().unwrap();

    assert!(mirror_root.join("Media").is_dir());
    let received = device.received.lock().unwrap();
    assert_eq!(
        received.as_slice(),
        ["", "dir \\", "dir \\Media", push]
    );
}

#[test]
fn unsupported_model_fails_immediately_without_retries() {
    let mut responses = HashMap::new();
    responses.insert(String::new(), banner("MERCURY"));
    let device = scripted_device(responses);

    let mut session = connect(&device);
    let error = session.discover_prompt().unwrap_err();
    assert!(error.is_unsupported_device());

    session.close();
    device.worker.join().unwrap();

    // A single probe, no retries.
    assert_eq!(device.received.lock().unwrap().as_slice(), [""]);
}

#[test]
fn missing_prompt_exhausts_the_retry_budget() {
    let mut responses = HashMap::new();
    responses.insert(String::new(), "no shell here\r\n".to_owned());
    let device = scripted_device(responses);

    let mut session = connect(&device);
    let error = session.discover_prompt().unwrap_err();
    assert!(!error.is_unsupported_device());
    assert!(error.to_string().contains("not found"));

    session.close();
    device.worker.join().unwrap();

    assert_eq!(device.received.lock().unwrap().as_slice(), ["", "", ""]);
}
