//! One-command-at-a-time console polling.
//!
//! The console protocol echoes input, prints output, and eventually prints
//! the prompt again. Nothing frames any of it. [`run_console_command`]
//! therefore drives a small state machine: transmit the command, strip the
//! echo, then poll bounded reads until the completion condition matches or
//! the device has been silent long enough to call the command finished.

use std::io;
use std::thread;
use std::time::Duration;

use crate::search::contains_in_window;

/// Line terminator the console expects and echoes.
pub const CR: &str = "\r";

/// Byte-oriented console transport as seen by the polling machine.
///
/// Implemented by the CTP socket transport; tests substitute scripted
/// channels. Exec-style transports never pass through here because their
/// protocol already delivers complete output per command.
pub trait ConsoleChannel {
    /// Transmits raw bytes to the device.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Attempts a bounded read.
    ///
    /// Returns an empty buffer when the timeout elapses with no data; that
    /// is an ordinary outcome, not an error. A closed peer is an error.
    fn recv_timeout(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>>;
}

/// Timing and threshold knobs for the polling machine.
///
/// The defaults reproduce the behaviour observed against shipping firmware;
/// tests shrink the delays to keep the suite fast.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Upper bound on a single read.
    pub buffer_size: usize,
    /// Per-attempt read timeout.
    pub poll_timeout: Duration,
    /// Settle delay between protocol steps; newer firmware drops output
    /// written immediately after a command.
    pub settle: Duration,
    /// A bare line terminator is retransmitted every this-many polling
    /// rounds to coax output from devices that completed silently.
    pub retransmit_interval: u32,
    /// Consecutive retransmit-interval checks with no output growth before
    /// the command is declared stalled.
    pub stall_checks: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer_size: 20_000,
            poll_timeout: Duration::from_secs(5),
            settle: Duration::from_millis(500),
            retransmit_interval: 5,
            stall_checks: 3,
        }
    }
}

/// One command together with its completion condition.
#[derive(Clone, Copy, Debug)]
pub struct CommandRequest<'a> {
    /// Command text, without line terminators.
    pub command: &'a str,
    /// Position at or after which the completion token (done-marker or
    /// prompt) must appear. Tuned per command to skip the echoed command
    /// itself.
    pub min_offset: usize,
    /// Literal completion marker overriding prompt detection, for commands
    /// whose real work finishes asynchronously from the prompt.
    pub done_marker: Option<&'a str>,
}

/// How a command's output was judged complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Termination {
    /// The session prompt reappeared at or after the minimum offset.
    Prompt,
    /// The caller's done-marker appeared.
    Marker,
    /// The device went silent for the configured number of rounds; the
    /// accumulated output is returned as-is. Soft exit, not an error.
    Stalled,
}

/// Accumulated output plus the completion verdict.
#[derive(Clone, Debug)]
pub struct CommandReply {
    /// Everything received after the echoed command was stripped.
    pub text: String,
    /// Why polling stopped.
    pub termination: Termination,
}

fn completion(data: &str, prompt: &str, request: &CommandRequest<'_>) -> Option<Termination> {
    if let Some(marker) = request.done_marker {
        return contains_in_window(data, marker, request.min_offset, 0)
            .then_some(Termination::Marker);
    }
    let token = format!("{prompt}>");
    contains_in_window(data, &token, request.min_offset, 0).then_some(Termination::Prompt)
}

/// Sends one command and blocks until its output is complete.
///
/// Polling rounds are bounded: every [`ChannelConfig::retransmit_interval`]
/// rounds the accumulated length is compared with the previous check, and
/// [`ChannelConfig::stall_checks`] consecutive unchanged checks end the
/// command with [`Termination::Stalled`]. With the defaults that is fifteen
/// silent rounds, so the call can never hang indefinitely while still
/// letting slow commands finish via the per-round completion re-check.
pub fn run_console_command<C: ConsoleChannel>(
    channel: &mut C,
    prompt: &str,
    request: &CommandRequest<'_>,
    config: &ChannelConfig,
) -> io::Result<CommandReply> {
    let framed = format!("{CR}{}{CR}", request.command);
    channel.send(framed.as_bytes())?;
    thread::sleep(config.settle);

    // Devices echo input; drop the echoed command line from the first chunk.
    let first = channel.recv_timeout(config.buffer_size, config.poll_timeout)?;
    let mut accumulated = String::from_utf8_lossy(&first).replace(&framed, "");
    thread::sleep(config.settle);

    let mut length_at_last_check = accumulated.len();
    let mut rounds_since_retransmit = 0u32;
    let mut unchanged_checks = 0u32;

    loop {
        if let Some(termination) = completion(&accumulated, prompt, request) {
            return Ok(CommandReply {
                text: accumulated,
                termination,
            });
        }

        let chunk = channel.recv_timeout(config.buffer_size, config.poll_timeout)?;
        accumulated.push_str(&String::from_utf8_lossy(&chunk));
        thread::sleep(config.settle);

        rounds_since_retransmit += 1;
        if rounds_since_retransmit == config.retransmit_interval {
            rounds_since_retransmit = 0;
            channel.send(CR.as_bytes())?;
            thread::sleep(config.settle);

            if accumulated.len() == length_at_last_check {
                unchanged_checks += 1;
                if unchanged_checks >= config.stall_checks {
                    tracing::debug!(
                        command = request.command,
                        received = accumulated.len(),
                        "command output stalled; returning accumulated text"
                    );
                    return Ok(CommandReply {
                        text: accumulated,
                        termination: Termination::Stalled,
                    });
                }
            } else {
                unchanged_checks = 0;
            }
            length_at_last_check = accumulated.len();
        }
    }
}
