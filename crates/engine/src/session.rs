//! Device session: one transport, one prompt, one command at a time.

use std::io;
use std::thread;

use ctp_protocol::{
    ChannelConfig, CommandRequest, ConsoleChannel, MAX_PROMPT_ATTEMPTS, PromptError, StripLimit,
    Termination, extract_console_prompt, extract_exec_prompt, is_unsupported_model,
    run_console_command, strip_prompt,
};
use ctp_transport::Transport;

use crate::ReplicateError;

/// Minimum prompt offset for `dir` replies, tuned to skip past the echoed
/// command so the prompt inside the echo does not count as completion.
pub const DIR_PROMPT_MIN_OFFSET: usize = 40;

/// Neutral console probe: a bare pair of line terminators.
const CONSOLE_PROBE: &[u8] = b"\r\r";

/// Harmless status command used to probe over the exec transport.
const EXEC_PROBE: &str = "ver";

/// Root of the device filesystem in console path syntax.
const REMOTE_ROOT: &str = "\\";

fn prompt_not_discovered() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "console prompt has not been discovered",
    )
}

/// An established connection to one device.
///
/// Owns the transport for the whole session; the prompt token is set once
/// by [`discover_prompt`](Self::discover_prompt) and read by every
/// subsequent command's completion check.
#[derive(Debug)]
pub struct DeviceSession {
    transport: Transport,
    prompt: Option<String>,
    channel: ChannelConfig,
}

impl DeviceSession {
    /// Wraps a freshly connected transport.
    #[must_use]
    pub const fn new(transport: Transport, channel: ChannelConfig) -> Self {
        Self {
            transport,
            prompt: None,
            channel,
        }
    }

    /// Reports whether the session runs over the exec transport.
    #[must_use]
    pub const fn is_exec(&self) -> bool {
        self.transport.is_exec()
    }

    /// The discovered prompt token, if discovery has run.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Discovers the console prompt with a bounded number of probes.
    ///
    /// A device that identifies as a known-unsupported model fails
    /// immediately without further retries. Once discovered, the prompt is
    /// immutable for the remainder of the session.
    pub fn discover_prompt(&mut self) -> Result<String, ReplicateError> {
        if let Some(prompt) = &self.prompt {
            return Ok(prompt.clone());
        }
        let token = self.probe_for_prompt()?;
        if is_unsupported_model(&token) {
            return Err(PromptError::UnsupportedDevice { model: token }.into());
        }
        tracing::info!(prompt = %token, "console prompt discovered");
        self.prompt = Some(token.clone());
        Ok(token)
    }

    fn probe_for_prompt(&mut self) -> Result<String, ReplicateError> {
        let mut accumulated = String::new();
        for attempt in 1..=MAX_PROMPT_ATTEMPTS {
            let found = match &mut self.transport {
                Transport::Exec(channel) => {
                    let output = channel.execute(EXEC_PROBE)?;
                    thread::sleep(self.channel.settle);
                    extract_exec_prompt(&output).map(str::to_owned)
                }
                Transport::Console(stream) => {
                    stream.send(CONSOLE_PROBE)?;
                    let chunk = stream
                        .recv_timeout(self.channel.buffer_size, self.channel.poll_timeout)?;
                    accumulated.push_str(&String::from_utf8_lossy(&chunk));
                    thread::sleep(self.channel.settle);
                    extract_console_prompt(&accumulated).map(str::to_owned)
                }
            };
            if let Some(token) = found {
                tracing::debug!(attempt, "prompt-shaped token found");
                return Ok(token);
            }
        }
        Err(PromptError::NotFound {
            attempts: MAX_PROMPT_ATTEMPTS,
        }
        .into())
    }

    /// Sends one command and returns its output once complete.
    ///
    /// Console sessions go through the polling machine keyed on the
    /// discovered prompt (or `done_marker` when supplied); a stalled
    /// command logs a warning and yields whatever accumulated. Exec
    /// sessions return the remote command's full output directly.
    pub fn run_command(
        &mut self,
        command: &str,
        min_offset: usize,
        done_marker: Option<&str>,
    ) -> Result<String, ReplicateError> {
        match &mut self.transport {
            Transport::Exec(channel) => Ok(channel.execute(command)?),
            Transport::Console(stream) => {
                let prompt = self.prompt.as_deref().ok_or_else(prompt_not_discovered)?;
                let request = CommandRequest {
                    command,
                    min_offset,
                    done_marker,
                };
                let reply = run_console_command(stream, prompt, &request, &self.channel)?;
                if reply.termination == Termination::Stalled {
                    tracing::warn!(
                        command,
                        "no completion detected; continuing with partial output"
                    );
                }
                Ok(reply.text)
            }
        }
    }

    /// Fetches the raw listing for one remote directory.
    ///
    /// An empty path lists the device root. Console replies get the echoed
    /// prompt stripped; exec replies are merely trimmed since no prompt is
    /// echoed over that transport.
    pub fn dir_listing(&mut self, remote_path: &str) -> Result<String, ReplicateError> {
        let target = if remote_path.is_empty() {
            REMOTE_ROOT
        } else {
            remote_path
        };
        let raw = self.run_command(&format!("dir {target}"), DIR_PROMPT_MIN_OFFSET, None)?;
        if self.is_exec() {
            return Ok(raw.trim().to_owned());
        }
        match self.prompt.as_deref() {
            Some(prompt) => Ok(strip_prompt(&raw, prompt, StripLimit::First)),
            None => Ok(raw),
        }
    }

    /// Closes the transport, best-effort and idempotent.
    pub fn close(&mut self) {
        tracing::info!("shutting down device connection");
        self.transport.close();
    }
}
