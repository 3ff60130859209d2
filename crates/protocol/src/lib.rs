#![deny(unsafe_code)]

//! # Overview
//!
//! `ctp-protocol` implements the text-protocol core shared by every Crestron
//! console transport: bounded substring searches over accumulated output,
//! prompt discovery and classification, the command/response polling state
//! machine, and the `dir` listing parser.
//!
//! # Design
//!
//! The console channel gives no delimiters, no length prefixes, and no
//! reliable end-of-output signal, so completion is inferred from prompt
//! reappearance or idle-output detection:
//!
//! - [`search`] provides the windowed find/strip helpers that everything
//!   else keys off.
//! - [`prompt`] extracts the prompt token a device prints before each
//!   command line and rejects known-unsupported models.
//! - [`channel`] drives one command through the Sent → Polling →
//!   Found | StalledTerminal state machine over any [`ConsoleChannel`].
//! - [`listing`] converts raw `dir` output into ordered directory and file
//!   name sequences.
//!
//! Transports implement [`ConsoleChannel`]; SSH exec sessions bypass this
//! crate's polling entirely because the remote-execution protocol already
//! delivers complete output.
//!
//! # Invariants
//!
//! - The prompt token is discovered once per session and treated as
//!   immutable afterwards; all completion detection is keyed off it unless a
//!   command supplies its own done-marker.
//! - A read timeout is never an error: it is "no new data this round".
//! - The polling machine always terminates: either the completion condition
//!   matches or the stall rule fires after a bounded number of silent
//!   rounds.

pub mod channel;
pub mod listing;
pub mod prompt;
pub mod search;

pub use channel::{
    ChannelConfig, CommandReply, CommandRequest, ConsoleChannel, Termination, run_console_command,
};
pub use listing::{Listing, parse_listing};
pub use prompt::{
    MAX_PROMPT_ATTEMPTS, PromptError, extract_console_prompt, extract_exec_prompt,
    is_unsupported_model,
};
pub use search::{StripLimit, contains_in_window, position_in_window, rposition_in_window, strip_prompt};
