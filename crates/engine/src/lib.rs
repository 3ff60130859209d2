#![deny(unsafe_code)]

//! # Overview
//!
//! `ctp-engine` drives a connected transport through a replication run:
//! prompt discovery, mirror-root resolution, the recursive directory walk,
//! and the push commands that make the device upload each file to the
//! transfer server.
//!
//! # Design
//!
//! - [`DeviceSession`] owns exactly one [`Transport`](ctp_transport::Transport)
//!   together with the prompt token, which is discovered once and immutable
//!   for the rest of the session. Commands dispatch on the transport
//!   variant: the console variant goes through the protocol crate's polling
//!   machine, the exec variant returns complete output directly.
//! - [`Replicator`] walks the remote tree depth-first in device order,
//!   pre-creating mirror directories ahead of the transfer server's writes
//!   and issuing one `FPUTfile` push per file. Failures below the root are
//!   isolated to their subtree; the walk never unwinds as a whole.
//!
//! The session is strictly half-duplex: at most one command is outstanding,
//! and the next is only issued once the previous one completed or stalled.

mod error;
mod replicate;
mod session;

pub use error::ReplicateError;
pub use replicate::{
    FtpCredentials, MAX_WALK_DEPTH, PUSH_DONE_MARKER, PUSH_VERB, Replicator, ReplicatorConfig,
    build_push_command, join_destination, join_remote, mirror_path, resolve_mirror_root,
};
pub use session::{DIR_PROMPT_MIN_OFFSET, DeviceSession};
