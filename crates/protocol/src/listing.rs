//! Parsing of `dir` command output.
//!
//! A listing line is either a directory (`[DIR]` marker, timestamp, name)
//! or a file (numeric size, timestamp, name), CRLF-terminated. Anything
//! else - banners, summaries, the trailing partial line a stalled command
//! can leave behind - simply fails to match and is dropped.

use std::sync::LazyLock;

use regex::Regex;

static DIRECTORY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[DIR\]\s+\d+-\d+-\d+ \d+:\d+:\d+ (?P<name>.+?)\r\n")
        .expect("directory line pattern compiles")
});

static FILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\s+\d+-\d+-\d+ \d+:\d+:\d+ (?P<name>.+?)\r\n")
        .expect("file line pattern compiles")
});

/// Structured view of one directory listing, in device order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Listing {
    /// Subdirectory names, in the order the device listed them.
    pub directories: Vec<String>,
    /// File names, in the order the device listed them.
    pub files: Vec<String>,
}

impl Listing {
    /// Reports whether the listing contained no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Extracts directory and file names from raw `dir` output.
pub fn parse_listing(raw: &str) -> Listing {
    let directories = DIRECTORY_LINE
        .captures_iter(raw)
        .map(|captures| captures["name"].to_owned())
        .collect();
    let files = FILE_LINE
        .captures_iter(raw)
        .map(|captures| captures["name"].to_owned())
        .collect();
    Listing { directories, files }
}
