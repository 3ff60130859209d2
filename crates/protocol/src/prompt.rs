//! Prompt discovery and device-model classification.
//!
//! A Crestron console prints a short token before each command line, e.g.
//! `AV3>`. That token is the only completion signal the console protocol
//! offers, so the session discovers it once up front and keys every
//! subsequent completion check off it. Over SSH no literal `>` is echoed;
//! the first token of a harmless status command's output serves instead.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Maximum number of probe attempts before prompt discovery gives up.
pub const MAX_PROMPT_ATTEMPTS: u32 = 3;

/// Model identifiers whose consoles cannot be replicated.
const UNSUPPORTED_MODELS: &[&str] = &["MERCURY"];

static CONSOLE_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]([\w-]{3,30})>").expect("console prompt pattern compiles"));

static EXEC_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w-]{3,30}) ").expect("exec prompt pattern compiles"));

/// Failures surfaced by prompt discovery.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PromptError {
    /// Every probe attempt completed without a prompt-shaped token in the
    /// device's output.
    #[error("console prompt not found on device after {attempts} attempts")]
    NotFound {
        /// Number of probe attempts performed.
        attempts: u32,
    },
    /// The device identified itself as a model this tool cannot drive. This
    /// is terminal; no retries are useful.
    #[error("device model `{model}` is unsupported")]
    UnsupportedDevice {
        /// The prompt token naming the rejected model.
        model: String,
    },
}

/// Extracts a prompt token from raw console output.
///
/// Matches three to thirty word characters or hyphens immediately followed
/// by `>` at the start of a line. The first match wins.
pub fn extract_console_prompt(data: &str) -> Option<&str> {
    CONSOLE_PROMPT
        .captures(data)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

/// Extracts a prompt token from the output of a status command run over an
/// exec channel, where no literal `>` is echoed.
pub fn extract_exec_prompt(data: &str) -> Option<&str> {
    EXEC_PROMPT
        .captures(data)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

/// Reports whether the discovered prompt names a known-unsupported model.
pub fn is_unsupported_model(prompt: &str) -> bool {
    UNSUPPORTED_MODELS.contains(&prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_console_prompt_after_line_break() {
        let banner = "Control Console\r\nAV3>";
        assert_eq!(extract_console_prompt(banner), Some("AV3"));
    }

    #[test]
    fn first_console_match_wins() {
        let data = "\r\nCP3-00A1>\r\nPRO3>";
        assert_eq!(extract_console_prompt(data), Some("CP3-00A1"));
    }

    #[test]
    fn console_prompt_requires_leading_line_break() {
        assert_eq!(extract_console_prompt("AV3>"), None);
    }

    #[test]
    fn short_tokens_are_not_prompts() {
        assert_eq!(extract_console_prompt("\r\nA>"), None);
    }

    #[test]
    fn extracts_exec_prompt_from_version_output() {
        let output = "AV3 Cntrl Eng [v1.503.3568.25373 #4001E302]";
        assert_eq!(extract_exec_prompt(output), Some("AV3"));
    }

    #[test]
    fn mercury_is_unsupported() {
        assert!(is_unsupported_model("MERCURY"));
        assert!(!is_unsupported_model("AV3"));
    }
}
