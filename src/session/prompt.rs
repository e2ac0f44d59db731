//! Prompt sentinel used to recover exit statuses from an interactive shell.
//!
//! The shell is started with `PS1=___${?}___> `, so every prompt it prints on
//! stderr embeds the status of the previous command.

use std::ops::Range;
use std::str;
use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::compute::ExecError;

/// Arguments that start an interactive POSIX shell with the sentinel prompt.
pub const SHELL_ARGV: [&str; 4] = ["env", "PS1=___${?}___> ", "/bin/sh", "-i"];

#[expect(
    clippy::expect_used,
    reason = "the pattern is a literal and is covered by tests"
)]
static PROMPT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"___(\d+)___> ").expect("prompt pattern should compile"));

/// One prompt found in a chunk of shell output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PromptMatch {
    /// Byte range of the whole prompt within the chunk.
    pub span: Range<usize>,
    /// Byte range of the status digits within the chunk.
    pub status: Range<usize>,
}

/// Returns every prompt in `chunk`, in order of appearance.
#[must_use]
pub fn find_prompts(chunk: &[u8]) -> Vec<PromptMatch> {
    PROMPT_PATTERN
        .captures_iter(chunk)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let digits = caps.get(1)?;
            Some(PromptMatch {
                span: whole.range(),
                status: digits.range(),
            })
        })
        .collect()
}

/// Returns `true` when `chunk` ends exactly with a prompt.
#[must_use]
pub fn ends_with_prompt(chunk: &[u8]) -> bool {
    find_prompts(chunk)
        .last()
        .is_some_and(|prompt| prompt.span.end == chunk.len())
}

/// Copies `chunk` without the given prompts.
///
/// Prompts are removed back to front so earlier spans stay valid.
#[must_use]
pub fn strip_prompts(chunk: &[u8], prompts: &[PromptMatch]) -> Vec<u8> {
    let mut residue = chunk.to_vec();
    for prompt in prompts.iter().rev() {
        if prompt.span.end <= residue.len() {
            residue.drain(prompt.span.clone());
        }
    }
    residue
}

/// Parses the status embedded in `prompt`.
///
/// # Errors
///
/// Returns [`ExecError::Protocol`] when the digits do not fit an `i32`.
pub fn parse_status(chunk: &[u8], prompt: &PromptMatch) -> Result<i32, ExecError> {
    let digits = chunk
        .get(prompt.status.clone())
        .ok_or_else(|| ExecError::Protocol(String::from("prompt status outside chunk")))?;
    let text = str::from_utf8(digits)
        .map_err(|err| ExecError::Protocol(format!("unable to parse return code: {err}")))?;
    text.parse::<i32>()
        .map_err(|err| ExecError::Protocol(format!("unable to parse return code {text:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"___0___> ".as_slice(), true)]
    #[case(b"welcome\n___0___> ".as_slice(), true)]
    #[case(b"___0___> trailing".as_slice(), false)]
    #[case(b"no prompt here".as_slice(), false)]
    #[case(b"".as_slice(), false)]
    fn detects_trailing_prompt(#[case] chunk: &[u8], #[case] expected: bool) {
        assert_eq!(ends_with_prompt(chunk), expected);
    }

    #[rstest]
    fn strips_every_prompt_and_keeps_residue() {
        let chunk = b"err one\n___1___> err two\n___0___> ";
        let prompts = find_prompts(chunk);
        assert_eq!(prompts.len(), 2);
        assert_eq!(strip_prompts(chunk, &prompts), b"err one\nerr two\n".to_vec());
    }

    #[rstest]
    #[case(b"___0___> ".as_slice(), 0)]
    #[case(b"___127___> ".as_slice(), 127)]
    #[case(b"noise ___42___> ".as_slice(), 42)]
    fn parses_embedded_status(#[case] chunk: &[u8], #[case] expected: i32) {
        let prompts = find_prompts(chunk);
        let first = prompts.first().unwrap_or_else(|| panic!("prompt expected"));
        let status = parse_status(chunk, first).unwrap_or_else(|err| panic!("parse: {err}"));
        assert_eq!(status, expected);
    }

    #[rstest]
    fn oversized_status_is_a_protocol_error() {
        let chunk = b"___99999999999___> ";
        let prompts = find_prompts(chunk);
        let first = prompts.first().unwrap_or_else(|| panic!("prompt expected"));
        let err = parse_status(chunk, first).expect_err("status should overflow i32");
        assert!(matches!(err, ExecError::Protocol(_)), "unexpected error: {err}");
    }

    #[rstest]
    fn shell_argv_sets_sentinel_prompt() {
        assert_eq!(SHELL_ARGV.get(1), Some(&"PS1=___${?}___> "));
    }
}
