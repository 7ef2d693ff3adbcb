// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The token protocol spoken by instrumented firmware.
//!
//! Firmware built by fremtester announces progress on its UART with framed
//! tokens of the form `^^^FREMTESTER:<id>:<keyword>^^^`, one per line. The id
//! is the correlation id baked into the image at build time; the keyword
//! describes what the test just did. Everything else on the wire is chatter
//! from the firmware and carries no meaning for the harness.

use regex::Regex;
use std::sync::LazyLock;

/// The envelope must start the line; bytes after the closing `^^^` are
/// allowed. The keyword sits after the last colon, so ids may themselves
/// contain colons.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\^\^\^FREMTESTER:(.*):(.*)\^\^\^").expect("token regex is valid")
});

/// The keyword of a result token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// The firmware came up and entered the test body.
    Begin,

    /// The test finished and passed.
    Pass,

    /// The test finished and failed.
    Fail,

    /// The keyword wasn't a recognized one.
    ///
    /// Unrecognized keywords are kept rather than dropped so misbehaving
    /// firmware is still attributed to the test that produced it.
    Unknown,
}

impl TokenKind {
    /// Maps a wire keyword to its kind. Total: every keyword maps somewhere.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "BEGIN" => TokenKind::Begin,
            "PASS" => TokenKind::Pass,
            "FAIL" => TokenKind::Fail,
            _ => TokenKind::Unknown,
        }
    }
}

/// A single token received from the device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResultToken {
    /// The correlation id embedded in the image that printed this token.
    pub test_id: String,

    /// The parsed keyword.
    pub kind: TokenKind,
}

/// Parses one line of serial output into a token.
///
/// Returns `None` for lines that don't carry a token.
pub fn parse_line(line: &str) -> Option<ResultToken> {
    let captures = TOKEN_RE.captures(line)?;
    Some(ResultToken {
        test_id: captures[1].to_owned(),
        kind: TokenKind::from_keyword(&captures[2]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("BEGIN", TokenKind::Begin)]
    #[test_case("PASS", TokenKind::Pass)]
    #[test_case("FAIL", TokenKind::Fail)]
    #[test_case("WOBBLE", TokenKind::Unknown)]
    #[test_case("pass", TokenKind::Unknown; "keywords are case sensitive")]
    #[test_case("", TokenKind::Unknown; "empty keyword")]
    fn keyword_mapping(keyword: &str, kind: TokenKind) {
        assert_eq!(TokenKind::from_keyword(keyword), kind);
    }

    #[test]
    fn parses_well_formed_tokens() {
        assert_eq!(
            parse_line("^^^FREMTESTER:3c1f0a:BEGIN^^^"),
            Some(ResultToken {
                test_id: "3c1f0a".to_owned(),
                kind: TokenKind::Begin,
            }),
        );
        assert_eq!(
            parse_line("^^^FREMTESTER:3c1f0a:PASS^^^"),
            Some(ResultToken {
                test_id: "3c1f0a".to_owned(),
                kind: TokenKind::Pass,
            }),
        );
    }

    #[test]
    fn keyword_sits_after_the_last_colon() {
        assert_eq!(
            parse_line("^^^FREMTESTER:dead:beef:FAIL^^^"),
            Some(ResultToken {
                test_id: "dead:beef".to_owned(),
                kind: TokenKind::Fail,
            }),
        );
    }

    #[test]
    fn empty_id_and_keyword_still_parse() {
        assert_eq!(
            parse_line("^^^FREMTESTER::^^^"),
            Some(ResultToken {
                test_id: String::new(),
                kind: TokenKind::Unknown,
            }),
        );
    }

    #[test]
    fn trailing_bytes_after_envelope_are_allowed() {
        assert_eq!(
            parse_line("^^^FREMTESTER:ab:PASS^^^ and some trailing noise"),
            Some(ResultToken {
                test_id: "ab".to_owned(),
                kind: TokenKind::Pass,
            }),
        );
    }

    #[test_case(""; "empty line")]
    #[test_case("hello from the firmware"; "plain chatter")]
    #[test_case("^^^FREMTESTER:ab:PASS^^"; "unterminated envelope")]
    #[test_case("^^^FREMTESTER-ab-PASS^^^"; "malformed separators")]
    #[test_case("  ^^^FREMTESTER:ab:PASS^^^"; "envelope must start the line")]
    #[test_case("log: ^^^FREMTESTER:ab:PASS^^^"; "envelope after prefix")]
    fn non_tokens_are_ignored(line: &str) {
        assert_eq!(parse_line(line), None);
    }

    proptest! {
        #[test]
        fn parse_line_never_panics(line in ".*") {
            _ = parse_line(&line);
        }

        #[test]
        fn well_formed_lines_always_parse(
            id in "[a-f0-9-]{1,40}",
            keyword in "[A-Z]{1,10}",
        ) {
            let line = format!("^^^FREMTESTER:{id}:{keyword}^^^");
            let token = parse_line(&line).expect("line is well-formed");
            prop_assert_eq!(token.test_id, id);
            prop_assert_eq!(token.kind, TokenKind::from_keyword(&keyword));
        }
    }
}
