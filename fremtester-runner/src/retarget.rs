// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test retarget shims.
//!
//! Every firmware image carries a small retarget translation unit that wires
//! the C library's stdio to the UART and bakes in the correlation id of the
//! test being run. Sites provide it as a template: `$TESTID` (or `${TESTID}`)
//! marks where the id goes, and `$$` produces a literal dollar sign.
//!
//! Templates are parsed and validated up front, before any test is built: a
//! template that references an undefined placeholder, never mentions
//! `$TESTID`, or contains a stray `$` fails the session immediately.

use crate::errors::TemplateError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the placeholder that receives the correlation id.
pub const TEST_ID_PLACEHOLDER: &str = "TESTID";

#[derive(Clone, Debug)]
enum Segment {
    Literal(String),
    TestId,
}

/// A parsed and validated retarget template.
#[derive(Clone, Debug)]
pub struct RetargetTemplate {
    path: Utf8PathBuf,
    segments: Vec<Segment>,
}

impl RetargetTemplate {
    /// Loads and validates a template.
    pub fn load(path: &Utf8Path) -> Result<Self, TemplateError> {
        let text = fs::read_to_string(path).map_err(|err| TemplateError::Read {
            path: path.to_owned(),
            err,
        })?;
        Self::parse(path, &text)
    }

    /// Returns the path the template was loaded from.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Renders the template with the given correlation id.
    pub fn render(&self, test_id: &str) -> String {
        let capacity = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.len(),
                Segment::TestId => test_id.len(),
            })
            .sum();
        let mut out = String::with_capacity(capacity);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::TestId => out.push_str(test_id),
            }
        }
        out
    }

    // Placeholder syntax is a dollar sign followed by an identifier, a braced
    // identifier, or another dollar sign. Identifiers and the delimiters are
    // all ASCII, so scanning bytes and slicing the original text is safe.
    fn parse(path: &Utf8Path, text: &str) -> Result<Self, TemplateError> {
        let bytes = text.as_bytes();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut saw_test_id = false;
        let mut i = 0;

        let mut push_name = |name: &str,
                             literal: &mut String,
                             segments: &mut Vec<Segment>|
         -> Result<(), TemplateError> {
            if name != TEST_ID_PLACEHOLDER {
                return Err(TemplateError::UndefinedPlaceholder {
                    path: path.to_owned(),
                    name: name.to_owned(),
                });
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(literal)));
            }
            segments.push(Segment::TestId);
            saw_test_id = true;
            Ok(())
        };

        while i < bytes.len() {
            if bytes[i] != b'$' {
                let start = i;
                while i < bytes.len() && bytes[i] != b'$' {
                    i += 1;
                }
                literal.push_str(&text[start..i]);
                continue;
            }

            let at = i;
            i += 1;
            match bytes.get(i) {
                Some(b'$') => {
                    literal.push('$');
                    i += 1;
                }
                Some(b'{') => {
                    i += 1;
                    let start = i;
                    while i < bytes.len() && bytes[i] != b'}' {
                        i += 1;
                    }
                    if i == bytes.len() || !is_identifier(&text[start..i]) {
                        return Err(TemplateError::StrayDollar {
                            path: path.to_owned(),
                            at,
                        });
                    }
                    push_name(&text[start..i], &mut literal, &mut segments)?;
                    i += 1;
                }
                Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {
                    let start = i;
                    while i < bytes.len()
                        && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                    {
                        i += 1;
                    }
                    push_name(&text[start..i], &mut literal, &mut segments)?;
                }
                _ => {
                    return Err(TemplateError::StrayDollar {
                        path: path.to_owned(),
                        at,
                    });
                }
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        if !saw_test_id {
            return Err(TemplateError::MissingTestId {
                path: path.to_owned(),
                required: TEST_ID_PLACEHOLDER,
            });
        }
        Ok(Self {
            path: path.to_owned(),
            segments,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    match bytes.first() {
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
        _ => return false,
    }
    bytes[1..]
        .iter()
        .all(|c| c.is_ascii_alphanumeric() || *c == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Result<RetargetTemplate, TemplateError> {
        RetargetTemplate::parse(Utf8Path::new("common/retarget.cpp.in"), text)
    }

    #[test]
    fn substitutes_plain_and_braced_placeholders() {
        let template = parse(indoc! {r#"
            static const char TEST_ID[] = "$TESTID";
            // id=${TESTID}
        "#})
        .expect("template is valid");
        assert_eq!(
            template.render("3b1a"),
            indoc! {r#"
                static const char TEST_ID[] = "3b1a";
                // id=3b1a
            "#},
        );
    }

    #[test]
    fn escaped_dollars_are_literal() {
        let template = parse("cost: $$5, id: $TESTID, not-an-id: $$TESTID\n")
            .expect("template is valid");
        assert_eq!(
            template.render("x"),
            "cost: $5, id: x, not-an-id: $TESTID\n",
        );
    }

    #[test]
    fn undefined_placeholder_is_rejected() {
        let err = parse("$TESTID plus $SERIALNO\n").expect_err("SERIALNO is undefined");
        assert!(
            matches!(&err, TemplateError::UndefinedPlaceholder { name, .. } if name == "SERIALNO"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn undefined_braced_placeholder_is_rejected() {
        let err = parse("${SERIALNO}\n").expect_err("SERIALNO is undefined");
        assert!(
            matches!(&err, TemplateError::UndefinedPlaceholder { name, .. } if name == "SERIALNO"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn template_without_test_id_is_rejected() {
        let err = parse("no placeholders at all\n").expect_err("TESTID is required");
        assert!(
            matches!(err, TemplateError::MissingTestId { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn lowercase_test_id_is_not_the_placeholder() {
        let err = parse("$testid\n").expect_err("placeholder names are case sensitive");
        assert!(
            matches!(&err, TemplateError::UndefinedPlaceholder { name, .. } if name == "testid"),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn stray_dollar_is_rejected() {
        let err = parse("price: 5$ \n$TESTID\n").expect_err("bare $ is invalid");
        assert!(
            matches!(err, TemplateError::StrayDollar { at: 8, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn trailing_dollar_is_rejected() {
        let err = parse("$TESTID$").expect_err("trailing $ is invalid");
        assert!(
            matches!(err, TemplateError::StrayDollar { at: 7, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn unterminated_brace_is_rejected() {
        let err = parse("${TESTID").expect_err("unterminated brace is invalid");
        assert!(
            matches!(err, TemplateError::StrayDollar { at: 0, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempdir().expect("created temp dir");
        let path = dir.path().join("retarget.cpp.in");
        std::fs::write(&path, "const char* id = \"$TESTID\";\n").expect("wrote template");

        let template = RetargetTemplate::load(&path).expect("template is valid");
        assert_eq!(template.render("42"), "const char* id = \"42\";\n");
        assert_eq!(template.path(), path);
    }

    #[test]
    fn load_missing_template_fails() {
        let dir = tempdir().expect("created temp dir");
        let err = RetargetTemplate::load(&dir.path().join("nope.cpp.in"))
            .expect_err("template does not exist");
        assert!(
            matches!(err, TemplateError::Read { .. }),
            "unexpected error: {err:?}"
        );
    }
}
