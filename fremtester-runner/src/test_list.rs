// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovering tests under a test root.
//!
//! A test is a single source file whose name starts with `tst_` and whose
//! file name declares the outcome the test expects for itself: `.pass.`,
//! `.fail.`, `.xpass.` or `.xfail.` somewhere in the name. Each test is
//! built into its own firmware image and runs alone on the device.

use crate::errors::{DiscoveryError, WriteTestListError};
use camino::{Utf8Path, Utf8PathBuf};
use owo_colors::{OwoColorize, Style};
use serde::Serialize;
use std::{fmt, io};
use walkdir::WalkDir;

/// The outcome a test source declares for itself, encoded in its file name.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedOutcome {
    /// The test is expected to pass (`.pass.`).
    Pass,

    /// The test is expected to fail (`.fail.`).
    Fail,

    /// An unexpected pass: a passing run is notable but not an error (`.xpass.`).
    XPass,

    /// An unexpected failure: a failing run is notable but not an error (`.xfail.`).
    XFail,
}

impl ExpectedOutcome {
    /// Extracts the expected outcome from a test file name.
    ///
    /// Markers are checked in the order `.pass.`, `.fail.`, `.xpass.`,
    /// `.xfail.`; the first one found wins.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        if file_name.contains(".pass.") {
            Some(ExpectedOutcome::Pass)
        } else if file_name.contains(".fail.") {
            Some(ExpectedOutcome::Fail)
        } else if file_name.contains(".xpass.") {
            Some(ExpectedOutcome::XPass)
        } else if file_name.contains(".xfail.") {
            Some(ExpectedOutcome::XFail)
        } else {
            None
        }
    }
}

impl fmt::Display for ExpectedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExpectedOutcome::Pass => "PASS",
            ExpectedOutcome::Fail => "FAIL",
            ExpectedOutcome::XPass => "XPASS",
            ExpectedOutcome::XFail => "XFAIL",
        };
        f.pad(s)
    }
}

/// A single discovered test.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestCase {
    /// The name of the test: the path of its source relative to the test root.
    pub name: String,

    /// The path to the test source.
    pub source: Utf8PathBuf,

    /// The outcome the test declares for itself.
    pub expected: ExpectedOutcome,
}

/// Output formats for [`TestList::write`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// A human-readable listing, optionally colorized.
    Human {
        /// Whether to colorize the output.
        colorize: bool,
    },

    /// Machine-readable JSON.
    Json,

    /// Pretty-printed JSON.
    JsonPretty,
}

/// List of tests discovered under a test root, in deterministic order.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestList {
    test_root: Utf8PathBuf,
    tests: Vec<TestCase>,
}

impl TestList {
    /// Walks the test root and collects every test source.
    ///
    /// Only files named `tst_*` with the given extension participate; other
    /// files are support code and are skipped. A `tst_*` source without an
    /// outcome marker is an error, not a skip. The walk is sorted by file
    /// name, so two runs over the same tree produce the same order.
    pub fn discover(test_root: &Utf8Path, extension: &str) -> Result<Self, DiscoveryError> {
        let mut tests = Vec::new();
        for entry in WalkDir::new(test_root).sort_by_file_name() {
            let entry = entry.map_err(|err| DiscoveryError::Walk {
                root: test_root.to_owned(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8PathBuf::try_from(entry.into_path())
                .map_err(|err| DiscoveryError::NonUtf8Path {
                    path: err.into_path_buf(),
                })?;
            let Some(file_name) = path.file_name() else {
                continue;
            };
            if !file_name.starts_with("tst_") || path.extension() != Some(extension) {
                continue;
            }
            let expected = ExpectedOutcome::from_file_name(file_name).ok_or_else(|| {
                DiscoveryError::MissingOutcomeMarker { path: path.clone() }
            })?;
            let name = path
                .strip_prefix(test_root)
                .unwrap_or(path.as_path())
                .to_string();
            tests.push(TestCase {
                name,
                source: path,
                expected,
            });
        }
        Ok(Self {
            test_root: test_root.to_owned(),
            tests,
        })
    }

    /// Creates a test list from already-discovered cases.
    pub fn from_cases(test_root: impl Into<Utf8PathBuf>, tests: Vec<TestCase>) -> Self {
        Self {
            test_root: test_root.into(),
            tests,
        }
    }

    /// Returns the test root this list was discovered from.
    pub fn test_root(&self) -> &Utf8Path {
        &self.test_root
    }

    /// Returns the number of tests in the list.
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// Iterates over the tests in run order.
    pub fn iter(&self) -> std::slice::Iter<'_, TestCase> {
        self.tests.iter()
    }

    /// Returns the width of the widest test name, for aligned output.
    pub fn max_name_width(&self) -> usize {
        self.tests.iter().map(|case| case.name.len()).max().unwrap_or(0)
    }

    /// Writes the list in the given format.
    pub fn write(
        &self,
        format: OutputFormat,
        writer: &mut impl io::Write,
    ) -> Result<(), WriteTestListError> {
        match format {
            OutputFormat::Human { colorize } => self
                .write_human(writer, colorize)
                .map_err(WriteTestListError::Io),
            OutputFormat::Json => {
                serde_json::to_writer(writer, self).map_err(WriteTestListError::Json)
            }
            OutputFormat::JsonPretty => {
                serde_json::to_writer_pretty(writer, self).map_err(WriteTestListError::Json)
            }
        }
    }

    fn write_human(&self, writer: &mut impl io::Write, colorize: bool) -> io::Result<()> {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }
        for case in &self.tests {
            writeln!(
                writer,
                "{}: {}",
                case.name.style(styles.test_name),
                case.expected.style(styles.expected),
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    test_name: Style,
    expected: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.test_name = Style::new().bold();
        self.expected = Style::new().cyan();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::{Utf8TempDir, tempdir};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs;
    use test_case::test_case;

    #[test_case("tst_alloc.pass.cpp", Some(ExpectedOutcome::Pass))]
    #[test_case("tst_alloc.fail.cpp", Some(ExpectedOutcome::Fail))]
    #[test_case("tst_alloc.xpass.cpp", Some(ExpectedOutcome::XPass))]
    #[test_case("tst_alloc.xfail.cpp", Some(ExpectedOutcome::XFail))]
    #[test_case("tst_alloc.cpp", None; "no marker")]
    #[test_case("tst_alloc.pass.fail.cpp", Some(ExpectedOutcome::Pass); "first marker wins")]
    fn outcome_markers(file_name: &str, expected: Option<ExpectedOutcome>) {
        assert_eq!(ExpectedOutcome::from_file_name(file_name), expected);
    }

    fn sample_tree() -> Utf8TempDir {
        let dir = tempdir().expect("created temp dir");
        fs::create_dir(dir.path().join("thread")).expect("created subdir");
        for name in [
            "tst_alloc.pass.cpp",
            "tst_mutex.xfail.cpp",
            "helper.cpp",
            "notes.md",
            "tst_wrongext.pass.c",
            "thread/tst_join.fail.cpp",
        ] {
            fs::write(dir.path().join(name), "// test source\n").expect("wrote file");
        }
        dir
    }

    #[test]
    fn discovers_marked_sources_in_sorted_order() {
        let dir = sample_tree();
        let list = TestList::discover(dir.path(), "cpp").expect("discovery succeeded");

        let names: Vec<_> = list.iter().map(|case| case.name.as_str()).collect();
        assert_eq!(
            names,
            ["thread/tst_join.fail.cpp", "tst_alloc.pass.cpp", "tst_mutex.xfail.cpp"],
        );
        assert_eq!(list.test_count(), 3);
        assert_eq!(list.max_name_width(), "thread/tst_join.fail.cpp".len());

        let join = list.iter().next().expect("list is non-empty");
        assert_eq!(join.expected, ExpectedOutcome::Fail);
        assert_eq!(join.source, dir.path().join("thread/tst_join.fail.cpp"));
    }

    #[test]
    fn marker_less_test_source_is_an_error() {
        let dir = sample_tree();
        fs::write(dir.path().join("tst_unmarked.cpp"), "").expect("wrote file");

        let err = TestList::discover(dir.path(), "cpp")
            .expect_err("discovery must reject unmarked tst_ sources");
        assert!(
            matches!(
                &err,
                DiscoveryError::MissingOutcomeMarker { path }
                    if path.file_name() == Some("tst_unmarked.cpp")
            ),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn human_output() {
        let list = TestList::from_cases(
            "/bench/tests",
            vec![
                TestCase {
                    name: "tst_alloc.pass.cpp".to_owned(),
                    source: "/bench/tests/tst_alloc.pass.cpp".into(),
                    expected: ExpectedOutcome::Pass,
                },
                TestCase {
                    name: "tst_mutex.xfail.cpp".to_owned(),
                    source: "/bench/tests/tst_mutex.xfail.cpp".into(),
                    expected: ExpectedOutcome::XFail,
                },
            ],
        );

        let mut out = Vec::new();
        list.write(OutputFormat::Human { colorize: false }, &mut out)
            .expect("write succeeded");
        assert_eq!(
            String::from_utf8(out).expect("output is UTF-8"),
            indoc! {"
                tst_alloc.pass.cpp: PASS
                tst_mutex.xfail.cpp: XFAIL
            "},
        );
    }

    #[test]
    fn json_output() {
        let list = TestList::from_cases(
            "/bench/tests",
            vec![TestCase {
                name: "tst_alloc.pass.cpp".to_owned(),
                source: "/bench/tests/tst_alloc.pass.cpp".into(),
                expected: ExpectedOutcome::Pass,
            }],
        );

        let mut out = Vec::new();
        list.write(OutputFormat::JsonPretty, &mut out)
            .expect("write succeeded");
        assert_eq!(
            String::from_utf8(out).expect("output is UTF-8"),
            indoc! {r#"
                {
                  "test-root": "/bench/tests",
                  "tests": [
                    {
                      "name": "tst_alloc.pass.cpp",
                      "source": "/bench/tests/tst_alloc.pass.cpp",
                      "expected": "pass"
                    }
                  ]
                }"#},
        );
    }
}
