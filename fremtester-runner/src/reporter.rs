// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting test results to a terminal.
//!
//! The runner hands every [`TestEvent`] to a callback; [`TestReporter`]
//! renders them as they arrive, one line per finished test, and closes with
//! a summary line. A finished test reads as
//! `<name>   [<status>]` with the status colored by how it compares to the
//! expectation, a `!` marking a contradicted expectation and `<reason>`
//! naming why a test was lost.

use crate::{
    runner::{ReportClass, RunStats, TestOutcome},
    test_list::{TestCase, TestList},
};
use owo_colors::{OwoColorize, Style};
use std::{io, time::Duration};

/// An event in the run lifecycle, as emitted by the runner.
#[derive(Clone, Debug)]
pub enum TestEvent<'a> {
    /// The test run started.
    RunStarted {
        /// The list of tests that will be run.
        test_list: &'a TestList,
    },

    /// A test is about to be built, flashed and run.
    TestStarted {
        /// The test being started.
        case: &'a TestCase,
    },

    /// A test concluded, one way or another.
    TestFinished {
        /// The test that finished.
        case: &'a TestCase,

        /// What happened on the device.
        outcome: TestOutcome,
    },

    /// The test run finished.
    RunFinished {
        /// Statistics for the run.
        run_stats: RunStats,

        /// How long the whole run took.
        elapsed: Duration,
    },
}

/// Renders run events for human consumption.
#[derive(Clone, Debug)]
pub struct TestReporter {
    styles: Styles,
    name_width: usize,
}

impl TestReporter {
    /// Creates a reporter for the given list.
    ///
    /// Result lines are padded so the status column lines up across the
    /// whole run.
    pub fn new(test_list: &TestList, colorize: bool) -> Self {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }
        Self {
            styles,
            name_width: test_list.max_name_width(),
        }
    }

    /// Writes one event to `writer`.
    pub fn report_event(
        &self,
        event: TestEvent<'_>,
        writer: &mut impl io::Write,
    ) -> io::Result<()> {
        match event {
            TestEvent::RunStarted { test_list } => {
                write!(writer, "{:>12} ", "Starting".style(self.styles.good))?;
                write!(
                    writer,
                    "{} tests from ",
                    test_list.test_count().style(self.styles.count),
                )?;
                writeln!(writer, "{}", test_list.test_root())?;
            }
            TestEvent::TestStarted { case } => {
                write!(writer, "{:>12} ", "Running".style(self.styles.count))?;
                writeln!(writer, "{}", case.name)?;
            }
            TestEvent::TestFinished { case, outcome } => {
                let class = outcome.classify(case.expected);
                let style = self.styles.for_class(class);
                write!(
                    writer,
                    "{:<width$}",
                    case.name,
                    width = self.name_width + 3,
                )?;
                write!(writer, "[{:<5}]", outcome.status_str().style(style))?;
                match outcome {
                    TestOutcome::Fatal(reason) => writeln!(writer, " <{reason}>")?,
                    _ if class == ReportClass::Error => writeln!(writer, " !")?,
                    _ => writeln!(writer)?,
                }
            }
            TestEvent::RunFinished { run_stats, elapsed } => {
                let summary_style = if run_stats.is_success() {
                    self.styles.good
                } else {
                    self.styles.error
                };
                writeln!(writer, "------------")?;
                write!(writer, "{:>12} ", "Summary".style(summary_style))?;
                write!(writer, "[{:>8.3}s] ", elapsed.as_secs_f64())?;
                write!(
                    writer,
                    "{} tests run: ",
                    run_stats.test_count.style(self.styles.count),
                )?;
                write!(writer, "{} ", run_stats.good.style(self.styles.count))?;
                write!(writer, "{}", "matched".style(self.styles.good))?;
                if run_stats.warn > 0 {
                    write!(writer, ", {} ", run_stats.warn.style(self.styles.count))?;
                    write!(writer, "{}", "warn".style(self.styles.warn))?;
                }
                if run_stats.error > 0 {
                    write!(writer, ", {} ", run_stats.error.style(self.styles.count))?;
                    write!(writer, "{}", "mismatched".style(self.styles.error))?;
                }
                if run_stats.fatal > 0 {
                    write!(writer, ", {} ", run_stats.fatal.style(self.styles.count))?;
                    write!(writer, "{}", "fatal".style(self.styles.fatal))?;
                }
                writeln!(writer)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    count: Style,
    good: Style,
    warn: Style,
    error: Style,
    fatal: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.good = Style::new().green().bold();
        self.warn = Style::new().yellow().bold();
        self.error = Style::new().red().bold();
        self.fatal = Style::new().red().bold();
    }

    fn for_class(&self, class: ReportClass) -> Style {
        match class {
            ReportClass::Good => self.good,
            ReportClass::Warn => self.warn,
            ReportClass::Error => self.error,
            ReportClass::Fatal => self.fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{runner::FatalReason, test_list::ExpectedOutcome};
    use camino::Utf8PathBuf;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn sample_list() -> TestList {
        let case = |name: &str, expected| TestCase {
            name: name.to_owned(),
            source: Utf8PathBuf::from("tests/device").join(name),
            expected,
        };
        TestList::from_cases(
            "tests/device",
            vec![
                case("tst_alloc.pass.cpp", ExpectedOutcome::Pass),
                case("thread/tst_join.xfail.cpp", ExpectedOutcome::XFail),
            ],
        )
    }

    fn render(reporter: &TestReporter, events: Vec<TestEvent<'_>>) -> String {
        let mut buffer = Vec::new();
        for event in events {
            reporter
                .report_event(event, &mut buffer)
                .expect("wrote event");
        }
        String::from_utf8(buffer).expect("output is UTF-8")
    }

    #[test]
    fn run_lifecycle_renders_aligned_lines() {
        let test_list = sample_list();
        let reporter = TestReporter::new(&test_list, false);
        let cases: Vec<_> = test_list.iter().collect();

        let run_stats = RunStats {
            test_count: 2,
            good: 1,
            warn: 1,
            ..RunStats::default()
        };

        let output = render(
            &reporter,
            vec![
                TestEvent::RunStarted {
                    test_list: &test_list,
                },
                TestEvent::TestStarted { case: cases[0] },
                TestEvent::TestFinished {
                    case: cases[0],
                    outcome: TestOutcome::Pass,
                },
                TestEvent::TestStarted { case: cases[1] },
                TestEvent::TestFinished {
                    case: cases[1],
                    outcome: TestOutcome::Pass,
                },
                TestEvent::RunFinished {
                    run_stats,
                    elapsed: Duration::from_millis(2345),
                },
            ],
        );

        // The longest name is 25 columns, so names pad to 28.
        assert_eq!(
            output,
            indoc! {"
                    Starting 2 tests from tests/device
                     Running tst_alloc.pass.cpp
                tst_alloc.pass.cpp          [PASS ]
                     Running thread/tst_join.xfail.cpp
                thread/tst_join.xfail.cpp   [PASS ]
                ------------
                     Summary [   2.345s] 2 tests run: 1 matched, 1 warn
            "}
        );
    }

    #[test]
    fn mismatches_and_losses_are_marked() {
        let test_list = sample_list();
        let reporter = TestReporter::new(&test_list, false);
        let cases: Vec<_> = test_list.iter().collect();

        let run_stats = RunStats {
            test_count: 2,
            error: 1,
            fatal: 1,
            failed: 1,
            ..RunStats::default()
        };

        let output = render(
            &reporter,
            vec![
                TestEvent::TestFinished {
                    case: cases[0],
                    outcome: TestOutcome::Fail,
                },
                TestEvent::TestFinished {
                    case: cases[1],
                    outcome: TestOutcome::Fatal(FatalReason::NotStarted),
                },
                TestEvent::RunFinished {
                    run_stats,
                    elapsed: Duration::from_millis(500),
                },
            ],
        );

        assert_eq!(
            output,
            indoc! {"
                tst_alloc.pass.cpp          [FAIL ] !
                thread/tst_join.xfail.cpp   [FATAL] <test not started>
                ------------
                     Summary [   0.500s] 2 tests run: 0 matched, 1 mismatched, 1 fatal
            "}
        );
    }

    #[test]
    fn colorized_status_keeps_its_column() {
        let test_list = sample_list();
        let reporter = TestReporter::new(&test_list, true);
        let cases: Vec<_> = test_list.iter().collect();

        let output = render(
            &reporter,
            vec![TestEvent::TestFinished {
                case: cases[0],
                outcome: TestOutcome::Pass,
            }],
        );

        // The escape codes sit outside the padded status field, so the
        // five-column status survives styling.
        assert!(
            output.starts_with("tst_alloc.pass.cpp          [\u{1b}["),
            "name column unchanged: {output:?}"
        );
        assert!(output.contains("PASS \u{1b}[0m]"), "status padded: {output:?}");
    }
}
