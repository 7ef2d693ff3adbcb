// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running tests on the device and classifying what comes back.
//!
//! Tests run strictly one at a time. For each test the runner builds an
//! image with a fresh correlation id, flashes it, and then watches the
//! monitor's channel: first for the begin token that proves the test
//! started, then for the token that decides it. Tokens carrying a foreign
//! id are leftovers from an earlier image and are discarded.

use crate::{
    config::WaitWindows,
    errors::{BuildError, RunError},
    flash::ImageFlasher,
    protocol::{ResultToken, TokenKind},
    reporter::TestEvent,
    test_list::{ExpectedOutcome, TestCase, TestList},
    toolchain::ImageBuilder,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::{fmt, io, time::Instant};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Why the harness gave up on a test.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FatalReason {
    /// The image could not be written to the device.
    DownloadFailed,

    /// The firmware never announced the test within the start window.
    NotStarted,

    /// The firmware sent a token that is neither a pass nor a failure.
    UnknownToken,

    /// The test announced itself but never concluded.
    Timeout,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FatalReason::DownloadFailed => "download failed",
            FatalReason::NotStarted => "test not started",
            FatalReason::UnknownToken => "unknown test token",
            FatalReason::Timeout => "timeout",
        };
        f.pad(reason)
    }
}

/// What actually happened when a test ran on the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestOutcome {
    /// The device reported that the test passed.
    Pass,

    /// The device reported that the test failed, or its image didn't build.
    Fail,

    /// The harness lost track of the test; the reason says how.
    Fatal(FatalReason),
}

impl TestOutcome {
    /// Short status tag for display, at most five columns wide.
    pub fn status_str(&self) -> &'static str {
        match self {
            TestOutcome::Pass => "PASS",
            TestOutcome::Fail => "FAIL",
            TestOutcome::Fatal(_) => "FATAL",
        }
    }

    /// Reads this outcome against the test's declared expectation.
    pub fn classify(&self, expected: ExpectedOutcome) -> ReportClass {
        match (self, expected) {
            (TestOutcome::Fatal(_), _) => ReportClass::Fatal,
            (TestOutcome::Pass, ExpectedOutcome::Pass)
            | (TestOutcome::Fail, ExpectedOutcome::Fail) => ReportClass::Good,
            (TestOutcome::Fail, ExpectedOutcome::XPass)
            | (TestOutcome::Pass, ExpectedOutcome::XFail) => ReportClass::Warn,
            _ => ReportClass::Error,
        }
    }
}

/// How an outcome reads against the declared expectation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReportClass {
    /// The outcome matched the expectation.
    Good,

    /// A surprise the expectation allows for: an xpass test failed, or an
    /// xfail test passed.
    Warn,

    /// The outcome contradicted the expectation.
    Error,

    /// The harness lost the test before it could conclude.
    Fatal,
}

/// Statistics for a test run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of tests that ran.
    pub test_count: usize,

    /// The number of outcomes that matched their expectation.
    pub good: usize,

    /// The number of allowed surprises.
    pub warn: usize,

    /// The number of outcomes that contradicted their expectation.
    pub error: usize,

    /// The number of tests the harness lost.
    pub fatal: usize,

    /// The number of tests that actually failed on the device, whether or
    /// not a failure was expected.
    pub failed: usize,
}

impl RunStats {
    /// Returns true if the run is considered a success: every outcome
    /// matched its expectation and nothing actually failed on the device.
    pub fn is_success(&self) -> bool {
        self.warn == 0 && self.error == 0 && self.fatal == 0 && self.failed == 0
    }

    fn record(&mut self, case: &TestCase, outcome: TestOutcome) {
        self.test_count += 1;
        match outcome.classify(case.expected) {
            ReportClass::Good => self.good += 1,
            ReportClass::Warn => self.warn += 1,
            ReportClass::Error => self.error += 1,
            ReportClass::Fatal => self.fatal += 1,
        }
        if outcome == TestOutcome::Fail {
            self.failed += 1;
        }
    }
}

/// Runs every test in a list on the device, one at a time.
pub struct TestRunner<'a, B, F> {
    builder: &'a B,
    flasher: &'a F,
    receiver: Receiver<ResultToken>,
    windows: WaitWindows,
}

impl<'a, B, F> TestRunner<'a, B, F>
where
    B: ImageBuilder,
    F: ImageFlasher,
{
    /// Creates a runner over the given collaborators.
    ///
    /// `receiver` is the monitor's token channel. `windows` bounds how long
    /// each phase waits on the device.
    pub fn new(
        builder: &'a B,
        flasher: &'a F,
        receiver: Receiver<ResultToken>,
        windows: WaitWindows,
    ) -> Self {
        Self {
            builder,
            flasher,
            receiver,
            windows,
        }
    }

    /// Executes the run, feeding every event to `callback`.
    ///
    /// A callback error aborts the run; so does losing the monitor. Build
    /// and flash problems do not, they are recorded against the test that
    /// hit them.
    pub fn execute<'list, C>(
        &self,
        test_list: &'list TestList,
        mut callback: C,
    ) -> Result<RunStats, RunError>
    where
        C: FnMut(TestEvent<'list>) -> io::Result<()>,
    {
        let start_time = Instant::now();
        let mut run_stats = RunStats::default();
        let mut write = |event: TestEvent<'list>| {
            callback(event).map_err(|err| RunError::WriteEvent { err })
        };

        write(TestEvent::RunStarted { test_list })?;
        for case in test_list.iter() {
            write(TestEvent::TestStarted { case })?;
            let outcome = self.run_test(case)?;
            run_stats.record(case, outcome);
            write(TestEvent::TestFinished { case, outcome })?;
        }
        write(TestEvent::RunFinished {
            run_stats,
            elapsed: start_time.elapsed(),
        })?;
        Ok(run_stats)
    }

    fn run_test(&self, case: &TestCase) -> Result<TestOutcome, RunError> {
        self.drain_stale_tokens();

        let test_id = Uuid::new_v4().to_string();
        debug!("running {} as {test_id}", case.name);

        let image = match self.builder.build_test(case, &test_id) {
            Ok(image) => image,
            Err(err) => {
                warn!("build failed for {}: {err}", case.name);
                if let BuildError::Failed { stderr, .. } = &err {
                    if !stderr.is_empty() {
                        debug!("tool stderr:\n{stderr}");
                    }
                }
                return Ok(TestOutcome::Fail);
            }
        };

        if let Err(err) = self.flasher.flash(&image) {
            warn!("download failed for {}: {err}", case.name);
            return Ok(TestOutcome::Fatal(FatalReason::DownloadFailed));
        }

        if !self.await_start(&test_id)? {
            return Ok(TestOutcome::Fatal(FatalReason::NotStarted));
        }
        self.await_outcome(&test_id)
    }

    // Tokens still in flight from a previous image cannot belong to a test
    // whose id hasn't been minted yet.
    fn drain_stale_tokens(&self) {
        while let Ok(token) = self.receiver.try_recv() {
            trace!("discarding stale token {}:{:?}", token.test_id, token.kind);
        }
    }

    /// Waits for the flashed firmware to announce the test.
    fn await_start(&self, test_id: &str) -> Result<bool, RunError> {
        let deadline = Instant::now() + self.windows.start;
        while Instant::now() < deadline {
            match self.receiver.recv_timeout(self.windows.poll) {
                Ok(token) => {
                    if token.test_id == test_id && token.kind == TokenKind::Begin {
                        debug!("test {test_id} started");
                        return Ok(true);
                    }
                    trace!("discarding token {}:{:?}", token.test_id, token.kind);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RunError::MonitorDisconnected);
                }
            }
        }
        Ok(false)
    }

    /// Waits for the announced test to conclude.
    fn await_outcome(&self, test_id: &str) -> Result<TestOutcome, RunError> {
        let deadline = Instant::now() + self.windows.outcome;
        while Instant::now() < deadline {
            let token = match self.receiver.recv_timeout(self.windows.poll) {
                Ok(token) => token,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RunError::MonitorDisconnected);
                }
            };
            if token.test_id != test_id {
                trace!("discarding token {}:{:?}", token.test_id, token.kind);
                continue;
            }
            let outcome = match token.kind {
                TokenKind::Pass => TestOutcome::Pass,
                TokenKind::Fail => TestOutcome::Fail,
                // A second begin is as inconclusive as a garbled keyword.
                TokenKind::Begin | TokenKind::Unknown => {
                    TestOutcome::Fatal(FatalReason::UnknownToken)
                }
            };
            return Ok(outcome);
        }
        Ok(TestOutcome::Fatal(FatalReason::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ExpectedOutcome::Pass, TestOutcome::Pass, ReportClass::Good)]
    #[test_case(ExpectedOutcome::Pass, TestOutcome::Fail, ReportClass::Error)]
    #[test_case(ExpectedOutcome::Fail, TestOutcome::Pass, ReportClass::Error)]
    #[test_case(ExpectedOutcome::Fail, TestOutcome::Fail, ReportClass::Good)]
    #[test_case(ExpectedOutcome::XPass, TestOutcome::Pass, ReportClass::Error)]
    #[test_case(ExpectedOutcome::XPass, TestOutcome::Fail, ReportClass::Warn)]
    #[test_case(ExpectedOutcome::XFail, TestOutcome::Pass, ReportClass::Warn)]
    #[test_case(ExpectedOutcome::XFail, TestOutcome::Fail, ReportClass::Error)]
    #[test_case(
        ExpectedOutcome::Pass,
        TestOutcome::Fatal(FatalReason::Timeout),
        ReportClass::Fatal
    )]
    #[test_case(
        ExpectedOutcome::XFail,
        TestOutcome::Fatal(FatalReason::DownloadFailed),
        ReportClass::Fatal
    )]
    fn classification(expected: ExpectedOutcome, outcome: TestOutcome, class: ReportClass) {
        assert_eq!(outcome.classify(expected), class);
    }

    fn case(name: &str, expected: ExpectedOutcome) -> TestCase {
        TestCase {
            name: name.to_owned(),
            source: name.into(),
            expected,
        }
    }

    #[test]
    fn stats_track_every_class() {
        let mut stats = RunStats::default();
        stats.record(
            &case("tst_a.pass.cpp", ExpectedOutcome::Pass),
            TestOutcome::Pass,
        );
        stats.record(
            &case("tst_b.xfail.cpp", ExpectedOutcome::XFail),
            TestOutcome::Pass,
        );
        stats.record(
            &case("tst_c.pass.cpp", ExpectedOutcome::Pass),
            TestOutcome::Fail,
        );
        stats.record(
            &case("tst_d.pass.cpp", ExpectedOutcome::Pass),
            TestOutcome::Fatal(FatalReason::NotStarted),
        );

        assert_eq!(
            stats,
            RunStats {
                test_count: 4,
                good: 1,
                warn: 1,
                error: 1,
                fatal: 1,
                failed: 1,
            }
        );
        assert!(!stats.is_success());
    }

    #[test]
    fn matched_failures_still_fail_the_run() {
        let mut stats = RunStats::default();
        stats.record(
            &case("tst_a.fail.cpp", ExpectedOutcome::Fail),
            TestOutcome::Fail,
        );

        assert_eq!(stats.good, 1);
        assert_eq!(stats.failed, 1);
        assert!(!stats.is_success(), "a device failure is never a success");
    }

    #[test]
    fn all_matched_passes_succeed() {
        let mut stats = RunStats::default();
        for name in ["tst_a.pass.cpp", "tst_b.pass.cpp"] {
            stats.record(&case(name, ExpectedOutcome::Pass), TestOutcome::Pass);
        }
        assert!(stats.is_success());
    }
}
