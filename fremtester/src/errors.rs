// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use fremtester_runner::errors::{
    BuildError, ConfigError, DiscoveryError, ProfileNotFound, SerialError, TemplateError,
    WriteTestListError,
};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for fremtester failures.
///
/// Runs may fail for a variety of reasons. This structure documents the exit codes that may occur
/// in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum FremtesterExitCode {}

impl FremtesterExitCode {
    /// No errors occurred and fremtester exited normally.
    pub const OK: i32 = 0;

    /// A user issue happened while setting up a fremtester invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests failed, or a test was lost to a fatal harness condition.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The serial monitor went away in the middle of a run.
    pub const SERIAL_COLLAPSE: i32 = 101;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error occurred while setting up or executing a test run.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config error")]
    ConfigError {
        #[from]
        err: ConfigError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("test discovery error")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("retarget template error")]
    TemplateError {
        #[from]
        err: TemplateError,
    },
    #[error("fixture build error")]
    FixtureBuildError {
        #[source]
        err: BuildError,
    },
    #[error("serial open error")]
    SerialOpenError {
        #[source]
        err: SerialError,
    },
    #[error("serial monitor collapsed")]
    SerialCollapsed { err: Option<SerialError> },
    #[error("test run failed")]
    TestRunFailed,
    #[error("error writing test list")]
    WriteTestListError {
        #[from]
        err: WriteTestListError,
    },
    #[error("error writing test event")]
    WriteEventError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigError { .. }
            | Self::ProfileNotFound { .. }
            | Self::DiscoveryError { .. }
            | Self::TemplateError { .. }
            | Self::FixtureBuildError { .. }
            | Self::SerialOpenError { .. } => FremtesterExitCode::SETUP_ERROR,
            Self::SerialCollapsed { .. } => FremtesterExitCode::SERIAL_COLLAPSE,
            Self::TestRunFailed => FremtesterExitCode::TEST_RUN_FAILED,
            Self::WriteTestListError { .. } | Self::WriteEventError { .. } => {
                FremtesterExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ConfigError { err } => match err {
                ConfigError::Read { path, err } => {
                    error!(
                        "failed to read fremtester config at `{}`",
                        path.style(styles.bold)
                    );
                    Some(err as &dyn Error)
                }
                ConfigError::Parse { path, err } => {
                    error!(
                        "failed to parse fremtester config at `{}`",
                        path.style(styles.bold)
                    );
                    Some(err as &dyn Error)
                }
            },
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::DiscoveryError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TemplateError { err } => {
                error!("{err}");
                err.source()
            }
            Self::FixtureBuildError { err } => {
                error!("failed to build session fixtures");
                Some(err as &dyn Error)
            }
            Self::SerialOpenError { err } => {
                error!("failed to set up the serial monitor");
                Some(err as &dyn Error)
            }
            Self::SerialCollapsed { err } => {
                error!("the serial monitor went away mid-run");
                err.as_ref().map(|err| err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
            Self::WriteTestListError { err } => {
                error!("failed to write test list to output");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write event to output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: "fremtester::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
