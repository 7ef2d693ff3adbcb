// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by fremtester.

use crate::config::ToolchainKind;
use camino::Utf8PathBuf;
use std::{io, process::ExitStatus};
use thiserror::Error;

/// An error that occurred while loading the session config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An error occurred while reading the config file.
    #[error("failed to read fremtester config at `{path}`")]
    Read {
        /// The path to the config file.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        err: io::Error,
    },

    /// An error occurred while deserializing the config file.
    #[error("failed to parse fremtester config at `{path}`")]
    Parse {
        /// The path to the config file.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        err: toml::de::Error,
    },
}

/// An error which indicates that a toolchain profile was requested but not defined in the config.
#[derive(Clone, Debug, Error)]
#[error("profile `{kind}` not found in config (known profiles: {})", .known.join(", "))]
pub struct ProfileNotFound {
    kind: ToolchainKind,
    known: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        kind: ToolchainKind,
        known: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut known: Vec<_> = known.into_iter().map(|s| s.into()).collect();
        known.sort_unstable();
        Self { kind, known }
    }
}

/// An error that occurred while scanning the test root for test sources.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// An error occurred while walking the directory tree.
    #[error("error walking test root `{root}`")]
    Walk {
        /// The test root being walked.
        root: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        err: walkdir::Error,
    },

    /// A test source has no expected-outcome marker in its file name.
    #[error(
        "test source `{path}` has no expected outcome marker \
         (file name must contain one of `.pass.`, `.fail.`, `.xpass.` or `.xfail.`)"
    )]
    MissingOutcomeMarker {
        /// The path to the test source.
        path: Utf8PathBuf,
    },

    /// A path under the test root isn't valid UTF-8.
    #[error("path under test root is invalid UTF-8: {}", .path.display())]
    NonUtf8Path {
        /// The path that failed the conversion.
        path: std::path::PathBuf,
    },
}

/// An error that occurred while writing list output.
#[derive(Debug, Error)]
pub enum WriteTestListError {
    /// An error occurred while writing the list to the output stream.
    #[error("error writing to output")]
    Io(#[source] io::Error),

    /// An error occurred while serializing the list to JSON.
    #[error("error serializing to JSON")]
    Json(#[source] serde_json::Error),
}

/// An error that occurred while loading or rendering a retarget template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// An error occurred while reading the template off disk.
    #[error("failed to read retarget template `{path}`")]
    Read {
        /// The path to the template.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        err: io::Error,
    },

    /// The template references a placeholder the harness doesn't define.
    #[error("retarget template `{path}` references undefined placeholder `${name}`")]
    UndefinedPlaceholder {
        /// The path to the template.
        path: Utf8PathBuf,

        /// The placeholder name, without the leading `$`.
        name: String,
    },

    /// The template never references the placeholder that carries the test id.
    #[error("retarget template `{path}` never references `${required}`")]
    MissingTestId {
        /// The path to the template.
        path: Utf8PathBuf,

        /// The placeholder the template must reference.
        required: &'static str,
    },

    /// The template contains a bare `$` that doesn't introduce a placeholder.
    #[error("retarget template `{path}` has a stray `$` at byte {at}")]
    StrayDollar {
        /// The path to the template.
        path: Utf8PathBuf,

        /// Byte offset of the `$` within the template.
        at: usize,
    },
}

/// An error that occurred while building a test image or a fixture object.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A build tool could not be executed at all.
    #[error("failed to execute `{program}`")]
    Exec {
        /// The program that failed to start.
        program: String,

        /// The error that occurred.
        #[source]
        err: io::Error,
    },

    /// A build tool ran and exited non-zero.
    #[error("`{program}` failed with {status}")]
    Failed {
        /// The program that failed.
        program: String,

        /// The exit status reported by the program.
        status: ExitStatus,

        /// Captured standard error, for diagnostics.
        stderr: String,
    },

    /// An output directory or file could not be written.
    #[error("failed to write build output `{path}`")]
    Write {
        /// The path that could not be written.
        path: Utf8PathBuf,

        /// The error that occurred.
        #[source]
        err: io::Error,
    },
}

/// An error that occurred while flashing an image to the target device.
#[derive(Debug, Error)]
pub enum FlashError {
    /// A flash tool could not be executed at all.
    #[error("failed to execute `{program}`")]
    Exec {
        /// The program that failed to start.
        program: String,

        /// The error that occurred.
        #[source]
        err: io::Error,
    },

    /// A flash tool ran and exited non-zero.
    #[error("`{program}` failed with {status}")]
    Failed {
        /// The program that failed.
        program: String,

        /// The exit status reported by the program.
        status: ExitStatus,

        /// Captured standard error, for diagnostics.
        stderr: String,
    },
}

/// An error that occurred on the serial side of the harness.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The serial port could not be opened.
    #[error("failed to open serial port `{port}`")]
    Open {
        /// The port that could not be opened.
        port: String,

        /// The error that occurred.
        #[source]
        err: serialport::Error,
    },

    /// A read from the serial port failed with a non-timeout error.
    #[error("failed to read from serial port")]
    Read {
        /// The error that occurred.
        #[source]
        err: io::Error,
    },

    /// The serial port reached end of input.
    ///
    /// A live device never stops producing (timeouts are retried), so this
    /// means the port went away underneath us.
    #[error("serial port closed unexpectedly")]
    Closed,
}

/// An error that aborted an in-progress test run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The serial monitor hung up, so no further tokens can arrive.
    ///
    /// Every test still waiting on the device would time out against a dead
    /// port, so the run is abandoned instead. The monitor records the
    /// underlying [`SerialError`] and hands it out on shutdown.
    #[error("serial monitor disconnected mid-run")]
    MonitorDisconnected,

    /// An error occurred while writing a test event to the output stream.
    #[error("error writing test event")]
    WriteEvent {
        /// The error that occurred.
        #[source]
        err: io::Error,
    },
}
