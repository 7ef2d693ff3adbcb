// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    errors::FremtesterExitCode,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::unbounded;
use fremtester_runner::{
    config::{SessionConfig, ToolchainKind},
    errors::{RunError, WriteTestListError},
    flash::OpenOcdFlasher,
    monitor::SerialMonitor,
    reporter::TestReporter,
    runner::TestRunner,
    test_list::{OutputFormat, TestList},
    toolchain::TestBuilder,
};
use std::io::Write;
use supports_color::Stream;
use tracing::warn;

/// An on-hardware test harness for embedded firmware.
///
/// Fremtester compiles each discovered test source into a standalone firmware
/// image, flashes it to the attached development board, and grades the test by
/// the result tokens the firmware prints over its serial port.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct FremtesterApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl FremtesterApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::List {
                test_root,
                message_format,
            } => {
                let config = self.config_opts.make_config()?;
                let test_list = TestList::discover(&test_root, &config.test_file_extension)?;

                let format =
                    message_format.to_output_format(output.color.should_colorize(Stream::Stdout));
                let mut writer = output_writer.stdout_writer();
                test_list.write(format, &mut writer)?;
                writer.flush().map_err(WriteTestListError::Io)?;

                Ok(FremtesterExitCode::OK)
            }
            Command::Run {
                test_root,
                toolchain,
                port,
                baud,
                scratch_dir,
            } => {
                let config = self.config_opts.make_config()?;
                let kind = toolchain.map_or(config.default_toolchain, ToolchainOpt::to_kind);
                let profile = config.toolchain_profile(kind)?;
                let test_list = TestList::discover(&test_root, &config.test_file_extension)?;

                let mut builder =
                    TestBuilder::new(profile, &config.fixtures, kind, &test_root, &scratch_dir)?;
                builder
                    .build_fixtures()
                    .map_err(|err| ExpectedError::FixtureBuildError { err })?;
                let flasher = OpenOcdFlasher::new(&config.flash, &profile.objcopy);

                let mut serial = config.serial.clone();
                if let Some(port) = port {
                    serial.port = port;
                }
                if let Some(baud) = baud {
                    serial.baud_rate = baud;
                }

                let (sender, receiver) = unbounded();
                let monitor = SerialMonitor::connect(&serial, sender)
                    .map_err(|err| ExpectedError::SerialOpenError { err })?;

                let runner = TestRunner::new(&builder, &flasher, receiver, config.windows);
                let reporter =
                    TestReporter::new(&test_list, output.color.should_colorize(Stream::Stdout));

                let mut writer = output_writer.stdout_writer();
                let result = runner.execute(&test_list, |event| {
                    // Write and flush the event.
                    reporter.report_event(event, &mut writer)?;
                    writer.flush()
                });

                match result {
                    Ok(run_stats) => {
                        if let Err(err) = monitor.stop() {
                            warn!("serial monitor shut down uncleanly: {err}");
                        }
                        if run_stats.is_success() {
                            Ok(FremtesterExitCode::OK)
                        } else {
                            Err(ExpectedError::TestRunFailed)
                        }
                    }
                    Err(RunError::MonitorDisconnected) => Err(ExpectedError::SerialCollapsed {
                        err: monitor.stop().err(),
                    }),
                    Err(RunError::WriteEvent { err }) => {
                        if let Err(stop_err) = monitor.stop() {
                            warn!("serial monitor shut down uncleanly: {stop_err}");
                        }
                        Err(ExpectedError::WriteEventError { err })
                    }
                }
            }
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: ./fremtester.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    /// Creates a session config with the given options.
    fn make_config(&self) -> Result<SessionConfig> {
        let config_file = match &self.config_file {
            Some(path) => Some(path.as_path()),
            None => {
                // Without an explicit path, the embedded default config is
                // used unless ./fremtester.toml exists.
                let default = Utf8Path::new(SessionConfig::DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            }
        };
        Ok(SessionConfig::from_sources(config_file)?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tests found under the test root
    ///
    /// Test sources are files named `tst_*` carrying an expected-outcome
    /// marker in their name: `.pass.`, `.fail.`, `.xpass.` or `.xfail.`.
    /// Use --message-format json to get machine-readable output.
    List {
        /// Directory scanned for test sources
        #[arg(long, value_name = "DIR", default_value = ".")]
        test_root: Utf8PathBuf,

        /// Output format
        #[arg(
            short = 'T',
            long,
            value_enum,
            default_value_t,
            help_heading = "Output options",
            value_name = "FMT"
        )]
        message_format: MessageFormatOpts,
    },
    /// Build, flash and run every test on the device
    ///
    /// Each test is compiled into its own firmware image, written to the
    /// board, and watched over the serial port until it reports a result or
    /// its wait window runs out.
    Run {
        /// Directory scanned for test sources
        #[arg(long, value_name = "DIR", default_value = ".")]
        test_root: Utf8PathBuf,

        /// Toolchain used to build test images [default: from config]
        #[arg(long, value_enum, value_name = "TOOLCHAIN")]
        toolchain: Option<ToolchainOpt>,

        /// Serial port the device reports on [default: from config]
        #[arg(long, value_name = "PORT")]
        port: Option<String>,

        /// Baud rate for the serial port [default: from config]
        #[arg(long, value_name = "RATE")]
        baud: Option<u32>,

        /// Directory build artifacts are written to
        #[arg(long, value_name = "DIR", default_value = ".")]
        scratch_dir: Utf8PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormatOpts {
    #[default]
    Human,
    Json,
    JsonPretty,
}

impl MessageFormatOpts {
    fn to_output_format(self, colorize: bool) -> OutputFormat {
        match self {
            Self::Human => OutputFormat::Human { colorize },
            Self::Json => OutputFormat::Json,
            Self::JsonPretty => OutputFormat::JsonPretty,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ToolchainOpt {
    Armcc,
    Gcc,
}

impl ToolchainOpt {
    fn to_kind(self) -> ToolchainKind {
        match self {
            Self::Armcc => ToolchainKind::Armcc,
            Self::Gcc => ToolchainKind::Gcc,
        }
    }
}
