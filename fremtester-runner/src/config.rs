// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session configuration.
//!
//! A session config describes everything about the bench that isn't a test:
//! which serial port the board is wired to, how long to wait for it, which
//! cross toolchains exist and how to drive them, and how images get flashed.
//! Configs are TOML; a default config is embedded in the binary and any file
//! passed on the command line is parsed with the same schema.

use crate::errors::{ConfigError, ProfileNotFound};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::{collections::BTreeMap, fmt, fs, time::Duration};

/// Overall session configuration for fremtester.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionConfig {
    /// The toolchain used when none is selected on the command line.
    #[serde(default)]
    pub default_toolchain: ToolchainKind,

    /// File extension test sources must carry, without the leading dot.
    #[serde(default = "default_test_file_extension")]
    pub test_file_extension: String,

    /// Serial connection to the target device.
    #[serde(default)]
    pub serial: SerialConfig,

    /// How long to wait for the device at each stage.
    #[serde(default)]
    pub windows: WaitWindows,

    /// Support code compiled once per session and linked into every test.
    #[serde(default)]
    pub fixtures: FixtureConfig,

    /// How images are written to the target device.
    #[serde(default)]
    pub flash: FlashConfig,

    /// Toolchain profiles, keyed by kind.
    #[serde(default)]
    pub toolchain: BTreeMap<ToolchainKind, ToolchainProfile>,
}

impl SessionConfig {
    /// The default config, embedded in the fremtester binary.
    pub const DEFAULT_CONFIG: &'static str =
        include_str!("../default-config/fremtester.toml");

    /// File name probed in the working directory when `--config-file` isn't given.
    pub const DEFAULT_CONFIG_PATH: &'static str = "fremtester.toml";

    /// Reads the config from the given file, falling back to the embedded
    /// default config if no file is given.
    pub fn from_sources(config_file: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        match config_file {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|err| ConfigError::Read {
                    path: path.to_owned(),
                    err,
                })?;
                toml::from_str(&text).map_err(|err| ConfigError::Parse {
                    path: path.to_owned(),
                    err,
                })
            }
            None => Ok(Self::default_config()),
        }
    }

    /// Returns the embedded default config.
    pub fn default_config() -> Self {
        toml::from_str(Self::DEFAULT_CONFIG).expect("embedded default config is valid")
    }

    /// Returns the profile for the given toolchain kind.
    pub fn toolchain_profile(
        &self,
        kind: ToolchainKind,
    ) -> Result<&ToolchainProfile, ProfileNotFound> {
        self.toolchain.get(&kind).ok_or_else(|| {
            ProfileNotFound::new(kind, self.toolchain.keys().map(|kind| kind.to_string()))
        })
    }
}

/// The kind of cross toolchain used to build test images.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainKind {
    /// The ARM Compiler (armcc/armasm/armlink).
    Armcc,

    /// The GNU Arm Embedded toolchain (arm-none-eabi-gcc and friends).
    #[default]
    Gcc,
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainKind::Armcc => write!(f, "armcc"),
            ToolchainKind::Gcc => write!(f, "gcc"),
        }
    }
}

/// Serial connection parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SerialConfig {
    /// Path to the serial device.
    #[serde(default = "default_serial_port")]
    pub port: String,

    /// Baud rate the device firmware is configured for.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// How long a single blocking read may wait before being retried.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout: default_read_timeout(),
        }
    }
}

/// Wait windows applied while a test is running on the device.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WaitWindows {
    /// How long freshly flashed firmware gets to announce itself.
    #[serde(default = "default_start_window", with = "humantime_serde")]
    pub start: Duration,

    /// How long an announced test gets to produce a conclusive token.
    #[serde(default = "default_outcome_window", with = "humantime_serde")]
    pub outcome: Duration,

    /// Granularity of the waiting loops.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll: Duration,
}

impl Default for WaitWindows {
    fn default() -> Self {
        Self {
            start: default_start_window(),
            outcome: default_outcome_window(),
            poll: default_poll_interval(),
        }
    }
}

/// Support code built once per session and linked into every test image.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FixtureConfig {
    /// C sources, compiled with the profile's C compiler.
    #[serde(default)]
    pub c_sources: Vec<Utf8PathBuf>,

    /// C++ sources, compiled with the profile's C++ compiler.
    #[serde(default)]
    pub cxx_sources: Vec<Utf8PathBuf>,

    /// Extra include directories passed when compiling fixture sources.
    #[serde(default)]
    pub include_dirs: Vec<Utf8PathBuf>,
}

/// How binary images get onto the target device.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlashConfig {
    /// The flash programmer.
    #[serde(default = "default_flash_program")]
    pub program: String,

    /// Board configuration script passed to the programmer.
    #[serde(default = "default_board_config")]
    pub board_config: Utf8PathBuf,

    /// Address the binary image is written to.
    #[serde(default = "default_flash_address")]
    pub flash_address: String,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            program: default_flash_program(),
            board_config: default_board_config(),
            flash_address: default_flash_address(),
        }
    }
}

/// A build or flash tool together with the flags it is always invoked with.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Tool {
    /// The program to run.
    pub program: String,

    /// Flags appended to every invocation.
    #[serde(default)]
    pub flags: Vec<String>,
}

/// A command template whose arguments may contain `{placeholder}` markers,
/// substituted at invocation time.
///
/// Used where argument order differs between tools: `fromelf` wants
/// `--output <bin> <elf>` while `objcopy` wants `<elf> <bin>`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandTemplate {
    /// The program to run.
    pub program: String,

    /// Argument templates.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// Renders the argument list, substituting each `{key}` marker.
    pub fn rendered_args(&self, substitutions: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                let mut arg = arg.clone();
                for (key, value) in substitutions {
                    arg = arg.replace(&format!("{{{key}}}"), value);
                }
                arg
            })
            .collect()
    }
}

/// A toolchain profile: the tools and flags needed to turn a test source into
/// a linked image, plus the support files that build requires.
///
/// Paths are resolved relative to the test root unless absolute.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolchainProfile {
    /// The assembler, for the startup source.
    pub assembler: Tool,

    /// The C compiler.
    pub cc: Tool,

    /// The C++ compiler.
    pub cxx: Tool,

    /// The linker.
    pub linker: Tool,

    /// Flag that introduces the linker script, e.g. `-T` or `--scatter`.
    pub linker_script_flag: String,

    /// The linker script (or scatter file).
    pub linker_script: Utf8PathBuf,

    /// Assembly startup source built as part of the fixtures.
    pub startup_source: Utf8PathBuf,

    /// Template for the per-test retarget shim.
    pub retarget_template: Utf8PathBuf,

    /// Converts a linked executable into a raw binary image.
    ///
    /// Substitutions: `{elf}` is the linked executable, `{bin}` the output.
    pub objcopy: CommandTemplate,
}

fn default_test_file_extension() -> String {
    "cpp".to_owned()
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_owned()
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_start_window() -> Duration {
    Duration::from_secs(3)
}

fn default_outcome_window() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_flash_program() -> String {
    "openocd".to_owned()
}

fn default_board_config() -> Utf8PathBuf {
    "/usr/share/openocd/scripts/board/stm32f4discovery.cfg".into()
}

fn default_flash_address() -> String {
    "0x8000000".to_owned()
}
