// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Getting built images onto the device.
//!
//! The linked executable is first stripped down to a raw binary with the
//! profile's objcopy tool, then written to flash through openocd. openocd's
//! command string halts the target, erases and programs the flash, and
//! releases the target so the image starts running.

use crate::{
    config::{CommandTemplate, FlashConfig},
    errors::FlashError,
    toolchain::ExecutableImage,
};
use camino::Utf8PathBuf;
use duct::cmd;
use tracing::{debug, info};

/// Writes a built image to the target device and starts it.
///
/// Implemented by [`OpenOcdFlasher`] for real hardware; test code substitutes
/// its own.
pub trait ImageFlasher {
    /// Downloads `image` to the device, leaving the device running it.
    fn flash(&self, image: &ExecutableImage) -> Result<(), FlashError>;
}

/// Flashes images to an STM32F4 target through openocd.
#[derive(Clone, Debug)]
pub struct OpenOcdFlasher<'cfg> {
    flash: &'cfg FlashConfig,
    objcopy: &'cfg CommandTemplate,
}

impl<'cfg> OpenOcdFlasher<'cfg> {
    /// Creates a flasher from the session's flash settings and the active
    /// toolchain's objcopy tool.
    pub fn new(flash: &'cfg FlashConfig, objcopy: &'cfg CommandTemplate) -> Self {
        Self { flash, objcopy }
    }

    fn run_tool(&self, program: &str, args: Vec<String>) -> Result<(), FlashError> {
        debug!("running {program} {}", args.join(" "));
        let output = cmd(program, args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|err| FlashError::Exec {
                program: program.to_owned(),
                err,
            })?;
        if !output.status.success() {
            return Err(FlashError::Failed {
                program: program.to_owned(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl ImageFlasher for OpenOcdFlasher<'_> {
    fn flash(&self, image: &ExecutableImage) -> Result<(), FlashError> {
        // The device boots from raw flash contents, not an ELF image.
        let bin = Utf8PathBuf::from(format!("{}.bin", image.elf));
        let args = self
            .objcopy
            .rendered_args(&[("elf", image.elf.as_str()), ("bin", bin.as_str())]);
        self.run_tool(&self.objcopy.program, args)?;

        info!("download {bin}");
        let commands = format!(
            "init; reset halt; wait_halt; flash write_image erase {bin} {}; reset run; shutdown",
            self.flash.flash_address,
        );
        self.run_tool(
            &self.flash.program,
            vec![
                "-f".to_owned(),
                self.flash.board_config.to_string(),
                "-c".to_owned(),
                commands,
            ],
        )
    }
}
