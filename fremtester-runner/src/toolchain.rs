// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building firmware images with a cross toolchain.
//!
//! A session builds in two stages. Fixtures are compiled once up front: the
//! startup assembly, shared C support code and the C++ runtime under test.
//! Then each test gets its own image: a retarget shim rendered with the
//! test's correlation id, the test source itself, and a link of everything
//! against the profile's linker script.

use crate::{
    config::{FixtureConfig, ToolchainKind, ToolchainProfile},
    errors::{BuildError, TemplateError},
    retarget::RetargetTemplate,
    test_list::TestCase,
};
use camino::{Utf8Path, Utf8PathBuf};
use duct::cmd;
use std::fs;
use tracing::{debug, info};

/// A linked firmware image, ready to flash.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutableImage {
    /// Path to the linked executable.
    pub elf: Utf8PathBuf,
}

/// Builds one firmware image per test.
///
/// Implemented by [`TestBuilder`] for real toolchains; test code substitutes
/// its own.
pub trait ImageBuilder {
    /// Builds the image for a test, baking the correlation id into it.
    fn build_test(&self, case: &TestCase, test_id: &str) -> Result<ExecutableImage, BuildError>;
}

/// Drives a configured cross toolchain to produce test images.
#[derive(Debug)]
pub struct TestBuilder<'cfg> {
    kind: ToolchainKind,
    profile: &'cfg ToolchainProfile,
    fixtures: &'cfg FixtureConfig,
    test_root: Utf8PathBuf,
    scratch_dir: Utf8PathBuf,
    template: RetargetTemplate,
    fixture_objects: Vec<Utf8PathBuf>,
}

impl<'cfg> TestBuilder<'cfg> {
    /// Creates a builder for the given toolchain profile.
    ///
    /// This loads and validates the profile's retarget template, so a broken
    /// template fails the session here, before anything touches the device.
    pub fn new(
        profile: &'cfg ToolchainProfile,
        fixtures: &'cfg FixtureConfig,
        kind: ToolchainKind,
        test_root: &Utf8Path,
        scratch_dir: &Utf8Path,
    ) -> Result<Self, TemplateError> {
        let template = RetargetTemplate::load(&resolve(test_root, &profile.retarget_template))?;
        Ok(Self {
            kind,
            profile,
            fixtures,
            test_root: test_root.to_owned(),
            scratch_dir: scratch_dir.to_owned(),
            template,
            fixture_objects: Vec::new(),
        })
    }

    /// Compiles the session fixtures.
    ///
    /// The resulting objects are linked into every test image. Must be called
    /// before the first [`build_test`](ImageBuilder::build_test).
    pub fn build_fixtures(&mut self) -> Result<(), BuildError> {
        info!("building fixtures with the {} toolchain", self.kind);
        let mut objects = Vec::new();

        let object = self.fixture_object(&self.profile.startup_source);
        self.run_tool(
            &self.profile.assembler.program,
            &[self.resolve(&self.profile.startup_source)],
            &object,
            &self.profile.assembler.flags,
        )?;
        objects.push(object);

        let include_flags: Vec<String> = self
            .fixtures
            .include_dirs
            .iter()
            .map(|dir| format!("-I{}", self.resolve(dir)))
            .collect();

        for source in &self.fixtures.c_sources {
            let object = self.fixture_object(source);
            let mut args = include_flags.clone();
            args.extend(self.profile.cc.flags.iter().cloned());
            args.push("-c".to_owned());
            self.run_tool(&self.profile.cc.program, &[self.resolve(source)], &object, &args)?;
            objects.push(object);
        }

        for source in &self.fixtures.cxx_sources {
            let object = self.fixture_object(source);
            let mut args = include_flags.clone();
            args.extend(self.profile.cxx.flags.iter().cloned());
            args.push("-c".to_owned());
            self.run_tool(&self.profile.cxx.program, &[self.resolve(source)], &object, &args)?;
            objects.push(object);
        }

        self.fixture_objects = objects;
        Ok(())
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        resolve(&self.test_root, path)
    }

    // Fixture objects land directly in the scratch dir under their stem, the
    // same place regardless of where the source lives.
    fn fixture_object(&self, source: &Utf8Path) -> Utf8PathBuf {
        let stem = source.file_stem().unwrap_or("fixture");
        self.scratch_dir.join(format!("{stem}.o"))
    }

    fn run_tool(
        &self,
        program: &str,
        inputs: &[Utf8PathBuf],
        output: &Utf8Path,
        args: &[String],
    ) -> Result<(), BuildError> {
        info!("generate {output}");
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|err| BuildError::Write {
                path: parent.to_owned(),
                err,
            })?;
        }

        let mut argv: Vec<String> = inputs.iter().map(|input| input.to_string()).collect();
        argv.push("-o".to_owned());
        argv.push(output.to_string());
        argv.extend(args.iter().cloned());
        debug!("running {program} {}", argv.join(" "));

        let output = cmd(program, argv)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|err| BuildError::Exec {
                program: program.to_owned(),
                err,
            })?;
        if !output.status.success() {
            return Err(BuildError::Failed {
                program: program.to_owned(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl ImageBuilder for TestBuilder<'_> {
    fn build_test(&self, case: &TestCase, test_id: &str) -> Result<ExecutableImage, BuildError> {
        let out_base = self.scratch_dir.join(Utf8Path::new(&case.name).with_extension(""));

        // Render the retarget shim with this test's correlation id.
        let shim_source = Utf8PathBuf::from(format!("{out_base}-retarget.cpp"));
        if let Some(parent) = shim_source.parent() {
            fs::create_dir_all(parent).map_err(|err| BuildError::Write {
                path: parent.to_owned(),
                err,
            })?;
        }
        fs::write(&shim_source, self.template.render(test_id)).map_err(|err| {
            BuildError::Write {
                path: shim_source.clone(),
                err,
            }
        })?;

        // Compile the shim. The template's directory is on the include path
        // so the shim can pull in site headers next to it.
        let shim_object = Utf8PathBuf::from(format!("{out_base}-retarget.o"));
        let mut args: Vec<String> = Vec::new();
        if let Some(dir) = self.template.path().parent() {
            args.push(format!("-I{dir}"));
        }
        args.extend(self.profile.cxx.flags.iter().cloned());
        args.push("-c".to_owned());
        self.run_tool(&self.profile.cxx.program, &[shim_source], &shim_object, &args)?;

        // Compile the test source.
        let test_object = Utf8PathBuf::from(format!("{out_base}.o"));
        let mut args = self.profile.cxx.flags.clone();
        args.push("-c".to_owned());
        self.run_tool(
            &self.profile.cxx.program,
            &[case.source.clone()],
            &test_object,
            &args,
        )?;

        // Link the test against the fixtures and the shim. Objects must come
        // before the linker flags or GNU ld drops the libraries.
        let elf = Utf8PathBuf::from(format!("{out_base}.axf"));
        let mut args: Vec<String> = self
            .fixture_objects
            .iter()
            .map(|object| object.to_string())
            .collect();
        args.push(shim_object.into_string());
        args.extend(self.profile.linker.flags.iter().cloned());
        args.push(self.profile.linker_script_flag.clone());
        args.push(self.resolve(&self.profile.linker_script).into_string());
        self.run_tool(&self.profile.linker.program, &[test_object], &elf, &args)?;

        Ok(ExecutableImage { elf })
    }
}

fn resolve(root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        root.join(path)
    }
}
