// Copyright (c) The fremtester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core functionality for [fremtester](https://crates.io/crates/fremtester),
//! an on-hardware test harness for embedded firmware.
//!
//! A session discovers `tst_*` sources under a test root, builds one firmware
//! image per test with a fresh correlation id baked in, flashes the image to
//! the target board, and watches the serial port for the tokens the firmware
//! prints while it runs. Each outcome is classified against the expectation
//! encoded in the test's file name.
//!
//! This crate is the engine behind the `fremtester` command-line tool, which
//! is the intended way to use it.

#![warn(missing_docs)]

pub mod config;
pub mod errors;
pub mod flash;
pub mod monitor;
pub mod protocol;
pub mod reporter;
pub mod retarget;
pub mod runner;
pub mod test_list;
pub mod toolchain;
