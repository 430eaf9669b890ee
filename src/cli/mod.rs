//! Command line interface module
//!
//! This module provides the entry point for parsing command-line arguments and running the
//! selected subcommand: pulling an image from a library, or inspecting a local SIF file.

pub mod args;
pub mod runner;

pub use args::{Args, Command, ImageRef};
pub use runner::Runner;
