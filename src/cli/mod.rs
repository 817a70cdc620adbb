//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Mapping arguments onto reader and reassembly configuration

mod args;

pub use args::{Args, ProtocolChoice};
