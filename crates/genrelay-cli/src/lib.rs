//! Library half of the `genrelay` binary: argument parsing and logging setup.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by main.rs only
use anyhow as _;
use dotenvy as _;
use genrelay_proxy as _;
use tokio as _;
use tracing as _;

pub mod logging;
pub mod parser;

pub use logging::init_tracing;
pub use parser::Cli;
