//! Command-line front end for the starmap catalog.

pub mod cli_args;
pub mod commands;
