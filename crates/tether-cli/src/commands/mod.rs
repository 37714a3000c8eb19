//! CLI subcommands.

pub(crate) mod censor;
pub(crate) mod config;
pub(crate) mod run;
