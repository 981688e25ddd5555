//! Subcommand implementations

pub mod convert;
pub mod run;
pub mod shape;
