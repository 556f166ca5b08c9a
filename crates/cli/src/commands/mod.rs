//! Subcommand implementations

pub mod inspect;
pub mod learning;
pub mod models;
