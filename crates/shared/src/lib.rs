//! Data shapes shared between the console core, its collaborators and the CLI.

pub mod domain;
pub mod error;
pub mod protocol;
