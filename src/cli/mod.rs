//! Command-line interface module.
//!
//! Each invocation bootstraps the registry (a no-op once master exists), runs
//! one subcommand as the selected principal and ends its session.

pub mod commands;
pub mod handlers;

pub use handlers::{handle_command, resolve_config};
