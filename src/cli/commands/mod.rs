pub mod options;

pub use options::{LoggingOptions, RegistryOptions};

use crate::registry::Direction;
use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Create and seed the master repository if it does not exist yet
    Bootstrap,

    /// List service definitions
    List {
        /// Only services whose URL pattern belongs to this domain
        #[arg(long)]
        domain: Option<String>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// List the domains services are filed under
    Domains,

    /// Print one service definition as JSON
    Show {
        id: i64,
    },

    /// Save a service definition read from a JSON file
    Save {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Delete a service definition
    Delete {
        id: i64,
    },

    /// Commit all pending changes and mark them published
    Publish {
        /// Commit message
        #[arg(short = 'm', long = "message")]
        message: String,
    },

    /// Show service definitions changed since the last commit
    Status,

    /// Show the commit history of a service definition
    History {
        id: i64,
    },

    /// Discard uncommitted changes to a service definition
    Revert {
        id: i64,
    },

    /// Move a service definition up or down in evaluation order
    Reorder {
        id: i64,

        #[arg(value_enum)]
        direction: OrderDirection,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Up,
    Down,
}

impl From<OrderDirection> for Direction {
    fn from(direction: OrderDirection) -> Self {
        match direction {
            OrderDirection::Up => Direction::Up,
            OrderDirection::Down => Direction::Down,
        }
    }
}
