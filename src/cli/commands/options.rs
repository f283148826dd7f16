//! Options shared by every subcommand

use crate::principal::{Principal, SessionId};
use clap::Args;
use std::path::PathBuf;

/// Who is acting and against which registry
#[derive(Args, Debug, Clone)]
pub struct RegistryOptions {
    /// Act as this user; without it the command runs as administrator
    #[arg(long, global = true, env = "REGVAULT_USER")]
    pub user: Option<String>,

    /// Treat the user as an administrator (works against master)
    #[arg(long, global = true)]
    pub admin: bool,

    /// Session identifier
    #[arg(long, global = true, default_value = "cli")]
    pub session: String,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep both repositories under this directory, overriding configuration
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

impl RegistryOptions {
    pub fn principal(&self) -> Principal {
        match (&self.user, self.admin) {
            (Some(user), false) => Principal::user(user.clone()),
            (Some(user), true) => Principal::administrator(user.clone()),
            (None, _) => Principal::administrator("admin"),
        }
    }

    pub fn session(&self) -> SessionId {
        SessionId::new(self.session.clone())
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingOptions {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log filter directives (e.g. "regvault_core=debug,git2=warn")
    #[arg(long, global = true, env = "REGVAULT_LOG")]
    pub log_filter: Option<String>,
}

impl LoggingOptions {
    pub fn get_effective_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(user: Option<&str>, admin: bool) -> RegistryOptions {
        RegistryOptions {
            user: user.map(str::to_string),
            admin,
            session: "cli".to_string(),
            config: None,
            root: None,
        }
    }

    #[test]
    fn test_principal_selection() {
        assert!(options(None, false).principal().is_administrator());
        assert!(!options(Some("alice"), false).principal().uses_master());
        let admin = options(Some("alice"), true).principal();
        assert!(admin.is_administrator());
        assert_eq!(admin.id(), "alice");
    }
}
