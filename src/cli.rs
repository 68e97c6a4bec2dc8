//! Command line

use crate::config::Overrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// FitMouv WhatsApp coaching bot.
#[derive(Debug, Parser)]
#[command(name = "fitmouv", version, about = "FitMouv WhatsApp coaching bot")]
pub struct Cli {
    /// TOML config file (default: ~/.config/fitmouv/config.toml if present)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Listen port (overrides PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Listen address (overrides BIND_ADDRESS)
    #[arg(long = "bind", global = true)]
    pub bind_address: Option<String>,

    /// Lead snapshot JSON file (overrides LEADS_FILE)
    #[arg(long, global = true)]
    pub leads_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the webhook server and the dispatcher (default)
    Serve,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            bind_address: self.bind_address.clone(),
            leads_file: self.leads_file.clone(),
        }
    }

    /// Subcommand to run, `serve` when none was given.
    pub fn action(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::parse_from(["fitmouv"]);
        assert!(matches!(cli.action(), Command::Serve));
        assert!(cli.overrides().port.is_none());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "fitmouv",
            "check-config",
            "--port",
            "8080",
            "--bind",
            "127.0.0.1",
            "--leads-file",
            "/tmp/leads.json",
        ]);
        assert!(matches!(cli.action(), Command::CheckConfig));
        let overrides = cli.overrides();
        assert_eq!(overrides.port, Some(8080));
        assert_eq!(overrides.bind_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(overrides.leads_file, Some(PathBuf::from("/tmp/leads.json")));
    }
}
