use std::path::PathBuf;

use clap::Parser;

use super::commands::Commands;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = CliArgs::try_parse_from([
            "docgate",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--config",
            "gw.yaml",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("gw.yaml")));
        assert!(cli.json_logs);
        match cli.command {
            Commands::Serve(args) => assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000")),
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn check_acl_takes_a_file() {
        let cli = CliArgs::try_parse_from(["docgate", "check-acl", "acl.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckAcl(args) if args.file == PathBuf::from("acl.yaml")));
    }
}
