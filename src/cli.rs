use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "migbench")]
#[command(author, version, about = "Benchmark inference models across GPU partitions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sample every configured model and write a comparison report
    Bench {
        /// Path to the TOML configuration file
        config: PathBuf,
        /// Write the report to this path instead of a fresh name in output.dir
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check which configured models the endpoint serves
    Check {
        /// Path to the TOML configuration file
        config: PathBuf,
    },
    /// Print the partition profile of each configured model
    Profiles {
        /// Path to the TOML configuration file
        config: PathBuf,
    },
}

impl Command {
    pub fn config(&self) -> &PathBuf {
        match self {
            Command::Bench { config, .. }
            | Command::Check { config }
            | Command::Profiles { config } => config,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bench() {
        let cli = Cli::try_parse_from(["migbench", "bench", "bench.toml", "-o", "out.html"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Bench {
                config: PathBuf::from("bench.toml"),
                output: Some(PathBuf::from("out.html")),
            }
        );
    }

    #[test]
    fn test_every_command_takes_config() {
        for name in ["check", "profiles"] {
            let cli = Cli::try_parse_from(["migbench", name, "x.toml"]).unwrap();
            assert_eq!(cli.command.config(), &PathBuf::from("x.toml"));
        }
        assert!(Cli::try_parse_from(["migbench", "check"]).is_err());
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
