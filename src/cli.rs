use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "docprobe")]
#[command(about = "Documentation metadata for Python packages and built doc trees")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the effective configuration to Docprobe.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Document a Python module or package
    Inspect {
        /// Dotted module name, e.g. `pkg.sub`
        module: String,

        /// Source root to load modules from (repeatable, overrides the config)
        #[arg(short, long)]
        source: Vec<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Document a built reStructuredText tree
    Rest {
        /// Environment file of a finished build
        #[arg(short, long, conflicts_with = "source")]
        env: Option<PathBuf>,

        /// Documentation sources to build with the configured builder
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Page the walk starts from
        #[arg(short, long)]
        path: Option<String>,

        /// Output format (text, json)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// List the available parser suites
    Suites,
}

impl Cli {
    pub fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path, force } => engine.init(path, force).map(|_| ()),
            Commands::Inspect { module, source, format } => engine.inspect(&module, source, format),
            Commands::Rest {
                env,
                source,
                path,
                format,
            } => engine.rest(env, source, path, format),
            Commands::Suites => engine.suites(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::parse_from(["docprobe", "-v", "inspect", "pkg.sub", "-s", "src", "-s", "lib", "--format", "json"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Inspect { module, source, format } => {
                assert_eq!(module, "pkg.sub");
                assert_eq!(source, [PathBuf::from("src"), PathBuf::from("lib")]);
                assert_eq!(format.as_deref(), Some("json"));
            }
            _ => panic!("expected inspect"),
        }
    }

    #[test]
    fn test_parse_init() {
        let cli = Cli::parse_from(["docprobe", "init", "--path", "proj", "--force"]);
        assert!(matches!(cli.command, Commands::Init { path: Some(ref p), force: true } if p == &PathBuf::from("proj")));
        let cli = Cli::parse_from(["docprobe", "init"]);
        assert!(matches!(cli.command, Commands::Init { path: None, force: false }));
    }

    #[test]
    fn test_rest_env_conflicts_with_source() {
        assert!(Cli::try_parse_from(["docprobe", "rest", "--env", "env.json", "--source", "docs"]).is_err());
        let cli = Cli::try_parse_from(["docprobe", "rest", "--env", "env.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Rest { env: Some(_), source: None, .. }));
    }
}
