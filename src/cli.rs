use std::path::PathBuf;

use clap::Parser;

use crate::models::BuildSystem;

#[derive(Parser, Debug)]
#[command(
    name = "depgraph",
    about = "Extract a normalized dependency graph from Maven, Gradle and sbt builds",
    version
)]
pub struct Cli {
    /// Project path to scan; becomes the root all paths are relative to
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Config file [default: ./.depgraph.toml, fallback ~/.config/depgraph/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write JSON output to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Skip a build system (repeatable)
    #[arg(long, value_name = "SYSTEM")]
    pub exclude: Vec<BuildSystemArg>,

    /// Debug logging; list every dependency in the terminal report
    #[arg(short, long)]
    pub verbose: bool,

    /// Warnings only, no progress spinner
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Terminal,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum BuildSystemArg {
    Maven,
    Gradle,
    Sbt,
}

impl From<&BuildSystemArg> for BuildSystem {
    fn from(arg: &BuildSystemArg) -> Self {
        match arg {
            BuildSystemArg::Maven => BuildSystem::Maven,
            BuildSystemArg::Gradle => BuildSystem::Gradle,
            BuildSystemArg::Sbt => BuildSystem::Sbt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["depgraph"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("."));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.exclude.is_empty());
    }

    #[test]
    fn test_repeated_exclude() {
        let cli = Cli::try_parse_from(["depgraph", "repo", "--exclude", "sbt", "--exclude", "maven"])
            .unwrap();
        let excluded: Vec<BuildSystem> = cli.exclude.iter().map(Into::into).collect();
        assert_eq!(excluded, vec![BuildSystem::Sbt, BuildSystem::Maven]);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["depgraph", "-v", "-q"]).is_err());
    }
}
