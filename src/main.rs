//! `depgraph`: extract a normalized dependency graph from JVM builds.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and initialise logging.
//! 2. Load config ([`config::load_config`]).
//! 3. Discover build files ([`detector::detect_build_files`]).
//! 4. Run one [`extractor::Extractor`] per build system, concurrently.
//! 5. Normalize the merged units ([`normalize::normalize`]).
//! 6. Write JSON or render the terminal report ([`report`]).
//! 7. Exit `1` when no supported build file was found.

mod cli;
mod config;
mod coordinate;
mod detector;
mod extractor;
mod models;
mod normalize;
mod report;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, OutputFormat};
use config::load_config;
use detector::detect_build_files;
use extractor::gradle::GradleExtractor;
use extractor::maven::MavenExtractor;
use extractor::sbt::SbtExtractor;
use extractor::Extractor;
use models::BuildSystem;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let path = cli
        .path
        .canonicalize()
        .unwrap_or_else(|_| cli.path.clone());

    let config = load_config(&path, cli.config.as_deref())?;

    let excluded: Vec<BuildSystem> = cli.exclude.iter().map(Into::into).collect();
    let found = detect_build_files(&path);
    let systems: Vec<BuildSystem> = found
        .build_systems()
        .into_iter()
        .filter(|s| !excluded.contains(s))
        .collect();

    if systems.is_empty() {
        eprintln!("No supported build files found in {}", path.display());
        std::process::exit(1);
    }

    let mut extractors: Vec<(BuildSystem, Box<dyn Extractor>)> = Vec::new();
    for system in &systems {
        let extractor: Box<dyn Extractor> = match system {
            BuildSystem::Maven => Box::new(MavenExtractor::new(found.maven.clone())),
            BuildSystem::Gradle => Box::new(GradleExtractor::new(&config.gradle, &path, &found)),
            BuildSystem::Sbt => match &found.sbt {
                Some(build_file) => Box::new(SbtExtractor::new(build_file.clone(), &config.sbt)),
                None => continue,
            },
        };
        extractors.push((*system, extractor));
    }

    let spinner = if !cli.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        pb.set_message(format!(
            "Extracting {}",
            systems.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let results = join_all(extractors.iter().map(|(_, e)| e.extract(&path))).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let mut units = Vec::new();
    for ((system, _), result) in extractors.iter().zip(results) {
        match result {
            Ok(found_units) => {
                info!("{} extraction produced {} units", system, found_units.len());
                units.extend(found_units);
            }
            Err(e) => error!("{} extraction failed: {:#}", system, e),
        }
    }

    let units = normalize::normalize(units, &path, &config.scan);

    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&units)?;
            match &cli.output {
                Some(file) => std::fs::write(file, json + "\n")
                    .with_context(|| format!("writing {}", file.display()))?,
                None => println!("{}", json),
            }
        }
        OutputFormat::Terminal => report::terminal::render(&units, &path, cli.verbose, cli.quiet),
    }

    Ok(())
}

/// Log to stderr; stdout carries the JSON document.
fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
