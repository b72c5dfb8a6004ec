//! Gradle projects: static scan of `build.gradle` / `build.gradle.kts`.

pub mod scanner;
pub mod syntax;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::GradleConfig;
use crate::detector::{self, BuildFiles};
use crate::models::{data_keys, DependencyKind, RawDependency, SourceUnit};
use scanner::ScanOptions;

/// Source extensions collected from `src/main` of a Gradle project.
const SOURCE_EXTENSIONS: &[&str] = &["java", "kt", "groovy", "scala"];

pub struct GradleExtractor {
    scripts: Vec<PathBuf>,
    options: ScanOptions,
}

impl GradleExtractor {
    /// Scan the discovered scripts, or only `config.build_file` when set.
    pub fn new(config: &GradleConfig, root: &Path, found: &BuildFiles) -> Self {
        let scripts = match &config.build_file {
            Some(file) => vec![root.join(file)],
            None => found.gradle.clone(),
        };
        GradleExtractor {
            scripts,
            options: ScanOptions {
                flush_trailing_group: config.flush_trailing_group,
            },
        }
    }
}

#[async_trait]
impl super::Extractor for GradleExtractor {
    async fn extract(&self, _root: &Path) -> Result<Vec<SourceUnit>> {
        let scripts = self.scripts.clone();
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || scan_scripts(&scripts, &options))
            .await
            .context("Gradle extraction task panicked")
    }
}

/// Scan every script, skipping the ones that cannot be read.
fn scan_scripts(scripts: &[PathBuf], options: &ScanOptions) -> Vec<SourceUnit> {
    let mut units = Vec::new();
    for script in scripts {
        match scan_script(script, options) {
            Ok(unit) => {
                info!(
                    "Gradle script {} declares {} dependencies",
                    script.display(),
                    unit.dependencies.len()
                );
                units.push(unit);
            }
            Err(e) => warn!("Skipping Gradle script {}: {:#}", script.display(), e),
        }
    }
    units
}

/// Build the unit for one script.
pub fn scan_script(script: &Path, options: &ScanOptions) -> Result<SourceUnit> {
    let content = std::fs::read_to_string(script)
        .with_context(|| format!("reading {}", script.display()))?;
    let dir = script.parent().unwrap_or_else(|| Path::new("."));
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());

    debug!("Scanning Gradle script {}", script.display());
    let tree = syntax::parse(&content);

    let mut unit = SourceUnit::new(name, dir);
    unit.dependencies = scanner::scan(&tree, options)
        .into_iter()
        .map(|c| {
            RawDependency::new(c.group_id, c.artifact_id, c.version, DependencyKind::Gradle, script)
                .with_scope(c.scope.as_deref())
                .with_source_file(script)
        })
        .collect();
    unit.files = detector::collect_sources(&dir.join("src").join("main"), SOURCE_EXTENSIONS);
    unit.data.insert(
        data_keys::GRADLE_FILE.to_string(),
        Value::String(script.to_string_lossy().into_owned()),
    );

    Ok(unit)
}
