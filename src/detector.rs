use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::models::BuildSystem;

/// Directories never searched for build files or sources.
const IGNORED_DIRS: &[&str] = &["target", "build", "node_modules", "out"];

/// Build files found under the working root, sorted by path.
#[derive(Debug, Default, Clone)]
pub struct BuildFiles {
    pub maven: Vec<PathBuf>,
    pub gradle: Vec<PathBuf>,
    /// Top-level `build.sbt` only; nested ones belong to the same build.
    pub sbt: Option<PathBuf>,
}

impl BuildFiles {
    /// Build systems with at least one build file.
    pub fn build_systems(&self) -> Vec<BuildSystem> {
        let mut systems = Vec::new();
        if !self.maven.is_empty() {
            systems.push(BuildSystem::Maven);
        }
        if !self.gradle.is_empty() {
            systems.push(BuildSystem::Gradle);
        }
        if self.sbt.is_some() {
            systems.push(BuildSystem::Sbt);
        }
        systems
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref())
}

/// Recursively find `pom.xml`, `build.gradle(.kts)` and `build.sbt` files.
pub fn detect_build_files(root: &Path) -> BuildFiles {
    let mut found = BuildFiles::default();
    let mut sbt_files: Vec<(usize, PathBuf)> = Vec::new();

    let walker = WalkDir::new(root).sort_by_file_name().into_iter();
    for entry in walker.filter_entry(|e| e.depth() == 0 || !is_ignored(e)) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.file_name().to_string_lossy().as_ref() {
            "pom.xml" => found.maven.push(entry.into_path()),
            "build.gradle" | "build.gradle.kts" => found.gradle.push(entry.into_path()),
            "build.sbt" => sbt_files.push((entry.depth(), entry.into_path())),
            _ => {}
        }
    }

    sbt_files.sort();
    found.sbt = sbt_files.into_iter().next().map(|(_, path)| path);
    found
}

/// Absolute paths of files under `dir` with one of `extensions`, sorted.
/// A missing directory yields no files.
pub fn collect_sources(dir: &Path, extensions: &[&str]) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
        })
        .map(|e| e.path().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}
