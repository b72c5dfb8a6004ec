use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG_FILE: &str = "DEPGRAPH_CONFIG_FILE";
/// Environment variable restricting the Gradle scan to one script.
pub const ENV_GRADLE_BUILD_FILE: &str = "DEPGRAPH_GRADLE_BUILD_FILE";
/// Environment variable overriding the sbt executable.
pub const ENV_SBT_BINARY: &str = "DEPGRAPH_SBT_BINARY";

/// Root configuration structure, deserialized from `.depgraph.toml`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub gradle: GradleConfig,
    pub sbt: SbtConfig,
}

/// Normalization policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Dependencies whose scope equals one of these (case-insensitive) are
    /// dropped from the final graph.
    pub exclude_scopes: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            exclude_scopes: vec!["test".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GradleConfig {
    /// Scan only this script (relative to the project root) instead of every
    /// `build.gradle` found.
    pub build_file: Option<PathBuf>,
    /// Emit a `group:/name:/version:` group still open at the end of its
    /// declaration.
    pub flush_trailing_group: bool,
}

impl Default for GradleConfig {
    fn default() -> Self {
        GradleConfig {
            build_file: None,
            flush_trailing_group: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SbtConfig {
    /// sbt executable, looked up on `PATH` when not absolute.
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Upper bound for a single shell command, including dependency resolution.
    pub command_timeout_secs: u64,
    /// Write the dependency-graph plugin into `project/` before starting sbt.
    pub install_dependency_plugin: bool,
    /// File name used for the plugin definition under `project/`.
    pub plugin_file: String,
}

impl Default for SbtConfig {
    fn default() -> Self {
        SbtConfig {
            binary: PathBuf::from("sbt"),
            args: vec!["-no-colors".to_string()],
            command_timeout_secs: 900,
            install_dependency_plugin: true,
            plugin_file: "depgraph-deps.sbt".to_string(),
        }
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `$DEPGRAPH_CONFIG_FILE`
/// 3. `<project_path>/.depgraph.toml`
/// 4. `~/.config/depgraph/config.toml`
/// 5. Built-in [`Config::default`]
///
/// Environment overrides are applied on top of whichever source was used.
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    let mut config = match find_config_file(project_path, config_override) {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => Config::default(),
    };
    apply_env(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn find_config_file(project_path: &Path, config_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = config_override {
        return Some(path.to_path_buf());
    }

    if let Some(path) = std::env::var_os(ENV_CONFIG_FILE).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let project_config = project_path.join(".depgraph.toml");
    if project_config.exists() {
        return Some(project_config);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join("depgraph").join("config.toml"))
        .filter(|p| p.exists())
}

/// Apply environment overrides; empty values are ignored.
fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(build_file) = get(ENV_GRADLE_BUILD_FILE) {
        config.gradle.build_file = Some(PathBuf::from(build_file));
    }
    if let Some(binary) = get(ENV_SBT_BINARY) {
        config.sbt.binary = PathBuf::from(binary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.scan.exclude_scopes, vec!["test"]);
        assert!(cfg.gradle.flush_trailing_group);
        assert!(cfg.gradle.build_file.is_none());
        assert_eq!(cfg.sbt.binary, PathBuf::from("sbt"));
        assert_eq!(cfg.sbt.args, vec!["-no-colors"]);
        assert!(cfg.sbt.install_dependency_plugin);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
[scan]
exclude_scopes = ["test", "provided"]

[sbt]
command_timeout_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(cfg.scan.exclude_scopes, vec!["test", "provided"]);
        assert_eq!(cfg.sbt.command_timeout_secs, 30);
        assert_eq!(cfg.sbt.binary, PathBuf::from("sbt"));
        assert!(cfg.gradle.flush_trailing_group);
    }

    #[test]
    fn test_override_path_wins() {
        let project = TempDir::new().unwrap();
        std::fs::write(
            project.path().join(".depgraph.toml"),
            "[sbt]\nbinary = \"/project/sbt\"\n",
        )
        .unwrap();
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[sbt]\nbinary = \"/override/sbt\"\n").unwrap();

        let found = find_config_file(project.path(), Some(f.path())).unwrap();
        assert_eq!(found, f.path());
    }

    #[test]
    fn test_project_config_file_is_found() {
        let project = TempDir::new().unwrap();
        let path = project.path().join(".depgraph.toml");
        std::fs::write(&path, "[gradle]\nflush_trailing_group = false\n").unwrap();
        let cfg = load_config(project.path(), Some(&path)).unwrap();
        assert!(!cfg.gradle.flush_trailing_group);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[scan\nexclude_scopes = 3").unwrap();
        assert!(load_config(Path::new("."), Some(f.path())).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_GRADLE_BUILD_FILE, "sub/build.gradle"),
            (ENV_SBT_BINARY, ""),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        apply_env(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.gradle.build_file, Some(PathBuf::from("sub/build.gradle")));
        assert_eq!(cfg.sbt.binary, PathBuf::from("sbt"));
    }
}
