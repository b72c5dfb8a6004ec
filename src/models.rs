use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit type handed to downstream consumers for every JVM build unit.
pub const DEFAULT_UNIT_TYPE: &str = "JavaArtifact";

/// Well-known keys of [`SourceUnit::data`].
pub mod data_keys {
    /// Parsed `pom.xml` document (generic JSON tree).
    pub const POM: &str = "POM";
    pub const POM_FILE: &str = "POMFile";
    pub const GRADLE_FILE: &str = "GradleFile";
    pub const SBT_FILE: &str = "SbtFile";
    pub const BUILD_XML: &str = "BuildXML";
    pub const CLASS_PATH: &str = "ClassPath";
    pub const BOOT_CLASS_PATH: &str = "BootClassPath";
    /// List of `[name, version, path]` triples.
    pub const SOURCE_PATH: &str = "SourcePath";
    /// Files that live outside the working root, written by normalization.
    pub const EXTRA_SOURCE_FILES: &str = "ExtraSourceFiles";
}

/// One buildable unit discovered by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceUnit {
    pub name: String,
    #[serde(rename = "Type")]
    pub unit_type: String,
    pub dir: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<RawDependency>,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl SourceUnit {
    /// Create an empty unit of the default type rooted at `dir`.
    pub fn new(name: impl Into<String>, dir: &Path) -> Self {
        SourceUnit {
            name: name.into(),
            unit_type: DEFAULT_UNIT_TYPE.to_string(),
            dir: dir.to_string_lossy().into_owned(),
            files: Vec::new(),
            dependencies: Vec::new(),
            data: BTreeMap::new(),
        }
    }
}

/// One declared dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDependency {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "artifactID")]
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Originating declaration file, if known.
    #[serde(rename = "file", default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Build file that declared this dependency.
    #[serde(rename = "containingUnitPath")]
    pub containing_unit_path: String,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusions: Option<Vec<RawExclusion>>,
}

impl RawDependency {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        kind: DependencyKind,
        containing_unit_path: &Path,
    ) -> Self {
        RawDependency {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            scope: None,
            source_file: None,
            containing_unit_path: containing_unit_path.to_string_lossy().into_owned(),
            kind,
            optional: false,
            exclusions: None,
        }
    }

    pub fn with_scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope.map(str::to_string);
        self
    }

    pub fn with_source_file(mut self, file: &Path) -> Self {
        self.source_file = Some(file.to_string_lossy().into_owned());
        self
    }

    /// `groupID:artifactID`, the key used to match POM declarations.
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

/// How a dependency record was obtained, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Declared in a Gradle script.
    Gradle,
    /// Read from an Ivy XML resolution report.
    IvyReport,
    /// Parsed from a flat `group:artifact:version` listing.
    DependencyList,
    /// Declared in a `pom.xml`.
    Pom,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::Gradle => write!(f, "gradle"),
            DependencyKind::IvyReport => write!(f, "ivy-report"),
            DependencyKind::DependencyList => write!(f, "dependency-list"),
            DependencyKind::Pom => write!(f, "pom"),
        }
    }
}

/// A transitive dependency to suppress, identified by group and artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawExclusion {
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "artifactID")]
    pub artifact_id: String,
}

impl RawExclusion {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        RawExclusion {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }
}

/// Build systems this tool knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildSystem {
    Maven,
    Gradle,
    Sbt,
}

impl std::fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildSystem::Maven => write!(f, "Maven"),
            BuildSystem::Gradle => write!(f, "Gradle"),
            BuildSystem::Sbt => write!(f, "sbt"),
        }
    }
}
