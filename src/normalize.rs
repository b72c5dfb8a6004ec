//! Merge extractor output into one deterministic collection.
//!
//! Paths become relative to the working root, dependencies are filtered by
//! scope, sorted and deduplicated, files are split into in-tree and
//! out-of-tree sets, and POM metadata is folded onto matching dependencies.
//! Running the pass on its own output changes nothing.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ScanConfig;
use crate::extractor::maven::elements;
use crate::models::{data_keys, RawDependency, RawExclusion, SourceUnit};

/// Data keys holding a single path.
const PATH_KEYS: &[&str] = &[
    data_keys::POM_FILE,
    data_keys::GRADLE_FILE,
    data_keys::SBT_FILE,
    data_keys::BUILD_XML,
];

pub fn normalize(units: Vec<SourceUnit>, root: &Path, config: &ScanConfig) -> Vec<SourceUnit> {
    let root = lexical(root);
    units
        .into_iter()
        .map(|unit| normalize_unit(unit, &root, config))
        .collect()
}

fn normalize_unit(mut unit: SourceUnit, root: &Path, config: &ScanConfig) -> SourceUnit {
    unit.dir = relativize(root, &unit.dir);

    let before = unit.dependencies.len();
    unit.dependencies.retain(|d| !is_excluded(d, config));
    if unit.dependencies.len() != before {
        debug!(
            "{}: dropped {} dependencies by scope",
            unit.name,
            before - unit.dependencies.len()
        );
    }
    for dep in &mut unit.dependencies {
        dep.containing_unit_path = relativize(root, &dep.containing_unit_path);
        if let Some(file) = &dep.source_file {
            dep.source_file = Some(relativize(root, file));
        }
    }

    if let Some(pom) = unit.data.get(data_keys::POM) {
        match pom_declarations(pom) {
            Ok(Some(declared)) => apply_pom(&mut unit.dependencies, &declared),
            Ok(None) => {}
            Err(e) => warn!("Skipping POM metadata for {}: {:#}", unit.name, e),
        }
    }

    unit.dependencies.sort_by(compare_dependencies);
    unit.dependencies.dedup();

    partition_files(&mut unit, root);
    relativize_data(&mut unit, root);
    unit
}

fn is_excluded(dep: &RawDependency, config: &ScanConfig) -> bool {
    dep.scope.as_deref().is_some_and(|scope| {
        config
            .exclude_scopes
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(scope))
    })
}

/// Artifact, group, version, scope, then file (absent first). The remaining
/// fields only break ties so identical records end up adjacent.
pub fn compare_dependencies(a: &RawDependency, b: &RawDependency) -> Ordering {
    (&a.artifact_id, &a.group_id, &a.version, &a.scope, &a.source_file)
        .cmp(&(&b.artifact_id, &b.group_id, &b.version, &b.scope, &b.source_file))
        .then_with(|| a.containing_unit_path.cmp(&b.containing_unit_path))
        .then_with(|| a.kind.cmp(&b.kind))
        .then_with(|| a.optional.cmp(&b.optional))
        .then_with(|| a.exclusions.cmp(&b.exclusions))
}

fn partition_files(unit: &mut SourceUnit, root: &Path) {
    let mut internal = BTreeSet::new();
    let mut external: BTreeSet<String> = unit
        .data
        .get(data_keys::EXTRA_SOURCE_FILES)
        .and_then(Value::as_array)
        .map(|files| files.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    for file in unit.files.drain(..) {
        let path = relativize(root, &file);
        if Path::new(&path).is_absolute() {
            external.insert(path);
        } else {
            internal.insert(path);
        }
    }

    unit.files = internal.into_iter().collect();
    if external.is_empty() {
        unit.data.remove(data_keys::EXTRA_SOURCE_FILES);
    } else {
        unit.data.insert(
            data_keys::EXTRA_SOURCE_FILES.to_string(),
            Value::Array(external.into_iter().map(Value::String).collect()),
        );
    }
}

fn relativize_data(unit: &mut SourceUnit, root: &Path) {
    let rel = |v: &mut Value| {
        if let Value::String(s) = v {
            *s = relativize(root, s);
        }
    };

    for key in PATH_KEYS {
        if let Some(value) = unit.data.get_mut(*key) {
            rel(value);
        }
    }
    if let Some(Value::Array(paths)) = unit.data.get_mut(data_keys::CLASS_PATH) {
        paths.iter_mut().for_each(rel);
    }
    if let Some(Value::Array(paths)) = unit.data.get_mut(data_keys::BOOT_CLASS_PATH) {
        paths.iter_mut().for_each(rel);
        paths.sort_by_key(|v| v.to_string());
    }
    if let Some(Value::Array(entries)) = unit.data.get_mut(data_keys::SOURCE_PATH) {
        for entry in entries.iter_mut() {
            if let Some(path) = entry.as_array_mut().and_then(|e| e.get_mut(2)) {
                rel(path);
            }
        }
        entries.sort_by_key(|v| v.to_string());
    }
}

/// Metadata declared for one `groupId:artifactId` in a POM.
#[derive(Debug, Default, PartialEq)]
struct PomDeclaration {
    optional: bool,
    exclusions: Vec<RawExclusion>,
}

/// Index `project.dependencies.dependency` by `groupId:artifactId`.
///
/// `Ok(None)` means there is nothing to apply; `Err` means the document is
/// not shaped like a POM.
fn pom_declarations(doc: &Value) -> Result<Option<HashMap<String, PomDeclaration>>> {
    let Some(project) = doc.get("project") else {
        warn!("POM document has no project element");
        return Ok(None);
    };
    let Some(dependencies) = project.get("dependencies").and_then(|d| d.get("dependency")) else {
        debug!("POM declares no dependencies");
        return Ok(None);
    };

    let mut declared = HashMap::new();
    for dep in elements(dependencies) {
        let key = pom_key(dep)?;
        let optional = dep.get("optional").is_some_and(is_true);

        let mut exclusions = Vec::new();
        if let Some(list) = dep.get("exclusions").and_then(|e| e.get("exclusion")) {
            for exclusion in elements(list) {
                let (group, artifact) = pom_coordinates(exclusion)?;
                exclusions.push(RawExclusion::new(group, artifact));
            }
        }
        exclusions.sort();
        exclusions.dedup();

        declared.insert(key, PomDeclaration { optional, exclusions });
    }
    Ok(Some(declared))
}

fn pom_text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).map(str::trim)
}

/// `true` as a JSON boolean or as case-insensitive text.
fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn pom_coordinates(value: &Value) -> Result<(&str, &str)> {
    if !value.is_object() {
        bail!("expected an element, found {}", value);
    }
    match (pom_text(value, "groupId"), pom_text(value, "artifactId")) {
        (Some(group), Some(artifact)) => Ok((group, artifact)),
        _ => bail!("entry without groupId/artifactId: {}", value),
    }
}

fn pom_key(value: &Value) -> Result<String> {
    let (group, artifact) = pom_coordinates(value)?;
    Ok(format!("{}:{}", group, artifact))
}

fn apply_pom(deps: &mut [RawDependency], declared: &HashMap<String, PomDeclaration>) {
    for dep in deps {
        match declared.get(&dep.key()) {
            Some(decl) => {
                dep.optional = decl.optional;
                dep.exclusions = Some(decl.exclusions.clone()).filter(|e| !e.is_empty());
            }
            None => {
                dep.optional = false;
                dep.exclusions = None;
            }
        }
    }
}

/// `path` relative to `root` when it lies under it ("." for the root
/// itself), otherwise absolute. Relative input is taken as relative to
/// `root`.
pub fn relativize(root: &Path, path: &str) -> String {
    let p = Path::new(path);
    let absolute = if p.is_absolute() {
        lexical(p)
    } else {
        lexical(&root.join(p))
    };
    match absolute.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => absolute.to_string_lossy().into_owned(),
    }
}

/// Resolve `.` and `..` without touching the file system.
fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
