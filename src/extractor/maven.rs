//! Maven projects: declared dependencies of each `pom.xml`.
//!
//! The POM is kept as a generic JSON tree on the unit so normalization can
//! cross-reference optional flags and exclusions later.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::detector;
use crate::models::{data_keys, DependencyKind, RawDependency, SourceUnit};

const SOURCE_EXTENSIONS: &[&str] = &["java", "kt"];

pub struct MavenExtractor {
    poms: Vec<PathBuf>,
}

impl MavenExtractor {
    pub fn new(poms: Vec<PathBuf>) -> Self {
        MavenExtractor { poms }
    }
}

#[async_trait]
impl super::Extractor for MavenExtractor {
    async fn extract(&self, _root: &Path) -> Result<Vec<SourceUnit>> {
        let poms = self.poms.clone();
        tokio::task::spawn_blocking(move || read_poms(&poms))
            .await
            .context("Maven extraction task panicked")
    }
}

/// Read every POM, skipping the ones that fail.
fn read_poms(poms: &[PathBuf]) -> Vec<SourceUnit> {
    let mut units = Vec::new();
    for pom in poms {
        match read_pom(pom) {
            Ok(unit) => {
                info!("{} declares {} dependencies", pom.display(), unit.dependencies.len());
                units.push(unit);
            }
            Err(e) => warn!("Skipping {}: {:#}", pom.display(), e),
        }
    }
    units
}

/// Build the unit for one `pom.xml`.
pub fn read_pom(path: &Path) -> Result<SourceUnit> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let doc = xml_to_json(&content).with_context(|| format!("parsing {}", path.display()))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let project = doc.get("project").context("missing <project> element")?;
    let props = Properties::from_project(project);

    let name = text(project, "artifactId")
        .map(|a| props.resolve(a))
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| ".".to_string());

    let mut unit = SourceUnit::new(name, dir);
    unit.files = detector::collect_sources(&dir.join("src").join("main"), SOURCE_EXTENSIONS);
    unit.dependencies = declared_dependencies(project, &props, path);
    unit.data.insert(
        data_keys::POM_FILE.to_string(),
        Value::String(path.to_string_lossy().into_owned()),
    );
    unit.data.insert(data_keys::POM.to_string(), doc);
    Ok(unit)
}

fn declared_dependencies(project: &Value, props: &Properties, pom: &Path) -> Vec<RawDependency> {
    let managed = managed_versions(project, props);
    let mut deps = Vec::new();

    let declared = project
        .get("dependencies")
        .and_then(|d| d.get("dependency"))
        .map(elements)
        .unwrap_or_default();

    for dep in declared {
        let (Some(group), Some(artifact)) = (text(dep, "groupId"), text(dep, "artifactId")) else {
            warn!("Skipping dependency without groupId/artifactId in {}", pom.display());
            continue;
        };
        let group = props.resolve(group);
        let artifact = props.resolve(artifact);
        let key = format!("{}:{}", group, artifact);

        let version = text(dep, "version")
            .map(|v| props.resolve(v))
            .or_else(|| managed.get(&key).cloned());
        let Some(version) = version.filter(|v| !v.is_empty() && !v.contains("${")) else {
            warn!("Skipping {} in {}: version could not be resolved", key, pom.display());
            continue;
        };
        if group.contains("${") || artifact.contains("${") {
            warn!("Skipping {} in {}: unresolved property", key, pom.display());
            continue;
        }

        let scope = text(dep, "scope").unwrap_or("compile");
        deps.push(
            RawDependency::new(group, artifact, version, DependencyKind::Pom, pom)
                .with_scope(Some(scope))
                .with_source_file(pom),
        );
    }
    deps
}

/// `groupId:artifactId` → version from `<dependencyManagement>`.
fn managed_versions(project: &Value, props: &Properties) -> HashMap<String, String> {
    project
        .get("dependencyManagement")
        .and_then(|m| m.get("dependencies"))
        .and_then(|d| d.get("dependency"))
        .map(elements)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|dep| {
            let group = props.resolve(text(dep, "groupId")?);
            let artifact = props.resolve(text(dep, "artifactId")?);
            let version = props.resolve(text(dep, "version")?);
            Some((format!("{}:{}", group, artifact), version))
        })
        .collect()
}

/// `${...}` substitution table for one POM.
struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    fn from_project(project: &Value) -> Self {
        let mut values: HashMap<String, String> = project
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let parent = project.get("parent");
        for key in ["version", "groupId", "artifactId"] {
            let value = text(project, key).or_else(|| parent.and_then(|p| text(p, key)));
            if let Some(value) = value {
                values.insert(format!("project.{}", key), value.to_string());
                values.insert(format!("pom.{}", key), value.to_string());
            }
        }
        Properties { values }
    }

    /// Substitute every known `${name}`; unknown placeholders stay in place.
    fn resolve(&self, raw: &str) -> String {
        let mut out = String::new();
        let mut rest = raw;
        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start..].find('}') else { break };
            let key = &rest[start + 2..start + len];
            out.push_str(&rest[..start]);
            match self.values.get(key) {
                Some(value) => out.push_str(value),
                None => out.push_str(&rest[start..=start + len]),
            }
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        out
    }
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).map(str::trim)
}

/// A POM element that may appear once (object) or repeatedly (array).
pub(crate) fn elements(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Convert an XML document into a JSON tree.
///
/// Elements with children become objects keyed by child name, a repeated
/// child becomes an array, and leaf elements become their text. Attributes
/// are dropped.
pub fn xml_to_json(xml: &str) -> Result<Value> {
    struct Frame {
        name: String,
        children: Map<String, Value>,
        text: String,
    }

    fn attach(children: &mut Map<String, Value>, name: String, value: Value) {
        match children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                children.insert(name, value);
            }
        }
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root = Map::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => stack.push(Frame {
                name: String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned(),
                children: Map::new(),
                text: String::new(),
            }),
            Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.children, name, Value::String(String::new())),
                    None => attach(&mut root, name, Value::String(String::new())),
                }
            }
            Event::Text(ref e) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(ref e) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    bail!("unbalanced closing tag");
                };
                let value = if frame.children.is_empty() {
                    Value::String(frame.text)
                } else {
                    Value::Object(frame.children)
                };
                match stack.last_mut() {
                    Some(parent) => attach(&mut parent.children, frame.name, value),
                    None => attach(&mut root, frame.name, value),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        bail!("unclosed element <{}>", open.name);
    }
    debug!("Converted POM with {} top-level elements", root.len());
    Ok(Value::Object(root))
}
