//! sbt projects, extracted by driving one long-lived interactive sbt shell.
//!
//! sbt startup is slow, so a single subprocess serves the whole traversal:
//! list projects, switch into each one, recurse into aggregated
//! subprojects, and query dependencies and sources of every leaf.

pub mod ivy;
pub mod session;

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::SbtConfig;
use crate::coordinate;
use crate::models::{data_keys, DependencyKind, RawDependency, SourceUnit};
use session::SbtSession;

const PROJECTS_HEADER: &str = "In file:";
const SELECTED_PROJECT_PREFIX: &str = "\t * ";
const PROJECT_PREFIX: &str = "\t   ";
const SUBPROJECT_PREFIX: &str = "    ";
const SOURCE_FILE_PREFIX: &str = "* ";
const PLUGIN_LINE: &str =
    "addSbtPlugin(\"net.virtual-void\" % \"sbt-dependency-graph\" % \"0.9.2\")";
/// How long `exit` may take before the process is killed.
const EXIT_GRACE: Duration = Duration::from_secs(10);

static RE_IVY_REPORT: OnceLock<Regex> = OnceLock::new();
static RE_NOISE: OnceLock<Regex> = OnceLock::new();

/// Absolute path of an Ivy XML report under sbt's resolution cache.
fn re_ivy_report() -> &'static Regex {
    RE_IVY_REPORT.get_or_init(|| {
        Regex::new(r"^/.+/resolution-cache/reports/.+\.xml$").expect("ivy report pattern")
    })
}

/// Two bare words, e.g. "Updating foo".
fn re_noise() -> &'static Regex {
    RE_NOISE.get_or_init(|| Regex::new(r"^\w+\s+\w+$").expect("noise pattern"))
}

pub struct SbtExtractor {
    build_file: PathBuf,
    config: SbtConfig,
}

impl SbtExtractor {
    pub fn new(build_file: PathBuf, config: &SbtConfig) -> Self {
        SbtExtractor {
            build_file,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl super::Extractor for SbtExtractor {
    async fn extract(&self, _root: &Path) -> Result<Vec<SourceUnit>> {
        let build_dir = self.build_file.parent().unwrap_or_else(|| Path::new("."));

        if self.config.install_dependency_plugin {
            let plugin = install_dependency_plugin(build_dir, &self.config.plugin_file)?;
            debug!("Installed dependency plugin at {}", plugin.display());
        }

        let mut process = SbtProcess::spawn(&self.config, build_dir)?;
        let result = discover_units(&mut process.session, &self.build_file).await;
        process.shutdown().await;

        let units = result.with_context(|| format!("driving sbt for {}", self.build_file.display()))?;
        info!("sbt build {} yielded {} units", self.build_file.display(), units.len());
        Ok(units)
    }
}

/// Write `project/<file_name>` declaring the dependency-graph plugin.
pub fn install_dependency_plugin(build_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let project_dir = build_dir.join("project");
    std::fs::create_dir_all(&project_dir)
        .with_context(|| format!("creating {}", project_dir.display()))?;
    let plugin = project_dir.join(file_name);
    std::fs::write(&plugin, format!("{}\n", PLUGIN_LINE))
        .with_context(|| format!("writing {}", plugin.display()))?;
    Ok(plugin)
}

/// The sbt child process together with the session over its pipes.
///
/// The child is spawned with `kill_on_drop`, so it never outlives this value
/// even when extraction bails out early.
struct SbtProcess {
    child: Child,
    session: SbtSession<BufReader<ChildStdout>, ChildStdin>,
}

impl SbtProcess {
    fn spawn(config: &SbtConfig, dir: &Path) -> Result<Self> {
        debug!("Starting {} in {}", config.binary.display(), dir.display());
        let mut child = Command::new(&config.binary)
            .args(&config.args)
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting {}", config.binary.display()))?;

        let stdin = child.stdin.take().context("sbt stdin was not captured")?;
        let stdout = child.stdout.take().context("sbt stdout was not captured")?;
        let timeout = Some(Duration::from_secs(config.command_timeout_secs)).filter(|d| !d.is_zero());

        Ok(SbtProcess {
            child,
            session: SbtSession::new(BufReader::new(stdout), stdin, timeout),
        })
    }

    /// Ask sbt to exit, then make sure the process is gone.
    async fn shutdown(mut self) {
        if let Err(e) = self.session.send("exit").await {
            debug!("Could not send exit to sbt: {}", e);
        }
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("sbt exited with {}", status),
            Ok(Err(e)) => warn!("Waiting for sbt failed: {}", e),
            Err(_) => {
                warn!("sbt did not exit within {:?}; killing it", EXIT_GRACE);
                if let Err(e) = self.child.kill().await {
                    warn!("Killing sbt failed: {}", e);
                }
            }
        }
    }
}

/// Projects named by the `projects` command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProjectListing {
    pub selected: Option<String>,
    pub others: Vec<String>,
}

impl ProjectListing {
    /// Projects to traverse; the selected project only counts on its own.
    pub fn projects_to_visit(&self) -> Vec<String> {
        match (&self.selected, self.others.is_empty()) {
            (Some(selected), true) => vec![selected.clone()],
            _ => self.others.clone(),
        }
    }
}

pub fn parse_project_listing(lines: &[String]) -> ProjectListing {
    let mut listing = ProjectListing::default();
    let body = lines
        .iter()
        .skip_while(|line| !line.starts_with(PROJECTS_HEADER))
        .skip(1);
    for line in body {
        if let Some(project) = line.strip_prefix(SELECTED_PROJECT_PREFIX) {
            debug!("found selected project: {}", project);
            listing.selected = Some(project.to_string());
        } else if let Some(project) = line.strip_prefix(PROJECT_PREFIX) {
            debug!("found project: {}", project);
            listing.others.push(project.to_string());
        }
    }
    listing
}

/// Subproject names from a multi-line `show name` answer for `project`.
pub fn parse_subprojects(lines: &[String], project: &str) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix(SUBPROJECT_PREFIX))
        .filter(|name| *name != project)
        .map(str::to_string)
        .collect()
}

/// Walk every project reachable from the `projects` listing.
pub async fn discover_units<R, W>(
    session: &mut SbtSession<R, W>,
    build_file: &Path,
) -> Result<Vec<SourceUnit>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Drain the startup banner.
    session.send_and_collect("").await?;

    let listing = parse_project_listing(&session.send_and_collect("projects").await?);
    let mut pending: VecDeque<String> = listing.projects_to_visit().into();
    let mut visited = HashSet::new();
    let mut units = Vec::new();

    while let Some(project) = pending.pop_front() {
        if !visited.insert(project.clone()) {
            continue;
        }
        session.send_and_collect(&format!("project {}", project)).await?;
        let names = session.send_and_collect("show name").await?;

        if names.len() > 1 {
            let subprojects = parse_subprojects(&names, &project);
            debug!("{} aggregates {:?}", project, subprojects);
            // Depth-first, in listing order.
            for sub in subprojects.into_iter().rev() {
                pending.push_front(sub);
            }
            continue;
        }

        let name = names.into_iter().next().unwrap_or_else(|| project.clone());
        units.push(extract_leaf(session, build_file, name).await?);
    }

    Ok(units)
}

async fn extract_leaf<R, W>(
    session: &mut SbtSession<R, W>,
    build_file: &Path,
    name: String,
) -> Result<SourceUnit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let dir = build_file.parent().unwrap_or_else(|| Path::new("."));
    let mut unit = SourceUnit::new(name, dir);
    unit.data.insert(
        data_keys::SBT_FILE.to_string(),
        Value::String(build_file.to_string_lossy().into_owned()),
    );

    let report_lines = session.send_and_collect("show ivyReport").await?;
    let reports: Vec<PathBuf> = report_lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| re_ivy_report().is_match(l))
        .map(PathBuf::from)
        .collect();

    // The printed report path is sometimes wrong; fall back to dependencyList.
    let mut use_flat_list = reports.is_empty();
    for report in &reports {
        if !report.exists() {
            debug!("Ivy report {} does not exist", report.display());
            use_flat_list = true;
            continue;
        }
        match ivy::read_report(report) {
            Ok(revisions) => unit.dependencies.extend(revisions.into_iter().map(|r| {
                RawDependency::new(r.organisation, r.name, r.revision, DependencyKind::IvyReport, build_file)
                    .with_scope(Some("compile"))
            })),
            Err(e) => warn!("Error parsing ivy report file for project <{}>: {:#}", unit.name, e),
        }
    }
    if use_flat_list {
        debug!("Falling back to dependencyList for {}", unit.name);
        let lines = session.send_and_collect("dependencyList").await?;
        unit.dependencies.extend(parse_dependency_list(&lines, build_file));
    }

    let sources = session.send_and_collect("show unmanagedSources").await?;
    unit.files = sources
        .iter()
        .filter_map(|l| l.strip_prefix(SOURCE_FILE_PREFIX))
        .map(str::to_string)
        .collect();

    Ok(unit)
}

/// Parse `dependencyList` output; every dependency gets scope `compile`
/// unless the line names its own.
pub fn parse_dependency_list(lines: &[String], build_file: &Path) -> Vec<RawDependency> {
    let mut deps = Vec::new();
    for line in lines.iter().map(|l| l.trim()) {
        if re_noise().is_match(line) {
            continue;
        }
        let segments: Vec<&str> = line.split(':').collect();
        if segments.len() < 3 {
            if line.contains(':') {
                warn!("Skipping malformed dependency line {:?}", line);
            }
            continue;
        }
        // Log lines such as "Resolving g:a:v ..." split into three segments too.
        if segments[..3].iter().any(|s| s.trim().contains(char::is_whitespace)) {
            warn!("Skipping malformed dependency line {:?}", line);
            continue;
        }
        let head = segments[..segments.len().min(4)].join(":");
        if let Some(c) = coordinate::parse_scoped(&head, None) {
            let scope = c.scope.as_deref().unwrap_or("compile");
            deps.push(
                RawDependency::new(c.group_id, c.artifact_id, c.version, DependencyKind::DependencyList, build_file)
                    .with_scope(Some(scope)),
            );
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader as TokioBufReader;

    const EOF: &str = "[info] ans: String = EOF\n";

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    /// Join command responses into one shell transcript.
    fn transcript(responses: &[&str]) -> String {
        responses.iter().map(|r| format!("{}{}", r, EOF)).collect()
    }

    #[test]
    fn test_project_listing_multi_module() {
        let out = lines(&["In file:/repo/", "\t * root", "\t   sub1", "\t   sub2"]);
        let listing = parse_project_listing(&out);
        assert_eq!(listing.selected.as_deref(), Some("root"));
        assert_eq!(listing.others, vec!["sub1", "sub2"]);
        assert_eq!(listing.projects_to_visit(), vec!["sub1", "sub2"]);
    }

    #[test]
    fn test_project_listing_single_module() {
        let out = lines(&["Loading settings", "In file:/repo/", "\t * hello"]);
        let listing = parse_project_listing(&out);
        assert!(listing.others.is_empty());
        assert_eq!(listing.projects_to_visit(), vec!["hello"]);
    }

    #[test]
    fn test_project_listing_ignores_lines_before_header() {
        let out = lines(&["\t   bogus", "In file:/repo/", "\t   real"]);
        assert_eq!(parse_project_listing(&out).others, vec!["real"]);
    }

    #[test]
    fn test_parse_subprojects_skips_self() {
        let out = lines(&["core / name", "    core", "    core-api", "    core-impl"]);
        assert_eq!(parse_subprojects(&out, "core"), vec!["core-api", "core-impl"]);
    }

    #[test]
    fn test_dependency_list_skips_noise() {
        let out = lines(&[
            "Updating foo",
            "com.x:lib:1.2.3",
            "Done updating.",
            "Updating ProjectRef(uri(\"file:/private/tmp/akka/\"), \"akka\")...",
            "Resolving org.scala-lang:scala-library:2.12.8 ...",
            "org.y:other:2.0:provided",
        ]);
        let deps = parse_dependency_list(&out, Path::new("/repo/build.sbt"));
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].group_id, "com.x");
        assert_eq!(deps[0].artifact_id, "lib");
        assert_eq!(deps[0].version, "1.2.3");
        assert_eq!(deps[0].scope.as_deref(), Some("compile"));
        assert_eq!(deps[0].kind, DependencyKind::DependencyList);
        assert_eq!(deps[0].containing_unit_path, "/repo/build.sbt");
        assert_eq!(deps[1].scope.as_deref(), Some("provided"));
    }

    #[test]
    fn test_install_dependency_plugin() {
        let dir = tempfile::TempDir::new().unwrap();
        let plugin = install_dependency_plugin(dir.path(), "deps.sbt").unwrap();
        assert_eq!(plugin, dir.path().join("project").join("deps.sbt"));
        let content = std::fs::read_to_string(plugin).unwrap();
        assert!(content.contains("sbt-dependency-graph"));
    }

    #[tokio::test]
    async fn test_discovery_with_fallback() {
        let script = transcript(&[
            "Welcome to sbt\n[info] Loading project definition from /repo/project\n",
            "[info] In file:/repo/\n[info] \t * root\n[info] \t   sub1\n[info] \t   sub2\n",
            // sub1
            "[info] Set current project to sub1\n",
            "[info] sub1\n",
            "[info] /missing/target/resolution-cache/reports/sub1-compile.xml\n",
            "[info] Updating foo\n[info] com.x:lib:1.2.3\n[info] Done updating.\n",
            "[info] * /repo/sub1/src/main/scala/A.scala\n[success] Total time: 0 s, completed\n",
            // sub2
            "[info] Set current project to sub2\n",
            "[info] sub2\n",
            "[warn] no report\n",
            "[info] org.y:other:2.0\n",
            "[info] * /repo/sub2/src/main/scala/B.scala\n",
        ]);
        let mut session = SbtSession::new(
            TokioBufReader::new(script.as_bytes()),
            Vec::new(),
            None,
        );

        let units = discover_units(&mut session, Path::new("/repo/build.sbt"))
            .await
            .unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "sub1");
        assert_eq!(units[0].dir, "/repo");
        assert_eq!(units[0].dependencies.len(), 1);
        assert_eq!(units[0].dependencies[0].artifact_id, "lib");
        assert_eq!(units[0].files, vec!["/repo/sub1/src/main/scala/A.scala"]);
        assert_eq!(units[1].name, "sub2");
        assert_eq!(units[1].dependencies[0].artifact_id, "other");

        let sent = String::from_utf8(session.writer().clone()).unwrap();
        let commands: Vec<&str> = sent.lines().filter(|l| *l != "eval \"EOF\"").collect();
        assert_eq!(
            commands,
            vec![
                "",
                "projects",
                "project sub1",
                "show name",
                "show ivyReport",
                "dependencyList",
                "show unmanagedSources",
                "project sub2",
                "show name",
                "show ivyReport",
                "dependencyList",
                "show unmanagedSources",
            ]
        );
    }

    #[tokio::test]
    async fn test_discovery_recurses_into_aggregates() {
        let script = transcript(&[
            "",
            "[info] In file:/repo/\n[info] \t * root\n",
            "",
            "[info] root / name\n[info]     root\n[info]     api\n",
            "",
            "[info] api\n",
            "",
            "",
            "",
        ]);
        let mut session = SbtSession::new(
            TokioBufReader::new(script.as_bytes()),
            Vec::new(),
            None,
        );
        let units = discover_units(&mut session, Path::new("/repo/build.sbt"))
            .await
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "api");
        assert!(units[0].dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_ivy_report_is_primary_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let report_dir = dir.path().join("target/resolution-cache/reports");
        std::fs::create_dir_all(&report_dir).unwrap();
        let report = report_dir.join("app-compile.xml");
        std::fs::write(
            &report,
            r#"<ivy-report><dependencies><module organisation="org.a" name="b"><revision name="1.0"/></module></dependencies></ivy-report>"#,
        )
        .unwrap();

        let report_line = format!("[info] {}\n", report.display());
        let script = transcript(&[
            "",
            "[info] In file:/repo/\n[info] \t * app\n",
            "",
            "[info] app\n",
            report_line.as_str(),
            "[info] * /repo/src/main/scala/Main.scala\n",
        ]);
        let mut session = SbtSession::new(
            TokioBufReader::new(script.as_bytes()),
            Vec::new(),
            None,
        );
        let units = discover_units(&mut session, Path::new("/repo/build.sbt"))
            .await
            .unwrap();
        assert_eq!(units.len(), 1);
        let dep = &units[0].dependencies[0];
        assert_eq!((dep.group_id.as_str(), dep.artifact_id.as_str()), ("org.a", "b"));
        assert_eq!(dep.kind, DependencyKind::IvyReport);

        let sent = String::from_utf8(session.writer().clone()).unwrap();
        assert!(!sent.contains("dependencyList"));
    }

    #[tokio::test]
    async fn test_io_failure_propagates() {
        // Shell dies after listing projects.
        let script = transcript(&["", "[info] In file:/repo/\n[info] \t * app\n"]);
        let mut session = SbtSession::new(
            TokioBufReader::new(script.as_bytes()),
            Vec::new(),
            None,
        );
        assert!(discover_units(&mut session, Path::new("/repo/build.sbt"))
            .await
            .is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_drives_real_process() {
        use crate::extractor::Extractor;

        let dir = tempfile::TempDir::new().unwrap();
        let fake_sbt = dir.path().join("fake-sbt");
        std::fs::write(
            &fake_sbt,
            r#"#!/bin/sh
while read -r line; do
  case "$line" in
    'eval "EOF"') echo '[info] ans: String = EOF' ;;
    projects) echo '[info] In file:/x/'; printf '[info] \t * app\n' ;;
    'show name') echo '[info] app' ;;
    dependencyList) echo '[info] org.x:lib:1.0' ;;
    'show unmanagedSources') echo '[info] * /x/src/main/scala/A.scala' ;;
    exit) exit 0 ;;
  esac
done
"#,
        )
        .unwrap();

        let build_file = dir.path().join("build.sbt");
        std::fs::write(&build_file, "name := \"app\"\n").unwrap();

        let config = SbtConfig {
            binary: PathBuf::from("/bin/sh"),
            args: vec![fake_sbt.to_string_lossy().into_owned()],
            command_timeout_secs: 30,
            install_dependency_plugin: true,
            plugin_file: "deps.sbt".to_string(),
        };
        let units = SbtExtractor::new(build_file, &config)
            .extract(dir.path())
            .await
            .unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "app");
        assert_eq!(units[0].dependencies[0].artifact_id, "lib");
        assert_eq!(units[0].files, vec!["/x/src/main/scala/A.scala"]);
        assert!(dir.path().join("project/deps.sbt").exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SbtConfig {
            binary: dir.path().join("no-such-sbt"),
            install_dependency_plugin: false,
            ..SbtConfig::default()
        };
        let extractor = SbtExtractor::new(dir.path().join("build.sbt"), &config);
        assert!(crate::extractor::Extractor::extract(&extractor, dir.path())
            .await
            .is_err());
    }
}
