//! Recovers dependency declarations from a Gradle call-expression tree.
//!
//! Three visitors cooperate:
//! - the task visitor walks top-level calls and arbitrary task wrappers
//!   looking for `dependencies` blocks (skipping `buildscript` and
//!   `repositories`);
//! - the dependency visitor treats every call inside a `dependencies` block
//!   as a configuration name;
//! - the artifact visitor reads the configuration's arguments, accepting
//!   either `"group:artifact:version"` strings or `group:/name:/version:`
//!   key/value groups.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::syntax::Node;
use crate::coordinate::{self, Coordinate};

/// Keys that announce that the next constant is their value.
const GROUP_KEYS: &[&str] = &["group", "name", "version", "transitive"];

/// Calls that reference local files rather than resolvable coordinates.
const FILE_CALLS: &[&str] = &["files", "fileTree"];

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Emit a key/value group left open when its declaration's argument
    /// list ends. When unset, such a group is only emitted once a later
    /// group or coordinate closes it, and a script's last group is lost.
    pub flush_trailing_group: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            flush_trailing_group: true,
        }
    }
}

/// Scan a parsed script; every coordinate carries its configuration as scope.
pub fn scan(nodes: &[Node], options: &ScanOptions) -> Vec<Coordinate> {
    let mut artifacts = ArtifactVisitor::new(options.flush_trailing_group);
    visit_tasks(nodes, &mut artifacts);
    artifacts.finish()
}

fn visit_tasks(nodes: &[Node], artifacts: &mut ArtifactVisitor) {
    for node in nodes {
        match node {
            Node::Call { name, args } => {
                let method = name.trim();
                if method.eq_ignore_ascii_case("dependencies") {
                    debug!("Found dependencies block");
                    visit_dependencies(args, artifacts);
                } else if method.eq_ignore_ascii_case("repositories")
                    || method.eq_ignore_ascii_case("buildscript")
                {
                    // Artifact sources and build plugins are not product dependencies.
                } else {
                    debug!("Found gradle task: {}", method);
                    visit_tasks(args, artifacts);
                }
            }
            Node::Block(children) => visit_tasks(children, artifacts),
            _ => {}
        }
    }
}

fn visit_dependencies(nodes: &[Node], artifacts: &mut ArtifactVisitor) {
    for node in nodes {
        match node {
            Node::Call { name, args } => artifacts.visit_declaration(name, args),
            Node::Block(children) => visit_dependencies(children, artifacts),
            _ => {}
        }
    }
}

/// A `group:/name:/version:` group being accumulated.
#[derive(Debug)]
struct OpenGroup {
    configuration: String,
    fields: HashMap<String, Option<String>>,
    /// Key whose value is expected next.
    awaiting: Option<String>,
}

#[derive(Debug)]
enum GroupState {
    Idle,
    Accumulating(OpenGroup),
}

struct ArtifactVisitor {
    flush_trailing_group: bool,
    state: GroupState,
    found: Vec<Coordinate>,
}

impl ArtifactVisitor {
    fn new(flush_trailing_group: bool) -> Self {
        ArtifactVisitor {
            flush_trailing_group,
            state: GroupState::Idle,
            found: Vec::new(),
        }
    }

    fn visit_declaration(&mut self, configuration: &str, args: &[Node]) {
        self.visit_arguments(configuration, args);
        if self.flush_trailing_group {
            self.close_group();
        }
    }

    fn visit_arguments(&mut self, configuration: &str, args: &[Node]) {
        for arg in args {
            match arg {
                Node::Constant(value) => self.visit_constant(configuration, value),
                Node::Call { name, .. } if FILE_CALLS.contains(&name.as_str()) => {
                    debug!("Ignoring local file dependency {}() in {}", name, configuration);
                }
                Node::Call { name, .. } => {
                    debug!("Skipping unsupported dependency notation {}() in {}", name, configuration);
                }
                Node::Block(children) => self.visit_arguments(configuration, children),
                Node::Identifier(_) | Node::Opaque(_) => self.visit_unresolved(configuration, arg),
            }
        }
    }

    fn visit_constant(&mut self, configuration: &str, raw: &str) {
        let token = raw.trim();

        if GROUP_KEYS.contains(&token) {
            self.visit_key(configuration, token);
            return;
        }

        let group_open = match &mut self.state {
            GroupState::Accumulating(group) => match group.awaiting.take() {
                Some(key) => {
                    group.fields.insert(key, Some(token.to_string()));
                    return;
                }
                None => true,
            },
            GroupState::Idle => false,
        };
        if group_open {
            // A plain value terminates the open group.
            self.close_group();
        }

        // Reserved for the `transitive` flag.
        if token == "true" || token == "false" {
            return;
        }

        if let Some(c) = coordinate::parse(token, Some(configuration)) {
            self.found.push(c);
        }
    }

    fn visit_key(&mut self, configuration: &str, key: &str) {
        let repeated = match &mut self.state {
            GroupState::Accumulating(group) if !group.fields.contains_key(key) => {
                group.awaiting = Some(key.to_string());
                return;
            }
            GroupState::Accumulating(_) => true,
            GroupState::Idle => false,
        };
        if repeated {
            // The key repeats, so a new group has started.
            self.close_group();
        }
        self.state = GroupState::Accumulating(OpenGroup {
            configuration: configuration.to_string(),
            fields: HashMap::new(),
            awaiting: Some(key.to_string()),
        });
    }

    /// A value the scanner cannot evaluate (variable, interpolated string).
    fn visit_unresolved(&mut self, configuration: &str, node: &Node) {
        if let GroupState::Accumulating(group) = &mut self.state {
            if let Some(key) = group.awaiting.take() {
                group.fields.insert(key, None);
                return;
            }
        }
        if let Node::Opaque(text) = node {
            if text.contains(':') {
                warn!(
                    "Skipping dependency {:?} from configuration {}: interpolated values are not evaluated",
                    text, configuration
                );
            }
        }
    }

    /// Emit the open group, if any, and return to idle.
    fn close_group(&mut self) {
        let GroupState::Accumulating(group) = std::mem::replace(&mut self.state, GroupState::Idle)
        else {
            return;
        };
        let field = |k: &str| group.fields.get(k).cloned().flatten();
        match (field("group"), field("name"), field("version")) {
            (Some(g), Some(n), Some(v)) => {
                let joined = format!("{}:{}:{}", g, n, v);
                if let Some(c) = coordinate::parse(&joined, Some(group.configuration.as_str())) {
                    self.found.push(c);
                }
            }
            _ => warn!(
                "Skipping incomplete dependency group {:?} from configuration {}",
                group.fields, group.configuration
            ),
        }
    }

    fn finish(self) -> Vec<Coordinate> {
        if let GroupState::Accumulating(group) = &self.state {
            debug!(
                "Dropping unterminated dependency group {:?} from configuration {}",
                group.fields, group.configuration
            );
        }
        self.found
    }
}
