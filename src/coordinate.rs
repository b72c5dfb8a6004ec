//! `group:artifact:version[:scope]` coordinate strings.

use tracing::warn;

/// A parsed dependency coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub scope: Option<String>,
}

/// Parse a strict three-segment coordinate, attaching `scope` as given.
///
/// Returns `None` (and logs a warning) when the string does not split into
/// exactly three non-empty segments.
pub fn parse(raw: &str, scope: Option<&str>) -> Option<Coordinate> {
    let parts = split_segments(raw);
    if parts.len() != 3 {
        warn!(
            "Skipping invalid dependency {:?} from configuration {}",
            raw,
            scope.unwrap_or("<none>")
        );
        return None;
    }
    build(raw, &parts, scope)
}

/// Like [`parse`], but also accepts `group:artifact:version:scope`.
///
/// The fourth segment is only used when the caller did not supply a scope.
pub fn parse_scoped(raw: &str, scope: Option<&str>) -> Option<Coordinate> {
    let parts = split_segments(raw);
    match parts.len() {
        3 => build(raw, &parts, scope),
        4 => {
            let embedded = Some(parts[3]).filter(|s| !s.is_empty());
            build(raw, &parts[..3], scope.or(embedded))
        }
        _ => {
            warn!(
                "Skipping invalid dependency {:?} from configuration {}",
                raw,
                scope.unwrap_or("<none>")
            );
            None
        }
    }
}

fn split_segments(raw: &str) -> Vec<&str> {
    raw.trim().split(':').map(str::trim).collect()
}

fn build(raw: &str, parts: &[&str], scope: Option<&str>) -> Option<Coordinate> {
    if parts.iter().any(|p| p.is_empty()) {
        warn!("Skipping dependency {:?} with an empty coordinate segment", raw);
        return None;
    }
    Some(Coordinate {
        group_id: parts[0].to_string(),
        artifact_id: parts[1].to_string(),
        version: parts[2].to_string(),
        scope: scope.map(str::to_string),
    })
}
