use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SourceUnit;

pub mod gradle;
pub mod maven;
pub mod sbt;

/// Produces source units for one build system.
///
/// Extractors own their state, so several can run concurrently.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, root: &Path) -> Result<Vec<SourceUnit>>;
}
