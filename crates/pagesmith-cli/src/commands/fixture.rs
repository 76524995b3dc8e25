//! Backend fixture loading shared by `open` and `edit`

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use pagesmith_core::memory::{BackendFixture, InMemoryBackend};
use tracing::debug;

/// Load a fixture file into an in-memory backend.
pub fn load(path: &Path) -> Result<Arc<InMemoryBackend>> {
    let fixture = BackendFixture::load(path)
        .with_context(|| format!("Failed to load fixture {}", path.display()))?;
    debug!(
        path = %path.display(),
        organizations = fixture.organizations.len(),
        pages = fixture.pages.len(),
        "loaded fixture"
    );
    Ok(Arc::new(InMemoryBackend::from_fixture(fixture)))
}

/// Write the backend's current contents back to `path`.
pub fn persist(backend: &InMemoryBackend, path: &Path) -> Result<()> {
    backend
        .to_fixture()
        .save(path)
        .with_context(|| format!("Failed to write fixture {}", path.display()))
}
