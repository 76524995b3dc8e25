//! Page open command: run the load state machine once

use std::io::Write;
use std::path::Path;

use anyhow::{Result, bail};
use pagesmith_core::{ManagerConfig, ManagerState, OrganizationId, PageId, PageManager, Phase};
use tracing::info;

use super::fixture;

/// Initialize a page against the fixture and print the final state as JSON.
///
/// The state is printed even when loading failed so the caller can see
/// `failure` and `retryCount`; the command then returns an error.
///
/// # Errors
///
/// Returns an error if the fixture cannot be read or written, output fails,
/// or the manager ends in [`Phase::Error`].
pub async fn execute<W: Write>(
    fixture_path: &Path,
    organization: Option<&str>,
    page: Option<&str>,
    write: bool,
    config: ManagerConfig,
    mut writer: W,
) -> Result<ManagerState> {
    let backend = fixture::load(fixture_path)?;
    let pages_before = backend.to_fixture().pages.len();

    let manager = PageManager::with_backend(backend.clone(), config);
    let state = manager
        .initialize_page(page.map(PageId::new), organization.map(OrganizationId::new))
        .await;

    serde_json::to_writer_pretty(&mut writer, &state)?;
    writeln!(writer)?;

    if write {
        let pages_after = backend.to_fixture().pages.len();
        if pages_after != pages_before {
            info!(created = pages_after - pages_before, "persisting bootstrapped pages");
        }
        fixture::persist(&backend, fixture_path)?;
    }

    if state.phase == Phase::Error {
        bail!(
            "{}",
            state
                .error
                .clone()
                .unwrap_or_else(|| "page initialization failed".to_string())
        );
    }
    Ok(state)
}
