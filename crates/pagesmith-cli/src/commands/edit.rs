//! Page edit command: open a session, apply edits, save once

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use pagesmith_core::{
    EditingSession, OrganizationId, PageContent, PageDocument, PageGateway, PageId, PageTarget,
    SessionConfig,
};
use tracing::info;

use super::fixture;
use crate::cli::EditArgs;

fn read_content(path: &Path) -> Result<PageContent> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read content {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Content {} is not valid JSON", path.display()))?;
    Ok(PageContent::from_value(value))
}

/// Apply the requested edits, save, and print the stored document as JSON.
///
/// # Errors
///
/// Returns an error if the fixture or content file cannot be read, the page
/// does not exist, or the save is rejected (with the user-facing message).
pub async fn execute<W: Write>(
    args: &EditArgs,
    mut config: SessionConfig,
    mut writer: W,
) -> Result<PageDocument> {
    // Read inputs before touching the backend so bad paths fail fast.
    let content = args.content.as_deref().map(read_content).transpose()?;

    let backend = fixture::load(&args.fixture)?;
    let gateway = PageGateway::new(backend.clone());
    if args.auto_homepage {
        config.auto_homepage_on_root_context = true;
    }

    let organization = OrganizationId::new(args.organization.as_str());
    let target = match &args.page {
        Some(id) => PageTarget::Existing(PageId::new(id.as_str())),
        None => PageTarget::New {
            root_context: args.root,
        },
    };
    let session = EditingSession::open(gateway, config, organization, target).await?;

    if let Some(title) = &args.title {
        session.set_title(title.as_str());
    }
    if let Some(slug) = &args.slug {
        session.set_slug(slug.as_str());
    }
    if let Some(content) = content {
        session.set_content(content);
    }
    if args.publish {
        session.toggle_published();
    }
    if args.homepage {
        session.toggle_homepage();
    }

    let result = session.save().await;
    session.shutdown();
    let saved = result.map_err(|e| anyhow!(e.user_message()))?;
    info!(page = ?saved.id, slug = %saved.slug, version = saved.version, "saved");

    if args.write {
        fixture::persist(&backend, &args.fixture)?;
    }

    serde_json::to_writer_pretty(&mut writer, &saved)?;
    writeln!(writer)?;
    Ok(saved)
}
