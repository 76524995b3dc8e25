//! Page data gateway.
//!
//! Thin layer over a [`PageStore`] that adds organization scoping, pre-write
//! validation, and homepage bootstrap. The load state machine goes through
//! [`PageGateway::ensure_page`]; the editing session loads by id and saves
//! through [`PageGateway::save`].

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::backend::PageStore;
use crate::content::PageContent;
use crate::slug::{is_valid_slug, slugify};
use crate::types::{OrganizationId, PageDocument, PageId};
use crate::{Error, Result};

/// Title given to a bootstrapped homepage.
pub const DEFAULT_HOMEPAGE_TITLE: &str = "Home";

/// Preferred slug of a bootstrapped homepage.
pub const DEFAULT_HOMEPAGE_SLUG: &str = "home";

/// Fetch/create/update access to page records.
#[derive(Clone)]
pub struct PageGateway {
    store: Arc<dyn PageStore>,
}

impl std::fmt::Debug for PageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGateway").finish_non_exhaustive()
    }
}

impl PageGateway {
    /// Create a gateway over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self { store }
    }

    /// Load a page that must belong to `organization`.
    ///
    /// A page owned by another organization is reported as not found.
    pub async fn load_by_id(
        &self,
        page_id: &PageId,
        organization: &OrganizationId,
    ) -> Result<PageDocument> {
        let page = self
            .store
            .fetch_page(page_id)
            .await?
            .filter(|p| &p.organization_id == organization)
            .ok_or_else(|| {
                Error::NotFound(format!("page {page_id} in organization {organization}"))
            })?;
        debug!(page = %page_id, version = page.version, "loaded page by id");
        Ok(page)
    }

    /// Load a page by slug, `None` when no page uses it.
    pub async fn load_by_slug(
        &self,
        organization: &OrganizationId,
        slug: &str,
    ) -> Result<Option<PageDocument>> {
        self.store.find_by_slug(organization, slug).await
    }

    /// The organization's homepage, `None` when there is none yet.
    pub async fn load_homepage(
        &self,
        organization: &OrganizationId,
    ) -> Result<Option<PageDocument>> {
        self.store.find_homepage(organization).await
    }

    /// Write a minimal published homepage for `organization`.
    ///
    /// Not safe to call blindly: callers must have checked that no homepage
    /// exists, otherwise the backend rejects the write as a duplicate.
    pub async fn create_default_homepage(
        &self,
        organization: &OrganizationId,
        organization_name: &str,
    ) -> Result<PageDocument> {
        let slug = if self
            .store
            .find_by_slug(organization, DEFAULT_HOMEPAGE_SLUG)
            .await?
            .is_some()
        {
            slugify(DEFAULT_HOMEPAGE_SLUG, true)
        } else {
            DEFAULT_HOMEPAGE_SLUG.to_string()
        };

        let doc = PageDocument::new(organization.clone(), DEFAULT_HOMEPAGE_TITLE, slug)
            .with_content(default_homepage_content(organization_name))
            .with_published(true)
            .with_homepage(true);

        let created = self.store.insert_page(doc).await?;
        info!(
            organization = %organization,
            page = ?created.id,
            "bootstrapped default homepage"
        );
        Ok(created)
    }

    /// Create or update `doc` after validating it.
    ///
    /// Creates when `doc.id` is absent. Rejects empty titles, malformed slugs,
    /// slugs used by another page, and a second homepage before anything is
    /// written.
    pub async fn save(&self, doc: PageDocument) -> Result<PageDocument> {
        if doc.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }
        if !is_valid_slug(&doc.slug) {
            return Err(Error::Validation(format!(
                "slug '{}' must use lowercase letters, digits and single hyphens",
                doc.slug
            )));
        }

        if let Some(existing) = self
            .store
            .find_by_slug(&doc.organization_id, &doc.slug)
            .await?
        {
            if existing.id != doc.id {
                return Err(Error::DuplicateSlug {
                    slug: doc.slug.clone(),
                });
            }
        }

        if doc.is_homepage {
            if let Some(home) = self.store.find_homepage(&doc.organization_id).await? {
                if home.id != doc.id {
                    return Err(Error::DuplicateHomepage);
                }
            }
        }

        let saved = if doc.is_persisted() {
            self.store.update_page(doc).await?
        } else {
            self.store.insert_page(doc).await?
        };
        debug!(page = ?saved.id, slug = %saved.slug, version = saved.version, "saved page");
        Ok(saved)
    }

    /// Load the requested page, or resolve the organization's homepage,
    /// bootstrapping one when the organization has none.
    pub async fn ensure_page(
        &self,
        page_id: Option<&PageId>,
        organization: &OrganizationId,
        organization_name: &str,
    ) -> Result<PageDocument> {
        if let Some(page_id) = page_id {
            return self.load_by_id(page_id, organization).await;
        }

        if let Some(home) = self.load_homepage(organization).await? {
            return Ok(home);
        }

        debug!(organization = %organization, "no homepage found; creating default");
        self.create_default_homepage(organization, organization_name)
            .await
    }
}

/// Starter content for a bootstrapped homepage.
#[must_use]
pub fn default_homepage_content(organization_name: &str) -> PageContent {
    PageContent::from_blocks(vec![
        json!({
            "type": "Hero",
            "props": {
                "id": "hero-1",
                "title": format!("Welcome to {organization_name}"),
                "subtitle": "We're glad you're here."
            }
        }),
        json!({
            "type": "Text",
            "props": {
                "id": "text-1",
                "text": "Edit this page to tell visitors about your organization."
            }
        }),
    ])
}
