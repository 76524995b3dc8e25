//! In-process backend.
//!
//! [`InMemoryBackend`] implements every collaborator trait over a single
//! mutex-guarded [`BackendFixture`]. The CLI loads it from a JSON file; tests
//! build it directly. It enforces the same write invariants as the hosted
//! backend so gateway and session behavior can be exercised end to end.
//!
//! ## Fixture Format
//!
//! ```json
//! {
//!   "session": { "user": { "id": "u1", "email": "pastor@example.org" } },
//!   "organizations": [ { "id": "grace", "name": "Grace Community Church" } ],
//!   "memberships": [ { "organizationId": "grace", "userId": "u1" } ],
//!   "pages": []
//! }
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{AuthProvider, MembershipDirectory, PageStore};
use crate::types::{OrganizationId, PageDocument, PageId, Session, User, UserId};
use crate::{Error, Result};

/// Organization row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRecord {
    /// Organization id.
    pub id: OrganizationId,
    /// Display name.
    pub name: String,
}

/// Membership row linking a user to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// Organization the user belongs to.
    pub organization_id: OrganizationId,
    /// Member.
    pub user_id: UserId,
}

/// Serializable backend contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendFixture {
    /// Signed-in session, if any.
    #[serde(default)]
    pub session: Option<Session>,
    /// Known organizations.
    #[serde(default)]
    pub organizations: Vec<OrganizationRecord>,
    /// Membership rows.
    #[serde(default)]
    pub memberships: Vec<Membership>,
    /// Stored pages.
    #[serde(default)]
    pub pages: Vec<PageDocument>,
}

impl BackendFixture {
    /// Read a fixture from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Backend(format!("Failed to read fixture {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the fixture as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|e| {
            Error::Backend(format!("Failed to write fixture {}: {e}", path.display()))
        })
    }
}

/// Backend kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<BackendFixture>,
}

impl InMemoryBackend {
    /// Empty backend with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend seeded from a fixture.
    #[must_use]
    pub fn from_fixture(fixture: BackendFixture) -> Self {
        Self {
            state: Mutex::new(fixture),
        }
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn to_fixture(&self) -> BackendFixture {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BackendFixture> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session for `user`.
    pub fn sign_in(&self, user: User) {
        self.lock().session = Some(Session {
            user,
            expires_at: None,
        });
    }

    /// End the current session.
    pub fn sign_out(&self) {
        self.lock().session = None;
    }

    /// Register an organization.
    pub fn add_organization(&self, id: OrganizationId, name: impl Into<String>) {
        self.lock().organizations.push(OrganizationRecord {
            id,
            name: name.into(),
        });
    }

    /// Add `user` as a member of `organization`.
    pub fn add_member(&self, organization: OrganizationId, user: UserId) {
        self.lock().memberships.push(Membership {
            organization_id: organization,
            user_id: user,
        });
    }

    /// All pages of an organization, in insertion order.
    #[must_use]
    pub fn pages_of(&self, organization: &OrganizationId) -> Vec<PageDocument> {
        self.lock()
            .pages
            .iter()
            .filter(|p| &p.organization_id == organization)
            .cloned()
            .collect()
    }

    fn check_uniqueness(state: &BackendFixture, doc: &PageDocument) -> Result<()> {
        let others = state
            .pages
            .iter()
            .filter(|p| p.organization_id == doc.organization_id && p.id != doc.id);

        for other in others {
            if other.slug == doc.slug {
                return Err(Error::DuplicateSlug {
                    slug: doc.slug.clone(),
                });
            }
            if doc.is_homepage && other.is_homepage {
                return Err(Error::DuplicateHomepage);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>> {
        let state = self.lock();
        Ok(state
            .session
            .clone()
            .filter(|s| !s.is_expired_at(Utc::now())))
    }

    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.current_session().await?.map(|s| s.user))
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryBackend {
    async fn membership_count(
        &self,
        organization: &OrganizationId,
        user: &UserId,
    ) -> Result<usize> {
        Ok(self
            .lock()
            .memberships
            .iter()
            .filter(|m| &m.organization_id == organization && &m.user_id == user)
            .count())
    }

    async fn primary_organization(&self, user: &UserId) -> Result<Option<OrganizationId>> {
        Ok(self
            .lock()
            .memberships
            .iter()
            .find(|m| &m.user_id == user)
            .map(|m| m.organization_id.clone()))
    }

    async fn organization_name(&self, organization: &OrganizationId) -> Result<Option<String>> {
        Ok(self
            .lock()
            .organizations
            .iter()
            .find(|o| &o.id == organization)
            .map(|o| o.name.clone()))
    }
}

#[async_trait]
impl PageStore for InMemoryBackend {
    async fn fetch_page(&self, id: &PageId) -> Result<Option<PageDocument>> {
        Ok(self
            .lock()
            .pages
            .iter()
            .find(|p| p.id.as_ref() == Some(id))
            .cloned())
    }

    async fn find_by_slug(
        &self,
        organization: &OrganizationId,
        slug: &str,
    ) -> Result<Option<PageDocument>> {
        Ok(self
            .lock()
            .pages
            .iter()
            .find(|p| &p.organization_id == organization && p.slug == slug)
            .cloned())
    }

    async fn find_homepage(&self, organization: &OrganizationId) -> Result<Option<PageDocument>> {
        Ok(self
            .lock()
            .pages
            .iter()
            .find(|p| &p.organization_id == organization && p.is_homepage)
            .cloned())
    }

    async fn insert_page(&self, mut doc: PageDocument) -> Result<PageDocument> {
        let mut state = self.lock();
        doc.id = Some(PageId::new(uuid::Uuid::new_v4().to_string()));
        Self::check_uniqueness(&state, &doc)?;

        doc.version = 1;
        doc.updated_at = Some(Utc::now());
        debug!(page = ?doc.id, slug = %doc.slug, "inserted page");
        state.pages.push(doc.clone());
        Ok(doc)
    }

    async fn update_page(&self, mut doc: PageDocument) -> Result<PageDocument> {
        let mut state = self.lock();
        let id = doc
            .id
            .clone()
            .ok_or_else(|| Error::Validation("cannot update a page without an id".into()))?;

        let index = state
            .pages
            .iter()
            .position(|p| p.id.as_ref() == Some(&id))
            .ok_or_else(|| Error::NotFound(format!("page {id}")))?;

        let stored_version = state.pages[index].version;
        if stored_version != doc.version {
            return Err(Error::Conflict {
                expected: doc.version,
                found: stored_version,
            });
        }
        Self::check_uniqueness(&state, &doc)?;

        doc.version = stored_version + 1;
        doc.updated_at = Some(Utc::now());
        debug!(page = %id, version = doc.version, "updated page");
        state.pages[index] = doc.clone();
        Ok(doc)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn org() -> OrganizationId {
        OrganizationId::new("grace")
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_version() {
        let backend = InMemoryBackend::new();
        let saved = backend
            .insert_page(PageDocument::new(org(), "About", "about"))
            .await
            .unwrap();

        assert!(saved.id.is_some());
        assert_eq!(saved.version, 1);
        assert!(saved.updated_at.is_some());
        assert_eq!(backend.pages_of(&org()).len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let backend = InMemoryBackend::new();
        backend
            .insert_page(PageDocument::new(org(), "About", "about"))
            .await
            .unwrap();

        let err = backend
            .insert_page(PageDocument::new(org(), "About again", "about"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateSlug {
                slug: "about".into()
            }
        );

        // Same slug in another organization is fine.
        backend
            .insert_page(PageDocument::new(OrganizationId::new("other"), "About", "about"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_homepage_rejected() {
        let backend = InMemoryBackend::new();
        backend
            .insert_page(PageDocument::new(org(), "Home", "home").with_homepage(true))
            .await
            .unwrap();

        let err = backend
            .insert_page(PageDocument::new(org(), "Welcome", "welcome").with_homepage(true))
            .await
            .unwrap_err();
        assert_eq!(err, Error::DuplicateHomepage);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let backend = InMemoryBackend::new();
        let saved = backend
            .insert_page(PageDocument::new(org(), "About", "about"))
            .await
            .unwrap();

        let mut first = saved.clone();
        first.title = "About us".into();
        let updated = backend.update_page(first).await.unwrap();
        assert_eq!(updated.version, 2);

        let mut stale = saved;
        stale.title = "Stale".into();
        let err = backend.update_page(stale).await.unwrap_err();
        assert_eq!(
            err,
            Error::Conflict {
                expected: 1,
                found: 2
            }
        );
    }

    #[tokio::test]
    async fn test_update_keeps_own_slug_and_homepage() {
        let backend = InMemoryBackend::new();
        let mut home = backend
            .insert_page(PageDocument::new(org(), "Home", "home").with_homepage(true))
            .await
            .unwrap();

        home.title = "Home sweet home".into();
        let updated = backend.update_page(home).await.unwrap();
        assert_eq!(updated.title, "Home sweet home");
    }

    #[tokio::test]
    async fn test_membership_and_session() {
        let backend = InMemoryBackend::new();
        assert!(backend.current_session().await.unwrap().is_none());

        backend.sign_in(User {
            id: UserId::new("u1"),
            email: None,
        });
        backend.add_organization(org(), "Grace Community Church");
        backend.add_member(org(), UserId::new("u1"));

        assert_eq!(
            backend.current_user().await.unwrap().map(|u| u.id),
            Some(UserId::new("u1"))
        );
        assert_eq!(
            backend
                .membership_count(&org(), &UserId::new("u1"))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            backend
                .primary_organization(&UserId::new("u1"))
                .await
                .unwrap(),
            Some(org())
        );
        assert_eq!(
            backend.organization_name(&org()).await.unwrap().as_deref(),
            Some("Grace Community Church")
        );
    }

    #[test]
    fn test_fixture_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.json");

        let backend = InMemoryBackend::new();
        backend.add_organization(org(), "Grace");
        backend.to_fixture().save(&path).unwrap();

        let loaded = BackendFixture::load(&path).unwrap();
        assert_eq!(loaded.organizations.len(), 1);
        assert_eq!(loaded.organizations[0].name, "Grace");
    }
}
