//! Collaborator contracts for the hosted backend.
//!
//! Persistence, auth and membership are owned by an external service. The
//! core only talks to it through these traits so the manager and editing
//! session can be driven by [`crate::memory::InMemoryBackend`] in tests and by
//! a network client in production.

use async_trait::async_trait;

use crate::Result;
use crate::types::{OrganizationId, PageDocument, PageId, Session, User, UserId};

/// Source of the current auth session.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current session, `None` when signed out.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Current user, `None` when signed out.
    async fn current_user(&self) -> Result<Option<User>>;
}

/// Organization membership and metadata lookups.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// Number of memberships `user` holds in `organization` (0 means no access).
    async fn membership_count(&self, organization: &OrganizationId, user: &UserId)
    -> Result<usize>;

    /// Organization to use when the caller did not name one.
    async fn primary_organization(&self, user: &UserId) -> Result<Option<OrganizationId>>;

    /// Display name of an organization.
    async fn organization_name(&self, organization: &OrganizationId) -> Result<Option<String>>;
}

/// Raw page records.
///
/// Implementations enforce the backend-owned invariants: one homepage per
/// organization, unique slug per organization, and a version bump on every
/// write. `update_page` must reject a document whose `version` is not the
/// stored one with [`crate::Error::Conflict`].
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Fetch a page by id regardless of organization.
    async fn fetch_page(&self, id: &PageId) -> Result<Option<PageDocument>>;

    /// Fetch a page by its slug within an organization.
    async fn find_by_slug(
        &self,
        organization: &OrganizationId,
        slug: &str,
    ) -> Result<Option<PageDocument>>;

    /// Fetch the organization's homepage.
    async fn find_homepage(&self, organization: &OrganizationId) -> Result<Option<PageDocument>>;

    /// Create a record; the backend assigns `id`, `version` and `updated_at`.
    async fn insert_page(&self, doc: PageDocument) -> Result<PageDocument>;

    /// Overwrite an existing record.
    async fn update_page(&self, doc: PageDocument) -> Result<PageDocument>;
}
