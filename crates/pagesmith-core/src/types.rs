//! Core data types shared by the gateway, manager and editing session.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::PageContent;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the string representation.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Backend identifier of a stored page.
    PageId
);
string_id!(
    /// Owning tenant of a page.
    OrganizationId
);
string_id!(
    /// Authenticated user.
    UserId
);

/// Authenticated user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Login email, if known.
    #[serde(default)]
    pub email: Option<String>,
}

/// Active auth session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Signed-in user.
    pub user: User,
    /// When the session stops being valid.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether the session is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// The unit of persistence: one page of an organization's site.
///
/// `id == None` means the page has not been created yet. `version` is 0 for
/// unsaved pages and bumped by the backend on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDocument {
    /// Backend identifier; absent until first save.
    #[serde(default)]
    pub id: Option<PageId>,
    /// Display title.
    pub title: String,
    /// URL path segment, unique within the organization.
    pub slug: String,
    /// Page builder content, opaque to this crate.
    #[serde(default)]
    pub content: PageContent,
    /// Owning tenant.
    pub organization_id: OrganizationId,
    /// Visible to site visitors.
    #[serde(default)]
    pub published: bool,
    /// Default landing page of the organization.
    #[serde(default)]
    pub is_homepage: bool,
    /// Listed in the site navigation.
    #[serde(default = "default_true")]
    pub show_in_navigation: bool,
    /// Optimistic concurrency token.
    #[serde(default)]
    pub version: u64,
    /// Last write time as recorded by the backend.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

const fn default_true() -> bool {
    true
}

impl PageDocument {
    /// Create an unsaved document.
    pub fn new(
        organization_id: OrganizationId,
        title: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            slug: slug.into(),
            content: PageContent::default(),
            organization_id,
            published: false,
            is_homepage: false,
            show_in_navigation: true,
            version: 0,
            updated_at: None,
        }
    }

    /// Whether the document already exists in the backend.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Set the content using builder pattern.
    #[must_use]
    pub fn with_content(mut self, content: PageContent) -> Self {
        self.content = content;
        self
    }

    /// Set the published flag using builder pattern.
    #[must_use]
    pub const fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    /// Set the homepage flag using builder pattern.
    #[must_use]
    pub const fn with_homepage(mut self, is_homepage: bool) -> Self {
        self.is_homepage = is_homepage;
        self
    }
}

/// The fields that decide whether a session has unsaved work.
///
/// Captured at every successful commit and compared against the live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSnapshot {
    /// Title at last commit.
    pub title: String,
    /// Content at last commit.
    pub content: PageContent,
    /// Published flag at last commit.
    pub published: bool,
    /// Homepage flag at last commit.
    pub is_homepage: bool,
}

impl SavedSnapshot {
    /// Capture the dirty-relevant fields of a document.
    #[must_use]
    pub fn of(doc: &PageDocument) -> Self {
        Self {
            title: doc.title.clone(),
            content: doc.content.clone(),
            published: doc.published,
            is_homepage: doc.is_homepage,
        }
    }
}
