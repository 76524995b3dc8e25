//! Error types and handling for pagesmith-core operations.
//!
//! Every fallible operation in the core returns [`Result<T, Error>`]. Errors are
//! categorized so the load state machine can decide whether a retry makes sense
//! and so the editing session can turn a failed save into a specific message.
//!
//! ## Error Categories
//!
//! - **Access errors**: no session, not a member of the organization
//! - **Validation errors**: empty title, malformed slug, duplicate slug or
//!   homepage, stale version
//! - **Infrastructure errors**: backend failures, timeouts
//! - **Configuration errors**: invalid or unreadable settings
//!
//! ## Recovery Hints
//!
//! ```rust
//! use pagesmith_core::Error;
//!
//! let transient = Error::Backend("connection reset".to_string());
//! assert!(transient.is_recoverable());
//!
//! let rejected = Error::DuplicateSlug { slug: "about".to_string() };
//! assert!(!rejected.is_recoverable());
//! ```

use thiserror::Error;

use crate::types::OrganizationId;

/// The main error type for pagesmith-core operations.
///
/// Variants mirror the failure classes a page load or save can hit. `Display`
/// gives a message suitable for logs; user-facing save messages live on
/// [`SaveError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No authenticated session is available.
    ///
    /// Retried by the load state machine like any other failure, but surfaced
    /// separately so the presentation layer can offer a sign-in action.
    #[error("Not authenticated: no active session")]
    Unauthenticated,

    /// The current user is not a member of the organization.
    #[error("No access to organization {organization}")]
    AccessDenied {
        /// Organization the caller asked for.
        organization: OrganizationId,
    },

    /// A page or organization could not be resolved.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another page in the organization already uses this slug.
    #[error("Slug '{slug}' is already used by another page")]
    DuplicateSlug {
        /// Slug that collided.
        slug: String,
    },

    /// Another page in the organization is already the homepage.
    #[error("Organization already has a homepage")]
    DuplicateHomepage,

    /// The document failed validation before it was written.
    ///
    /// ## Common Causes
    ///
    /// - Empty title
    /// - Slug not matching `^[a-z0-9]+(-[a-z0-9]+)*$`
    #[error("Validation error: {0}")]
    Validation(String),

    /// The stored record advanced since this copy was loaded.
    ///
    /// Raised when the version carried by an update does not match the stored
    /// version. Never retried automatically.
    #[error("Conflict: page was modified elsewhere (expected version {expected}, found {found})")]
    Conflict {
        /// Version the caller based its edit on.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// Operation exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The backend rejected or failed the request.
    ///
    /// Covers network errors and server-side failures; treated as transient.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config: {err}"))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Classification of a gateway failure, used to pick a save message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    /// Slug collides with another page in the organization.
    DuplicateSlug,
    /// A second homepage was requested.
    DuplicateHomepage,
    /// Document failed local or backend validation.
    ValidationError,
    /// The stored version advanced.
    Conflict,
    /// Requested record does not exist.
    NotFound,
    /// Caller lacks a session or membership.
    Unauthorized,
    /// Anything else coming back from the backend.
    BackendError,
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Deterministic rejections (validation, duplicates, conflicts) return
    /// `false`: retrying the same request cannot change the outcome.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Timeout(_))
    }

    /// Whether the failure is about who the caller is rather than what they sent.
    #[must_use]
    pub const fn is_access_failure(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::AccessDenied { .. })
    }

    /// Classify the error for save-message selection.
    #[must_use]
    pub const fn kind(&self) -> GatewayErrorKind {
        match self {
            Self::DuplicateSlug { .. } => GatewayErrorKind::DuplicateSlug,
            Self::DuplicateHomepage => GatewayErrorKind::DuplicateHomepage,
            Self::Validation(_) => GatewayErrorKind::ValidationError,
            Self::Conflict { .. } => GatewayErrorKind::Conflict,
            Self::NotFound(_) => GatewayErrorKind::NotFound,
            Self::Unauthenticated | Self::AccessDenied { .. } => GatewayErrorKind::Unauthorized,
            Self::Timeout(_) | Self::Backend(_) | Self::Config(_) | Self::Serialization(_) => {
                GatewayErrorKind::BackendError
            },
        }
    }

    /// Get the error category as a string identifier for structured logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AccessDenied { .. } => "access_denied",
            Self::NotFound(_) => "not_found",
            Self::DuplicateSlug { .. } => "duplicate_slug",
            Self::DuplicateHomepage => "duplicate_homepage",
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::Timeout(_) => "timeout",
            Self::Backend(_) => "backend",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a manual save did not go through, phrased for the person who asked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    /// Another save is still in flight.
    #[error("A save is already in progress. Please try again in a moment.")]
    Busy,
    /// The session has no organization to save into.
    #[error("Cannot save: no organization selected.")]
    MissingOrganization,
    /// Title is empty or whitespace.
    #[error("Please enter a page title before saving.")]
    EmptyTitle,
    /// Slug collides with another page.
    #[error("The URL '{slug}' is already used by another page. Choose a different slug.")]
    DuplicateSlug {
        /// Slug that collided.
        slug: String,
    },
    /// The organization already has a homepage.
    #[error("Another page is already set as the homepage. Unset it first.")]
    DuplicateHomepage,
    /// Someone else saved this page in the meantime.
    #[error("This page was changed elsewhere. Reload it before saving again.")]
    Conflict,
    /// Generic validation failure.
    #[error("The page could not be saved: {0}")]
    Validation(String),
    /// Backend or network failure.
    #[error("Saving failed. Check your connection and try again.")]
    Backend(String),
}

impl SaveError {
    /// Map a gateway failure onto the message shown to the user.
    #[must_use]
    pub fn from_gateway(err: &Error) -> Self {
        match (err.kind(), err) {
            (GatewayErrorKind::DuplicateSlug, Error::DuplicateSlug { slug }) => {
                Self::DuplicateSlug { slug: slug.clone() }
            },
            (GatewayErrorKind::DuplicateHomepage, _) => Self::DuplicateHomepage,
            (GatewayErrorKind::Conflict, _) => Self::Conflict,
            (GatewayErrorKind::ValidationError, Error::Validation(msg)) => {
                Self::Validation(msg.clone())
            },
            _ => Self::Backend(err.to_string()),
        }
    }

    /// User-facing message.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
