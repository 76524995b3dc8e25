//! # pagesmith-core
//!
//! Load/save orchestration for a drag-and-drop page builder.
//!
//! The crate sits between an editor UI and a hosted backend. It decides which
//! page the editor should open, survives flaky backends with bounded retries
//! and per-attempt deadlines, and keeps edits flowing back with a debounced,
//! conflict-aware auto-save.
//!
//! ## Architecture
//!
//! - **Slugs**: URL-safe slugs from titles, optionally made unique
//! - **Content**: Semantic equality of editor documents for dirty tracking
//! - **Gateway**: Organization-scoped page fetch/create/update with homepage bootstrap
//! - **Manager**: The `Idle → Loading → Ready | Error` load state machine
//! - **Session**: In-memory editing state with manual and automatic saves
//! - **Backend**: Traits for the hosted services plus an in-memory implementation
//! - **Error Handling**: Categorized errors and user-facing save errors
//!
//! ## Quick Start
//!
//! ```rust
//! use pagesmith_core::content::{PageContent, contents_equal};
//! use pagesmith_core::slug::{FALLBACK_SLUG, slugify};
//!
//! assert_eq!(slugify("Hello World!", false), "hello-world");
//! assert_eq!(slugify("!!!", false), FALLBACK_SLUG);
//!
//! let empty = PageContent::default();
//! let legacy = PageContent::from_value(serde_json::json!({ "content": null }));
//! assert!(contents_equal(Some(&empty), Some(&legacy)));
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use pagesmith_core::Error;
//!
//! let err = Error::Timeout("page load".into());
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "timeout");
//! ```

/// Service traits the manager and gateway depend on
pub mod backend;
/// Tunable retry, timeout, and auto-save settings
pub mod config;
/// Editor document model and semantic equality
pub mod content;
/// Error types and result aliases
pub mod error;
/// Page fetch/create/update with homepage bootstrap
pub mod gateway;
/// Load state machine
pub mod manager;
/// In-memory backend for tests, demos, and the CLI
pub mod memory;
/// Editing session with debounced auto-save
pub mod session;
/// Slug generation
pub mod slug;
/// Core data types
pub mod types;

// Re-export commonly used types
pub use config::{Config, ManagerConfig, SessionConfig};
pub use content::{PageContent, contents_equal};
pub use error::{Error, GatewayErrorKind, Result, SaveError};
pub use gateway::PageGateway;
pub use manager::{FailureKind, ManagerState, PageManager, Phase, SubscriptionId};
pub use session::{
    AutosaveOutcome, EditingSession, PageTarget, SaveStatus, SessionSnapshot, SkipReason,
};
pub use slug::slugify;
pub use types::*;
