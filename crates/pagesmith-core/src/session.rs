//! Live editing session for one page.
//!
//! [`EditingSession`] owns the in-memory copy of a page while it is being
//! edited. Every mutation recomputes the dirty flag against the snapshot of
//! the last successful commit; while the session is dirty, a background task
//! debounces edits and auto-saves once the user pauses.
//!
//! ## Save Pipeline
//!
//! 1. Check organization and title (auto-save skips silently).
//! 2. Auto-save only: re-check dirtiness right before sending, so a manual
//!    save that landed while the debounce timer was pending is not repeated.
//! 3. Refuse to overlap with a save already in flight.
//! 4. Brand-new pages with an auto-derived slug get a fresh unique slug.
//! 5. On success adopt the stored id/slug/version and move the baseline. A
//!    slug edited by hand while the save was in flight is kept and stays
//!    dirty until the next save writes it.
//! 6. On failure keep the session dirty; manual saves get a [`SaveError`],
//!    auto-saves are only logged.
//!
//! All constructors spawn the auto-save task and must be called from within
//! a Tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::content::{PageContent, contents_equal};
use crate::error::SaveError;
use crate::gateway::PageGateway;
use crate::slug::slugify;
use crate::types::{OrganizationId, PageDocument, PageId, SavedSnapshot};
use crate::{Error, Result};

/// Visible progress of the most recent save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveStatus {
    /// Nothing to report.
    #[default]
    Idle,
    /// A save is in flight.
    Saving,
    /// The last save succeeded.
    Saved,
    /// The last save failed.
    Error,
}

/// What a session should edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTarget {
    /// A page that already exists in the backend.
    Existing(PageId),
    /// A page that only exists in memory until first save.
    New {
        /// Opened from the organization's root context rather than a
        /// specific page list.
        root_context: bool,
    },
}

/// Result of an auto-save attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveOutcome {
    /// The page was written.
    Saved(PageDocument),
    /// Nothing was sent.
    Skipped(SkipReason),
    /// The write failed; the session stays dirty.
    Failed(Error),
}

/// Why an auto-save did not send anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Current state matches the last commit.
    NotDirty,
    /// Another save is in flight.
    InFlight,
    /// No organization to save into.
    MissingOrganization,
    /// Title is empty.
    EmptyTitle,
}

/// Read-only view of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Backend id, once saved.
    pub page_id: Option<PageId>,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Title being edited.
    pub page_title: String,
    /// Slug being edited.
    pub page_slug: String,
    /// Content being edited.
    pub page_content: PageContent,
    /// Published flag.
    pub is_published: bool,
    /// Homepage flag.
    pub is_homepage: bool,
    /// Navigation flag.
    pub show_in_navigation: bool,
    /// Unsaved changes exist.
    pub is_dirty: bool,
    /// Save progress.
    pub save_status: SaveStatus,
    /// When the last save succeeded.
    pub last_save_time: Option<DateTime<Utc>>,
    /// Stored version this session is based on.
    pub version: u64,
}

#[derive(Debug)]
struct State {
    doc: PageDocument,
    last_saved: SavedSnapshot,
    slug_auto: bool,
    /// A hand-edited slug arrived while a save was in flight and has not
    /// been written yet.
    slug_unsaved: bool,
    is_dirty: bool,
    save_status: SaveStatus,
    status_epoch: u64,
    last_save_time: Option<DateTime<Utc>>,
}

impl State {
    fn recompute_dirty(&mut self) -> bool {
        let saved = &self.last_saved;
        let unchanged = self.doc.title == saved.title
            && self.doc.published == saved.published
            && self.doc.is_homepage == saved.is_homepage
            && contents_equal(Some(&self.doc.content), Some(&saved.content));
        self.is_dirty = !unchanged || self.slug_unsaved;
        self.is_dirty
    }
}

#[derive(Debug)]
struct Shared {
    gateway: PageGateway,
    config: SessionConfig,
    state: Mutex<State>,
    in_flight: AtomicBool,
    edits: watch::Sender<u64>,
}

/// Clears the in-flight flag even if the save future is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Mode {
    Manual,
    Auto,
}

enum CommitError {
    Skipped(SkipReason),
    Rejected(SaveError),
    Failed(Error),
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply an edit and arm the auto-save timer if it left the page dirty.
    fn edit(&self, f: impl FnOnce(&mut State)) {
        let dirty = {
            let mut state = self.lock();
            f(&mut state);
            state.recompute_dirty()
        };
        if dirty {
            self.arm_autosave();
        }
    }

    fn arm_autosave(&self) {
        self.edits.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn set_status(self: &Arc<Self>, status: SaveStatus) {
        let epoch = {
            let mut state = self.lock();
            state.save_status = status;
            state.status_epoch += 1;
            state.status_epoch
        };
        if matches!(status, SaveStatus::Saved | SaveStatus::Error) {
            let weak = Arc::downgrade(self);
            let display = self.config.saved_display;
            tokio::spawn(reset_status_later(weak, epoch, display));
        }
    }

    async fn commit(
        self: &Arc<Self>,
        mode: Mode,
    ) -> std::result::Result<PageDocument, CommitError> {
        let manual = matches!(mode, Mode::Manual);
        let (doc, sent, local_slug) = {
            let state = self.lock();
            if state.doc.organization_id.as_str().is_empty() {
                return Err(if manual {
                    CommitError::Rejected(SaveError::MissingOrganization)
                } else {
                    CommitError::Skipped(SkipReason::MissingOrganization)
                });
            }
            if state.doc.title.trim().is_empty() {
                return Err(if manual {
                    CommitError::Rejected(SaveError::EmptyTitle)
                } else {
                    CommitError::Skipped(SkipReason::EmptyTitle)
                });
            }
            if !manual && !state.is_dirty {
                return Err(CommitError::Skipped(SkipReason::NotDirty));
            }
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(if manual {
                    CommitError::Rejected(SaveError::Busy)
                } else {
                    CommitError::Skipped(SkipReason::InFlight)
                });
            }

            let mut doc = state.doc.clone();
            if !doc.is_persisted() && state.slug_auto {
                doc.slug = slugify(&doc.title, true);
            }
            let sent = SavedSnapshot::of(&doc);
            (doc, sent, state.doc.slug.clone())
        };
        let guard = InFlightGuard(&self.in_flight);
        self.set_status(SaveStatus::Saving);

        match self.gateway.save(doc).await {
            Ok(saved) => {
                let still_dirty = {
                    let mut state = self.lock();
                    state.doc.id.clone_from(&saved.id);
                    state.doc.version = saved.version;
                    state.doc.updated_at = saved.updated_at;
                    if !state.slug_auto && state.doc.slug != local_slug {
                        // Typed while the save was in flight; the next save sends it.
                        debug!(slug = %state.doc.slug, "keeping slug edited during save");
                        state.slug_unsaved = true;
                    } else {
                        state.doc.slug.clone_from(&saved.slug);
                        state.slug_auto = false;
                        state.slug_unsaved = false;
                    }
                    state.last_saved = sent;
                    state.last_save_time = Some(Utc::now());
                    state.recompute_dirty()
                };
                self.set_status(SaveStatus::Saved);
                info!(
                    page = ?saved.id,
                    slug = %saved.slug,
                    version = saved.version,
                    autosave = !manual,
                    "page saved"
                );
                drop(guard);
                if still_dirty {
                    self.arm_autosave();
                }
                Ok(saved)
            },
            Err(err) => {
                self.set_status(SaveStatus::Error);
                if manual {
                    warn!(category = err.category(), error = %err, "save failed");
                    Err(CommitError::Rejected(SaveError::from_gateway(&err)))
                } else {
                    warn!(category = err.category(), error = %err, "auto-save failed");
                    Err(CommitError::Failed(err))
                }
            },
        }
    }

    async fn autosave(self: &Arc<Self>) -> AutosaveOutcome {
        match self.commit(Mode::Auto).await {
            Ok(doc) => AutosaveOutcome::Saved(doc),
            Err(CommitError::Skipped(reason)) => {
                debug!(?reason, "auto-save skipped");
                AutosaveOutcome::Skipped(reason)
            },
            Err(CommitError::Failed(err)) => AutosaveOutcome::Failed(err),
            Err(CommitError::Rejected(err)) => {
                AutosaveOutcome::Failed(Error::Validation(err.user_message()))
            },
        }
    }
}

async fn reset_status_later(shared: Weak<Shared>, epoch: u64, after: std::time::Duration) {
    tokio::time::sleep(after).await;
    if let Some(shared) = shared.upgrade() {
        let mut state = shared.lock();
        if state.status_epoch == epoch {
            state.save_status = SaveStatus::Idle;
        }
    }
}

async fn autosave_loop(
    shared: Arc<Shared>,
    mut edits: watch::Receiver<u64>,
    delay: std::time::Duration,
) {
    loop {
        if edits.changed().await.is_err() {
            return;
        }
        // Every further edit restarts the inactivity window.
        loop {
            tokio::select! {
                changed = edits.changed() => {
                    if changed.is_err() {
                        return;
                    }
                },
                () = tokio::time::sleep(delay) => break,
            }
        }
        shared.autosave().await;
    }
}

/// Editing state of one page plus its auto-save loop.
///
/// Dropping the session stops auto-saving; an in-flight save is not aborted.
#[derive(Debug)]
pub struct EditingSession {
    shared: Arc<Shared>,
    autosave: JoinHandle<()>,
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        self.autosave.abort();
    }
}

impl EditingSession {
    /// Open a session for an existing page or a new in-memory one.
    pub async fn open(
        gateway: PageGateway,
        config: SessionConfig,
        organization: OrganizationId,
        target: PageTarget,
    ) -> Result<Self> {
        match target {
            PageTarget::Existing(page_id) => {
                let doc = gateway.load_by_id(&page_id, &organization).await?;
                Ok(Self::from_document(gateway, config, doc))
            },
            PageTarget::New { root_context } => Ok(Self::new_page(
                gateway,
                config,
                organization,
                root_context,
            )),
        }
    }

    /// Edit a document that was already loaded, e.g. by [`crate::PageManager`].
    #[must_use]
    pub fn from_document(gateway: PageGateway, config: SessionConfig, doc: PageDocument) -> Self {
        let slug_auto = !doc.is_persisted() && doc.slug.is_empty();
        Self::start(gateway, config, doc, slug_auto)
    }

    /// Edit a page that does not exist yet. It is not dirty until changed.
    #[must_use]
    pub fn new_page(
        gateway: PageGateway,
        config: SessionConfig,
        organization: OrganizationId,
        root_context: bool,
    ) -> Self {
        let title = config.new_page_title.clone();
        let slug = slugify(&title, true);
        let is_homepage = root_context && config.auto_homepage_on_root_context;
        let doc = PageDocument::new(organization, title, slug).with_homepage(is_homepage);
        debug!(slug = %doc.slug, is_homepage, "started new page");
        Self::start(gateway, config, doc, true)
    }

    fn start(
        gateway: PageGateway,
        config: SessionConfig,
        doc: PageDocument,
        slug_auto: bool,
    ) -> Self {
        let (edits, rx) = watch::channel(0);
        let delay = config.autosave_delay;
        let shared = Arc::new(Shared {
            gateway,
            config,
            state: Mutex::new(State {
                last_saved: SavedSnapshot::of(&doc),
                doc,
                slug_auto,
                slug_unsaved: false,
                is_dirty: false,
                save_status: SaveStatus::Idle,
                status_epoch: 0,
                last_save_time: None,
            }),
            in_flight: AtomicBool::new(false),
            edits,
        });
        let autosave = tokio::spawn(autosave_loop(Arc::clone(&shared), rx, delay));
        Self { shared, autosave }
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.lock();
        SessionSnapshot {
            page_id: state.doc.id.clone(),
            organization_id: state.doc.organization_id.clone(),
            page_title: state.doc.title.clone(),
            page_slug: state.doc.slug.clone(),
            page_content: state.doc.content.clone(),
            is_published: state.doc.published,
            is_homepage: state.doc.is_homepage,
            show_in_navigation: state.doc.show_in_navigation,
            is_dirty: state.is_dirty,
            save_status: state.save_status,
            last_save_time: state.last_save_time,
            version: state.doc.version,
        }
    }

    /// Whether unsaved changes exist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared.lock().is_dirty
    }

    /// Progress of the most recent save.
    #[must_use]
    pub fn save_status(&self) -> SaveStatus {
        self.shared.lock().save_status
    }

    /// Change the title; re-derives the slug unless it was edited by hand.
    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.shared.edit(|state| {
            if state.slug_auto || state.doc.slug.is_empty() {
                state.doc.slug = slugify(&title, false);
                state.slug_auto = true;
            }
            state.doc.title = title;
        });
    }

    /// Set the slug by hand. An empty slug re-enables derivation from the title.
    pub fn set_slug(&self, slug: impl Into<String>) {
        let slug = slug.into();
        self.shared.edit(|state| {
            state.slug_auto = slug.is_empty();
            state.doc.slug = slug;
        });
    }

    /// Replace the page content.
    pub fn set_content(&self, content: PageContent) {
        self.shared.edit(|state| state.doc.content = content);
    }

    /// Flip the homepage flag.
    pub fn toggle_homepage(&self) {
        self.shared
            .edit(|state| state.doc.is_homepage = !state.doc.is_homepage);
    }

    /// Flip the published flag.
    pub fn toggle_published(&self) {
        self.shared
            .edit(|state| state.doc.published = !state.doc.published);
    }

    /// Show or hide the page in site navigation.
    pub fn set_show_in_navigation(&self, show: bool) {
        self.shared.edit(|state| state.doc.show_in_navigation = show);
    }

    /// Save now, on behalf of the user.
    pub async fn save(&self) -> std::result::Result<PageDocument, SaveError> {
        match self.shared.commit(Mode::Manual).await {
            Ok(doc) => Ok(doc),
            Err(CommitError::Rejected(err)) => Err(err),
            Err(CommitError::Failed(err)) => Err(SaveError::from_gateway(&err)),
            Err(CommitError::Skipped(reason)) => Err(SaveError::Validation(format!("{reason:?}"))),
        }
    }

    /// Save only if dirty, as the timer would. Errors are logged, not raised.
    pub async fn autosave(&self) -> AutosaveOutcome {
        self.shared.autosave().await
    }

    /// Save if there are unsaved changes; `None` when there were none.
    pub async fn flush(&self) -> std::result::Result<Option<PageDocument>, SaveError> {
        if self.is_dirty() {
            self.save().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Stop auto-saving and release the session.
    pub fn shutdown(self) {
        drop(self);
    }
}
