//! Load state machine for the page builder.
//!
//! [`PageManager`] resolves the organization, checks the session and
//! membership, then loads (or bootstraps) the page. Each attempt runs under a
//! deadline; failed attempts are retried with linear backoff.
//!
//! ## States
//!
//! ```text
//! Idle ──initialize_page──▶ Loading ──ok──▶ Ready ⟲ editor_ready
//!                             │  ▲
//!                   error,    │  │ retry_delay × n
//!                   retries   ▼  │
//!                   left     (backoff)
//!                             │
//!              exhausted /    ▼
//!              timed out ──▶ Error
//! ```
//!
//! Every transition publishes a full [`ManagerState`] snapshot to all
//! subscribers. [`PageManager::reset`] and a new
//! [`PageManager::initialize_page`] supersede any attempt still in flight. A
//! superseded or timed-out attempt may still finish in the background, but
//! its result is discarded and nothing it observes is published.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pagesmith_core::memory::InMemoryBackend;
//! use pagesmith_core::{ManagerConfig, OrganizationId, PageManager, Phase, User, UserId};
//!
//! # tokio_test_block_on(async {
//! let backend = Arc::new(InMemoryBackend::new());
//! backend.sign_in(User { id: UserId::new("u1"), email: None });
//! backend.add_organization(OrganizationId::new("grace"), "Grace");
//! backend.add_member(OrganizationId::new("grace"), UserId::new("u1"));
//!
//! let manager = PageManager::with_backend(backend, ManagerConfig::default());
//! let state = manager
//!     .initialize_page(None, Some(OrganizationId::new("grace")))
//!     .await;
//! assert_eq!(state.phase, Phase::Ready);
//! assert!(state.page_data.is_some_and(|page| page.is_homepage));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backend::{AuthProvider, MembershipDirectory, PageStore};
use crate::config::ManagerConfig;
use crate::gateway::PageGateway;
use crate::types::{OrganizationId, PageDocument, PageId};
use crate::{Error, Result};

/// Coarse lifecycle position of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Nothing requested yet, or reset.
    #[default]
    Idle,
    /// An initialization is running.
    Loading,
    /// Page data is available.
    Ready,
    /// Initialization gave up.
    Error,
}

/// Why the manager ended in [`Phase::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Retries exhausted without a session; offer sign-in.
    Unauthenticated,
    /// Retries exhausted without membership in the organization.
    AccessDenied,
    /// An attempt exceeded the deadline.
    TimedOut,
    /// Retries exhausted on any other failure.
    Exhausted,
}

impl FailureKind {
    /// Classify the error that ended an initialization.
    #[must_use]
    pub const fn of(err: &Error) -> Self {
        match err {
            Error::Timeout(_) => Self::TimedOut,
            Error::Unauthenticated => Self::Unauthenticated,
            err if err.is_access_failure() => Self::AccessDenied,
            _ => Self::Exhausted,
        }
    }
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerState {
    /// Lifecycle position.
    pub phase: Phase,
    /// `true` while [`Phase::Loading`].
    pub is_loading: bool,
    /// `None` until the session has been checked.
    pub is_authenticated: Option<bool>,
    /// Organization the page belongs to, once resolved.
    pub organization_id: Option<OrganizationId>,
    /// Loaded page.
    pub page_data: Option<PageDocument>,
    /// Human-readable failure.
    pub error: Option<String>,
    /// Failure class, set together with `error`.
    pub failure: Option<FailureKind>,
    /// The visual editor has mounted and accepts input.
    pub is_editor_ready: bool,
    /// Retries consumed by the current initialization.
    pub retry_count: u32,
}

/// Subscriber callback.
pub type Listener = Arc<dyn Fn(&ManagerState) + Send + Sync>;

/// Handle returned by [`PageManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Request = (Option<PageId>, Option<OrganizationId>);

struct Inner {
    state: ManagerState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    generation: u64,
    last_request: Option<Request>,
}

struct Shared {
    inner: Mutex<Inner>,
    generation_tx: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` if `generation` is still current, then publish.
    ///
    /// Returns `false` when the caller has been superseded.
    fn transition(&self, generation: u64, f: impl FnOnce(&mut ManagerState)) -> bool {
        let (snapshot, listeners) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return false;
            }
            f(&mut inner.state);
            (inner.state.clone(), listeners_of(&inner))
        };
        notify(&listeners, &snapshot);
        true
    }

    /// Start a new generation, invalidating everything still running.
    fn advance(&self, f: impl FnOnce(&mut Inner)) -> u64 {
        let (generation, snapshot, listeners) = {
            let mut inner = self.lock();
            inner.generation += 1;
            f(&mut inner);
            (inner.generation, inner.state.clone(), listeners_of(&inner))
        };
        self.generation_tx.send_replace(generation);
        notify(&listeners, &snapshot);
        generation
    }

    /// Apply a final `f` for `generation` and retire it, so a task still
    /// running under that generation can no longer publish.
    fn retire(&self, generation: u64, f: impl FnOnce(&mut ManagerState)) -> bool {
        let (next, snapshot, listeners) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return false;
            }
            inner.generation += 1;
            f(&mut inner.state);
            (inner.generation, inner.state.clone(), listeners_of(&inner))
        };
        self.generation_tx.send_replace(next);
        notify(&listeners, &snapshot);
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }
}

fn listeners_of(inner: &Inner) -> Vec<Listener> {
    inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
}

fn notify(listeners: &[Listener], snapshot: &ManagerState) {
    for listener in listeners {
        listener(snapshot);
    }
}

/// Collaborators an attempt needs; cloned into the spawned task.
#[derive(Clone)]
struct Deps {
    auth: Arc<dyn AuthProvider>,
    directory: Arc<dyn MembershipDirectory>,
    gateway: PageGateway,
}

/// Orchestrates authentication, access checks and page loading.
pub struct PageManager {
    deps: Deps,
    config: ManagerConfig,
    shared: Arc<Shared>,
    run_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for PageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageManager")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PageManager {
    /// Create a manager over explicit collaborators.
    #[must_use]
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        directory: Arc<dyn MembershipDirectory>,
        gateway: PageGateway,
        config: ManagerConfig,
    ) -> Self {
        let (generation_tx, _) = watch::channel(0);
        Self {
            deps: Deps {
                auth,
                directory,
                gateway,
            },
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ManagerState::default(),
                    listeners: Vec::new(),
                    next_subscription: 0,
                    generation: 0,
                    last_request: None,
                }),
                generation_tx,
            }),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a manager whose collaborators are all served by one backend.
    #[must_use]
    pub fn with_backend<B>(backend: Arc<B>, config: ManagerConfig) -> Self
    where
        B: AuthProvider + MembershipDirectory + PageStore + 'static,
    {
        let gateway = PageGateway::new(backend.clone());
        Self::new(backend.clone(), backend, gateway, config)
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.shared.lock().state.clone()
    }

    /// Gateway used for loads; shared with editing sessions.
    #[must_use]
    pub const fn gateway(&self) -> &PageGateway {
        &self.deps.gateway
    }

    /// Register a listener called with every published snapshot.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ManagerState) + Send + Sync + 'static,
    {
        let mut inner = self.shared.lock();
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.shared.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(sub, _)| *sub != id);
        inner.listeners.len() != before
    }

    /// Mark the visual editor as mounted. Ignored unless the page is loaded.
    pub fn set_editor_ready(&self, ready: bool) -> bool {
        let (snapshot, listeners) = {
            let mut inner = self.shared.lock();
            if inner.state.phase != Phase::Ready {
                drop(inner);
                debug!("editor readiness ignored outside Ready phase");
                return false;
            }
            inner.state.is_editor_ready = ready;
            (inner.state.clone(), listeners_of(&inner))
        };
        notify(&listeners, &snapshot);
        true
    }

    /// Drop all state back to `Idle`. Listeners stay subscribed.
    pub fn reset(&self) {
        self.shared.advance(|inner| inner.state = ManagerState::default());
        debug!("page manager reset");
    }

    /// Reset, then initialize again with the arguments of the last call.
    pub async fn retry(&self) -> ManagerState {
        let request = self.shared.lock().last_request.clone();
        self.reset();
        match request {
            Some((page_id, organization)) => self.initialize_page(page_id, organization).await,
            None => self.state(),
        }
    }

    /// Authenticate, verify access and load the page.
    ///
    /// With no `page_id` the organization's homepage is loaded, or created
    /// when it has none. With no `organization` the user's primary
    /// organization is used. Returns the settled snapshot; failures are
    /// reported through [`ManagerState::error`] rather than returned.
    pub async fn initialize_page(
        &self,
        page_id: Option<PageId>,
        organization: Option<OrganizationId>,
    ) -> ManagerState {
        let request = (page_id.clone(), organization.clone());
        let generation = self.shared.advance(|inner| {
            inner.last_request = Some(request);
            inner.state = ManagerState {
                phase: Phase::Loading,
                is_loading: true,
                organization_id: organization.clone(),
                ..ManagerState::default()
            };
        });

        // Any older run notices the new generation and bails out.
        let _running = self.run_lock.lock().await;
        if !self.shared.is_current(generation) {
            return self.state();
        }

        self.run(generation, page_id, organization).await;
        self.state()
    }

    async fn run(
        &self,
        generation: u64,
        page_id: Option<PageId>,
        organization: Option<OrganizationId>,
    ) {
        let mut superseded = self.shared.generation_tx.subscribe();
        let mut retry_count: u32 = 0;

        loop {
            let attempt = tokio::spawn(run_attempt(
                self.deps.clone(),
                Arc::clone(&self.shared),
                generation,
                page_id.clone(),
                organization.clone(),
            ));

            let outcome = tokio::select! {
                outcome = tokio::time::timeout(self.config.timeout, attempt) => outcome,
                () = wait_superseded(&mut superseded, generation) => return,
            };

            let err = match outcome {
                Ok(Ok(Ok(page))) => {
                    info!(
                        page = ?page.id,
                        organization = %page.organization_id,
                        retries = retry_count,
                        "page loaded"
                    );
                    self.shared.transition(generation, |state| {
                        state.phase = Phase::Ready;
                        state.is_loading = false;
                        state.organization_id = Some(page.organization_id.clone());
                        state.page_data = Some(page);
                        state.error = None;
                        state.failure = None;
                    });
                    return;
                },
                Ok(Ok(Err(err))) => err,
                Ok(Err(join_err)) => Error::Backend(format!("load task failed: {join_err}")),
                Err(_elapsed) => {
                    let timeout_ms = self.config.timeout.as_millis();
                    let err = Error::Timeout(format!("page initialization after {timeout_ms}ms"));
                    error!(
                        timeout_ms = %timeout_ms,
                        category = err.category(),
                        error = %err,
                        "page initialization timed out"
                    );
                    // The attempt keeps running detached; retiring the
                    // generation turns its remaining transitions into no-ops.
                    self.shared.retire(generation, |state| {
                        state.phase = Phase::Error;
                        state.is_loading = false;
                        state.error =
                            Some(format!("Page initialization timed out after {timeout_ms}ms"));
                        state.failure = Some(FailureKind::of(&err));
                    });
                    return;
                },
            };

            if retry_count >= self.config.max_retries {
                let attempts = retry_count + 1;
                error!(
                    attempts,
                    category = err.category(),
                    error = %err,
                    "page initialization failed"
                );
                let failure = FailureKind::of(&err);
                self.shared.transition(generation, |state| {
                    state.phase = Phase::Error;
                    state.is_loading = false;
                    state.error = Some(format!(
                        "Failed to load page after {attempts} attempts: {err}"
                    ));
                    state.failure = Some(failure);
                });
                return;
            }

            retry_count += 1;
            let delay = self.config.retry_delay * retry_count;
            warn!(
                attempt = retry_count,
                delay_ms = %delay.as_millis(),
                category = err.category(),
                recoverable = err.is_recoverable(),
                error = %err,
                "page initialization failed; retrying"
            );
            if !self
                .shared
                .transition(generation, |state| state.retry_count = retry_count)
            {
                return;
            }

            tokio::select! {
                () = tokio::time::sleep(delay) => {},
                () = wait_superseded(&mut superseded, generation) => return,
            }
        }
    }
}

async fn wait_superseded(rx: &mut watch::Receiver<u64>, generation: u64) {
    while *rx.borrow_and_update() == generation {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_attempt(
    deps: Deps,
    shared: Arc<Shared>,
    generation: u64,
    page_id: Option<PageId>,
    organization: Option<OrganizationId>,
) -> Result<PageDocument> {
    let session = deps.auth.current_session().await?;
    shared.transition(generation, |state| {
        state.is_authenticated = Some(session.is_some());
    });
    let user = session.ok_or(Error::Unauthenticated)?.user;

    let organization = if let Some(organization) = organization {
        let memberships = deps.directory.membership_count(&organization, &user.id).await?;
        if memberships == 0 {
            return Err(Error::AccessDenied { organization });
        }
        organization
    } else {
        deps.directory
            .primary_organization(&user.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no organization for user {}", user.id)))?
    };
    shared.transition(generation, |state| {
        state.organization_id = Some(organization.clone());
    });

    let name = deps
        .directory
        .organization_name(&organization)
        .await?
        .unwrap_or_else(|| organization.to_string());

    debug!(organization = %organization, page = ?page_id, "resolving page");
    deps.gateway
        .ensure_page(page_id.as_ref(), &organization, &name)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::types::{User, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn org() -> OrganizationId {
        OrganizationId::new("grace")
    }

    fn signed_in_backend() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        backend.sign_in(User {
            id: UserId::new("u1"),
            email: None,
        });
        backend.add_organization(org(), "Grace Community Church");
        backend.add_member(org(), UserId::new("u1"));
        backend
    }

    fn fast_config() -> ManagerConfig {
        ManagerConfig::default()
            .with_retry_delay(Duration::from_millis(100))
            .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_bootstraps_homepage_for_empty_organization() {
        let backend = signed_in_backend();
        let manager = PageManager::with_backend(backend.clone(), fast_config());

        let state = manager.initialize_page(None, Some(org())).await;

        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.is_authenticated, Some(true));
        assert!(!state.is_loading);
        let page = state.page_data.expect("page loaded");
        assert!(page.is_homepage);
        assert!(page.published);
        assert_eq!(backend.pages_of(&org()).len(), 1);
    }

    #[tokio::test]
    async fn test_resolves_primary_organization() {
        let backend = signed_in_backend();
        let manager = PageManager::with_backend(backend, fast_config());

        let state = manager.initialize_page(None, None).await;
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.organization_id, Some(org()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_retries_then_fails_distinctly() {
        let backend = Arc::new(InMemoryBackend::new());
        let manager = PageManager::with_backend(backend, fast_config());

        let state = manager.initialize_page(None, Some(org())).await;

        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.failure, Some(FailureKind::Unauthenticated));
        assert_eq!(state.is_authenticated, Some(false));
        assert_eq!(state.retry_count, 3);
        assert!(state.error.unwrap().contains("after 4 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_member_denied() {
        let backend = signed_in_backend();
        let manager = PageManager::with_backend(backend, fast_config().with_max_retries(0));

        let state = manager
            .initialize_page(None, Some(OrganizationId::new("someone-else")))
            .await;

        assert_eq!(state.failure, Some(FailureKind::AccessDenied));
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test]
    async fn test_every_transition_is_published() {
        let backend = signed_in_backend();
        let manager = PageManager::with_backend(backend, fast_config());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = manager.subscribe(move |state| sink.lock().unwrap().push(state.phase));

        manager.initialize_page(None, Some(org())).await;
        manager.set_editor_ready(true);
        assert!(manager.state().is_editor_ready);

        let phases = seen.lock().unwrap().clone();
        assert_eq!(phases.first(), Some(&Phase::Loading));
        assert_eq!(phases.last(), Some(&Phase::Ready));
        assert!(phases.len() >= 4);

        assert!(manager.unsubscribe(id));
        assert!(!manager.unsubscribe(id));
        let count = seen.lock().unwrap().len();
        manager.reset();
        assert_eq!(seen.lock().unwrap().len(), count);
    }

    #[tokio::test]
    async fn test_editor_ready_ignored_before_load() {
        let manager = PageManager::with_backend(signed_in_backend(), fast_config());
        assert!(!manager.set_editor_ready(true));
        assert!(!manager.state().is_editor_ready);
    }

    #[tokio::test]
    async fn test_ignored_editor_ready_publishes_nothing() {
        let manager = PageManager::with_backend(signed_in_backend(), fast_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!manager.set_editor_ready(true));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        manager.initialize_page(None, Some(org())).await;
        let settled = calls.load(Ordering::SeqCst);
        assert!(manager.set_editor_ready(true));
        assert_eq!(calls.load(Ordering::SeqCst), settled + 1);

        manager.reset();
        let after_reset = calls.load(Ordering::SeqCst);
        assert!(!manager.set_editor_ready(true));
        assert_eq!(calls.load(Ordering::SeqCst), after_reset);
    }

    #[test]
    fn test_failure_kind_classification() {
        assert_eq!(
            FailureKind::of(&Error::Timeout("slow".into())),
            FailureKind::TimedOut
        );
        assert_eq!(
            FailureKind::of(&Error::Unauthenticated),
            FailureKind::Unauthenticated
        );
        assert_eq!(
            FailureKind::of(&Error::AccessDenied {
                organization: org()
            }),
            FailureKind::AccessDenied
        );
        assert_eq!(
            FailureKind::of(&Error::Backend("down".into())),
            FailureKind::Exhausted
        );
    }

    #[tokio::test]
    async fn test_reset_keeps_listeners() {
        let manager = PageManager::with_backend(signed_in_backend(), fast_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.initialize_page(None, Some(org())).await;
        manager.reset();
        assert_eq!(manager.state(), ManagerState::default());

        let before = calls.load(Ordering::SeqCst);
        manager.initialize_page(None, Some(org())).await;
        assert!(calls.load(Ordering::SeqCst) > before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_restarts_with_same_arguments() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.add_organization(org(), "Grace");
        backend.add_member(org(), UserId::new("u1"));
        let manager = PageManager::with_backend(backend.clone(), fast_config().with_max_retries(0));

        let failed = manager.initialize_page(None, Some(org())).await;
        assert_eq!(failed.phase, Phase::Error);

        backend.sign_in(User {
            id: UserId::new("u1"),
            email: None,
        });
        let state = manager.retry().await;
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.organization_id, Some(org()));
    }

    #[tokio::test]
    async fn test_retry_without_prior_request_is_noop() {
        let manager = PageManager::with_backend(signed_in_backend(), fast_config());
        assert_eq!(manager.retry().await.phase, Phase::Idle);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let json = serde_json::to_value(ManagerState::default()).unwrap();
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["isEditorReady"], false);
        assert!(json["isAuthenticated"].is_null());
    }
}
