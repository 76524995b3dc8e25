#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pagesmith_core::backend::{AuthProvider, PageStore};
use pagesmith_core::memory::InMemoryBackend;
use pagesmith_core::{
    Error, ManagerConfig, OrganizationId, PageDocument, PageGateway, PageId, PageManager, Result,
    Session, SessionConfig, User, UserId,
};

pub fn org() -> OrganizationId {
    OrganizationId::new("grace")
}

/// Backend with one signed-in member of `grace`.
pub fn seeded_backend() -> Arc<InMemoryBackend> {
    let backend = Arc::new(InMemoryBackend::new());
    backend.sign_in(User {
        id: UserId::new("u1"),
        email: Some("pastor@example.org".into()),
    });
    backend.add_organization(org(), "Grace Community Church");
    backend.add_member(org(), UserId::new("u1"));
    backend
}

pub fn fast_manager_config() -> ManagerConfig {
    ManagerConfig::default()
        .with_max_retries(3)
        .with_timeout(Duration::from_secs(10))
        .with_retry_delay(Duration::from_secs(1))
}

pub fn session_config(autosave_delay: Duration) -> SessionConfig {
    SessionConfig::default().with_autosave_delay(autosave_delay)
}

/// Page store wrapper that injects failures and latency and counts calls.
pub struct FaultyStore {
    inner: Arc<InMemoryBackend>,
    failing_reads: AtomicUsize,
    read_delay: Duration,
    write_delay: Duration,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            failing_reads: AtomicUsize::new(0),
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` homepage lookups with a backend error.
    pub fn failing_homepage_reads(self, n: usize) -> Self {
        self.failing_reads.store(n, Ordering::SeqCst);
        self
    }

    /// Delay every homepage lookup.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Delay every insert and update.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageStore for FaultyStore {
    async fn fetch_page(&self, id: &PageId) -> Result<Option<PageDocument>> {
        self.inner.fetch_page(id).await
    }

    async fn find_by_slug(
        &self,
        organization: &OrganizationId,
        slug: &str,
    ) -> Result<Option<PageDocument>> {
        self.inner.find_by_slug(organization, slug).await
    }

    async fn find_homepage(&self, organization: &OrganizationId) -> Result<Option<PageDocument>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Backend("503 Service Unavailable".into()));
        }
        self.inner.find_homepage(organization).await
    }

    async fn insert_page(&self, doc: PageDocument) -> Result<PageDocument> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_page(doc).await
    }

    async fn update_page(&self, doc: PageDocument) -> Result<PageDocument> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_page(doc).await
    }
}

/// Manager whose auth and membership come from `backend` and pages from `store`.
pub fn manager_over(
    backend: &Arc<InMemoryBackend>,
    store: Arc<FaultyStore>,
    config: ManagerConfig,
) -> PageManager {
    PageManager::new(
        backend.clone(),
        backend.clone(),
        PageGateway::new(store),
        config,
    )
}

/// Auth provider that answers only after `delay`.
pub struct SlowAuth {
    inner: Arc<InMemoryBackend>,
    delay: Duration,
}

impl SlowAuth {
    pub fn new(inner: Arc<InMemoryBackend>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl AuthProvider for SlowAuth {
    async fn current_session(&self) -> Result<Option<Session>> {
        tokio::time::sleep(self.delay).await;
        self.inner.current_session().await
    }

    async fn current_user(&self) -> Result<Option<User>> {
        tokio::time::sleep(self.delay).await;
        self.inner.current_user().await
    }
}
