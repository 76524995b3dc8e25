#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FaultyStore, org, seeded_backend, session_config};
use pagesmith_core::{
    AutosaveOutcome, EditingSession, PageContent, PageDocument, PageGateway, PageManager,
    PageTarget, SaveError, SaveStatus, SkipReason,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const AUTOSAVE: Duration = Duration::from_secs(5);

fn text_block(text: &str) -> PageContent {
    PageContent::from_blocks(vec![json!({ "type": "Text", "props": { "text": text } })])
}

fn new_page_over(store: &Arc<FaultyStore>) -> EditingSession {
    EditingSession::new_page(
        PageGateway::new(store.clone()),
        session_config(AUTOSAVE),
        org(),
        false,
    )
}

#[tokio::test(start_paused = true)]
async fn test_autosave_waits_for_inactivity() {
    let backend = seeded_backend();
    let store = Arc::new(FaultyStore::new(backend.clone()));
    let session = new_page_over(&store);

    session.set_title("Welcome");
    tokio::time::sleep(Duration::from_secs(3)).await;
    session.set_content(text_block("hello"));
    tokio::time::sleep(Duration::from_secs(3)).await;
    // Second edit restarted the window.
    assert_eq!(store.writes(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.writes(), 1);
    assert!(!session.is_dirty());
    assert!(session.snapshot().page_id.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_clean_session_never_autosaves() {
    let backend = seeded_backend();
    let store = Arc::new(FaultyStore::new(backend.clone()));
    let session = new_page_over(&store);

    session.set_title("Draft");
    session.set_title("Untitled Page");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_save_cancels_pending_autosave() {
    let backend = seeded_backend();
    let store = Arc::new(FaultyStore::new(backend.clone()));
    let session = new_page_over(&store);

    session.set_title("Ministries");
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.save().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.writes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_autosave_never_overlaps_manual_save() {
    let backend = seeded_backend();
    let store =
        Arc::new(FaultyStore::new(backend.clone()).with_write_delay(Duration::from_secs(2)));
    let session = new_page_over(&store);
    session.set_title("Sermons");

    let (manual, auto) = tokio::join!(session.save(), session.autosave());

    assert!(manual.is_ok());
    assert_eq!(auto, AutosaveOutcome::Skipped(SkipReason::InFlight));
    assert_eq!(store.writes(), 1);
    assert_eq!(backend.pages_of(&org()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_manual_save_while_in_flight_is_busy() {
    let backend = seeded_backend();
    let store =
        Arc::new(FaultyStore::new(backend.clone()).with_write_delay(Duration::from_secs(2)));
    let session = new_page_over(&store);
    session.set_title("Staff");

    let (first, second) = tokio::join!(session.save(), session.save());
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), SaveError::Busy);
}

#[tokio::test(start_paused = true)]
async fn test_edits_during_save_stay_dirty_and_save_later() {
    let backend = seeded_backend();
    let store =
        Arc::new(FaultyStore::new(backend.clone()).with_write_delay(Duration::from_secs(2)));
    let session = Arc::new(EditingSession::new_page(
        PageGateway::new(store.clone()),
        session_config(AUTOSAVE),
        org(),
        false,
    ));
    session.set_title("Outreach");

    let saving = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.save().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.save_status(), SaveStatus::Saving);
    session.set_content(text_block("food pantry"));

    let first = saving.await.unwrap().unwrap();
    assert_eq!(first.version, 1);
    assert!(session.is_dirty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!session.is_dirty());
    let pages = backend.pages_of(&org());
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].version, 2);
    assert_eq!(pages[0].content, text_block("food pantry"));
    assert_eq!(pages[0].slug, first.slug);
}

#[tokio::test(start_paused = true)]
async fn test_slug_edited_during_save_is_kept_and_saved_later() {
    let backend = seeded_backend();
    let stored = PageGateway::new(backend.clone())
        .save(PageDocument::new(org(), "About", "about"))
        .await
        .unwrap();
    let store =
        Arc::new(FaultyStore::new(backend.clone()).with_write_delay(Duration::from_secs(2)));
    let session = Arc::new(
        EditingSession::open(
            PageGateway::new(store.clone()),
            session_config(AUTOSAVE),
            org(),
            PageTarget::Existing(stored.id.unwrap()),
        )
        .await
        .unwrap(),
    );
    session.set_title("About Grace");

    let saving = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.save().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.set_slug("about-us");

    let first = saving.await.unwrap().unwrap();
    assert_eq!(first.slug, "about");
    assert_eq!(session.snapshot().page_slug, "about-us");
    assert!(session.is_dirty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!session.is_dirty());
    assert_eq!(store.writes(), 2);
    let pages = backend.pages_of(&org());
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].slug, "about-us");
    assert_eq!(pages[0].title, "About Grace");
}

#[tokio::test(start_paused = true)]
async fn test_failed_autosave_keeps_dirty() {
    let backend = seeded_backend();
    let gateway = PageGateway::new(backend.clone());
    gateway
        .save(PageDocument::new(org(), "About", "about"))
        .await
        .unwrap();
    let session = EditingSession::new_page(gateway, session_config(AUTOSAVE), org(), false);
    session.set_title("About Us");
    session.set_slug("about");

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(session.is_dirty());
    assert_eq!(session.save_status(), SaveStatus::Error);
    assert_eq!(backend.pages_of(&org()).len(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(session.save_status(), SaveStatus::Idle);
}

#[tokio::test]
async fn test_duplicate_slug_message_names_slug() {
    let backend = seeded_backend();
    let gateway = PageGateway::new(backend.clone());
    gateway
        .save(PageDocument::new(org(), "About", "about"))
        .await
        .unwrap();

    let session = EditingSession::new_page(gateway, session_config(AUTOSAVE), org(), false);
    session.set_title("About Us");
    session.set_slug("about");

    let err = session.save().await.unwrap_err();
    assert_eq!(err, SaveError::DuplicateSlug { slug: "about".into() });
    assert!(err.user_message().contains("'about'"));
}

#[tokio::test]
async fn test_new_pages_with_same_title_get_distinct_slugs() {
    let backend = seeded_backend();
    let gateway = PageGateway::new(backend.clone());

    let mut slugs = Vec::new();
    for _ in 0..3 {
        let session =
            EditingSession::new_page(gateway.clone(), session_config(AUTOSAVE), org(), false);
        session.set_title("Events");
        slugs.push(session.save().await.unwrap().slug);
    }

    slugs.sort();
    slugs.dedup();
    assert_eq!(slugs.len(), 3);
    assert!(slugs.iter().all(|s| s.starts_with("events-")));
}

#[tokio::test]
async fn test_concurrent_editors_conflict() {
    let backend = seeded_backend();
    let gateway = PageGateway::new(backend.clone());
    let stored = gateway
        .save(PageDocument::new(org(), "About", "about"))
        .await
        .unwrap();
    let id = stored.id.unwrap();

    let alice = EditingSession::open(
        gateway.clone(),
        session_config(AUTOSAVE),
        org(),
        PageTarget::Existing(id.clone()),
    )
    .await
    .unwrap();
    let bob = EditingSession::open(
        gateway,
        session_config(AUTOSAVE),
        org(),
        PageTarget::Existing(id),
    )
    .await
    .unwrap();

    alice.set_title("About Grace");
    alice.save().await.unwrap();

    bob.set_title("About Us");
    assert_eq!(bob.save().await.unwrap_err(), SaveError::Conflict);
    assert!(bob.is_dirty());
}

#[tokio::test]
async fn test_manager_page_flows_into_session() {
    let backend = seeded_backend();
    let manager = PageManager::with_backend(backend.clone(), common::fast_manager_config());
    let state = manager.initialize_page(None, Some(org())).await;
    let home = state.page_data.unwrap();

    let session = EditingSession::from_document(
        manager.gateway().clone(),
        session_config(AUTOSAVE),
        home.clone(),
    );
    assert!(!session.is_dirty());
    session.set_content(text_block("Sunday service at 10am"));
    let saved = session.save().await.unwrap();
    assert_eq!(saved.id, home.id);
    assert_eq!(saved.version, home.version + 1);

    let reloaded = manager.retry().await.page_data.unwrap();
    assert_eq!(reloaded.content, text_block("Sunday service at 10am"));
}
