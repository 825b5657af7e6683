mod common;

use std::time::Duration;

use tokio::time::sleep;

use justsave_client::memory::NoMemory;
use justsave_client::{Phase, SaveIndicator, SessionHandle, spawn};
use justsave_gateway::Hub;

use common::{DbStore, LocalHub, SharedMemory, fast_config, wait_view};

fn session(store: &DbStore, hub: &LocalHub) -> SessionHandle {
    spawn(fast_config(), store.clone(), hub.clone(), NoMemory)
}

async fn join(session: &SessionHandle, room_id: &str) {
    session.set_room_id(room_id);
    let mut views = session.subscribe();
    wait_view(&mut views, |v| {
        v.phase == Phase::Ready && v.connected && v.room_id.as_deref() == Some(room_id)
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn a_burst_of_keystrokes_is_saved_once() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    join(&a, "abc").await;

    for text in ["h", "he", "hel", "hell", "hello"] {
        a.edit(text);
        sleep(Duration::from_millis(20)).await;
    }

    let mut views = a.subscribe();
    let view = wait_view(&mut views, |v| v.content == "hello" && v.indicator == SaveIndicator::Saved).await;
    assert_eq!(view.status_line(), "5 character saved.");
    assert!(view.last_modified.is_some());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(store.updates(), vec![("abc".to_string(), "hello".to_string())]);
    assert_eq!(store.content("abc").as_deref(), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn peers_see_updates_without_saving_them_again() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    let b = session(&store, &hub);
    join(&a, "abc").await;
    join(&b, "abc").await;

    a.edit("hello");

    let mut b_views = b.subscribe();
    let view = wait_view(&mut b_views, |v| v.content == "hello").await;
    assert_eq!(view.indicator, SaveIndicator::UpdatedRemotely);

    // The field reporting the applied text back must not start a save
    b.edit("hello");
    sleep(Duration::from_secs(1)).await;
    assert_eq!(store.updates().len(), 1);

    // A genuine edit on the receiving side flows back
    b.edit("hello there");
    let mut a_views = a.subscribe();
    let view = wait_view(&mut a_views, |v| v.content == "hello there").await;
    assert_eq!(view.indicator, SaveIndicator::UpdatedRemotely);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(
        store.updates(),
        vec![
            ("abc".to_string(), "hello".to_string()),
            ("abc".to_string(), "hello there".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn rooms_are_isolated() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    let b = session(&store, &hub);
    join(&a, "abc").await;
    join(&b, "ABC").await;

    a.edit("lower");
    sleep(Duration::from_secs(1)).await;

    assert_eq!(b.view().content, "");
    assert_eq!(store.content("ABC").as_deref(), Some(""));
}

#[tokio::test(start_paused = true)]
async fn switching_rooms_drops_the_pending_save() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    join(&a, "abc").await;

    a.edit("draft");
    join(&a, "xyz").await;
    sleep(Duration::from_secs(1)).await;

    assert!(store.updates().is_empty());
    assert_eq!(store.content("abc").as_deref(), Some(""));
    assert_eq!(a.view().content, "");
    assert_eq!(hub.hub.member_count("abc").await, 0);
    assert_eq!(hub.hub.member_count("xyz").await, 1);
}

#[tokio::test(start_paused = true)]
async fn clearing_saves_empty_content() {
    let store = DbStore::new();
    store.put("abc", "some text");
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    join(&a, "abc").await;
    assert_eq!(a.view().content, "some text");

    a.clear();
    let mut views = a.subscribe();
    let view = wait_view(&mut views, |v| v.indicator == SaveIndicator::Cleared).await;
    assert_eq!(view.status_line(), "No character cleared.");

    wait_view(&mut views, |v| v.indicator == SaveIndicator::Saved).await;
    assert_eq!(store.content("abc").as_deref(), Some(""));
}

#[tokio::test(start_paused = true)]
async fn failed_resolve_blocks_editing_until_retry() {
    let store = DbStore::new();
    store.fail_resolves(true);
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    let mut views = a.subscribe();

    a.set_room_id("abc");
    let view = wait_view(&mut views, |v| v.phase == Phase::Error).await;
    assert!(!view.phase.is_editable());
    assert!(view.error.is_some());

    a.edit("ignored");
    sleep(Duration::from_secs(1)).await;
    assert!(store.updates().is_empty());

    store.fail_resolves(false);
    a.retry();
    let view = wait_view(&mut views, |v| v.phase == Phase::Ready && v.connected).await;
    assert_eq!(view.content, "");
    assert_eq!(view.error, None);
}

#[tokio::test(start_paused = true)]
async fn failed_save_is_reported_and_not_retried() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    join(&a, "abc").await;
    let mut views = a.subscribe();

    store.fail_updates(true);
    a.edit("x");
    let view = wait_view(&mut views, |v| v.indicator == SaveIndicator::Failed).await;
    assert_eq!(view.status_line(), "1 character not saved");
    assert!(view.phase.is_editable());

    store.fail_updates(false);
    sleep(Duration::from_secs(5)).await;
    assert!(store.updates().is_empty());

    a.edit("xy");
    wait_view(&mut views, |v| v.content == "xy" && v.indicator == SaveIndicator::Saved).await;
    assert_eq!(store.updates(), vec![("abc".to_string(), "xy".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn lost_hub_connection_rejoins_and_reloads() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    let b = session(&store, &hub);
    join(&a, "abc").await;
    join(&b, "abc").await;

    a.edit("before");
    let mut b_views = b.subscribe();
    wait_view(&mut b_views, |v| v.content == "before").await;

    hub.sever_all();
    let mut a_views = a.subscribe();
    wait_view(&mut a_views, |v| !v.connected).await;
    let view = wait_view(&mut a_views, |v| v.connected && v.phase == Phase::Ready).await;
    assert_eq!(view.content, "before");
    wait_view(&mut b_views, |v| v.connected && v.phase == Phase::Ready).await;

    a.edit("after");
    wait_view(&mut b_views, |v| v.content == "after").await;
}

#[tokio::test(start_paused = true)]
async fn resolved_room_is_remembered_and_reopened() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let memory = SharedMemory::default();

    let first = spawn(fast_config(), store.clone(), hub.clone(), memory.clone());
    join(&first, "abc").await;
    first.edit("kept");
    let mut views = first.subscribe();
    wait_view(&mut views, |v| v.content == "kept" && v.indicator == SaveIndicator::Saved).await;
    first.shutdown().await;
    assert_eq!(memory.0.lock().unwrap().as_deref(), Some("abc"));

    let second = spawn(fast_config(), store.clone(), hub.clone(), memory.clone());
    let mut views = second.subscribe();
    let view = wait_view(&mut views, |v| v.phase == Phase::Ready).await;
    assert_eq!(view.room_id.as_deref(), Some("abc"));
    assert_eq!(view.content, "kept");
}

#[tokio::test(start_paused = true)]
async fn leaving_the_room_id_empty_detaches() {
    let store = DbStore::new();
    let hub = LocalHub::new(Hub::new());
    let a = session(&store, &hub);
    join(&a, "abc").await;

    a.set_room_id("");
    let mut views = a.subscribe();
    let view = wait_view(&mut views, |v| v.room_id.is_none()).await;
    assert_eq!(view.status_line(), "Please Enter room id");
    assert!(!view.phase.is_editable());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(hub.hub.member_count("abc").await, 0);
}
