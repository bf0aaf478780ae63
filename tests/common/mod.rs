#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use eventdeck::{Event, EventCategory, EventRepository, MemoryDocumentStore};
use tokio::sync::watch;

pub fn event(id: &str, title: &str, location: &str) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("{title} description"),
        date_time: "2030-05-01T19:00:00Z".to_string(),
        location: location.to_string(),
        image_url: None,
        category: EventCategory::Music,
        price: 0.0,
        currency: "USD".to_string(),
        organizer_id: "org-1".to_string(),
        registered_user_ids: Vec::new(),
        is_registered: false,
    }
}

pub fn repo_with(events: Vec<Event>) -> (Arc<MemoryDocumentStore>, Arc<EventRepository>) {
    let store = Arc::new(MemoryDocumentStore::with_events(events));
    let repo = Arc::new(EventRepository::new(store.clone()));
    (store, repo)
}

/// Waits (up to two seconds) for a published state that satisfies `pred`.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("state in time")
        .expect("channel open")
        .clone()
}

/// Polls an async check until it holds, for state that is not published on a channel.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
