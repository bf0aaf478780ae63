use std::sync::Arc;

use tokio::sync::watch;

use super::{LoadState, Subscription};
use crate::models::{Event, Ticket};
use crate::remote::EventSnapshot;
use crate::repository::EventRepository;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventDetailState {
    pub load_state: LoadState,
    /// `None` once loaded means the event does not exist (or was deleted).
    pub event: Option<Event>,
}

pub struct EventDetailViewModel {
    repo: Arc<EventRepository>,
    event_id: String,
    user_id: Option<String>,
    state: watch::Receiver<EventDetailState>,
    _task: Subscription,
}

impl EventDetailViewModel {
    pub fn new(repo: Arc<EventRepository>, event_id: impl Into<String>, user_id: Option<String>) -> Self {
        let event_id = event_id.into();
        let (state_tx, state_rx) = watch::channel(EventDetailState {
            load_state: LoadState::Loading,
            event: None,
        });
        let task = Subscription::spawn(run(
            Arc::clone(&repo),
            state_tx,
            event_id.clone(),
            user_id.clone(),
        ));
        Self {
            repo,
            event_id,
            user_id,
            state: state_rx,
            _task: task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<EventDetailState> {
        self.state.clone()
    }

    pub fn state(&self) -> EventDetailState {
        self.state.borrow().clone()
    }

    pub async fn toggle_registration(&self) -> bool {
        match &self.user_id {
            Some(user_id) => {
                self.repo
                    .toggle_event_registration(&self.event_id, user_id)
                    .await
            }
            None => false,
        }
    }

    pub async fn buy_ticket(&self) -> Option<Ticket> {
        let user_id = self.user_id.as_deref()?;
        self.repo.purchase_ticket(&self.event_id, user_id).await
    }
}

async fn run(
    repo: Arc<EventRepository>,
    state: watch::Sender<EventDetailState>,
    event_id: String,
    user_id: Option<String>,
) {
    let mut events: watch::Receiver<Option<EventSnapshot>> = repo.events();
    // Until the store answers, show the cached copy, still as Loading.
    if events.borrow().is_none() {
        if let Some(cached) = repo.offline_event(&event_id).await {
            let cached = cached.for_user(user_id.as_deref());
            state.send_if_modified(|s| {
                if s.load_state != LoadState::Loading {
                    return false;
                }
                s.event = Some(cached);
                true
            });
        }
    }
    loop {
        let snapshot = events.borrow_and_update().clone();
        if let Some(list) = snapshot {
            let event = list
                .iter()
                .find(|e| e.id == event_id)
                .map(|e| e.for_user(user_id.as_deref()));
            state.send_replace(EventDetailState {
                load_state: LoadState::Loaded,
                event,
            });
        }
        if events.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventCategory, DEFAULT_CURRENCY};
    use crate::remote::MemoryDocumentStore;
    use std::time::Duration;

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            title: "Indie Fest".to_string(),
            description: String::new(),
            date_time: "2030-01-01T19:00:00Z".to_string(),
            location: "Boise".to_string(),
            image_url: None,
            category: EventCategory::Music,
            price: 0.0,
            currency: DEFAULT_CURRENCY.to_string(),
            organizer_id: "org".to_string(),
            registered_user_ids: Vec::new(),
            is_registered: false,
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<EventDetailState>, pred: F) -> EventDetailState
    where
        F: FnMut(&EventDetailState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("state in time")
            .expect("channel open")
            .clone()
    }

    #[tokio::test]
    async fn stays_loading_until_backend_answers() {
        let store = Arc::new(MemoryDocumentStore::offline(vec![event("e1")]));
        let repo = Arc::new(EventRepository::new(store.clone()));
        let vm = EventDetailViewModel::new(repo, "e1", Some("u1".to_string()));
        let mut rx = vm.subscribe();
        assert!(vm.state().load_state.is_loading());

        store.set_online(true);
        let state = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert_eq!(state.event.map(|e| e.id), Some("e1".to_string()));
    }

    #[tokio::test]
    async fn offline_detail_shows_cached_copy_while_loading() {
        use crate::db::Store;
        use crate::repository::LocalCache;

        let store = Arc::new(MemoryDocumentStore::offline(vec![event("e1")]));
        let cache = LocalCache::new(Store::open_in_memory().expect("open cache"));
        let repo = Arc::new(EventRepository::new(store.clone()).with_cache(cache));
        assert_eq!(repo.seed_cache_if_empty().await, 3);

        let vm = EventDetailViewModel::new(repo, "seed-indie-fest", None);
        let mut rx = vm.subscribe();
        let state = wait_for(&mut rx, |s| s.event.is_some()).await;
        assert_eq!(state.load_state, LoadState::Loading);
        assert_eq!(state.event.map(|e| e.title), Some("Indie Fest".to_string()));

        store.set_online(true);
        let state = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert!(state.event.is_none());
    }

    #[tokio::test]
    async fn missing_event_loads_as_empty() {
        let store = Arc::new(MemoryDocumentStore::new());
        let repo = Arc::new(EventRepository::new(store));
        let vm = EventDetailViewModel::new(repo, "nope", None);
        let mut rx = vm.subscribe();
        let state = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert!(state.event.is_none());
    }

    #[tokio::test]
    async fn toggle_twice_round_trips() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![event("e1")]));
        let repo = Arc::new(EventRepository::new(store));
        let vm = EventDetailViewModel::new(repo, "e1", Some("u1".to_string()));
        let mut rx = vm.subscribe();
        wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;

        assert!(vm.toggle_registration().await);
        wait_for(&mut rx, |s| s.event.as_ref().map_or(false, |e| e.is_registered)).await;
        assert!(vm.toggle_registration().await);
        let state = wait_for(&mut rx, |s| s.event.as_ref().map_or(false, |e| !e.is_registered)).await;
        assert!(state.event.expect("event").registered_user_ids.is_empty());
    }
}
