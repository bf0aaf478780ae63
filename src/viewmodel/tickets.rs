use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use super::{LoadState, Subscription};
use crate::models::Ticket;
use crate::repository::EventRepository;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TicketsState {
    pub load_state: LoadState,
    pub upcoming: Vec<Ticket>,
    pub past: Vec<Ticket>,
}

/// Ticket wallet. Tickets are not observable, so the list is fetched on
/// creation and again on every `refresh`.
pub struct TicketsViewModel {
    repo: Arc<EventRepository>,
    refresh: watch::Sender<u64>,
    state: watch::Receiver<TicketsState>,
    _task: Subscription,
}

impl TicketsViewModel {
    pub fn new(repo: Arc<EventRepository>, user_id: impl Into<String>) -> Self {
        let (refresh_tx, refresh_rx) = watch::channel(0u64);
        let (state_tx, state_rx) = watch::channel(TicketsState {
            load_state: LoadState::Loading,
            ..TicketsState::default()
        });
        let task = Subscription::spawn(run(Arc::clone(&repo), user_id.into(), refresh_rx, state_tx));
        Self {
            repo,
            refresh: refresh_tx,
            state: state_rx,
            _task: task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TicketsState> {
        self.state.clone()
    }

    pub fn state(&self) -> TicketsState {
        self.state.borrow().clone()
    }

    /// Pull-to-refresh: back to `Loading` until the fetch finishes.
    pub fn refresh(&self) {
        self.refresh.send_modify(|generation| *generation += 1);
    }

    pub async fn transfer(&self, ticket_id: &str, new_user_id: &str) -> bool {
        let moved = self.repo.transfer_ticket(ticket_id, new_user_id).await.is_some();
        if moved {
            self.refresh();
        }
        moved
    }
}

async fn run(
    repo: Arc<EventRepository>,
    user_id: String,
    mut refresh: watch::Receiver<u64>,
    state: watch::Sender<TicketsState>,
) {
    loop {
        refresh.borrow_and_update();
        state.send_modify(|s| s.load_state = LoadState::Loading);

        match repo.tickets_for_user(&user_id).await {
            Some(tickets) => {
                let now = Utc::now();
                let (upcoming, past): (Vec<Ticket>, Vec<Ticket>) = tickets
                    .into_iter()
                    .filter(Ticket::is_active)
                    .partition(|t| t.is_upcoming(now));
                state.send_replace(TicketsState {
                    load_state: LoadState::Loaded,
                    upcoming,
                    past,
                });
            }
            // Keep whatever was shown before.
            None => state.send_modify(|s| s.load_state = LoadState::Loaded),
        }

        if refresh.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventCategory, DEFAULT_CURRENCY};
    use crate::remote::MemoryDocumentStore;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn event(id: &str, days_from_now: i64) -> Event {
        Event {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            date_time: (Utc::now() + Duration::days(days_from_now)).to_rfc3339(),
            location: "Boise".to_string(),
            image_url: None,
            category: EventCategory::Arts,
            price: 10.0,
            currency: DEFAULT_CURRENCY.to_string(),
            organizer_id: "org".to_string(),
            registered_user_ids: Vec::new(),
            is_registered: false,
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<TicketsState>, pred: F) -> TicketsState
    where
        F: FnMut(&TicketsState) -> bool,
    {
        tokio::time::timeout(StdDuration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("state in time")
            .expect("channel open")
            .clone()
    }

    #[tokio::test]
    async fn splits_upcoming_and_past() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![
            event("soon", 2),
            event("gone", -2),
        ]));
        let repo = Arc::new(EventRepository::new(store));
        repo.purchase_ticket("soon", "u1").await.expect("ticket");
        repo.purchase_ticket("gone", "u1").await.expect("ticket");

        let vm = TicketsViewModel::new(repo, "u1");
        let mut rx = vm.subscribe();
        let state = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert_eq!(state.upcoming.len(), 1);
        assert_eq!(state.upcoming[0].event_id, "soon");
        assert_eq!(state.past.len(), 1);
    }

    #[tokio::test]
    async fn refresh_picks_up_new_purchases() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![event("soon", 2)]));
        let repo = Arc::new(EventRepository::new(store));
        let vm = TicketsViewModel::new(repo.clone(), "u1");
        let mut rx = vm.subscribe();
        let state = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert!(state.upcoming.is_empty());

        repo.purchase_ticket("soon", "u1").await.expect("ticket");
        vm.refresh();
        let state = wait_for(&mut rx, |s| !s.upcoming.is_empty()).await;
        assert_eq!(state.load_state, LoadState::Loaded);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_list() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![event("soon", 2)]));
        let repo = Arc::new(EventRepository::new(store.clone()));
        repo.purchase_ticket("soon", "u1").await.expect("ticket");
        let vm = TicketsViewModel::new(repo, "u1");
        let mut rx = vm.subscribe();
        wait_for(&mut rx, |s| s.upcoming.len() == 1).await;

        store.set_online(false);
        vm.refresh();
        // Let the refresh run to completion before checking.
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let state = vm.state();
        assert_eq!(state.load_state, LoadState::Loaded);
        assert_eq!(state.upcoming.len(), 1);
    }

    #[tokio::test]
    async fn transfer_moves_ticket_out_of_wallet() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![event("soon", 2)]));
        let repo = Arc::new(EventRepository::new(store));
        let ticket = repo.purchase_ticket("soon", "u1").await.expect("ticket");
        let vm = TicketsViewModel::new(repo, "u1");
        let mut rx = vm.subscribe();
        wait_for(&mut rx, |s| s.upcoming.len() == 1).await;

        assert!(vm.transfer(&ticket.id, "u2").await);
        wait_for(&mut rx, |s| s.upcoming.is_empty()).await;
    }
}
