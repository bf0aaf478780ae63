use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use super::{LoadState, Subscription};
use crate::models::{Event, Ticket};
use crate::remote::EventSnapshot;
use crate::repository::EventRepository;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeRange {
    Week,
    #[default]
    Month,
    Year,
    All,
}

impl TimeRange {
    fn window(&self) -> Option<Duration> {
        match self {
            TimeRange::Week => Some(Duration::days(7)),
            TimeRange::Month => Some(Duration::days(30)),
            TimeRange::Year => Some(Duration::days(365)),
            TimeRange::All => None,
        }
    }

    /// Events starting inside the window that ends now, plus everything upcoming.
    fn includes(&self, event: &Event, now: DateTime<Utc>) -> bool {
        match self.window() {
            None => true,
            Some(window) => event.starts_at().map_or(false, |start| start >= now - window),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardStats {
    pub event_count: usize,
    pub total_registrations: usize,
    pub tickets_sold: usize,
    pub checked_in: usize,
    pub revenue: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardState {
    pub load_state: LoadState,
    pub time_range: TimeRange,
    pub events: Vec<Event>,
    pub stats: DashboardStats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Request {
    range: TimeRange,
    generation: u64,
}

/// Organizer dashboard.
pub struct DashboardViewModel {
    request: watch::Sender<Request>,
    state: watch::Receiver<DashboardState>,
    _task: Subscription,
}

impl DashboardViewModel {
    pub fn new(repo: Arc<EventRepository>, organizer_id: impl Into<String>) -> Self {
        let (request_tx, request_rx) = watch::channel(Request::default());
        let (state_tx, state_rx) = watch::channel(DashboardState {
            load_state: LoadState::Loading,
            ..DashboardState::default()
        });
        let task = Subscription::spawn(run(repo, organizer_id.into(), request_rx, state_tx));
        Self {
            request: request_tx,
            state: state_rx,
            _task: task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state.clone()
    }

    pub fn state(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    /// Re-enters `Loading` and recomputes for the new range.
    pub fn set_time_range(&self, range: TimeRange) {
        self.request.send_modify(|request| {
            request.range = range;
            request.generation += 1;
        });
    }
}

async fn run(
    repo: Arc<EventRepository>,
    organizer_id: String,
    mut request: watch::Receiver<Request>,
    state: watch::Sender<DashboardState>,
) {
    let mut events = repo.events();
    let mut last_generation = None;
    loop {
        let current = *request.borrow_and_update();
        let snapshot = events.borrow_and_update().clone();

        if last_generation.is_some() && last_generation != Some(current.generation) {
            state.send_modify(|s| {
                s.load_state = LoadState::Loading;
                s.time_range = current.range;
            });
            // Give subscribers a turn to see Loading before the recompute lands.
            tokio::task::yield_now().await;
        }
        last_generation = Some(current.generation);

        if let Some(list) = snapshot {
            let (mine, stats) = compute(&repo, &list, &organizer_id, current.range).await;
            state.send_replace(DashboardState {
                load_state: LoadState::Loaded,
                time_range: current.range,
                events: mine,
                stats,
            });
        }

        tokio::select! {
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = request.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn compute(
    repo: &EventRepository,
    list: &[Event],
    organizer_id: &str,
    range: TimeRange,
) -> (Vec<Event>, DashboardStats) {
    let now = Utc::now();
    let events: Vec<Event> = list
        .iter()
        .filter(|e| e.organizer_id == organizer_id && range.includes(e, now))
        .cloned()
        .collect();

    let mut stats = DashboardStats {
        event_count: events.len(),
        total_registrations: events.iter().map(Event::registration_count).sum(),
        ..DashboardStats::default()
    };
    for event in &events {
        let tickets = repo.tickets_for_event(&event.id).await.unwrap_or_default();
        let sold: Vec<&Ticket> = tickets.iter().filter(|t| t.is_active()).collect();
        stats.tickets_sold += sold.len();
        stats.checked_in += sold.iter().filter(|t| !t.is_valid).count();
        stats.revenue += event.price * sold.len() as f64;
    }
    (events, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventCategory, DEFAULT_CURRENCY};
    use crate::remote::MemoryDocumentStore;
    use std::time::Duration as StdDuration;

    fn event(id: &str, organizer: &str, days_from_now: i64, price: f64) -> Event {
        Event {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            date_time: (Utc::now() + Duration::days(days_from_now)).to_rfc3339(),
            location: "Boise".to_string(),
            image_url: None,
            category: EventCategory::Business,
            price,
            currency: DEFAULT_CURRENCY.to_string(),
            organizer_id: organizer.to_string(),
            registered_user_ids: Vec::new(),
            is_registered: false,
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<DashboardState>, pred: F) -> DashboardState
    where
        F: FnMut(&DashboardState) -> bool,
    {
        tokio::time::timeout(StdDuration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("state in time")
            .expect("channel open")
            .clone()
    }

    #[tokio::test]
    async fn stats_cover_only_this_organizer_and_range() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![
            event("upcoming", "org-1", 3, 20.0),
            event("last-quarter", "org-1", -90, 10.0),
            event("someone-else", "org-2", 3, 50.0),
        ]));
        let repo = Arc::new(EventRepository::new(store));
        repo.purchase_ticket("upcoming", "u1").await.expect("ticket");
        repo.purchase_ticket("upcoming", "u2").await.expect("ticket");

        let vm = DashboardViewModel::new(repo, "org-1");
        let mut rx = vm.subscribe();
        let state = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert_eq!(state.time_range, TimeRange::Month);
        assert_eq!(state.stats.event_count, 1);
        assert_eq!(state.stats.tickets_sold, 2);
        assert_eq!(state.stats.total_registrations, 2);
        assert_eq!(state.stats.revenue, 40.0);

        vm.set_time_range(TimeRange::Year);
        let state = wait_for(&mut rx, |s| {
            s.time_range == TimeRange::Year && s.load_state == LoadState::Loaded
        })
        .await;
        assert_eq!(state.stats.event_count, 2);
    }

    #[tokio::test]
    async fn range_change_shows_loading_then_loaded() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![
            event("upcoming", "org-1", 3, 20.0),
            event("last-quarter", "org-1", -90, 10.0),
        ]));
        let repo = Arc::new(EventRepository::new(store));
        let vm = DashboardViewModel::new(repo, "org-1");
        let mut rx = vm.subscribe();
        wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;

        vm.set_time_range(TimeRange::All);
        let loading = wait_for(&mut rx, |s| s.load_state == LoadState::Loading).await;
        assert_eq!(loading.time_range, TimeRange::All);
        let loaded = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert_eq!(loaded.time_range, TimeRange::All);
        assert_eq!(loaded.stats.event_count, 2);
    }
}
