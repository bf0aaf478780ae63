use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use super::{LoadState, Subscription};
use crate::filter;
use crate::models::{Event, FilterState, GeoPoint};
use crate::remote::EventSnapshot;
use crate::repository::EventRepository;

const DEFAULT_NEARBY_RADIUS_KM: f64 = 25.0;

#[derive(Clone, Debug, Default, PartialEq)]
struct ExploreInputs {
    query: String,
    filter: FilterState,
    origin: Option<GeoPoint>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExploreState {
    pub load_state: LoadState,
    pub query: String,
    pub filter: FilterState,
    /// Every event, with `is_registered` set for the current user.
    pub events: Vec<Event>,
    /// `events` after search and filters.
    pub visible: Vec<Event>,
}

impl ExploreState {
    pub fn is_loading(&self) -> bool {
        self.load_state.is_loading()
    }
}

/// Browse/search screen.
pub struct ExploreViewModel {
    repo: Arc<EventRepository>,
    user_id: Option<String>,
    nearby_radius_km: f64,
    inputs: watch::Sender<ExploreInputs>,
    state: watch::Receiver<ExploreState>,
    _task: Subscription,
}

impl ExploreViewModel {
    pub fn new(repo: Arc<EventRepository>, user_id: Option<String>) -> Self {
        let (inputs_tx, inputs_rx) = watch::channel(ExploreInputs::default());
        let (state_tx, state_rx) = watch::channel(ExploreState {
            load_state: LoadState::Loading,
            ..ExploreState::default()
        });
        let task = Subscription::spawn(run(repo.events(), inputs_rx, state_tx, user_id.clone()));
        Self {
            repo,
            user_id,
            nearby_radius_km: DEFAULT_NEARBY_RADIUS_KM,
            inputs: inputs_tx,
            state: state_rx,
            _task: task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ExploreState> {
        self.state.clone()
    }

    pub fn state(&self) -> ExploreState {
        self.state.borrow().clone()
    }

    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.inputs.send_if_modified(|inputs| {
            if inputs.query == query {
                return false;
            }
            inputs.query = query;
            true
        });
    }

    pub fn set_filter(&self, filter: FilterState) {
        self.inputs.send_if_modified(|inputs| {
            if inputs.filter == filter {
                return false;
            }
            inputs.filter = filter;
            true
        });
    }

    /// Derives the next filter from the current one, e.g. `|f| f.with_sort(..)`.
    pub fn update_filter<F>(&self, change: F)
    where
        F: FnOnce(&FilterState) -> FilterState,
    {
        let next = change(&self.inputs.borrow().filter);
        self.set_filter(next);
    }

    pub fn clear_filters(&self) {
        self.set_filter(FilterState::default());
    }

    /// Radius used by [`set_nearby`](Self::set_nearby), normally the
    /// configured `default_radius_km`.
    pub fn with_nearby_radius(mut self, radius_km: f64) -> Self {
        if radius_km.is_finite() && radius_km > 0.0 {
            self.nearby_radius_km = radius_km;
        }
        self
    }

    /// Turns the "near me" radius on (at the nearby radius) or off.
    pub fn set_nearby(&self, enabled: bool) {
        let radius = enabled.then_some(self.nearby_radius_km);
        self.update_filter(|filter| filter.with_radius_km(radius));
    }

    pub fn set_origin(&self, origin: Option<GeoPoint>) {
        self.inputs.send_if_modified(|inputs| {
            if inputs.origin == origin {
                return false;
            }
            inputs.origin = origin;
            true
        });
    }

    /// RSVP toggle for the signed-in user. Signed-out users get `false`.
    pub async fn toggle_registration(&self, event_id: &str) -> bool {
        match &self.user_id {
            Some(user_id) => self.repo.toggle_event_registration(event_id, user_id).await,
            None => false,
        }
    }
}

async fn run(
    mut events: watch::Receiver<Option<EventSnapshot>>,
    mut inputs: watch::Receiver<ExploreInputs>,
    state: watch::Sender<ExploreState>,
    user_id: Option<String>,
) {
    loop {
        let snapshot = events.borrow_and_update().clone();
        let current = inputs.borrow_and_update().clone();
        state.send_modify(|s| recompute(s, snapshot, current, user_id.as_deref()));

        tokio::select! {
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = inputs.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn recompute(
    state: &mut ExploreState,
    snapshot: Option<EventSnapshot>,
    inputs: ExploreInputs,
    user_id: Option<&str>,
) {
    if let Some(list) = snapshot {
        state.events = list.iter().map(|e| e.for_user(user_id)).collect();
        state.load_state = LoadState::Loaded;
    }
    let searched = filter::search_events(&state.events, &inputs.query);
    state.visible = filter::apply_filter(&searched, &inputs.filter, inputs.origin, Utc::now());
    state.query = inputs.query;
    state.filter = inputs.filter;
}
