use std::sync::Arc;

use tokio::sync::watch;

use super::{LoadState, Subscription};
use crate::models::{Attendee, Event};
use crate::repository::{CheckInOutcome, EventRepository};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttendeesState {
    pub load_state: LoadState,
    pub event: Option<Event>,
    pub attendees: Vec<Attendee>,
    pub checked_in: usize,
}

/// Organizer's attendee list and door scanner for one event.
pub struct AttendeesViewModel {
    repo: Arc<EventRepository>,
    event_id: String,
    reload: watch::Sender<u64>,
    state: watch::Receiver<AttendeesState>,
    _task: Subscription,
}

impl AttendeesViewModel {
    pub fn new(repo: Arc<EventRepository>, event_id: impl Into<String>) -> Self {
        let event_id = event_id.into();
        let (reload_tx, reload_rx) = watch::channel(0u64);
        let (state_tx, state_rx) = watch::channel(AttendeesState {
            load_state: LoadState::Loading,
            ..AttendeesState::default()
        });
        let task = Subscription::spawn(run(
            Arc::clone(&repo),
            event_id.clone(),
            reload_rx,
            state_tx,
        ));
        Self {
            repo,
            event_id,
            reload: reload_tx,
            state: state_rx,
            _task: task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AttendeesState> {
        self.state.clone()
    }

    pub fn state(&self) -> AttendeesState {
        self.state.borrow().clone()
    }

    /// Checks the attendee in, or, if already in, reissues their ticket so
    /// they show as not checked in again. A used ticket itself never becomes
    /// valid.
    pub async fn toggle_check_in(&self, ticket_id: &str) -> bool {
        let checked_in = self
            .state
            .borrow()
            .attendees
            .iter()
            .find(|a| a.ticket_id == ticket_id)
            .map(|a| a.checked_in);

        let ok = match checked_in {
            None => false,
            Some(false) => matches!(
                self.repo.check_in(Some(&self.event_id), ticket_id).await,
                CheckInOutcome::Admitted(_)
            ),
            Some(true) => self.repo.reissue_ticket(ticket_id).await.is_some(),
        };
        if ok {
            self.reload();
        }
        ok
    }

    /// Door scan of a QR payload (or a typed ticket id).
    pub async fn scan(&self, code: &str) -> CheckInOutcome {
        let outcome = self.repo.check_in(Some(&self.event_id), code).await;
        if matches!(outcome, CheckInOutcome::Admitted(_)) {
            self.reload();
        }
        outcome
    }

    fn reload(&self) {
        self.reload.send_modify(|generation| *generation += 1);
    }
}

async fn run(
    repo: Arc<EventRepository>,
    event_id: String,
    mut reload: watch::Receiver<u64>,
    state: watch::Sender<AttendeesState>,
) {
    let mut events = repo.events();
    loop {
        reload.borrow_and_update();
        let snapshot = events.borrow_and_update().clone();

        if let Some(list) = snapshot {
            let event = list.iter().find(|e| e.id == event_id).cloned();
            match repo.attendees(&event_id).await {
                Some(attendees) => {
                    let checked_in = attendees.iter().filter(|a| a.checked_in).count();
                    state.send_replace(AttendeesState {
                        load_state: LoadState::Loaded,
                        event,
                        attendees,
                        checked_in,
                    });
                }
                None => state.send_modify(|s| {
                    s.load_state = LoadState::Loaded;
                    s.event = event;
                }),
            }
        }

        tokio::select! {
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = reload.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
