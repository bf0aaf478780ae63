//! Per-screen view-state holders.
//!
//! A holder owns one background task subscribed to the repository and
//! publishes its state on a `watch` channel. Dropping the holder aborts the
//! task, so a screen's subscription never outlives the screen.

mod attendees;
mod create;
mod dashboard;
mod detail;
mod explore;
mod profile;
mod tickets;

pub use attendees::{AttendeesState, AttendeesViewModel};
pub use create::{CreateEventViewModel, EventForm};
pub use dashboard::{DashboardState, DashboardStats, DashboardViewModel, TimeRange};
pub use detail::{EventDetailState, EventDetailViewModel};
pub use explore::{ExploreState, ExploreViewModel};
pub use profile::{ProfileState, ProfileViewModel};
pub use tickets::{TicketsState, TicketsViewModel};

use tokio::task::JoinHandle;

use crate::error::ValidationError;

/// `Idle → Loading → Loaded`. Only the dashboard and tickets holders go back
/// to `Loading`, and only on an explicit user action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        *self == LoadState::Loading
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome<T> {
    Saved(T),
    Invalid(Vec<ValidationError>),
    Failed,
}

impl<T> SubmitOutcome<T> {
    pub fn is_saved(&self) -> bool {
        matches!(self, SubmitOutcome::Saved(_))
    }
}

/// Background task tied to a holder's lifetime.
struct Subscription(JoinHandle<()>);

impl Subscription {
    fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Subscription(tokio::spawn(future))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.0.abort();
    }
}
