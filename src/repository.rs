//! Event repository: the single source of truth the view-state holders read.
//!
//! Writes go straight to the document store and return `bool`/`Option`;
//! failures are logged and swallowed. The list itself only changes when the
//! store re-emits it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::Store;
use crate::error::{CacheError, StoreError};
use crate::filter;
use crate::models::{
    Attendee, Event, EventCategory, FilterState, GeoPoint, Notification, Ticket, UserProfile,
};
use crate::remote::{DocumentStore, EventSnapshot, RegistrationChange};

pub const GUEST_NAME: &str = "Guest";

/// Organizer input for a new event, before an id is assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub date_time: String,
    pub location: String,
    pub image_url: Option<String>,
    pub category: EventCategory,
    pub price: f64,
    pub currency: String,
}

impl EventDraft {
    pub fn into_event(self, id: String, organizer_id: &str) -> Event {
        Event {
            id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            date_time: self.date_time.trim().to_string(),
            location: self.location.trim().to_string(),
            image_url: self.image_url.filter(|url| !url.trim().is_empty()),
            category: self.category,
            price: self.price,
            currency: self.currency,
            organizer_id: organizer_id.to_string(),
            registered_user_ids: Vec::new(),
            is_registered: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CheckInOutcome {
    Admitted(Ticket),
    AlreadyUsed(Ticket),
    WrongEvent(Ticket),
    NotFound,
    Failed,
}

/// SQLite mirror of the events list, driven from async code.
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<Mutex<Store>>,
}

impl LocalCache {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, CacheError> {
        Ok(Self::new(Store::open(path)?))
    }

    async fn with_store<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Store) -> rusqlite::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || -> Result<T, CacheError> {
            let mut guard = store
                .lock()
                .map_err(|_| CacheError::Task("cache mutex poisoned".to_string()))?;
            Ok(op(&mut guard)?)
        })
        .await
        .map_err(|err| CacheError::Task(err.to_string()))?
    }

    pub async fn replace_all(&self, events: EventSnapshot) -> Result<(), CacheError> {
        self.with_store(move |store| store.replace_all(&events)).await
    }

    pub async fn list(&self) -> Result<Vec<Event>, CacheError> {
        self.with_store(|store| store.list_events()).await
    }

    pub async fn event(&self, id: &str) -> Result<Option<Event>, CacheError> {
        let id = id.to_string();
        self.with_store(move |store| store.get_event(&id)).await
    }

    pub async fn seed_if_empty(&self) -> Result<usize, CacheError> {
        self.with_store(|store| store.seed_if_empty()).await
    }
}

pub struct EventRepository {
    remote: Arc<dyn DocumentStore>,
    cache: Option<LocalCache>,
    mirror: Option<JoinHandle<()>>,
}

impl Drop for EventRepository {
    fn drop(&mut self) {
        if let Some(handle) = self.mirror.take() {
            handle.abort();
        }
    }
}

impl EventRepository {
    pub fn new(remote: Arc<dyn DocumentStore>) -> Self {
        Self {
            remote,
            cache: None,
            mirror: None,
        }
    }

    /// Mirrors every emitted list into `cache`. Must be called inside a tokio runtime.
    pub fn with_cache(mut self, cache: LocalCache) -> Self {
        let events = self.remote.events();
        let mirror_cache = cache.clone();
        self.mirror = Some(tokio::spawn(mirror_events(events, mirror_cache)));
        self.cache = Some(cache);
        self
    }

    pub fn events(&self) -> watch::Receiver<Option<EventSnapshot>> {
        self.remote.events()
    }

    /// Latest emitted list; empty before the first emission.
    pub fn current_events(&self) -> EventSnapshot {
        self.remote
            .events()
            .borrow()
            .clone()
            .unwrap_or_default()
    }

    pub fn event(&self, id: &str) -> Option<Event> {
        self.current_events().iter().find(|e| e.id == id).cloned()
    }

    pub fn search_events(&self, query: &str) -> Vec<Event> {
        filter::search_events(&self.current_events(), query)
    }

    pub fn filter_events(
        &self,
        filter: &FilterState,
        origin: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        filter::apply_filter(&self.current_events(), filter, origin, now)
    }

    pub fn events_by_organizer(&self, organizer_id: &str) -> Vec<Event> {
        self.current_events()
            .iter()
            .filter(|e| e.organizer_id == organizer_id)
            .cloned()
            .collect()
    }

    /// Cached list for display before the backend answers.
    pub async fn offline_events(&self) -> Vec<Event> {
        let Some(cache) = &self.cache else {
            return Vec::new();
        };
        match cache.list().await {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!("reading event cache failed: {err}");
                Vec::new()
            }
        }
    }

    /// Cached copy of one event, for a detail screen opened offline.
    pub async fn offline_event(&self, id: &str) -> Option<Event> {
        let cache = self.cache.as_ref()?;
        match cache.event(id).await {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(event_id = id, "reading cached event failed: {err}");
                None
            }
        }
    }

    /// Seeds sample events into an empty cache, but only while the store has
    /// not emitted a list yet. Once it has, the cache mirrors that list.
    pub async fn seed_cache_if_empty(&self) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        if self.remote.events().borrow().is_some() {
            return 0;
        }
        match cache.seed_if_empty().await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!("seeding event cache failed: {err}");
                0
            }
        }
    }

    pub async fn add_event(&self, event: Event) -> bool {
        let id = event.id.clone();
        log_write(
            "add event",
            &id,
            self.remote.add_event(event).await,
        )
    }

    pub async fn create_event(&self, draft: EventDraft, organizer_id: &str) -> Option<Event> {
        let event = draft.into_event(uuid::Uuid::new_v4().to_string(), organizer_id);
        if self.add_event(event.clone()).await {
            Some(event)
        } else {
            None
        }
    }

    /// Replaces the organizer-owned fields of the stored event. Registrations
    /// are never written from here; users registered in the store's latest
    /// list get a notification.
    pub async fn update_event(&self, event: Event) -> bool {
        let id = event.id.clone();
        let title = event.title.clone();
        let ok = log_write("update event", &id, self.remote.update_event(event).await);
        if ok {
            if let Some(current) = self.event(&id) {
                self.notify_registered(&current, &format!("\"{title}\" was updated"))
                    .await;
            }
        }
        ok
    }

    pub async fn delete_event(&self, id: &str) -> bool {
        let existing = self.event(id);
        let ok = log_write("delete event", id, self.remote.delete_event(id).await);
        if let (true, Some(event)) = (ok, existing) {
            self.notify_registered(&event, &format!("\"{}\" was cancelled", event.title))
                .await;
        }
        ok
    }

    /// Flips `user_id`'s membership based on the latest list, as one atomic
    /// union/remove on the store.
    pub async fn toggle_event_registration(&self, event_id: &str, user_id: &str) -> bool {
        let Some(event) = self.event(event_id) else {
            tracing::warn!(event_id, "toggle registration on unknown event");
            return false;
        };
        let change = if event.has_registered(user_id) {
            RegistrationChange::Remove
        } else {
            RegistrationChange::Add
        };
        self.set_registration(event_id, user_id, change).await
    }

    pub async fn set_registration(
        &self,
        event_id: &str,
        user_id: &str,
        change: RegistrationChange,
    ) -> bool {
        let result = self
            .remote
            .update_registration(event_id, user_id, change)
            .await;
        log_write("update registration", event_id, result)
    }

    /// Issues a ticket. The store registers the buyer in the same write, so a
    /// ticket never exists without its holder's registration.
    pub async fn purchase_ticket(&self, event_id: &str, user_id: &str) -> Option<Ticket> {
        let Some(event) = self.event(event_id) else {
            tracing::warn!(event_id, "purchase for unknown event");
            return None;
        };
        let ticket = Ticket::for_event(&event, user_id, Utc::now());
        if log_write(
            "issue ticket",
            &ticket.id,
            self.remote.issue_ticket(ticket.clone()).await,
        ) {
            Some(ticket)
        } else {
            None
        }
    }

    pub async fn tickets_for_user(&self, user_id: &str) -> Option<Vec<Ticket>> {
        log_read("tickets for user", self.remote.tickets_for_user(user_id).await)
    }

    pub async fn tickets_for_event(&self, event_id: &str) -> Option<Vec<Ticket>> {
        log_read(
            "tickets for event",
            self.remote.tickets_for_event(event_id).await,
        )
    }

    /// Ticket holders joined with their profiles. Superseded tickets are left out.
    pub async fn attendees(&self, event_id: &str) -> Option<Vec<Attendee>> {
        let tickets = self.tickets_for_event(event_id).await?;
        let mut attendees = Vec::with_capacity(tickets.len());
        for ticket in tickets.into_iter().filter(Ticket::is_active) {
            let profile = self.user(&ticket.user_id).await;
            attendees.push(attendee_from(ticket, profile));
        }
        Some(attendees)
    }

    /// Looks the scanned value up as a ticket code, then as a ticket id.
    /// When `event_id` is given the ticket must belong to that event.
    pub async fn check_in(&self, event_id: Option<&str>, scanned: &str) -> CheckInOutcome {
        let scanned = scanned.trim();
        let found = match self.remote.ticket_by_code(scanned).await {
            Ok(Some(ticket)) => Ok(Some(ticket)),
            Ok(None) => self.remote.ticket(scanned).await,
            Err(err) => Err(err),
        };
        let ticket = match found {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return CheckInOutcome::NotFound,
            Err(err) => {
                tracing::warn!("ticket lookup failed: {err}");
                return CheckInOutcome::Failed;
            }
        };

        if event_id.map_or(false, |id| id != ticket.event_id) {
            return CheckInOutcome::WrongEvent(ticket);
        }
        if !ticket.is_valid {
            return CheckInOutcome::AlreadyUsed(ticket);
        }

        match self.remote.invalidate_ticket(&ticket.id).await {
            Ok(used) => {
                tracing::info!(ticket_id = %used.id, event_id = %used.event_id, "ticket checked in");
                CheckInOutcome::Admitted(used)
            }
            Err(StoreError::AlreadyUsed(_)) => CheckInOutcome::AlreadyUsed(ticket),
            Err(err) => {
                tracing::warn!(ticket_id = %ticket.id, "check-in failed: {err}");
                CheckInOutcome::Failed
            }
        }
    }

    pub async fn reissue_ticket(&self, ticket_id: &str) -> Option<Ticket> {
        let old = log_read("ticket", self.remote.ticket(ticket_id).await).flatten()?;
        let replacement = old.reissued(Utc::now());
        log_read(
            "reissue ticket",
            self.remote.reissue_ticket(ticket_id, replacement).await,
        )
    }

    pub async fn transfer_ticket(&self, ticket_id: &str, new_user_id: &str) -> Option<Ticket> {
        log_read(
            "transfer ticket",
            self.remote.transfer_ticket(ticket_id, new_user_id).await,
        )
    }

    pub async fn user(&self, user_id: &str) -> Option<UserProfile> {
        log_read("user", self.remote.user(user_id).await).flatten()
    }

    pub async fn save_user(&self, profile: UserProfile) -> bool {
        let id = profile.id.clone();
        log_write("save user", &id, self.remote.upsert_user(profile).await)
    }

    pub async fn notifications_for(&self, user_id: &str) -> Option<Vec<Notification>> {
        log_read("notifications", self.remote.notifications_for(user_id).await)
    }

    pub async fn mark_notification_read(&self, id: &str) -> bool {
        log_write(
            "mark notification read",
            id,
            self.remote.mark_notification_read(id).await,
        )
    }

    async fn notify_registered(&self, event: &Event, message: &str) {
        for user_id in &event.registered_user_ids {
            let notification = Notification {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.clone(),
                event_id: event.id.clone(),
                message: message.to_string(),
                created_at: Utc::now(),
                read: false,
            };
            if let Err(err) = self.remote.push_notification(notification).await {
                tracing::warn!(user_id = %user_id, event_id = %event.id, "notification failed: {err}");
            }
        }
    }
}

fn attendee_from(ticket: Ticket, profile: Option<UserProfile>) -> Attendee {
    let (name, email, photo_url) = match profile {
        Some(p) if !p.display_name.trim().is_empty() => (p.display_name, p.email, p.photo_url),
        Some(p) => (GUEST_NAME.to_string(), p.email, p.photo_url),
        None => (GUEST_NAME.to_string(), None, None),
    };
    Attendee {
        ticket_id: ticket.id,
        user_id: ticket.user_id,
        name,
        email,
        photo_url,
        checked_in: !ticket.is_valid,
    }
}

fn log_write(action: &str, id: &str, result: Result<(), StoreError>) -> bool {
    match result {
        Ok(()) => {
            tracing::info!(id, "{action} ok");
            true
        }
        Err(err) => {
            tracing::warn!(id, "{action} failed: {err}");
            false
        }
    }
}

fn log_read<T>(what: &str, result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("{what} failed: {err}");
            None
        }
    }
}

async fn mirror_events(mut events: watch::Receiver<Option<EventSnapshot>>, cache: LocalCache) {
    loop {
        let latest = events.borrow_and_update().clone();
        if let Some(list) = latest {
            let count = list.len();
            match cache.replace_all(list).await {
                Ok(()) => tracing::debug!(count, "mirrored events into cache"),
                Err(err) => tracing::warn!("mirroring events failed: {err}"),
            }
        }
        if events.changed().await.is_err() {
            break;
        }
    }
}
