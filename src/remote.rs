//! Remote document store adapter.
//!
//! [`DocumentStore`] is the seam between the app and the managed cloud
//! database. The events collection is observable: every change re-emits the
//! whole list on a `watch` channel, so readers always see the latest full
//! list and may skip intermediate ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::models::{Event, Notification, Ticket, UserProfile};

pub type EventSnapshot = Arc<Vec<Event>>;

const EVENTS: &str = "events";
const TICKETS: &str = "tickets";
const USERS: &str = "users";
const NOTIFICATIONS: &str = "notifications";

/// Field-level array update on `registeredUserIds`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationChange {
    Add,
    Remove,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `None` until the first full list has been received.
    fn events(&self) -> watch::Receiver<Option<EventSnapshot>>;

    async fn add_event(&self, event: Event) -> Result<(), StoreError>;
    /// Replaces the organizer-owned fields. `registeredUserIds` is left as the
    /// store has it; only [`update_registration`](Self::update_registration)
    /// and [`issue_ticket`](Self::issue_ticket) change it.
    async fn update_event(&self, event: Event) -> Result<(), StoreError>;
    async fn delete_event(&self, id: &str) -> Result<(), StoreError>;

    /// Applied atomically by the store. Adding a present id or removing an
    /// absent one succeeds without changing anything.
    async fn update_registration(
        &self,
        event_id: &str,
        user_id: &str,
        change: RegistrationChange,
    ) -> Result<(), StoreError>;

    /// Stores the ticket and adds its holder to the event's registrations in
    /// the same write.
    async fn issue_ticket(&self, ticket: Ticket) -> Result<(), StoreError>;
    async fn ticket(&self, id: &str) -> Result<Option<Ticket>, StoreError>;
    async fn ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, StoreError>;
    async fn tickets_for_user(&self, user_id: &str) -> Result<Vec<Ticket>, StoreError>;
    async fn tickets_for_event(&self, event_id: &str) -> Result<Vec<Ticket>, StoreError>;
    /// Marks a valid ticket as used. Fails with `AlreadyUsed` otherwise.
    async fn invalidate_ticket(&self, id: &str) -> Result<Ticket, StoreError>;
    /// Supersedes `id` with `replacement`; the old record stays, invalid.
    async fn reissue_ticket(&self, id: &str, replacement: Ticket) -> Result<Ticket, StoreError>;
    async fn transfer_ticket(&self, id: &str, new_user_id: &str) -> Result<Ticket, StoreError>;

    async fn user(&self, id: &str) -> Result<Option<UserProfile>, StoreError>;
    async fn upsert_user(&self, profile: UserProfile) -> Result<(), StoreError>;

    async fn push_notification(&self, notification: Notification) -> Result<(), StoreError>;
    async fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>, StoreError>;
    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Collections {
    events: HashMap<String, Event>,
    tickets: HashMap<String, Ticket>,
    users: HashMap<String, UserProfile>,
    notifications: Vec<Notification>,
}

impl Collections {
    fn event_snapshot(&self) -> EventSnapshot {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| a.date_time.cmp(&b.date_time).then_with(|| a.id.cmp(&b.id)));
        Arc::new(events)
    }

    fn ticket_mut(&mut self, id: &str) -> Result<&mut Ticket, StoreError> {
        self.tickets
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(TICKETS, id))
    }
}

/// In-process document store with the same contract as the cloud backend.
///
/// Starts online unless built with [`MemoryDocumentStore::offline`]; while
/// offline every call fails with [`StoreError::Unavailable`].
pub struct MemoryDocumentStore {
    data: Mutex<Collections>,
    online: AtomicBool,
    events_tx: watch::Sender<Option<EventSnapshot>>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_events(Vec::new())
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        let data = Collections {
            events: events.into_iter().map(|e| (e.id.clone(), e)).collect(),
            ..Collections::default()
        };
        let (events_tx, _) = watch::channel(Some(data.event_snapshot()));
        Self {
            data: Mutex::new(data),
            online: AtomicBool::new(true),
            events_tx,
        }
    }

    /// A store that has not reached the backend yet: no list is emitted until
    /// [`set_online`](Self::set_online) is called with `true`.
    pub fn offline(events: Vec<Event>) -> Self {
        let store = Self::with_events(events);
        store.online.store(false, Ordering::SeqCst);
        store.events_tx.send_replace(None);
        store
    }

    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            tracing::info!("document store back online");
            if let Ok(data) = self.data.lock() {
                self.events_tx.send_replace(Some(data.event_snapshot()));
            }
        } else if !online && was_online {
            tracing::warn!("document store went offline");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        if !self.is_online() {
            return Err(StoreError::Unavailable);
        }
        self.data.lock().map_err(|_| StoreError::Poisoned)
    }

    fn publish(&self, data: &Collections) {
        let snapshot = data.event_snapshot();
        tracing::debug!(count = snapshot.len(), "events collection changed");
        self.events_tx.send_replace(Some(snapshot));
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn events(&self) -> watch::Receiver<Option<EventSnapshot>> {
        self.events_tx.subscribe()
    }

    async fn add_event(&self, event: Event) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        if data.events.contains_key(&event.id) {
            return Err(StoreError::AlreadyExists {
                collection: EVENTS,
                id: event.id,
            });
        }
        data.events.insert(event.id.clone(), event);
        self.publish(&data);
        Ok(())
    }

    async fn update_event(&self, event: Event) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        match data.events.get_mut(&event.id) {
            Some(existing) => {
                let registered = std::mem::take(&mut existing.registered_user_ids);
                *existing = Event {
                    registered_user_ids: registered,
                    is_registered: false,
                    ..event
                };
            }
            None => return Err(StoreError::not_found(EVENTS, &event.id)),
        }
        self.publish(&data);
        Ok(())
    }

    async fn delete_event(&self, id: &str) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        if data.events.remove(id).is_none() {
            return Err(StoreError::not_found(EVENTS, id));
        }
        self.publish(&data);
        Ok(())
    }

    async fn update_registration(
        &self,
        event_id: &str,
        user_id: &str,
        change: RegistrationChange,
    ) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        let event = data
            .events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::not_found(EVENTS, event_id))?;
        let present = event.has_registered(user_id);
        let changed = match change {
            RegistrationChange::Add if !present => {
                event.registered_user_ids.push(user_id.to_string());
                true
            }
            RegistrationChange::Remove if present => {
                event.registered_user_ids.retain(|id| id != user_id);
                true
            }
            _ => false,
        };
        if changed {
            self.publish(&data);
        }
        Ok(())
    }

    async fn issue_ticket(&self, ticket: Ticket) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        if data.tickets.contains_key(&ticket.id) {
            return Err(StoreError::AlreadyExists {
                collection: TICKETS,
                id: ticket.id,
            });
        }
        let event = data
            .events
            .get_mut(&ticket.event_id)
            .ok_or_else(|| StoreError::not_found(EVENTS, &ticket.event_id))?;
        let newly_registered = !event.has_registered(&ticket.user_id);
        if newly_registered {
            event.registered_user_ids.push(ticket.user_id.clone());
        }
        data.tickets.insert(ticket.id.clone(), ticket);
        if newly_registered {
            self.publish(&data);
        }
        Ok(())
    }

    async fn ticket(&self, id: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self.lock()?.tickets.get(id).cloned())
    }

    async fn ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, StoreError> {
        let data = self.lock()?;
        Ok(data.tickets.values().find(|t| t.code == code).cloned())
    }

    async fn tickets_for_user(&self, user_id: &str) -> Result<Vec<Ticket>, StoreError> {
        let data = self.lock()?;
        let mut tickets: Vec<Ticket> = data
            .tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.purchased_at.cmp(&b.purchased_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tickets)
    }

    async fn tickets_for_event(&self, event_id: &str) -> Result<Vec<Ticket>, StoreError> {
        let data = self.lock()?;
        let mut tickets: Vec<Ticket> = data
            .tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.purchased_at.cmp(&b.purchased_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tickets)
    }

    async fn invalidate_ticket(&self, id: &str) -> Result<Ticket, StoreError> {
        let mut data = self.lock()?;
        let ticket = data.ticket_mut(id)?;
        if !ticket.is_valid {
            return Err(StoreError::AlreadyUsed(id.to_string()));
        }
        ticket.is_valid = false;
        Ok(ticket.clone())
    }

    async fn reissue_ticket(&self, id: &str, replacement: Ticket) -> Result<Ticket, StoreError> {
        let mut data = self.lock()?;
        if data.tickets.contains_key(&replacement.id) {
            return Err(StoreError::AlreadyExists {
                collection: TICKETS,
                id: replacement.id,
            });
        }
        let old = data.ticket_mut(id)?;
        if !old.is_active() {
            return Err(StoreError::InvalidTicket(id.to_string()));
        }
        old.is_valid = false;
        old.replaced_by = Some(replacement.id.clone());
        data.tickets
            .insert(replacement.id.clone(), replacement.clone());
        Ok(replacement)
    }

    async fn transfer_ticket(&self, id: &str, new_user_id: &str) -> Result<Ticket, StoreError> {
        let mut data = self.lock()?;
        let ticket = data.ticket_mut(id)?;
        if !ticket.is_valid || !ticket.is_active() {
            return Err(StoreError::InvalidTicket(id.to_string()));
        }
        ticket.user_id = new_user_id.to_string();
        ticket.rotate_code();
        Ok(ticket.clone())
    }

    async fn user(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        data.users.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn push_notification(&self, notification: Notification) -> Result<(), StoreError> {
        self.lock()?.notifications.push(notification);
        Ok(())
    }

    async fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>, StoreError> {
        let data = self.lock()?;
        let mut out: Vec<Notification> = data
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError> {
        let mut data = self.lock()?;
        let notification = data
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::not_found(NOTIFICATIONS, id))?;
        notification.read = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventCategory, DEFAULT_CURRENCY};
    use chrono::Utc;

    fn event(id: &str, date_time: &str) -> Event {
        Event {
            id: id.to_string(),
            title: format!("Event {id}"),
            description: String::new(),
            date_time: date_time.to_string(),
            location: "Boise".to_string(),
            image_url: None,
            category: EventCategory::Community,
            price: 0.0,
            currency: DEFAULT_CURRENCY.to_string(),
            organizer_id: "org".to_string(),
            registered_user_ids: Vec::new(),
            is_registered: false,
        }
    }

    fn current(store: &MemoryDocumentStore) -> Vec<Event> {
        store
            .events()
            .borrow()
            .as_ref()
            .map(|list| list.as_ref().clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn emits_full_list_ordered_by_date() {
        let store = MemoryDocumentStore::new();
        let mut rx = store.events();
        store
            .add_event(event("b", "2026-02-01T00:00:00Z"))
            .await
            .expect("add b");
        store
            .add_event(event("a", "2026-01-01T00:00:00Z"))
            .await
            .expect("add a");
        rx.changed().await.expect("changed");
        let ids: Vec<String> = current(&store).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryDocumentStore::with_events(vec![event("a", "2026-01-01T00:00:00Z")]);
        let err = store
            .add_event(event("a", "2026-03-01T00:00:00Z"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(current(&store).len(), 1);
    }

    #[tokio::test]
    async fn registration_union_and_remove_are_idempotent() {
        let store = MemoryDocumentStore::with_events(vec![event("e1", "2026-01-01T00:00:00Z")]);
        for _ in 0..2 {
            store
                .update_registration("e1", "u1", RegistrationChange::Add)
                .await
                .expect("add");
        }
        assert_eq!(current(&store)[0].registered_user_ids, vec!["u1".to_string()]);

        for _ in 0..2 {
            store
                .update_registration("e1", "u1", RegistrationChange::Remove)
                .await
                .expect("remove");
        }
        assert!(current(&store)[0].registered_user_ids.is_empty());
    }

    #[tokio::test]
    async fn concurrent_registrations_are_not_lost() {
        let store = Arc::new(MemoryDocumentStore::with_events(vec![event(
            "e1",
            "2026-01-01T00:00:00Z",
        )]));
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update_registration("e1", &format!("u{i}"), RegistrationChange::Add)
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("register");
        }
        assert_eq!(current(&store)[0].registration_count(), 20);
    }

    #[tokio::test]
    async fn offline_store_emits_nothing_until_online() {
        let store = MemoryDocumentStore::offline(vec![event("a", "2026-01-01T00:00:00Z")]);
        let mut rx = store.events();
        assert!(rx.borrow().is_none());
        assert_eq!(
            store.delete_event("a").await.expect_err("offline"),
            StoreError::Unavailable
        );

        store.set_online(true);
        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow().as_ref().map(|l| l.len()), Some(1));
    }

    #[tokio::test]
    async fn used_ticket_cannot_be_used_again() {
        let store = MemoryDocumentStore::with_events(vec![event("e1", "2026-01-01T00:00:00Z")]);
        let ticket = Ticket::for_event(&current(&store)[0], "u1", Utc::now());
        store.issue_ticket(ticket.clone()).await.expect("issue");

        let used = store.invalidate_ticket(&ticket.id).await.expect("check in");
        assert!(!used.is_valid);
        assert_eq!(
            store.invalidate_ticket(&ticket.id).await.expect_err("reuse"),
            StoreError::AlreadyUsed(ticket.id.clone())
        );
        assert!(matches!(
            store.transfer_ticket(&ticket.id, "u2").await,
            Err(StoreError::InvalidTicket(_))
        ));

        let fresh = store
            .reissue_ticket(&ticket.id, used.reissued(Utc::now()))
            .await
            .expect("reissue");
        assert!(fresh.is_valid);
        let old = store.ticket(&ticket.id).await.expect("get").expect("kept");
        assert!(!old.is_valid);
        assert_eq!(old.replaced_by.as_deref(), Some(fresh.id.as_str()));
        assert_eq!(store.tickets_for_user("u1").await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn transfer_moves_holder_and_rotates_code() {
        let store = MemoryDocumentStore::with_events(vec![event("e1", "2026-01-01T00:00:00Z")]);
        let ticket = Ticket::for_event(&current(&store)[0], "u1", Utc::now());
        store.issue_ticket(ticket.clone()).await.expect("issue");

        let moved = store.transfer_ticket(&ticket.id, "u2").await.expect("transfer");
        assert_eq!(moved.user_id, "u2");
        assert_ne!(moved.code, ticket.code);
        assert!(store.ticket_by_code(&ticket.code).await.expect("lookup").is_none());
        assert!(store.tickets_for_user("u1").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn update_leaves_registrations_alone() {
        let store = MemoryDocumentStore::with_events(vec![event("e1", "2026-01-01T00:00:00Z")]);
        let stale = current(&store)[0].clone();
        store
            .update_registration("e1", "u1", RegistrationChange::Add)
            .await
            .expect("register");

        let edited = Event {
            title: "Renamed".to_string(),
            ..stale
        };
        store.update_event(edited).await.expect("update");
        let stored = &current(&store)[0];
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.registered_user_ids, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn issuing_a_ticket_registers_the_holder_once() {
        let store = MemoryDocumentStore::with_events(vec![event("e1", "2026-01-01T00:00:00Z")]);
        let first = Ticket::for_event(&current(&store)[0], "u1", Utc::now());
        let second = Ticket::for_event(&current(&store)[0], "u1", Utc::now());
        store.issue_ticket(first).await.expect("issue");
        store.issue_ticket(second).await.expect("issue again");
        assert_eq!(current(&store)[0].registered_user_ids, vec!["u1".to_string()]);
        assert_eq!(store.tickets_for_event("e1").await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn tickets_require_an_existing_event() {
        let store = MemoryDocumentStore::new();
        let ticket = Ticket::for_event(&event("ghost", "2026-01-01T00:00:00Z"), "u1", Utc::now());
        assert!(matches!(
            store.issue_ticket(ticket).await,
            Err(StoreError::NotFound { collection: "events", .. })
        ));
    }
}
