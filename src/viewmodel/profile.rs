use std::sync::Arc;

use tokio::sync::watch;

use super::{LoadState, SubmitOutcome, Subscription};
use crate::error::ValidationError;
use crate::models::{EventCategory, Notification, UserProfile};
use crate::repository::EventRepository;
use crate::utils;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileState {
    pub load_state: LoadState,
    /// A user without a stored profile gets an empty one with their id.
    pub profile: UserProfile,
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

pub struct ProfileViewModel {
    repo: Arc<EventRepository>,
    user_id: String,
    reload: watch::Sender<u64>,
    state: watch::Receiver<ProfileState>,
    _task: Subscription,
}

impl ProfileViewModel {
    pub fn new(repo: Arc<EventRepository>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let (reload_tx, reload_rx) = watch::channel(0u64);
        let (state_tx, state_rx) = watch::channel(ProfileState {
            load_state: LoadState::Loading,
            ..ProfileState::default()
        });
        let task = Subscription::spawn(run(Arc::clone(&repo), user_id.clone(), reload_rx, state_tx));
        Self {
            repo,
            user_id,
            reload: reload_tx,
            state: state_rx,
            _task: task,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        self.state.clone()
    }

    pub fn state(&self) -> ProfileState {
        self.state.borrow().clone()
    }

    pub async fn save(&self, mut profile: UserProfile) -> SubmitOutcome<UserProfile> {
        if utils::is_blank(&profile.display_name) {
            return SubmitOutcome::Invalid(vec![ValidationError::Blank("display name")]);
        }
        profile.id = self.user_id.clone();
        profile.display_name = utils::clean_text(&profile.display_name);
        profile.interests = normalize_interests(&profile.interests);

        if self.repo.save_user(profile.clone()).await {
            self.reload.send_modify(|generation| *generation += 1);
            SubmitOutcome::Saved(profile)
        } else {
            SubmitOutcome::Failed
        }
    }

    pub async fn mark_read(&self, notification_id: &str) -> bool {
        let ok = self.repo.mark_notification_read(notification_id).await;
        if ok {
            self.reload.send_modify(|generation| *generation += 1);
        }
        ok
    }
}

/// Interests are category names; unknown ones and duplicates are dropped.
fn normalize_interests(interests: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for interest in interests {
        let category = EventCategory::parse(interest);
        if category == EventCategory::Other && !interest.trim().eq_ignore_ascii_case("other") {
            continue;
        }
        let name = category.as_str().to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

async fn run(
    repo: Arc<EventRepository>,
    user_id: String,
    mut reload: watch::Receiver<u64>,
    state: watch::Sender<ProfileState>,
) {
    loop {
        reload.borrow_and_update();

        let profile = repo.user(&user_id).await;
        let notifications = repo.notifications_for(&user_id).await;
        state.send_modify(|s| {
            s.load_state = LoadState::Loaded;
            match profile {
                Some(profile) => s.profile = profile,
                None if s.profile.id.is_empty() => {
                    s.profile = UserProfile {
                        id: user_id.clone(),
                        ..UserProfile::default()
                    }
                }
                None => {}
            }
            if let Some(notifications) = notifications {
                s.unread = notifications.iter().filter(|n| !n.read).count();
                s.notifications = notifications;
            }
        });

        if reload.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, UserRole, DEFAULT_CURRENCY};
    use crate::remote::MemoryDocumentStore;
    use std::time::Duration;

    async fn wait_for<F>(rx: &mut watch::Receiver<ProfileState>, pred: F) -> ProfileState
    where
        F: FnMut(&ProfileState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("state in time")
            .expect("channel open")
            .clone()
    }

    #[test]
    fn interests_are_normalized() {
        let raw = vec![
            "music".to_string(),
            "Music".to_string(),
            "knitting".to_string(),
            " other ".to_string(),
        ];
        assert_eq!(
            normalize_interests(&raw),
            vec!["Music".to_string(), "Other".to_string()]
        );
    }

    #[tokio::test]
    async fn new_user_gets_empty_profile_and_can_save() {
        let repo = Arc::new(EventRepository::new(Arc::new(MemoryDocumentStore::new())));
        let vm = ProfileViewModel::new(repo.clone(), "u1");
        let mut rx = vm.subscribe();
        let state = wait_for(&mut rx, |s| s.load_state == LoadState::Loaded).await;
        assert_eq!(state.profile.id, "u1");
        assert_eq!(state.profile.role, UserRole::User);

        let blank = vm.save(UserProfile::default()).await;
        assert_eq!(
            blank,
            SubmitOutcome::Invalid(vec![ValidationError::Blank("display name")])
        );

        let saved = vm
            .save(UserProfile {
                display_name: " Ada  Lovelace ".to_string(),
                role: UserRole::Organizer,
                ..UserProfile::default()
            })
            .await;
        assert!(saved.is_saved());
        let state = wait_for(&mut rx, |s| s.profile.display_name == "Ada Lovelace").await;
        assert!(state.profile.is_organizer());
        assert!(repo.user("u1").await.is_some());
    }

    #[tokio::test]
    async fn notifications_and_unread_count() {
        let event = Event {
            id: "e1".to_string(),
            title: "Indie Fest".to_string(),
            description: String::new(),
            date_time: "2030-01-01T19:00:00Z".to_string(),
            location: "Boise".to_string(),
            image_url: None,
            category: EventCategory::Music,
            price: 0.0,
            currency: DEFAULT_CURRENCY.to_string(),
            organizer_id: "org".to_string(),
            registered_user_ids: vec!["u1".to_string()],
            is_registered: false,
        };
        let repo = Arc::new(EventRepository::new(Arc::new(
            MemoryDocumentStore::with_events(vec![event]),
        )));
        assert!(repo.delete_event("e1").await);

        let vm = ProfileViewModel::new(repo, "u1");
        let mut rx = vm.subscribe();
        let state = wait_for(&mut rx, |s| s.unread == 1).await;
        assert!(vm.mark_read(&state.notifications[0].id).await);
        wait_for(&mut rx, |s| s.unread == 0 && s.notifications.len() == 1).await;
    }
}
