pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod remote;
pub mod repository;
pub mod telemetry;
pub mod utils;
pub mod viewmodel;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use config::{AppConfig, ConfigStore};
pub use error::{CacheError, ConfigError, StoreError, ValidationError};
pub use models::{
    Attendee, DateRange, Event, EventCategory, FilterState, GeoPoint, Notification, PriceType,
    SortOption, Ticket, UserProfile, UserRole,
};
pub use remote::{DocumentStore, EventSnapshot, MemoryDocumentStore, RegistrationChange};
pub use repository::{CheckInOutcome, EventDraft, EventRepository, LocalCache};

use viewmodel::{
    AttendeesViewModel, CreateEventViewModel, DashboardViewModel, EventDetailViewModel,
    ExploreViewModel, ProfileViewModel, TicketsViewModel,
};

/// Everything a host shell needs after startup: the loaded config and the
/// shared repository the screens are built on.
pub struct App {
    pub config: AppConfig,
    pub repository: Arc<EventRepository>,
}

/// Wires logging, the local cache and the repository. Must be called inside a
/// tokio runtime because the cache mirror runs as a background task.
pub async fn init(config: AppConfig, remote: Arc<dyn DocumentStore>) -> Result<App> {
    telemetry::init(&config.log_filter);

    let db_path = config.database_path();
    utils::ensure_parent(&db_path);
    let cache = LocalCache::open(&db_path)
        .with_context(|| format!("unable to open event cache at {}", db_path.display()))?;

    // Seed before the mirror starts so a list the store already emitted
    // always wins over the samples.
    let store_has_list = remote.events().borrow().is_some();
    if config.seed_cache_on_empty && !store_has_list {
        match cache.seed_if_empty().await {
            Ok(0) => {}
            Ok(seeded) => tracing::info!(seeded, "seeded empty event cache"),
            Err(err) => tracing::warn!("seeding event cache failed: {err}"),
        }
    }
    let repository = EventRepository::new(remote).with_cache(cache);

    tracing::info!(path = %db_path.display(), "eventdeck ready");
    Ok(App {
        config,
        repository: Arc::new(repository),
    })
}

impl App {
    pub fn user_id(&self) -> Option<&str> {
        self.config.current_user_id.as_deref()
    }

    pub fn explore(&self) -> ExploreViewModel {
        ExploreViewModel::new(
            Arc::clone(&self.repository),
            self.config.current_user_id.clone(),
        )
        .with_nearby_radius(self.config.default_radius_km)
    }

    pub fn event_detail(&self, event_id: &str) -> EventDetailViewModel {
        EventDetailViewModel::new(
            Arc::clone(&self.repository),
            event_id,
            self.config.current_user_id.clone(),
        )
    }

    /// Screens below need a signed-in user.
    fn require_user(&self) -> Result<String> {
        self.config
            .current_user_id
            .clone()
            .context("no signed-in user")
    }

    pub fn create_event(&self) -> Result<CreateEventViewModel> {
        Ok(CreateEventViewModel::new(
            Arc::clone(&self.repository),
            self.require_user()?,
        ))
    }

    pub fn dashboard(&self) -> Result<DashboardViewModel> {
        Ok(DashboardViewModel::new(
            Arc::clone(&self.repository),
            self.require_user()?,
        ))
    }

    pub fn tickets(&self) -> Result<TicketsViewModel> {
        Ok(TicketsViewModel::new(
            Arc::clone(&self.repository),
            self.require_user()?,
        ))
    }

    pub fn attendees(&self, event_id: &str) -> AttendeesViewModel {
        AttendeesViewModel::new(Arc::clone(&self.repository), event_id)
    }

    pub fn profile(&self) -> Result<ProfileViewModel> {
        Ok(ProfileViewModel::new(
            Arc::clone(&self.repository),
            self.require_user()?,
        ))
    }
}
