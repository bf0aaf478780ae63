use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

static LAT_LNG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?\d{1,2}(?:\.\d+)?)\s*,\s*(-?\d{1,3}(?:\.\d+)?)\s*$")
        .expect("valid lat,lng regex")
});

const EARTH_RADIUS_KM: f64 = 6371.0;

pub const DEFAULT_CURRENCY: &str = "USD";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// RFC 3339 start time. Kept as the raw string the backend stores.
    pub date_time: String,
    /// Free text or a `"lat,lng"` pair.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: EventCategory,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub organizer_id: String,
    #[serde(default)]
    pub registered_user_ids: Vec<String>,
    /// Derived relative to the current user, never persisted.
    #[serde(skip)]
    pub is_registered: bool,
}

impl Event {
    pub fn is_free(&self) -> bool {
        self.price <= 0.0
    }

    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.date_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn coordinates(&self) -> Option<GeoPoint> {
        GeoPoint::parse(&self.location)
    }

    pub fn registration_count(&self) -> usize {
        self.registered_user_ids.len()
    }

    pub fn has_registered(&self, user_id: &str) -> bool {
        self.registered_user_ids.iter().any(|id| id == user_id)
    }

    /// Copy of the event with `is_registered` filled in for `user_id`.
    pub fn for_user(&self, user_id: Option<&str>) -> Event {
        let mut event = self.clone();
        event.is_registered = user_id.map_or(false, |id| self.has_registered(id));
        event
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    Music,
    Sports,
    Arts,
    Food,
    Technology,
    Business,
    Education,
    Community,
    #[default]
    Other,
}

impl EventCategory {
    pub const ALL: [EventCategory; 9] = [
        EventCategory::Music,
        EventCategory::Sports,
        EventCategory::Arts,
        EventCategory::Food,
        EventCategory::Technology,
        EventCategory::Business,
        EventCategory::Education,
        EventCategory::Community,
        EventCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Music => "Music",
            EventCategory::Sports => "Sports",
            EventCategory::Arts => "Arts",
            EventCategory::Food => "Food",
            EventCategory::Technology => "Technology",
            EventCategory::Business => "Business",
            EventCategory::Education => "Education",
            EventCategory::Community => "Community",
            EventCategory::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> EventCategory {
        let value = value.trim();
        EventCategory::ALL
            .iter()
            .copied()
            .find(|category| category.as_str().eq_ignore_ascii_case(value))
            .unwrap_or(EventCategory::Other)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventCategory {
    fn from(value: String) -> Self {
        EventCategory::parse(&value)
    }
}

impl From<EventCategory> for String {
    fn from(value: EventCategory) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Parses `"lat,lng"`; anything else (a street address, a venue name) is `None`.
    pub fn parse(text: &str) -> Option<GeoPoint> {
        let caps = LAT_LNG_RE.captures(text)?;
        let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let lng = caps.get(2)?.as_str().parse::<f64>().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(GeoPoint { lat, lng })
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub event_title: String,
    pub event_location: String,
    pub event_date_time: String,
    #[serde(default)]
    pub event_image_url: Option<String>,
    pub purchased_at: DateTime<Utc>,
    pub is_valid: bool,
    /// QR payload shown at the door.
    pub code: String,
    /// Set when this ticket was superseded by a reissue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
}

impl Ticket {
    pub fn for_event(event: &Event, user_id: &str, purchased_at: DateTime<Utc>) -> Ticket {
        let id = uuid::Uuid::new_v4().to_string();
        let code = ticket_code(&id, &event.id, user_id);
        Ticket {
            id,
            user_id: user_id.to_string(),
            event_id: event.id.clone(),
            event_title: event.title.clone(),
            event_location: event.location.clone(),
            event_date_time: event.date_time.clone(),
            event_image_url: event.image_url.clone(),
            purchased_at,
            is_valid: true,
            code,
            replaced_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.replaced_by.is_none()
    }

    /// Fresh valid ticket for the same holder and event. The used one stays on record.
    pub fn reissued(&self, issued_at: DateTime<Utc>) -> Ticket {
        let id = uuid::Uuid::new_v4().to_string();
        let code = ticket_code(&id, &self.event_id, &self.user_id);
        Ticket {
            id,
            purchased_at: issued_at,
            is_valid: true,
            code,
            replaced_by: None,
            ..self.clone()
        }
    }

    pub fn rotate_code(&mut self) {
        self.code = ticket_code(&self.id, &self.event_id, &self.user_id);
    }

    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.event_date_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Tickets with an unreadable date count as upcoming so they never vanish from the wallet.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.starts_at().map_or(true, |start| start >= now)
    }
}

pub fn ticket_code(ticket_id: &str, event_id: &str, user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticket_id.as_bytes());
    hasher.update(b"|");
    hasher.update(event_id.as_bytes());
    hasher.update(b"|");
    hasher.update(user_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub ticket_id: String,
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub checked_in: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Organizer,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub bio: String,
    pub photo_url: Option<String>,
    pub social_link: Option<String>,
    pub role: UserRole,
    pub interests: Vec<String>,
}

impl UserProfile {
    pub fn is_organizer(&self) -> bool {
        self.role == UserRole::Organizer
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DateRange {
    #[default]
    Any,
    Today,
    ThisWeek,
    ThisMonth,
    Custom {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PriceType {
    #[default]
    Any,
    Free,
    Paid,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOption {
    #[default]
    DateAscending,
    DateDescending,
    PriceLowToHigh,
    PriceHighToLow,
    Popularity,
    Distance,
}

/// Explore-screen filter. Each `with_*` call returns a new value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    pub date_range: DateRange,
    pub radius_km: Option<f64>,
    pub categories: BTreeSet<EventCategory>,
    pub price_type: PriceType,
    pub sort: SortOption,
}

impl FilterState {
    pub fn is_default(&self) -> bool {
        self == &FilterState::default()
    }

    pub fn with_date_range(&self, date_range: DateRange) -> FilterState {
        FilterState {
            date_range,
            ..self.clone()
        }
    }

    pub fn with_radius_km(&self, radius_km: Option<f64>) -> FilterState {
        FilterState {
            radius_km,
            ..self.clone()
        }
    }

    pub fn with_category(&self, category: EventCategory) -> FilterState {
        let mut categories = self.categories.clone();
        categories.insert(category);
        FilterState {
            categories,
            ..self.clone()
        }
    }

    pub fn without_category(&self, category: EventCategory) -> FilterState {
        let mut categories = self.categories.clone();
        categories.remove(&category);
        FilterState {
            categories,
            ..self.clone()
        }
    }

    pub fn with_price_type(&self, price_type: PriceType) -> FilterState {
        FilterState {
            price_type,
            ..self.clone()
        }
    }

    pub fn with_sort(&self, sort: SortOption) -> FilterState {
        FilterState {
            sort,
            ..self.clone()
        }
    }
}
