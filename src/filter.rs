//! Search and filter predicates over an in-memory event list.
//!
//! Everything here is pure: callers pass the list, the clock and the user's
//! position, and get a new list back.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::{DateRange, Event, FilterState, GeoPoint, PriceType, SortOption};

/// Case-insensitive substring match on title or location.
/// A blank query returns the list unchanged.
pub fn search_events(events: &[Event], query: &str) -> Vec<Event> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return events.to_vec();
    }
    events
        .iter()
        .filter(|event| matches_query(event, &needle))
        .cloned()
        .collect()
}

fn matches_query(event: &Event, needle: &str) -> bool {
    event.title.to_lowercase().contains(needle) || event.location.to_lowercase().contains(needle)
}

/// Applies every active dimension of `filter` (ANDed), then sorts.
///
/// A default filter returns the list exactly as given, order included.
/// The radius only applies when `origin` is known; events whose location is
/// not a `"lat,lng"` pair are dropped while a radius is active.
pub fn apply_filter(
    events: &[Event],
    filter: &FilterState,
    origin: Option<GeoPoint>,
    now: DateTime<Utc>,
) -> Vec<Event> {
    if filter.is_default() {
        return events.to_vec();
    }
    let mut out: Vec<Event> = events
        .iter()
        .filter(|event| matches_filter(event, filter, origin, now))
        .cloned()
        .collect();
    sort_events(&mut out, filter.sort, origin);
    out
}

pub fn matches_filter(
    event: &Event,
    filter: &FilterState,
    origin: Option<GeoPoint>,
    now: DateTime<Utc>,
) -> bool {
    matches_date(event, &filter.date_range, now)
        && matches_radius(event, filter.radius_km, origin)
        && (filter.categories.is_empty() || filter.categories.contains(&event.category))
        && matches_price(event, filter.price_type)
}

fn matches_date(event: &Event, range: &DateRange, now: DateTime<Utc>) -> bool {
    if *range == DateRange::Any {
        return true;
    }
    let Some(start) = event.starts_at() else {
        return false;
    };
    match range {
        DateRange::Any => true,
        DateRange::Today => start.date_naive() == now.date_naive(),
        DateRange::ThisWeek => {
            let day_start = start_of_day(now);
            start >= day_start && start < day_start + Duration::days(7)
        }
        DateRange::ThisMonth => start.year() == now.year() && start.month() == now.month(),
        DateRange::Custom { from, to } => start >= *from && start <= *to,
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

fn matches_radius(event: &Event, radius_km: Option<f64>, origin: Option<GeoPoint>) -> bool {
    let (Some(radius), Some(origin)) = (radius_km, origin) else {
        return true;
    };
    event
        .coordinates()
        .map_or(false, |point| origin.distance_km(&point) <= radius)
}

fn matches_price(event: &Event, price_type: PriceType) -> bool {
    match price_type {
        PriceType::Any => true,
        PriceType::Free => event.is_free(),
        PriceType::Paid => !event.is_free(),
    }
}

/// Stable sort; ties fall back to start time, then id. Events without a
/// readable start time sort last in both date directions.
pub fn sort_events(events: &mut [Event], sort: SortOption, origin: Option<GeoPoint>) {
    match sort {
        SortOption::DateAscending => events.sort_by(by_date),
        SortOption::DateDescending => events.sort_by(by_date_desc),
        SortOption::PriceLowToHigh => {
            events.sort_by(|a, b| a.price.total_cmp(&b.price).then_with(|| by_date(a, b)))
        }
        SortOption::PriceHighToLow => {
            events.sort_by(|a, b| b.price.total_cmp(&a.price).then_with(|| by_date(a, b)))
        }
        SortOption::Popularity => events.sort_by(|a, b| {
            b.registration_count()
                .cmp(&a.registration_count())
                .then_with(|| by_date(a, b))
        }),
        SortOption::Distance => match origin {
            Some(origin) => events.sort_by(|a, b| {
                let da = a.coordinates().map(|p| origin.distance_km(&p));
                let db = b.coordinates().map(|p| origin.distance_km(&p));
                by_distance(da, db).then_with(|| by_date(a, b))
            }),
            None => events.sort_by(by_date),
        },
    }
}

fn by_date(a: &Event, b: &Event) -> Ordering {
    match (a.starts_at(), b.starts_at()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn by_date_desc(a: &Event, b: &Event) -> Ordering {
    match (a.starts_at(), b.starts_at()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

// Unknown distances sort last.
fn by_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
