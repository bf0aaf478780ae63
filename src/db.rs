use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Event, EventCategory, DEFAULT_CURRENCY};
use crate::utils;

const EVENT_COLUMNS: &str = "id, title, description, date_time, location, image_url, category, \
                             price, currency, organizer_id, registered_user_ids";

/// Local mirror of the `events` collection, for offline display.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                date_time TEXT NOT NULL,
                location TEXT NOT NULL,
                image_url TEXT,
                category TEXT NOT NULL,
                price REAL NOT NULL,
                currency TEXT NOT NULL,
                organizer_id TEXT NOT NULL,
                registered_user_ids TEXT NOT NULL,
                cached_at_utc TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Seeds sample events into an empty table. Returns how many rows were written.
    pub fn seed_if_empty(&self) -> rusqlite::Result<usize> {
        if self.count()? > 0 {
            return Ok(0);
        }

        let now = Utc::now();
        let samples = vec![
            sample_event(
                "seed-indie-fest",
                "Indie Fest",
                "43.6150,-116.2023",
                EventCategory::Music,
                0.0,
                now + Duration::days(1),
            ),
            sample_event(
                "seed-food-trucks",
                "Food Truck Rally",
                "Julia Davis Park",
                EventCategory::Food,
                0.0,
                now + Duration::days(6),
            ),
            sample_event(
                "seed-rust-meetup",
                "Rust Meetup",
                "43.6187,-116.2146",
                EventCategory::Technology,
                15.0,
                now + Duration::days(14),
            ),
        ];

        for event in &samples {
            self.upsert_event(event)?;
        }
        tracing::info!(count = samples.len(), "seeded local event cache");

        Ok(samples.len())
    }

    pub fn upsert_event(&self, event: &Event) -> rusqlite::Result<()> {
        upsert_with(&self.conn, event)
    }

    /// Replaces the whole table with `events` in one transaction.
    pub fn replace_all(&mut self, events: &[Event]) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM events", [])?;
        for event in events {
            upsert_with(&tx, event)?;
        }
        tx.commit()
    }

    pub fn list_events(&self) -> rusqlite::Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY date_time, id"
        ))?;
        let rows = stmt.query_map([], event_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_event(&self, id: &str) -> rusqlite::Result<Option<Event>> {
        self.conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![id],
                event_from_row,
            )
            .optional()
    }

    pub fn count(&self) -> rusqlite::Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

fn upsert_with(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    let registered = serde_json::to_string(&event.registered_user_ids)
        .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO events (id, title, description, date_time, location, image_url, category,
                             price, currency, organizer_id, registered_user_ids, cached_at_utc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           description = excluded.description,
           date_time = excluded.date_time,
           location = excluded.location,
           image_url = excluded.image_url,
           category = excluded.category,
           price = excluded.price,
           currency = excluded.currency,
           organizer_id = excluded.organizer_id,
           registered_user_ids = excluded.registered_user_ids,
           cached_at_utc = excluded.cached_at_utc",
        params![
            event.id,
            event.title,
            event.description,
            event.date_time,
            event.location,
            event.image_url,
            event.category.as_str(),
            event.price,
            event.currency,
            event.organizer_id,
            registered,
            now
        ],
    )?;
    Ok(())
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let category: String = row.get(6)?;
    let registered: String = row.get(10)?;
    let registered_user_ids: Vec<String> = serde_json::from_str(&registered).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            registered.len(),
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })?;

    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date_time: row.get(3)?,
        location: row.get(4)?,
        image_url: row.get(5)?,
        category: EventCategory::parse(&category),
        price: row.get(7)?,
        currency: row.get(8)?,
        organizer_id: row.get(9)?,
        registered_user_ids,
        is_registered: false,
    })
}

fn sample_event(
    id: &str,
    title: &str,
    location: &str,
    category: EventCategory,
    price: f64,
    start: DateTime<Utc>,
) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("{title} (sample event)"),
        date_time: start.to_rfc3339(),
        location: location.to_string(),
        image_url: None,
        category,
        price,
        currency: DEFAULT_CURRENCY.to_string(),
        organizer_id: "seed".to_string(),
        registered_user_ids: Vec::new(),
        is_registered: false,
    }
}
