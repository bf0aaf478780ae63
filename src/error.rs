use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document store unavailable")]
    Unavailable,
    #[error("{collection} document not found: {id}")]
    NotFound { collection: &'static str, id: String },
    #[error("{collection} document already exists: {id}")]
    AlreadyExists { collection: &'static str, id: String },
    #[error("ticket already used: {0}")]
    AlreadyUsed(String),
    #[error("ticket is not valid: {0}")]
    InvalidTicket(String),
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub(crate) fn not_found(collection: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            collection,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("config mutex poisoned")]
    Poisoned,
}

/// Inline form errors shown next to the offending field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Blank(&'static str),
    #[error("price must be a non-negative number")]
    InvalidPrice,
    #[error("date must be an RFC 3339 timestamp")]
    InvalidDate,
}
