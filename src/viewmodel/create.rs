use std::sync::Arc;

use chrono::DateTime;

use super::SubmitOutcome;
use crate::error::ValidationError;
use crate::models::{Event, EventCategory, DEFAULT_CURRENCY};
use crate::repository::{EventDraft, EventRepository};
use crate::utils;

/// Raw form input, as typed.
#[derive(Clone, Debug, PartialEq)]
pub struct EventForm {
    pub title: String,
    pub description: String,
    pub date_time: String,
    pub location: String,
    pub image_url: String,
    pub category: EventCategory,
    pub price: String,
    pub currency: String,
}

impl Default for EventForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            date_time: String::new(),
            location: String::new(),
            image_url: String::new(),
            category: EventCategory::Other,
            price: "0".to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl EventForm {
    pub fn from_event(event: &Event) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            date_time: event.date_time.clone(),
            location: event.location.clone(),
            image_url: event.image_url.clone().unwrap_or_default(),
            category: event.category,
            price: event.price.to_string(),
            currency: event.currency.clone(),
        }
    }

    /// Every problem with the form, in field order. Empty means valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (name, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("date", &self.date_time),
            ("location", &self.location),
        ] {
            if utils::is_blank(value) {
                errors.push(ValidationError::Blank(name));
            }
        }
        if !utils::is_blank(&self.date_time)
            && DateTime::parse_from_rfc3339(self.date_time.trim()).is_err()
        {
            errors.push(ValidationError::InvalidDate);
        }
        if parse_price(&self.price).is_none() {
            errors.push(ValidationError::InvalidPrice);
        }
        errors
    }

    pub fn to_draft(&self) -> Result<EventDraft, Vec<ValidationError>> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(errors);
        }
        let currency = if utils::is_blank(&self.currency) {
            DEFAULT_CURRENCY.to_string()
        } else {
            self.currency.trim().to_uppercase()
        };
        Ok(EventDraft {
            title: utils::clean_text(&self.title),
            description: self.description.trim().to_string(),
            date_time: self.date_time.trim().to_string(),
            location: utils::clean_text(&self.location),
            image_url: Some(self.image_url.trim().to_string()),
            category: self.category,
            price: parse_price(&self.price).unwrap_or(0.0),
            currency,
        })
    }
}

fn parse_price(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0.0);
    }
    text.parse::<f64>()
        .ok()
        .filter(|price| price.is_finite() && *price >= 0.0)
}

/// Create-event screen; also used to edit an existing event.
pub struct CreateEventViewModel {
    repo: Arc<EventRepository>,
    organizer_id: String,
    editing: Option<Event>,
    pub form: EventForm,
    submitting: bool,
}

impl CreateEventViewModel {
    pub fn new(repo: Arc<EventRepository>, organizer_id: impl Into<String>) -> Self {
        Self {
            repo,
            organizer_id: organizer_id.into(),
            editing: None,
            form: EventForm::default(),
            submitting: false,
        }
    }

    pub fn edit(repo: Arc<EventRepository>, event: Event) -> Self {
        Self {
            repo,
            organizer_id: event.organizer_id.clone(),
            form: EventForm::from_event(&event),
            editing: Some(event),
            submitting: false,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        self.form.validate()
    }

    pub async fn submit(&mut self) -> SubmitOutcome<Event> {
        let draft = match self.form.to_draft() {
            Ok(draft) => draft,
            Err(errors) => return SubmitOutcome::Invalid(errors),
        };

        self.submitting = true;
        let outcome = match &self.editing {
            Some(existing) => {
                let updated = draft.into_event(existing.id.clone(), &existing.organizer_id);
                if self.repo.update_event(updated.clone()).await {
                    SubmitOutcome::Saved(self.repo.event(&updated.id).unwrap_or(updated))
                } else {
                    SubmitOutcome::Failed
                }
            }
            None => match self.repo.create_event(draft, &self.organizer_id).await {
                Some(event) => SubmitOutcome::Saved(event),
                None => SubmitOutcome::Failed,
            },
        };
        self.submitting = false;

        if let SubmitOutcome::Saved(event) = &outcome {
            if self.editing.is_none() {
                self.form = EventForm::default();
            } else {
                self.editing = Some(event.clone());
            }
        }
        outcome
    }
}
