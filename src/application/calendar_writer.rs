use crate::domain::models::{CreatedEventResult, GeneratedEvent, OAuthToken};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_created_event, encode_generated_event};
use crate::infrastructure::google_calendar_client::GoogleCalendarClient;
use std::sync::Arc;

pub struct CalendarWriter<C>
where
    C: GoogleCalendarClient,
{
    calendar_client: Arc<C>,
    calendar_id: String,
}

impl<C> CalendarWriter<C>
where
    C: GoogleCalendarClient,
{
    pub fn new(calendar_client: Arc<C>, calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_client,
            calendar_id: calendar_id.into(),
        }
    }

    /// Inserts one event. Not idempotent: every call creates a new provider-side event.
    pub async fn create_event(
        &self,
        credential: &OAuthToken,
        event: &GeneratedEvent,
    ) -> Result<CreatedEventResult, InfraError> {
        let payload = encode_generated_event(event);
        let created = self
            .calendar_client
            .insert_event(&credential.access_token, &self.calendar_id, &payload)
            .await?;
        decode_created_event(&event.summary, &created)
    }
}
