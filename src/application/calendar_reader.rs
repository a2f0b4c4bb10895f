use crate::domain::models::{CalendarEvent, OAuthToken, Task};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::decode_calendar_event;
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ListEventsRequest};
use crate::infrastructure::google_tasks_client::{GoogleTasksClient, decode_task};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

/// `[midnight, midnight + 24h)` in UTC for the day containing `now`.
pub fn utc_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

pub struct CalendarReader<C, T>
where
    C: GoogleCalendarClient,
    T: GoogleTasksClient,
{
    calendar_client: Arc<C>,
    tasks_client: Arc<T>,
    calendar_id: String,
    task_list_id: String,
}

impl<C, T> CalendarReader<C, T>
where
    C: GoogleCalendarClient,
    T: GoogleTasksClient,
{
    pub fn new(
        calendar_client: Arc<C>,
        tasks_client: Arc<T>,
        calendar_id: impl Into<String>,
        task_list_id: impl Into<String>,
    ) -> Self {
        Self {
            calendar_client,
            tasks_client,
            calendar_id: calendar_id.into(),
            task_list_id: task_list_id.into(),
        }
    }

    pub async fn fetch_today_events(
        &self,
        credential: &OAuthToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let (time_min, time_max) = utc_day_window(now);
        let raw_events = self
            .calendar_client
            .list_events(
                &credential.access_token,
                &self.calendar_id,
                ListEventsRequest { time_min, time_max },
            )
            .await?;

        let mut events = raw_events
            .iter()
            .filter(|event| !event.is_cancelled())
            .map(decode_calendar_event)
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|event| event.start.sort_key());
        Ok(events)
    }

    pub async fn fetch_tasks(&self, credential: &OAuthToken) -> Result<Vec<Task>, InfraError> {
        let raw_tasks = self
            .tasks_client
            .list_tasks(&credential.access_token, &self.task_list_id)
            .await?;
        raw_tasks.iter().map(decode_task).collect()
    }
}
