use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const ZONED_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }

    /// A token without a recorded scope was granted exactly what was requested.
    pub fn covers_scopes(&self, required_scopes: &[String]) -> bool {
        let Some(scope) = self.scope.as_deref() else {
            return true;
        };
        let granted: Vec<&str> = scope.split_whitespace().collect();
        required_scopes
            .iter()
            .all(|required| granted.contains(&required.as_str()))
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .is_some_and(|value| !value.is_empty())
    }
}

/// Start or end of a fetched calendar event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EventBoundary {
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl EventBoundary {
    /// All-day boundaries sort as UTC midnight.
    pub fn sort_key(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(value) => value.with_timezone(&Utc),
            Self::Date(date) => Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)),
        }
    }
}

impl fmt::Display for EventBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DateTime(value) => write!(f, "{}", value.to_rfc3339()),
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: EventBoundary,
    pub end: EventBoundary,
    pub location: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: Option<String>,
    pub due: Option<NaiveDate>,
    pub parent: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

/// Datetime proposed by the model. Values that cannot be parsed are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    Zoned(DateTime<FixedOffset>),
    Local(NaiveDateTime),
    Raw(String),
}

impl EventTime {
    /// Lenient parse. A naive value is localised when `timezone` names a known IANA zone.
    pub fn parse(raw: &str, timezone: Option<&str>) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
            return Self::Zoned(value);
        }
        if let Ok(value) = trimmed.parse::<DateTime<FixedOffset>>() {
            return Self::Zoned(value);
        }
        for format in ZONED_DATETIME_FORMATS {
            if let Ok(value) = DateTime::parse_from_str(trimmed, format) {
                return Self::Zoned(value);
            }
        }
        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Self::localize(value, timezone);
            }
        }
        Self::Raw(raw.to_string())
    }

    fn localize(naive: NaiveDateTime, timezone: Option<&str>) -> Self {
        let zone = timezone
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse::<Tz>().ok());
        match zone.and_then(|zone| zone.from_local_datetime(&naive).earliest()) {
            Some(localized) => Self::Zoned(localized.fixed_offset()),
            None => Self::Local(naive),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zoned(value) => write!(f, "{}", value.to_rfc3339()),
            Self::Local(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::Raw(value) => f.write_str(value),
        }
    }
}

/// Serialized shape shared by the model response and the generated-events artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedEventRecord {
    pub summary: String,
    pub start_datetime: String,
    pub end_datetime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "GeneratedEventRecord", into = "GeneratedEventRecord")]
pub struct GeneratedEvent {
    pub summary: String,
    pub start_datetime: EventTime,
    pub end_datetime: EventTime,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color_id: Option<String>,
    pub attendees: Option<Vec<String>>,
    pub timezone: Option<String>,
}

impl GeneratedEvent {
    /// True only when both ends parsed into comparable values and end precedes start.
    pub fn ends_before_start(&self) -> bool {
        match (&self.start_datetime, &self.end_datetime) {
            (EventTime::Zoned(start), EventTime::Zoned(end)) => end < start,
            (EventTime::Local(start), EventTime::Local(end)) => end < start,
            _ => false,
        }
    }
}

impl From<GeneratedEventRecord> for GeneratedEvent {
    fn from(record: GeneratedEventRecord) -> Self {
        let timezone = record.timezone.as_deref();
        Self {
            start_datetime: EventTime::parse(&record.start_datetime, timezone),
            end_datetime: EventTime::parse(&record.end_datetime, timezone),
            summary: record.summary,
            description: record.description,
            location: record.location,
            color_id: record.color_id,
            attendees: record.attendees,
            timezone: record.timezone,
        }
    }
}

impl From<GeneratedEvent> for GeneratedEventRecord {
    fn from(event: GeneratedEvent) -> Self {
        Self {
            summary: event.summary,
            start_datetime: event.start_datetime.to_string(),
            end_datetime: event.end_datetime.to_string(),
            description: event.description,
            location: event.location,
            color_id: event.color_id,
            attendees: event.attendees,
            timezone: event.timezone,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedEventResult {
    pub summary: String,
    pub html_link: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Idle,
    Fetching,
    AuthPending,
    Generating,
    Creating,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WorkflowState {
    pub phase: WorkflowPhase,
    pub messages: Vec<StatusMessage>,
    pub step_fetch: bool,
    pub step_generate: bool,
    pub step_create: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    pub events: Vec<CalendarEvent>,
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub generated_events: Vec<GeneratedEvent>,
    pub created_events: Vec<CreatedEventResult>,
}

impl WorkflowState {
    pub fn record_success(&mut self, text: impl Into<String>) {
        self.messages.push(StatusMessage {
            level: MessageLevel::Success,
            text: text.into(),
        });
    }

    pub fn record_error(&mut self, text: impl Into<String>) {
        self.messages.push(StatusMessage {
            level: MessageLevel::Error,
            text: text.into(),
        });
    }

    pub fn messages_at(&self, level: MessageLevel) -> impl Iterator<Item = &StatusMessage> {
        self.messages
            .iter()
            .filter(move |message| message.level == level)
    }

    pub fn is_auth_pending(&self) -> bool {
        self.phase == WorkflowPhase::AuthPending
    }
}
