use crate::domain::models::{
    CalendarEvent, CreatedEventResult, EventBoundary, EventTime, GeneratedEvent,
};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CalendarEventAttendee {
    pub email: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "colorId", skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(rename = "htmlLink", skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<CalendarEventAttendee>>,
}

impl GoogleCalendarEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("cancelled"))
    }
}

pub fn decode_calendar_event(event: &GoogleCalendarEvent) -> Result<CalendarEvent, InfraError> {
    let id = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| InfraError::Api("calendar event payload did not include id".to_string()))?;

    Ok(CalendarEvent {
        id: id.to_string(),
        summary: non_empty(event.summary.as_deref()),
        start: decode_boundary(&event.start, "start")?,
        end: decode_boundary(&event.end, "end")?,
        location: non_empty(event.location.as_deref()),
        description: non_empty(event.description.as_deref()),
    })
}

fn decode_boundary(
    value: &CalendarEventDateTime,
    field_name: &str,
) -> Result<EventBoundary, InfraError> {
    if let Some(date_time) = value.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(date_time.trim())
            .map(EventBoundary::DateTime)
            .map_err(|error| {
                InfraError::Api(format!(
                    "invalid calendar event {field_name}.dateTime '{date_time}': {error}"
                ))
            });
    }
    if let Some(date) = value.date.as_deref() {
        return NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map(EventBoundary::Date)
            .map_err(|error| {
                InfraError::Api(format!("invalid calendar event {field_name}.date '{date}': {error}"))
            });
    }
    Err(InfraError::Api(format!(
        "calendar event {field_name} has neither dateTime nor date"
    )))
}

/// Turns a model-provided datetime into the string sent to the calendar API.
///
/// Fallback order:
/// 1. lenient parse; parsed values are rendered as ISO-8601,
/// 2. otherwise the first space is replaced with `T`,
/// 3. a `Z` is appended when the result carries neither `Z` nor a numeric offset.
///
/// Malformed input is never rejected here; the provider decides.
pub fn normalize_event_datetime(value: &EventTime) -> String {
    let normalized = match value {
        EventTime::Zoned(_) | EventTime::Local(_) => value.to_string(),
        EventTime::Raw(raw) => raw.replacen(' ', "T", 1),
    };
    if has_utc_marker_or_offset(&normalized) {
        normalized
    } else {
        format!("{normalized}Z")
    }
}

fn has_utc_marker_or_offset(value: &str) -> bool {
    if value.ends_with('Z') || value.ends_with('z') {
        return true;
    }
    let Some((_, time_part)) = value.rsplit_once('T') else {
        return false;
    };
    let Some(sign_index) = time_part.rfind(['+', '-']) else {
        return false;
    };
    let offset = time_part[sign_index + 1..].replace(':', "");
    sign_index > 0 && offset.len() == 4 && offset.chars().all(|c| c.is_ascii_digit())
}

pub fn encode_generated_event(event: &GeneratedEvent) -> GoogleCalendarEvent {
    let time_zone = non_empty(event.timezone.as_deref()).filter(|zone| zone.parse::<Tz>().is_ok());
    let attendees = event.attendees.as_ref().map(|emails| {
        emails
            .iter()
            .map(|email| CalendarEventAttendee {
                email: email.clone(),
            })
            .collect()
    });

    GoogleCalendarEvent {
        summary: Some(event.summary.clone()),
        description: non_empty(event.description.as_deref()),
        location: non_empty(event.location.as_deref()),
        color_id: non_empty(event.color_id.as_deref()),
        start: CalendarEventDateTime {
            date_time: Some(normalize_event_datetime(&event.start_datetime)),
            date: None,
            time_zone: time_zone.clone(),
        },
        end: CalendarEventDateTime {
            date_time: Some(normalize_event_datetime(&event.end_datetime)),
            date: None,
            time_zone,
        },
        attendees,
        ..GoogleCalendarEvent::default()
    }
}

pub fn decode_created_event(
    summary: &str,
    created: &GoogleCalendarEvent,
) -> Result<CreatedEventResult, InfraError> {
    let html_link = non_empty(created.html_link.as_deref())
        .ok_or_else(|| InfraError::Api("event insert response did not include htmlLink".to_string()))?;
    Ok(CreatedEventResult {
        summary: non_empty(created.summary.as_deref()).unwrap_or_else(|| summary.to_string()),
        html_link,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GeneratedEventRecord;

    fn generated(start: &str, end: &str) -> GeneratedEvent {
        GeneratedEvent::from(GeneratedEventRecord {
            summary: "Deep work".to_string(),
            start_datetime: start.to_string(),
            end_datetime: end.to_string(),
            description: None,
            location: None,
            color_id: None,
            attendees: None,
            timezone: None,
        })
    }

    #[test]
    fn normalize_keeps_explicit_offsets() {
        let value = EventTime::parse("2026-10-19T09:00:00-07:00", None);
        assert_eq!(normalize_event_datetime(&value), "2026-10-19T09:00:00-07:00");
    }

    #[test]
    fn normalize_appends_utc_marker_to_naive_values() {
        let value = EventTime::parse("2026-10-19 09:00", None);
        assert_eq!(normalize_event_datetime(&value), "2026-10-19T09:00:00Z");
    }

    #[test]
    fn normalize_falls_back_to_space_substitution_for_unparseable_values() {
        let value = EventTime::parse("2026-10-19 9am", None);
        assert_eq!(value, EventTime::Raw("2026-10-19 9am".to_string()));
        assert_eq!(normalize_event_datetime(&value), "2026-10-19T9amZ");
    }

    #[test]
    fn normalize_forwards_garbage_with_utc_marker() {
        let value = EventTime::parse("not-a-date", None);
        assert_eq!(normalize_event_datetime(&value), "not-a-dateZ");
    }

    #[test]
    fn normalize_recognises_offset_in_unparsed_value() {
        let value = EventTime::Raw("2026-10-19 25:00+02:00".to_string());
        assert_eq!(normalize_event_datetime(&value), "2026-10-19T25:00+02:00");
    }

    #[test]
    fn encode_maps_only_present_optional_fields() {
        let mut event = generated("2026-10-19T09:00:00Z", "2026-10-19T10:00:00Z");
        event.description = Some("  ".to_string());
        event.location = Some("Room 4".to_string());
        event.color_id = Some("5".to_string());

        let encoded = encode_generated_event(&event);
        let json = serde_json::to_value(&encoded).expect("serialize");

        assert_eq!(json["summary"], "Deep work");
        assert_eq!(json["location"], "Room 4");
        assert_eq!(json["colorId"], "5");
        assert_eq!(json["start"]["dateTime"], "2026-10-19T09:00:00+00:00");
        assert!(json.get("description").is_none());
        assert!(json.get("attendees").is_none());
        assert!(json["start"].get("timeZone").is_none());
    }

    #[test]
    fn encode_maps_attendees_and_timezone() {
        let mut event = generated("2026-10-19T09:00:00", "2026-10-19T10:00:00");
        event.attendees = Some(vec!["a@example.com".to_string(), "b@example.com".to_string()]);
        event.timezone = Some("Europe/Berlin".to_string());

        let encoded = encode_generated_event(&event);
        let attendees = encoded.attendees.expect("attendees");
        assert_eq!(attendees.len(), 2);
        assert_eq!(attendees[1].email, "b@example.com");
        assert_eq!(encoded.start.time_zone.as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn encode_drops_timezone_names_google_would_reject() {
        let mut event = generated("2026-10-19T15:00:00", "2026-10-19T16:00:00");
        event.timezone = Some("EST+5".to_string());

        let encoded = encode_generated_event(&event);

        assert_eq!(encoded.start.time_zone, None);
        assert_eq!(encoded.end.time_zone, None);
        assert_eq!(encoded.start.date_time.as_deref(), Some("2026-10-19T15:00:00Z"));
    }

    #[test]
    fn decode_reads_all_day_and_timed_events() {
        let payload = r#"{
            "id": "evt-1",
            "summary": "Offsite",
            "start": {"date": "2026-10-19"},
            "end": {"date": "2026-10-20"}
        }"#;
        let event: GoogleCalendarEvent = serde_json::from_str(payload).expect("payload");
        let decoded = decode_calendar_event(&event).expect("decode");
        assert_eq!(decoded.start.to_string(), "2026-10-19");

        let timed = r#"{
            "id": "evt-2",
            "start": {"dateTime": "2026-10-19T09:00:00+02:00"},
            "end": {"dateTime": "2026-10-19T10:00:00+02:00"}
        }"#;
        let event: GoogleCalendarEvent = serde_json::from_str(timed).expect("payload");
        let decoded = decode_calendar_event(&event).expect("decode");
        assert_eq!(decoded.summary, None);
        assert_eq!(decoded.end.to_string(), "2026-10-19T10:00:00+02:00");
    }

    #[test]
    fn decode_rejects_event_without_start() {
        let event = GoogleCalendarEvent {
            id: Some("evt-3".to_string()),
            ..GoogleCalendarEvent::default()
        };
        assert!(matches!(decode_calendar_event(&event), Err(InfraError::Api(_))));
    }

    #[test]
    fn created_event_requires_view_link() {
        let created = GoogleCalendarEvent {
            id: Some("new".to_string()),
            ..GoogleCalendarEvent::default()
        };
        assert!(decode_created_event("Deep work", &created).is_err());

        let created = GoogleCalendarEvent {
            html_link: Some("https://calendar.google.com/event?eid=1".to_string()),
            ..created
        };
        let result = decode_created_event("Deep work", &created).expect("created");
        assert_eq!(result.summary, "Deep work");
    }
}
