use crate::domain::models::{GeneratedEvent, GeneratedEventRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::GenerativeModelClient;
use std::sync::Arc;

/// Response schema handed to the model: an array of event objects.
pub fn generated_events_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "summary": { "type": "STRING" },
                "start_datetime": { "type": "STRING", "format": "date-time" },
                "end_datetime": { "type": "STRING", "format": "date-time" },
                "description": { "type": "STRING" },
                "location": { "type": "STRING" },
                "color_id": { "type": "STRING" },
                "attendees": { "type": "ARRAY", "items": { "type": "STRING" } },
                "timezone": { "type": "STRING" }
            },
            "required": ["summary", "start_datetime", "end_datetime"]
        }
    })
}

pub struct ScheduleGenerator<M>
where
    M: GenerativeModelClient,
{
    model_client: Arc<M>,
}

impl<M> ScheduleGenerator<M>
where
    M: GenerativeModelClient,
{
    pub fn new(model_client: Arc<M>) -> Self {
        Self { model_client }
    }

    /// One model call, no retry.
    pub async fn generate_events(&self, prompt: &str) -> Result<Vec<GeneratedEvent>, InfraError> {
        let raw = self
            .model_client
            .generate_json(prompt, &generated_events_schema())
            .await?;
        parse_generated_events(&raw)
    }
}

pub fn parse_generated_events(raw: &str) -> Result<Vec<GeneratedEvent>, InfraError> {
    let value: serde_json::Value = serde_json::from_str(raw.trim())
        .map_err(|error| InfraError::Generation(format!("model response is not valid JSON: {error}")))?;
    if !value.is_array() {
        return Err(InfraError::Generation(
            "model response must be a JSON array of events".to_string(),
        ));
    }

    let records: Vec<GeneratedEventRecord> = serde_json::from_value(value).map_err(|error| {
        InfraError::Generation(format!("model response does not match the event schema: {error}"))
    })?;

    let events: Vec<GeneratedEvent> = records.into_iter().map(GeneratedEvent::from).collect();
    if let Some(reversed) = events.iter().find(|event| event.ends_before_start()) {
        return Err(InfraError::Generation(format!(
            "event '{}' ends before it starts",
            reversed.summary
        )));
    }
    Ok(events)
}
