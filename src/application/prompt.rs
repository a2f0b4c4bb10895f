use crate::domain::models::{CalendarEvent, Task};
use std::collections::HashMap;

pub const EVENTS_HEADER: &str = "Here are my calendar events for today:";
pub const TASKS_HEADER: &str = "Here are my tasks:";
const UNTITLED: &str = "(untitled)";

/// Renders events, tasks and the user's own words into the model prompt.
///
/// Output is a pure function of the inputs: one `- ` line per event and per
/// task in input order, then a blank line and `user_text` unchanged. A task
/// parent is named by its title when the parent is in `tasks`, else by id.
pub fn build_prompt(events: &[CalendarEvent], tasks: &[Task], user_text: &str) -> String {
    let parent_titles: HashMap<&str, &str> = tasks
        .iter()
        .filter_map(|task| task.title.as_deref().map(|title| (task.id.as_str(), title)))
        .collect();

    let mut lines = Vec::with_capacity(events.len() + tasks.len() + 5);
    lines.push(EVENTS_HEADER.to_string());
    for event in events {
        lines.push(format!(
            "- {} from {} to {}",
            event.summary.as_deref().unwrap_or(UNTITLED),
            event.start,
            event.end
        ));
    }

    lines.push(String::new());
    lines.push(TASKS_HEADER.to_string());
    for task in tasks {
        let title = task.title.as_deref().unwrap_or(UNTITLED);
        let due = task
            .due
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "none".to_string());
        let mut line = format!("- {title}, due {due}");
        if let Some(parent) = task.parent.as_deref() {
            let parent_name = parent_titles.get(parent).copied().unwrap_or(parent);
            line.push_str(&format!(", subtask of {parent_name}"));
        }
        lines.push(line);
    }

    lines.push(String::new());
    let mut prompt = lines.join("\n");
    prompt.push('\n');
    prompt.push_str(user_text);
    prompt
}
