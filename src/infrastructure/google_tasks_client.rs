use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use url::Url;

const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1/";

#[derive(Debug, Clone, serde::Deserialize, PartialEq, Eq, Default)]
pub struct GoogleTask {
    pub id: Option<String>,
    pub title: Option<String>,
    pub due: Option<String>,
    pub parent: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

#[async_trait]
pub trait GoogleTasksClient: Send + Sync {
    /// Every task in the list, completed and hidden ones included.
    async fn list_tasks(
        &self,
        access_token: &str,
        task_list_id: &str,
    ) -> Result<Vec<GoogleTask>, InfraError>;
}

/// Due values only carry a date; the time portion is always midnight UTC.
pub fn decode_task(task: &GoogleTask) -> Result<Task, InfraError> {
    let id = non_empty(task.id.as_deref())
        .ok_or_else(|| InfraError::Api("task payload did not include id".to_string()))?;
    let due = task
        .due
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|parsed| parsed.date_naive())
                .map_err(|error| InfraError::Api(format!("invalid task due '{value}': {error}")))
        })
        .transpose()?;

    Ok(Task {
        id,
        title: non_empty(task.title.as_deref()),
        due,
        parent: non_empty(task.parent.as_deref()),
        notes: non_empty(task.notes.as_deref()),
        status: non_empty(task.status.as_deref()),
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[derive(Debug, Clone)]
pub struct ReqwestGoogleTasksClient {
    client: Client,
    api_base: String,
}

impl Default for ReqwestGoogleTasksClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestGoogleTasksClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_base: TASKS_API_BASE.to_string(),
        }
    }

    fn tasks_endpoint(&self, task_list_id: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|error| InfraError::Api(format!("invalid tasks api base url: {error}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Api("tasks api base URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("lists");
            segments.push(task_list_id);
            segments.push("tasks");
        }
        Ok(url)
    }
}

#[derive(Debug, serde::Deserialize)]
struct TasksPageResponse {
    items: Option<Vec<GoogleTask>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[async_trait]
impl GoogleTasksClient for ReqwestGoogleTasksClient {
    async fn list_tasks(
        &self,
        access_token: &str,
        task_list_id: &str,
    ) -> Result<Vec<GoogleTask>, InfraError> {
        if access_token.trim().is_empty() {
            return Err(InfraError::Api("access token must not be empty".to_string()));
        }
        if task_list_id.trim().is_empty() {
            return Err(InfraError::Api("task list id must not be empty".to_string()));
        }

        let endpoint = self.tasks_endpoint(task_list_id)?;
        let mut page_token: Option<String> = None;
        let mut tasks = Vec::new();

        loop {
            let mut req = self
                .client
                .get(endpoint.clone())
                .bearer_auth(access_token)
                .query(&[
                    ("showCompleted", "true"),
                    ("showHidden", "true"),
                    ("maxResults", "100"),
                ]);
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let response = req.send().await.map_err(|error| {
                InfraError::Api(format!("network error while listing tasks: {error}"))
            })?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|error| InfraError::Api(format!("failed reading tasks list response: {error}")))?;

            if !status.is_success() {
                return Err(InfraError::Api(format!(
                    "google tasks api error: http {}; body={body}",
                    status.as_u16()
                )));
            }

            let mut parsed: TasksPageResponse = serde_json::from_str(&body).map_err(|error| {
                InfraError::Api(format!("invalid tasks list payload: {error}; body={body}"))
            })?;
            tasks.extend(parsed.items.take().unwrap_or_default());

            match parsed.next_page_token.take() {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(tasks)
    }
}
