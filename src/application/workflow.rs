use crate::application::calendar_reader::CalendarReader;
use crate::application::calendar_writer::CalendarWriter;
use crate::application::oauth::{EnsureCredential, NowProvider, OAuthManager};
use crate::application::prompt::build_prompt;
use crate::application::schedule_generator::ScheduleGenerator;
use crate::domain::models::{OAuthToken, WorkflowPhase, WorkflowState};
use crate::infrastructure::artifact_store::ArtifactStore;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::GenerativeModelClient;
use crate::infrastructure::google_calendar_client::GoogleCalendarClient;
use crate::infrastructure::google_tasks_client::GoogleTasksClient;
use crate::infrastructure::oauth_client::OAuthHttpClient;
use chrono::Utc;
use std::sync::Arc;

pub const REQUIRED_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/tasks.readonly",
];

pub fn required_scopes() -> Vec<String> {
    REQUIRED_SCOPES.iter().map(|scope| scope.to_string()).collect()
}

/// Fetch, generate, create. One run per request, strictly in sequence.
pub struct WorkflowOrchestrator<S, O, C, T, M, A>
where
    S: CredentialStore,
    O: OAuthHttpClient,
    C: GoogleCalendarClient,
    T: GoogleTasksClient,
    M: GenerativeModelClient,
    A: ArtifactStore,
{
    oauth: OAuthManager<S, O>,
    reader: CalendarReader<C, T>,
    generator: ScheduleGenerator<M>,
    writer: CalendarWriter<C>,
    artifacts: Arc<A>,
    now_provider: NowProvider,
}

impl<S, O, C, T, M, A> WorkflowOrchestrator<S, O, C, T, M, A>
where
    S: CredentialStore,
    O: OAuthHttpClient,
    C: GoogleCalendarClient,
    T: GoogleTasksClient,
    M: GenerativeModelClient,
    A: ArtifactStore,
{
    pub fn new(
        oauth: OAuthManager<S, O>,
        reader: CalendarReader<C, T>,
        generator: ScheduleGenerator<M>,
        writer: CalendarWriter<C>,
        artifacts: Arc<A>,
    ) -> Self {
        Self {
            oauth,
            reader,
            generator,
            writer,
            artifacts,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn ensure_authenticated(&self) -> Result<EnsureCredential, InfraError> {
        self.oauth.ensure_credential(&required_scopes()).await
    }

    /// Never fails: every problem ends up in `WorkflowState::messages`.
    pub async fn run_workflow(&self, user_text: &str) -> WorkflowState {
        let mut state = WorkflowState {
            phase: WorkflowPhase::Fetching,
            ..WorkflowState::default()
        };

        let Some(credential) = self.acquire_credential(&mut state).await else {
            return state;
        };

        let Some(prompt) = self.fetch(&mut state, &credential, user_text).await else {
            state.phase = WorkflowPhase::Done;
            return state;
        };

        state.phase = WorkflowPhase::Generating;
        let generated = match self.generator.generate_events(&prompt).await {
            Ok(events) => events,
            Err(error) => {
                state.record_error(format!("Schedule generation failed: {error}"));
                state.phase = WorkflowPhase::Done;
                return state;
            }
        };
        if let Err(error) = self.artifacts.save_generated_events(&generated) {
            state.record_error(format!("Failed to save generated events: {error}"));
        }
        state.record_success(format!("Generated {} events", generated.len()));
        state.step_generate = true;

        state.phase = WorkflowPhase::Creating;
        for event in &generated {
            match self.writer.create_event(&credential, event).await {
                Ok(created) => state.created_events.push(created),
                Err(error) => {
                    state.record_error(format!("Failed to create event '{}': {error}", event.summary))
                }
            }
        }
        state.generated_events = generated;
        state.record_success(format!("Created {} events", state.created_events.len()));
        state.step_create = true;
        state.phase = WorkflowPhase::Done;
        state
    }

    async fn acquire_credential(&self, state: &mut WorkflowState) -> Option<OAuthToken> {
        match self.ensure_authenticated().await {
            Ok(EnsureCredential::Existing(token)) | Ok(EnsureCredential::Refreshed(token)) => Some(token),
            Ok(EnsureCredential::Pending(request)) => {
                let error = InfraError::Authentication(
                    "sign in with Google to let the agent read and write your calendar".to_string(),
                );
                state.record_error(error.to_string());
                state.authorization_url = Some(request.url);
                state.phase = WorkflowPhase::AuthPending;
                None
            }
            Err(error) => {
                state.record_error(format!("Could not obtain Google credential: {error}"));
                state.phase = WorkflowPhase::Done;
                None
            }
        }
    }

    async fn fetch(
        &self,
        state: &mut WorkflowState,
        credential: &OAuthToken,
        user_text: &str,
    ) -> Option<String> {
        let now = (self.now_provider)();
        let events = match self.reader.fetch_today_events(credential, now).await {
            Ok(events) => events,
            Err(error) => {
                state.record_error(format!("Failed to fetch calendar events: {error}"));
                return None;
            }
        };
        let tasks = match self.reader.fetch_tasks(credential).await {
            Ok(tasks) => tasks,
            Err(error) => {
                state.record_error(format!("Failed to fetch tasks: {error}"));
                return None;
            }
        };

        let prompt = build_prompt(&events, &tasks, user_text);
        if let Err(error) = self.artifacts.save_prompt(&prompt) {
            state.record_error(format!("Failed to save prompt: {error}"));
            return None;
        }
        state.record_success(format!("Fetched {} events and {} tasks", events.len(), tasks.len()));
        state.events = events;
        state.tasks = tasks;
        state.step_fetch = true;
        state.prompt = Some(prompt.clone());
        Some(prompt)
    }
}
