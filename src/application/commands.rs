use crate::application::bootstrap::bootstrap_workspace;
use crate::application::calendar_reader::CalendarReader;
use crate::application::calendar_writer::CalendarWriter;
use crate::application::oauth::{EnsureCredential, OAuthConfig, OAuthManager};
use crate::application::schedule_generator::ScheduleGenerator;
use crate::application::workflow::{WorkflowOrchestrator, required_scopes};
use crate::domain::models::{MessageLevel, OAuthToken, WorkflowPhase, WorkflowState};
use crate::infrastructure::artifact_store::FileArtifactStore;
use crate::infrastructure::config::{
    AppSettings, load_app_settings, load_gemini_api_key, load_google_client_secret,
};
use crate::infrastructure::credential_store::FileCredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::ReqwestGeminiClient;
use crate::infrastructure::google_calendar_client::ReqwestGoogleCalendarClient;
use crate::infrastructure::google_tasks_client::ReqwestGoogleTasksClient;
use crate::infrastructure::oauth_client::ReqwestOAuthClient;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const CREDENTIAL_FILE: &str = "credential.json";
const PENDING_STATE_TTL_MINUTES: i64 = 10;
const MAX_PENDING_STATES: usize = 16;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// OAuth `state` values issued for sign-ins that have not called back yet.
#[derive(Debug, Default)]
struct PendingStates {
    issued: HashMap<String, DateTime<Utc>>,
}

impl PendingStates {
    fn issue(&mut self, state: String, now: DateTime<Utc>) {
        self.prune(now);
        while self.issued.len() >= MAX_PENDING_STATES {
            let Some(oldest) = self
                .issued
                .iter()
                .min_by_key(|(_, issued_at)| **issued_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.issued.remove(&oldest);
        }
        self.issued.insert(state, now);
    }

    fn take(&mut self, state: &str, now: DateTime<Utc>) -> bool {
        self.prune(now);
        self.issued.remove(state).is_some()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::minutes(PENDING_STATE_TTL_MINUTES);
        self.issued.retain(|_, issued_at| *issued_at > cutoff);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.issued.len()
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

type ProductionOAuthManager = OAuthManager<FileCredentialStore, ReqwestOAuthClient>;

type ProductionOrchestrator = WorkflowOrchestrator<
    FileCredentialStore,
    ReqwestOAuthClient,
    ReqwestGoogleCalendarClient,
    ReqwestGoogleTasksClient,
    ReqwestGeminiClient,
    FileArtifactStore,
>;

pub struct AppState {
    config_dir: PathBuf,
    state_dir: PathBuf,
    logs_dir: PathBuf,
    settings: AppSettings,
    env_lookup: EnvLookup,
    pending_oauth_states: Arc<Mutex<PendingStates>>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self {
            config_dir: bootstrap.config_dir,
            state_dir: bootstrap.state_dir,
            logs_dir: bootstrap.logs_dir,
            settings: bootstrap.settings,
            env_lookup: Arc::new(|key: &str| std::env::var(key).ok()),
            pending_oauth_states: Arc::new(Mutex::new(PendingStates::default())),
            log_guard: Mutex::new(()),
        })
    }

    pub fn with_env_lookup(mut self, env_lookup: EnvLookup) -> Self {
        self.env_lookup = env_lookup;
        self
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn credential_path(&self) -> PathBuf {
        self.state_dir.join(CREDENTIAL_FILE)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn oauth_manager(&self) -> Result<ProductionOAuthManager, InfraError> {
        let secret = load_google_client_secret(&self.config_dir, |key| (self.env_lookup)(key))?;
        let mut config = OAuthConfig::new(secret.client_id, secret.client_secret, secret.redirect_uri);
        if let Some(endpoint) = secret.authorization_endpoint {
            config.authorization_endpoint = endpoint;
        }
        if let Some(endpoint) = secret.token_endpoint {
            config.token_endpoint = endpoint;
        }

        let pending = Arc::clone(&self.pending_oauth_states);
        Ok(OAuthManager::new(
            config,
            Arc::new(FileCredentialStore::new(self.credential_path())),
            Arc::new(ReqwestOAuthClient::new()),
        )
        .with_state_provider(Arc::new(move || {
            let state = next_id("oauth-state");
            if let Ok(mut guard) = pending.lock() {
                guard.issue(state.clone(), Utc::now());
            }
            state
        })))
    }

    fn orchestrator(&self) -> Result<ProductionOrchestrator, InfraError> {
        let settings = load_app_settings(&self.config_dir)?;
        let api_key = load_gemini_api_key(|key| (self.env_lookup)(key))?;
        let oauth = self.oauth_manager()?;

        let calendar_client = Arc::new(ReqwestGoogleCalendarClient::new());
        let tasks_client = Arc::new(ReqwestGoogleTasksClient::new());
        let model_client = Arc::new(ReqwestGeminiClient::new(api_key, settings.model.clone()));

        Ok(WorkflowOrchestrator::new(
            oauth,
            CalendarReader::new(
                Arc::clone(&calendar_client),
                tasks_client,
                settings.calendar_id.clone(),
                settings.task_list_id.clone(),
            ),
            ScheduleGenerator::new(model_client),
            CalendarWriter::new(calendar_client, settings.calendar_id),
            Arc::new(FileArtifactStore::new(&self.state_dir)),
        ))
    }

    fn take_pending_state(&self, returned_state: &str) -> Result<(), InfraError> {
        let mut guard = self
            .pending_oauth_states
            .lock()
            .map_err(|error| InfraError::OAuth(format!("pending state lock poisoned: {error}")))?;
        if guard.take(returned_state.trim(), Utc::now()) {
            Ok(())
        } else {
            Err(InfraError::OAuth(
                "authorization state does not match a pending sign-in".to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthenticationResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl AuthenticationResponse {
    fn ready(status: &str, token: &OAuthToken) -> Self {
        Self {
            status: status.to_string(),
            authorization_url: None,
            expires_at: Some(token.expires_at.to_rfc3339()),
        }
    }
}

pub async fn run_workflow_impl(state: &AppState, user_text: &str) -> WorkflowState {
    let orchestrator = match state.orchestrator() {
        Ok(orchestrator) => orchestrator,
        Err(error) => {
            let mut blocked = WorkflowState {
                phase: WorkflowPhase::Done,
                ..WorkflowState::default()
            };
            blocked.record_error(state.command_error("run_workflow", &error));
            return blocked;
        }
    };

    let result = orchestrator.run_workflow(user_text).await;
    for message in &result.messages {
        match message.level {
            MessageLevel::Success => state.log_info("run_workflow", &message.text),
            MessageLevel::Error => state.log_error("run_workflow", &message.text),
        }
    }
    if result.is_auth_pending() {
        state.log_info("run_workflow", "authorization url issued");
    }
    result
}

pub async fn ensure_authenticated_impl(state: &AppState) -> Result<AuthenticationResponse, InfraError> {
    let manager = state.oauth_manager()?;
    let response = match manager.ensure_credential(&required_scopes()).await? {
        EnsureCredential::Existing(token) => AuthenticationResponse::ready("ready", &token),
        EnsureCredential::Refreshed(token) => {
            state.log_info("ensure_authenticated", "refreshed stored credential");
            AuthenticationResponse::ready("refreshed", &token)
        }
        EnsureCredential::Pending(request) => {
            state.log_info("ensure_authenticated", "authorization url issued");
            AuthenticationResponse {
                status: "authorization_required".to_string(),
                authorization_url: Some(request.url),
                expires_at: None,
            }
        }
    };
    Ok(response)
}

pub async fn complete_authentication_impl(
    state: &AppState,
    authorization_code: &str,
    returned_state: &str,
) -> Result<AuthenticationResponse, InfraError> {
    state.take_pending_state(returned_state)?;
    let manager = state.oauth_manager()?;
    let token = manager.complete_authentication(authorization_code).await?;
    state.log_info(
        "complete_authentication",
        "exchanged authorization code and stored credential",
    );
    Ok(AuthenticationResponse::ready("authenticated", &token))
}

pub fn logout_impl(state: &AppState) -> Result<AuthenticationResponse, InfraError> {
    let manager = state.oauth_manager()?;
    manager.clear_stored_token()?;
    state.log_info("logout", "removed stored credential");
    Ok(AuthenticationResponse {
        status: "signed_out".to_string(),
        authorization_url: None,
        expires_at: None,
    })
}
