use crate::infrastructure::error::InfraError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const DEFAULT_CALENDAR_ID: &str = "primary";
const DEFAULT_TASK_LIST_ID: &str = "@default";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/oauth2/callback";

const CLIENT_ID_KEYS: [&str; 2] = ["DAYBOOK_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"];
const CLIENT_SECRET_KEYS: [&str; 2] = ["DAYBOOK_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"];
const REDIRECT_URI_KEYS: [&str; 2] = ["DAYBOOK_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"];
const GEMINI_API_KEY_KEYS: [&str; 2] = ["DAYBOOK_GEMINI_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub calendar_id: String,
    pub task_list_id: String,
    pub model: String,
    pub listen_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
}

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "calendarId": DEFAULT_CALENDAR_ID,
        "taskListId": DEFAULT_TASK_LIST_ID,
        "model": DEFAULT_MODEL,
        "listenAddress": DEFAULT_LISTEN_ADDRESS
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn string_setting(config: &serde_json::Value, key: &str, default: &str) -> String {
    config
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}

pub fn load_app_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(AppSettings {
        calendar_id: string_setting(&app, "calendarId", DEFAULT_CALENDAR_ID),
        task_list_id: string_setting(&app, "taskListId", DEFAULT_TASK_LIST_ID),
        model: string_setting(&app, "model", DEFAULT_MODEL),
        listen_address: string_setting(&app, "listenAddress", DEFAULT_LISTEN_ADDRESS),
    })
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    web: Option<ClientSecretEntry>,
    installed: Option<ClientSecretEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretEntry {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

fn read_client_secret_file(path: &Path) -> Result<Option<ClientSecretEntry>, InfraError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let parsed: ClientSecretFile = serde_json::from_str(&raw).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid client secret file {}: {error}", path.display()))
    })?;
    let entry = parsed.web.or(parsed.installed).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "client secret file {} has neither \"web\" nor \"installed\" section",
            path.display()
        ))
    })?;
    Ok(Some(entry))
}

/// Environment wins over `config/client_secret.json`.
pub fn load_google_client_secret<F>(config_dir: &Path, lookup: F) -> Result<GoogleClientSecret, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let file_entry = read_client_secret_file(&config_dir.join(CLIENT_SECRET_JSON))?;

    let client_id = optional_lookup_value(&lookup, &CLIENT_ID_KEYS)
        .or_else(|| file_entry.as_ref().map(|entry| entry.client_id.trim().to_string()))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| missing_value("google client id", &CLIENT_ID_KEYS))?;
    let client_secret = optional_lookup_value(&lookup, &CLIENT_SECRET_KEYS)
        .or_else(|| file_entry.as_ref().map(|entry| entry.client_secret.trim().to_string()))
        .filter(|value| !value.is_empty())
        .ok_or_else(|| missing_value("google client secret", &CLIENT_SECRET_KEYS))?;
    let redirect_uri = optional_lookup_value(&lookup, &REDIRECT_URI_KEYS)
        .or_else(|| {
            file_entry
                .as_ref()
                .and_then(|entry| entry.redirect_uris.first())
                .map(|value| value.trim().to_string())
        })
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

    Ok(GoogleClientSecret {
        client_id,
        client_secret,
        redirect_uri,
        authorization_endpoint: file_entry.as_ref().and_then(|entry| entry.auth_uri.clone()),
        token_endpoint: file_entry.and_then(|entry| entry.token_uri),
    })
}

pub fn load_gemini_api_key<F>(lookup: F) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(&lookup, &GEMINI_API_KEY_KEYS)
        .ok_or_else(|| missing_value("gemini api key", &GEMINI_API_KEY_KEYS))
}

fn missing_value(field_name: &str, keys: &[&str]) -> InfraError {
    InfraError::InvalidConfig(format!(
        "missing {} (set one of: {})",
        field_name,
        keys.join(", ")
    ))
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
