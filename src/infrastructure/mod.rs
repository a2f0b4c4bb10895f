pub mod artifact_store;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod gemini_client;
pub mod google_calendar_client;
pub mod google_tasks_client;
pub mod oauth_client;
pub mod storage;
