use crate::domain::models::GeneratedEvent;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::write_atomic;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

const PROMPT_FILE: &str = "prompt.txt";
const GENERATED_EVENTS_FILE: &str = "generated_events.json";

/// Side artifacts of the latest workflow run, kept for inspection.
pub trait ArtifactStore: Send + Sync {
    fn save_prompt(&self, prompt: &str) -> Result<(), InfraError>;
    fn save_generated_events(&self, events: &[GeneratedEvent]) -> Result<(), InfraError>;
    fn load_generated_events(&self) -> Result<Vec<GeneratedEvent>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    state_dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }
}

impl ArtifactStore for FileArtifactStore {
    fn save_prompt(&self, prompt: &str) -> Result<(), InfraError> {
        write_atomic(&self.state_dir.join(PROMPT_FILE), prompt)
    }

    fn save_generated_events(&self, events: &[GeneratedEvent]) -> Result<(), InfraError> {
        let formatted = serde_json::to_string_pretty(events)?;
        write_atomic(
            &self.state_dir.join(GENERATED_EVENTS_FILE),
            &format!("{formatted}\n"),
        )
    }

    fn load_generated_events(&self) -> Result<Vec<GeneratedEvent>, InfraError> {
        let raw = match fs::read_to_string(self.state_dir.join(GENERATED_EVENTS_FILE)) {
            Ok(value) => value,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    prompt: Mutex<Option<String>>,
    generated_events: Mutex<Vec<GeneratedEvent>>,
}

impl InMemoryArtifactStore {
    pub fn prompt(&self) -> Option<String> {
        self.prompt.lock().ok().and_then(|guard| guard.clone())
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn save_prompt(&self, prompt: &str) -> Result<(), InfraError> {
        let mut guard = self
            .prompt
            .lock()
            .map_err(|error| InfraError::Io(std::io::Error::other(format!("lock poisoned: {error}"))))?;
        *guard = Some(prompt.to_string());
        Ok(())
    }

    fn save_generated_events(&self, events: &[GeneratedEvent]) -> Result<(), InfraError> {
        let mut guard = self
            .generated_events
            .lock()
            .map_err(|error| InfraError::Io(std::io::Error::other(format!("lock poisoned: {error}"))))?;
        *guard = events.to_vec();
        Ok(())
    }

    fn load_generated_events(&self) -> Result<Vec<GeneratedEvent>, InfraError> {
        let guard = self
            .generated_events
            .lock()
            .map_err(|error| InfraError::Io(std::io::Error::other(format!("lock poisoned: {error}"))))?;
        Ok(guard.clone())
    }
}
