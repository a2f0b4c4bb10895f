use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

/// Writes through a sibling temp file and renames it over `path`.
///
/// Each call gets its own temp name, so overlapping writers never rename a
/// file another writer is still filling.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), InfraError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| InfraError::InvalidConfig(format!("invalid file path {}", path.display())))?;
    let sequence = NEXT_TEMP.fetch_add(1, Ordering::Relaxed);
    let temp_path = path.with_file_name(format!(
        ".{file_name}.{}.{sequence}.tmp",
        std::process::id()
    ));
    fs::write(&temp_path, contents)?;
    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error.into());
    }
    Ok(())
}
