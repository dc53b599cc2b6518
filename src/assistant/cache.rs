//! File-backed cache of synced assistants.
//!
//! One TOML file per assistant name under the cache directory. Each holds the
//! remote id and version suffix along with the definition last pushed and its
//! fingerprint. Files are written with mode 0o600 on unix.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PaiprogError, Result};

/// Cached link between a local assistant name and its remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantRecord {
    pub name: String,
    pub remote_id: String,
    pub fingerprint: String,
    /// JSON text of the config last pushed to the remote.
    pub serialized_config: String,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
}

/// Storage for assistant records, keyed by local name.
pub trait AssistantCache: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<AssistantRecord>>;
    fn save(&self, record: &AssistantRecord) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
    fn list(&self) -> Result<Vec<AssistantRecord>>;
}

/// One TOML file per assistant under `base_dir`.
#[derive(Debug, Clone)]
pub struct FileAssistantCache {
    base_dir: PathBuf,
}

impl FileAssistantCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.toml", normalize_label(name)))
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn read_record(path: &Path) -> Result<Option<AssistantRecord>> {
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: RecordFile = toml::from_str(&raw)?;
        if file.format != RECORD_FORMAT {
            return Err(PaiprogError::Configuration(format!(
                "{}: unsupported cache format {}",
                path.display(),
                file.format
            )));
        }
        Ok(Some(file.assistant))
    }
}

impl AssistantCache for FileAssistantCache {
    fn load(&self, name: &str) -> Result<Option<AssistantRecord>> {
        let record = Self::read_record(&self.record_path(name))?;
        // Distinct names can normalize to the same file.
        Ok(record.filter(|r| r.name == name))
    }

    fn save(&self, record: &AssistantRecord) -> Result<()> {
        let path = self.record_path(&record.name);
        Self::ensure_parent(&path)?;
        let file = RecordFile {
            format: RECORD_FORMAT,
            assistant: record.clone(),
        };
        let serialized = toml::to_string(&file)?;
        fs::write(&path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self) -> Result<Vec<AssistantRecord>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            if let Some(record) = Self::read_record(&path)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}

const RECORD_FORMAT: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordFile {
    format: u32,
    assistant: AssistantRecord,
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' || lower == '_' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}
